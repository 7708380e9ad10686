//! Gemeinsame Identifikationstypen fuer voipbench
//!
//! Newtype-Pattern, damit Lauf-IDs nicht mit anderen UUIDs verwechselt werden.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID eines Benchmark-Laufs (landet im Bericht)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaufId(pub Uuid);

impl LaufId {
    /// Erstellt eine neue zufaellige LaufId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for LaufId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LaufId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lauf_ids_sind_eindeutig() {
        assert_ne!(LaufId::new(), LaufId::new());
    }

    #[test]
    fn lauf_id_serde() {
        let id = LaufId::new();
        let json = serde_json::to_string(&id).unwrap();
        let id2: LaufId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }
}
