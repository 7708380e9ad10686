//! Fehlertypen fuer voipbench
//!
//! Zentraler Fehler-Enum fuer Paket-Codec und RTP-Sessions.
//! Die Audio-Engine definiert eigene Fehler (`voipbench_audio::AudioError`).

use thiserror::Error;

/// Globaler Result-Alias fuer voipbench
pub type Result<T> = std::result::Result<T, VoipError>;

/// Alle moeglichen Fehler im RTP-Transport-Kern
#[derive(Debug, Error)]
pub enum VoipError {
    // --- Protokoll ---
    /// Strukturell ungueltiges RTP-Datagramm (wird nicht wiederholt)
    #[error("Ungueltiges RTP-Paket: {0}")]
    UngueltigesPaket(String),

    // --- Session ---
    /// API-Fehlbenutzung: Session nicht geoeffnet oder bereits geschlossen
    #[error("RTP-Session nicht geoeffnet")]
    SessionNichtOffen,

    /// Session ist nur zum Empfang konfiguriert (kein Remote-Endpunkt)
    #[error("Kein Remote-Endpunkt konfiguriert (Session ist receive-only)")]
    KeinRemoteEndpunkt,

    /// Lokaler Endpunkt konnte nicht gebunden werden
    #[error("Bind fehlgeschlagen auf {adresse}: {grund}")]
    Bind { adresse: String, grund: String },

    // --- Netzwerk ---
    /// Voruebergehender Sende-/Empfangsfehler
    #[error("Transportfehler: {0}")]
    Transport(#[from] std::io::Error),
}

impl VoipError {
    /// Erstellt einen Paketfehler aus einer beliebigen Nachricht
    pub fn paket(msg: impl Into<String>) -> Self {
        Self::UngueltigesPaket(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler voruebergehend sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        match self {
            Self::Transport(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = VoipError::paket("zu kurz: 4 Bytes");
        assert_eq!(e.to_string(), "Ungueltiges RTP-Paket: zu kurz: 4 Bytes");
    }

    #[test]
    fn bind_fehler_enthaelt_adresse() {
        let e = VoipError::Bind {
            adresse: "127.0.0.1:5004".into(),
            grund: "Address in use".into(),
        };
        assert!(e.to_string().contains("127.0.0.1:5004"));
    }

    #[test]
    fn wiederholbar_erkennung() {
        let timeout = VoipError::Transport(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(timeout.ist_wiederholbar());
        assert!(!VoipError::SessionNichtOffen.ist_wiederholbar());
        assert!(!VoipError::paket("x").ist_wiederholbar());
    }
}
