//! voipbench-core – Gemeinsame Typen und Fehlertypen
//!
//! Fundamentale Bausteine, die von allen anderen voipbench-Crates
//! gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, VoipError};
pub use types::LaufId;
