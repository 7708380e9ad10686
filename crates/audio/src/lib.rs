//! voipbench-audio – Codec und Audio-Analyse
//!
//! - [`codec`] – `AudioCodec`-Trait, Passthrough und Opus (Feature `opus`)
//! - [`analyse`] – Testton-Quelle, RMS-Pegel und Stille-Anteil
//! - [`error`] – Fehlertypen

pub mod analyse;
pub mod codec;
pub mod error;

// Bequeme Re-Exporte der wichtigsten Typen
pub use analyse::{rms, StilleAnalyse, TestTon};
pub use codec::{codec_erstellen, AudioCodec, PassthroughCodec};
pub use error::{AudioError, AudioResult};
