//! Fehlertypen fuer Codec und Audio-Analyse

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Schicht
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Codec nicht verfuegbar: {0}")]
    CodecNichtVerfuegbar(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("PCM-Rahmen hat {erhalten} Samples, erwartet {erwartet}")]
    Rahmengroesse { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Nutzdaten: {0}")]
    UngueltigeNutzdaten(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
