//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `VB_LOG_LEVEL`: Log-Level bzw. Filter-Direktive, ueberschreibt die Konfiguration
//! - `VB_LOG_FORMAT`: Format (text/json), ueberschreibt die Konfiguration
//!
//! Logs gehen nach stderr, damit stdout dem JSON-Bericht vorbehalten bleibt.

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer das Log-Level
pub const ENV_LOG_LEVEL: &str = "VB_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "VB_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor `level` / `format`.
/// Faellt auf `info` / `text` zurueck falls beides ungueltig ist.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());

    let ergebnis = match format_env.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    // Zweiter Aufruf (z.B. in Tests) behaelt den bestehenden Subscriber
    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        assert!(log_level_gueltig("trace"));
        assert!(log_level_gueltig("debug"));
        assert!(log_level_gueltig("info"));
        assert!(log_level_gueltig("warn"));
        assert!(log_level_gueltig("error"));
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
    }

    #[test]
    fn doppelte_initialisierung_ist_harmlos() {
        logging_initialisieren("warn", "text");
        logging_initialisieren("debug", "json");
    }
}
