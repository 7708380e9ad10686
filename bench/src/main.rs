//! voipbench – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, misst alle
//! Netzwerkbedingungen und schreibt die Ergebnisse als JSON nach stdout.

use anyhow::Result;
use voipbench::{config::BenchConfig, logging::logging_initialisieren, Benchmark};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("VOIPBENCH_CONFIG").unwrap_or_else(|_| "voipbench.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = BenchConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "voipbench wird initialisiert"
    );

    let benchmark = Benchmark::neu(config);
    let ergebnisse = benchmark.ausfuehren().await?;

    println!("{}", serde_json::to_string_pretty(&ergebnisse)?);
    Ok(())
}
