//! voipbench – Bibliotheks-Root
//!
//! Verdrahtet Testton, Codec, RTP, Netzwerk-Simulator, Bitrate-Regler und
//! Quality-Metriken zu einem Benchmark-Lauf pro Netzwerkbedingung.

mod auswertung;
mod batch;
pub mod config;
mod echtzeit;
pub mod logging;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use voipbench_core::LaufId;
use voipbench_protocol::codec::CodecTyp;
use voipbench_protocol::rtp::{MAX_PAKET_GROESSE, RTP_HEADER_GROESSE};
use voipbench_voice::netsim::{NetsimStatistik, NetworkCondition};
use voipbench_voice::telemetry::QualityReport;

pub use auswertung::BitrateDaten;
use config::{BenchConfig, Modus};

/// Ergebnis einer Netzwerkbedingung mit einem Codec
#[derive(Debug, Clone, Serialize)]
pub struct BedingungsErgebnis {
    pub lauf_id: LaufId,
    pub gestartet: DateTime<Utc>,
    pub modus: Modus,
    pub codec: CodecTyp,
    /// Seed des Netzwerk-Simulators fuer diese Bedingung
    pub seed: u64,
    pub bedingung: NetworkCondition,
    pub bericht: QualityReport,
    pub netzwerk: NetsimStatistik,
    pub bitrate: BitrateDaten,
}

/// Haelt die Konfiguration eines Benchmarks zusammen
pub struct Benchmark {
    pub config: BenchConfig,
    seed: u64,
}

impl Benchmark {
    /// Erstellt einen neuen Benchmark aus der gegebenen Konfiguration
    ///
    /// Ohne konfigurierten Seed wird einer gezogen und geloggt, damit der
    /// Lauf wiederholt werden kann.
    pub fn neu(config: BenchConfig) -> Self {
        let seed = config.benchmark.seed.unwrap_or_else(rand::random);
        Self { config, seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Misst alle konfigurierten Bedingungen nacheinander
    ///
    /// Bedingung `i` verwendet den Seed `seed + i`. Bei einem Codec-Vergleich
    /// laufen alle Codecs einer Bedingung mit demselben Seed und sehen damit
    /// dieselben Netzwerkentscheidungen.
    pub async fn ausfuehren(&self) -> Result<Vec<BedingungsErgebnis>> {
        if let Err(fehler) = self.config.validieren() {
            anyhow::bail!("Ungueltige Konfiguration: {}", fehler.join("; "));
        }

        let codecs = self.config.codec.codecs();
        tracing::info!(
            modus = ?self.config.benchmark.modus,
            codecs = ?codecs,
            bedingungen = self.config.benchmark.bedingungen.len(),
            dauer_s = self.config.benchmark.dauer_s,
            seed = self.seed,
            "Benchmark startet"
        );

        let pcm_datagramm = RTP_HEADER_GROESSE + self.config.audio.rahmen_bytes();
        if codecs.contains(&CodecTyp::None) && pcm_datagramm > MAX_PAKET_GROESSE {
            tracing::warn!(
                bytes = pcm_datagramm,
                mtu = MAX_PAKET_GROESSE,
                "PCM-Datagramme groesser als die MTU, IP fragmentiert sie"
            );
        }

        let mut ergebnisse =
            Vec::with_capacity(self.config.benchmark.bedingungen.len() * codecs.len());
        for (i, bedingung) in self.config.benchmark.bedingungen.iter().enumerate() {
            let seed = self.seed.wrapping_add(i as u64);

            for &codec in &codecs {
                let mut config = self.config.clone();
                config.codec.typ = codec;
                ergebnisse.push(self.bedingung_messen(&config, bedingung, seed).await?);
            }
        }

        Ok(ergebnisse)
    }

    async fn bedingung_messen(
        &self,
        config: &BenchConfig,
        bedingung: &NetworkCondition,
        seed: u64,
    ) -> Result<BedingungsErgebnis> {
        let lauf_id = LaufId::new();
        let gestartet = Utc::now();

        tracing::info!(
            lauf_id = %lauf_id,
            bedingung = %bedingung.name,
            codec = config.codec.typ.bezeichnung(),
            verlust = bedingung.packet_loss,
            latenz_ms = bedingung.latenz_ms,
            jitter_ms = bedingung.jitter_ms,
            "Bedingung wird gemessen"
        );

        let daten = match config.benchmark.modus {
            Modus::Batch => batch::ausfuehren(config, bedingung, seed)?,
            Modus::Echtzeit => echtzeit::ausfuehren(config, bedingung, seed).await?,
        };

        tracing::info!(
            lauf_id = %lauf_id,
            bedingung = %bedingung.name,
            codec = config.codec.typ.bezeichnung(),
            ziel_bitrate = daten.bitrate.ziel_bitrate,
            kompressionsrate = daten.bitrate.kompressionsrate,
            "{}",
            daten.bericht.zusammenfassung()
        );

        Ok(BedingungsErgebnis {
            lauf_id,
            gestartet,
            modus: config.benchmark.modus,
            codec: config.codec.typ,
            seed,
            bedingung: bedingung.clone(),
            bericht: daten.bericht,
            netzwerk: daten.netzwerk,
            bitrate: daten.bitrate,
        })
    }
}
