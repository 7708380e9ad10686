//! Benchmark-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Benchmark ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use voipbench_protocol::codec::{AudioFormat, CodecTyp};
use voipbench_protocol::rtp::{MAX_DATAGRAMM_GROESSE, RTP_HEADER_GROESSE};
use voipbench_voice::congestion::{BitrateConfig, BitrateStrategie};
use voipbench_voice::netsim::NetworkCondition;
use voipbench_voice::telemetry::MosParameter;
use voipbench_voice::verlust::STANDARD_FENSTER;

use crate::logging::{log_format_gueltig, log_level_gueltig};

/// Vollstaendige Benchmark-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// PCM-Format der Testquelle
    pub audio: AudioFormat,
    /// Codec-Auswahl
    pub codec: CodecEinstellungen,
    /// Netzwerk-Einstellungen der Sessions
    pub netzwerk: NetzwerkEinstellungen,
    /// Ablauf des Benchmarks
    pub benchmark: BenchmarkEinstellungen,
    /// Bitrate-Regler
    pub bitrate: BitrateEinstellungen,
    /// Faktoren der MOS-Schaetzung
    pub mos: MosParameter,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: trace, debug, info, warn, error
    pub level: String,
    /// Format: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Codec-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecEinstellungen {
    /// "none" (Roh-PCM) oder "opus"
    pub typ: CodecTyp,
    /// Start-Bitrate in bit/s
    pub bitrate: u32,
    /// Bitrate waehrend des Laufs regeln
    pub adaptiv: bool,
    /// Codecs, die unter identischen Bedingungen verglichen werden
    /// (leer = nur `typ`)
    pub vergleich: Vec<CodecTyp>,
}

impl CodecEinstellungen {
    /// Alle zu messenden Codecs in Konfigurationsreihenfolge
    pub fn codecs(&self) -> Vec<CodecTyp> {
        if self.vergleich.is_empty() {
            vec![self.typ]
        } else {
            self.vergleich.clone()
        }
    }
}

impl Default for CodecEinstellungen {
    fn default() -> Self {
        Self {
            typ: CodecTyp::None,
            bitrate: 64_000,
            adaptiv: true,
            vergleich: Vec::new(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse beider Sessions
    pub bind_adresse: String,
    /// UDP-Port des Senders (0 = vom System vergeben)
    pub sender_port: u16,
    /// UDP-Port des Empfaengers (0 = vom System vergeben)
    pub empfaenger_port: u16,
    /// Groesse des Verlust-Fensters in Sequenznummern
    pub verlust_fenster: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "127.0.0.1".into(),
            sender_port: 0,
            empfaenger_port: 0,
            verlust_fenster: STANDARD_FENSTER,
        }
    }
}

/// Ausfuehrungsart eines Laufs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modus {
    /// Diskrete Ereignissimulation ohne Sockets
    #[default]
    Batch,
    /// Echte UDP-Sessions auf Loopback mit Echtzeit-Zustellung
    Echtzeit,
}

/// Ablauf-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkEinstellungen {
    /// Sendedauer pro Bedingung in Sekunden
    pub dauer_s: f64,
    /// Nachlaufzeit fuer verspaetete Pakete in Sekunden
    pub cooldown_s: f64,
    pub modus: Modus,
    /// Seed des Netzwerk-Simulators (None = zufaellig)
    pub seed: Option<u64>,
    /// Empfangene Pakete pro Feedback-Fenster des Reglers
    pub feedback_fenster: u32,
    /// Nacheinander gemessene Netzwerkbedingungen
    pub bedingungen: Vec<NetworkCondition>,
}

impl Default for BenchmarkEinstellungen {
    fn default() -> Self {
        Self {
            dauer_s: 10.0,
            cooldown_s: 2.0,
            modus: Modus::Batch,
            seed: None,
            feedback_fenster: 50,
            bedingungen: vec![
                NetworkCondition::perfekt(),
                NetworkCondition::gut(),
                NetworkCondition::schlecht(),
            ],
        }
    }
}

/// Regler-Einstellungen
///
/// Die Strategie liefert die Schwellwerte; explizit gesetzte Felder in
/// `[bitrate.regler]` haben Vorrang.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BitrateEinstellungen {
    pub strategie: BitrateStrategie,
    pub regler: ReglerUeberschreibung,
}

impl Default for BitrateEinstellungen {
    fn default() -> Self {
        Self {
            strategie: BitrateStrategie::Ausgewogen,
            regler: ReglerUeberschreibung::default(),
        }
    }
}

/// Einzeln ueberschreibbare Regler-Parameter (`None` = Wert der Strategie)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReglerUeberschreibung {
    pub min_bitrate: Option<u32>,
    pub max_bitrate: Option<u32>,
    pub schritt: Option<u32>,
    pub verlust_obergrenze_prozent: Option<f64>,
    pub verlust_untergrenze_prozent: Option<f64>,
    pub jitter_schwelle_ms: Option<f64>,
    pub hysterese_fenster: Option<u32>,
    pub cooldown_fenster: Option<u32>,
}

impl ReglerUeberschreibung {
    /// Legt die gesetzten Felder ueber `basis`
    pub fn anwenden(&self, mut basis: BitrateConfig) -> BitrateConfig {
        fn setzen<T: Copy>(ziel: &mut T, wert: Option<T>) {
            if let Some(w) = wert {
                *ziel = w;
            }
        }

        setzen(&mut basis.min_bitrate, self.min_bitrate);
        setzen(&mut basis.max_bitrate, self.max_bitrate);
        setzen(&mut basis.schritt, self.schritt);
        setzen(&mut basis.verlust_obergrenze_prozent, self.verlust_obergrenze_prozent);
        setzen(&mut basis.verlust_untergrenze_prozent, self.verlust_untergrenze_prozent);
        setzen(&mut basis.jitter_schwelle_ms, self.jitter_schwelle_ms);
        setzen(&mut basis.hysterese_fenster, self.hysterese_fenster);
        setzen(&mut basis.cooldown_fenster, self.cooldown_fenster);
        basis
    }
}

impl BitrateEinstellungen {
    /// Wirksame Regler-Parameter
    pub fn regler_config(&self) -> BitrateConfig {
        self.regler
            .anwenden(BitrateConfig::fuer_strategie(self.strategie))
    }
}

impl BenchConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Falls die Datei nicht existiert, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: BenchConfig = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{}': {}", pfad, e))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = %pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(BenchConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{}' konnte nicht gelesen werden: {}",
                pfad,
                e
            )),
        }
    }

    /// Prueft die Konfiguration und liefert alle gefundenen Fehler
    pub fn validieren(&self) -> Result<(), Vec<String>> {
        let mut fehler = Vec::new();

        if !log_level_gueltig(&self.logging.level) {
            fehler.push(format!("Ungueltiges Log-Level: {}", self.logging.level));
        }
        if !log_format_gueltig(&self.logging.format) {
            fehler.push(format!("Ungueltiges Log-Format: {}", self.logging.format));
        }
        if let Err(e) = self.audio.validieren() {
            fehler.push(e);
        }
        if self.codec.bitrate == 0 {
            fehler.push("codec.bitrate muss groesser 0 sein".into());
        }
        // Roh-PCM muss als einzelnes UDP-Datagramm transportierbar sein
        let pcm_datagramm = RTP_HEADER_GROESSE + self.audio.rahmen_bytes();
        if self.codec.codecs().contains(&CodecTyp::None) && pcm_datagramm > MAX_DATAGRAMM_GROESSE {
            fehler.push(format!(
                "PCM-Rahmen ergibt {} Byte grosse Datagramme (maximal {})",
                pcm_datagramm, MAX_DATAGRAMM_GROESSE
            ));
        }
        if self.bind_ip().is_none() {
            fehler.push(format!(
                "Ungueltige Bind-Adresse: {}",
                self.netzwerk.bind_adresse
            ));
        }
        if self.netzwerk.verlust_fenster == 0 {
            fehler.push("netzwerk.verlust_fenster muss mindestens 1 sein".into());
        }
        if !(self.benchmark.dauer_s > 0.0) {
            fehler.push("benchmark.dauer_s muss groesser 0 sein".into());
        }
        if !(self.benchmark.cooldown_s >= 0.0) {
            fehler.push("benchmark.cooldown_s darf nicht negativ sein".into());
        }
        if self.benchmark.feedback_fenster == 0 {
            fehler.push("benchmark.feedback_fenster muss mindestens 1 sein".into());
        }
        if self.benchmark.bedingungen.is_empty() {
            fehler.push("Keine Netzwerkbedingungen konfiguriert".into());
        }
        if let Err(e) = self.bitrate.regler_config().validieren() {
            fehler.push(e);
        }

        if fehler.is_empty() {
            Ok(())
        } else {
            Err(fehler)
        }
    }

    /// Gibt die Bind-IP zurueck, falls sie parsebar ist
    pub fn bind_ip(&self) -> Option<IpAddr> {
        self.netzwerk.bind_adresse.parse().ok()
    }

    /// Bind-Endpunkt der sendenden Session
    pub fn sender_bind_adresse(&self) -> Option<SocketAddr> {
        self.bind_ip()
            .map(|ip| SocketAddr::new(ip, self.netzwerk.sender_port))
    }

    /// Bind-Endpunkt der empfangenden Session
    pub fn empfaenger_bind_adresse(&self) -> Option<SocketAddr> {
        self.bind_ip()
            .map(|ip| SocketAddr::new(ip, self.netzwerk.empfaenger_port))
    }
}
