//! voipbench-voice – RTP-Transport und Qualitaetsmessung
//!
//! Kern des Benchmarks: Pakete werden ueber RTP verschickt, durch eine
//! simulierte Netzwerkstrecke geschickt und auf Empfangsseite vermessen.
//!
//! ## Module
//! - [`session`] – RTP-Session ueber UDP mit Empfangs-Task
//! - [`sequenz`] – Sequenznummern- und Zeitstempel-Vergabe
//! - [`verlust`] – Verlust-Erkennung ueber ein gleitendes Sequenzfenster
//! - [`netsim`] – Netzwerk-Simulator (Batch und Echtzeit)
//! - [`congestion`] – Adaptive Bitrate-Regelung
//! - [`telemetry`] – Quality-Metriken und MOS-Schaetzung

pub mod congestion;
pub mod netsim;
pub mod sequenz;
pub mod session;
pub mod telemetry;
pub mod verlust;

pub use congestion::{AdaptiveBitrateController, BitrateConfig, BitrateFeedback, BitrateStrategie};
pub use netsim::{Echtzeitplaner, NetsimStatistik, NetworkCondition, NetworkSimulator, SimulierteZustellung};
pub use sequenz::RtpSequencer;
pub use session::{EmpfangenesPaket, RtpSession, SessionConfig, SessionStatistik, SessionZustand};
pub use telemetry::{MosKategorie, MosParameter, QualityMetrics, QualityReport, Statistik};
pub use verlust::{Ankunft, VerlustFenster};
