//! Sende- und Empfangsseite eines Laufs
//!
//! Beide Ausfuehrungsarten teilen sich die Quelle (Testton, Encoder,
//! Bitrate-Regler) und die Auswertung (Decoder, Metriken, Stille-Analyse).
//! Sie unterscheiden sich nur darin, wie Pakete vom einen zum anderen kommen.

use serde::Serialize;
use tracing::{debug, trace};
use voipbench_audio::{codec_erstellen, AudioCodec, StilleAnalyse, TestTon};
use voipbench_protocol::codec::BYTES_PRO_SAMPLE;
use voipbench_protocol::RtpPacket;
use voipbench_voice::congestion::{AdaptiveBitrateController, BitrateFeedback};
use voipbench_voice::netsim::NetsimStatistik;
use voipbench_voice::telemetry::{QualityMetrics, QualityReport};
use voipbench_voice::verlust::Ankunft;

use crate::config::BenchConfig;

// ---------------------------------------------------------------------------
// Quelle
// ---------------------------------------------------------------------------

/// Erzeugt kodierte Rahmen und setzt Regler-Entscheidungen am Encoder um
pub(crate) struct Quelle {
    ton: TestTon,
    encoder: Box<dyn AudioCodec>,
    regler: AdaptiveBitrateController,
    adaptiv: bool,
    pcm_bytes: u64,
    kodierte_bytes: u64,
}

impl Quelle {
    pub(crate) fn neu(config: &BenchConfig) -> anyhow::Result<Self> {
        let encoder = codec_erstellen(config.codec.typ, config.audio, config.codec.bitrate)?;
        Ok(Self {
            ton: TestTon::neu(config.audio),
            encoder,
            regler: AdaptiveBitrateController::neu(
                config.bitrate.regler_config(),
                config.codec.bitrate,
            ),
            adaptiv: config.codec.adaptiv,
            pcm_bytes: 0,
            kodierte_bytes: 0,
        })
    }

    pub(crate) fn payload_type(&self) -> u8 {
        self.encoder.payload_type()
    }

    pub(crate) fn adaptiv(&self) -> bool {
        self.adaptiv
    }

    /// Kodiert den naechsten Rahmen des Testtons
    pub(crate) fn naechste_nutzdaten(&mut self) -> anyhow::Result<Vec<u8>> {
        let pcm = self.ton.naechster_rahmen();
        let kodiert = self.encoder.encode(&pcm)?;
        self.pcm_bytes += (pcm.len() * BYTES_PRO_SAMPLE) as u64;
        self.kodierte_bytes += kodiert.len() as u64;
        Ok(kodiert)
    }

    /// Fuettert den Regler und uebernimmt eine geaenderte Bitrate
    pub(crate) fn regeln(&mut self, feedback: BitrateFeedback) -> anyhow::Result<()> {
        let alt = self.regler.aktuelle_bitrate();
        let neu = self.regler.anpassen(feedback);
        if neu != alt {
            self.encoder.bitrate_setzen(neu)?;
            debug!(
                alt,
                neu,
                verlust_prozent = feedback.verlust_prozent,
                jitter_ms = feedback.jitter_avg_ms,
                "Bitrate angepasst"
            );
        }
        Ok(())
    }

    /// Endstand des Reglers
    pub(crate) fn bitrate_daten(&self) -> BitrateDaten {
        BitrateDaten {
            ziel_bitrate: self.regler.aktuelle_bitrate(),
            codec_bitrate: self.encoder.aktuelle_bitrate(),
            erhoehungen: self.regler.erhoehungen(),
            senkungen: self.regler.senkungen(),
            verlauf: self.regler.verlauf(),
            pcm_bytes: self.pcm_bytes,
            kodierte_bytes: self.kodierte_bytes,
            kompressionsrate: kompressionsrate(self.pcm_bytes, self.kodierte_bytes),
        }
    }
}

/// Bitrate-Verlauf eines Laufs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitrateDaten {
    /// Letzte Vorgabe des Reglers in bit/s
    pub ziel_bitrate: u32,
    /// Tatsaechliche Bitrate des Codecs (Roh-PCM ignoriert die Vorgabe)
    pub codec_bitrate: u32,
    pub erhoehungen: u64,
    pub senkungen: u64,
    /// Letzte Vorgaben, aelteste zuerst
    pub verlauf: Vec<u32>,
    /// Groesse der unkomprimierten Rahmen in Bytes
    pub pcm_bytes: u64,
    /// Groesse der kodierten Nutzdaten in Bytes
    pub kodierte_bytes: u64,
    /// Kodierte / PCM-Groesse (1.0 = keine Kompression, 0.0 ohne Rahmen)
    pub kompressionsrate: f64,
}

fn kompressionsrate(pcm_bytes: u64, kodierte_bytes: u64) -> f64 {
    if pcm_bytes == 0 {
        0.0
    } else {
        kodierte_bytes as f64 / pcm_bytes as f64
    }
}

// ---------------------------------------------------------------------------
// Auswertung
// ---------------------------------------------------------------------------

/// Empfangsseitige Auswertung eines Laufs
pub(crate) struct Auswertung {
    decoder: Box<dyn AudioCodec>,
    metrics: QualityMetrics,
    stille: StilleAnalyse,
    /// Pro gesendetem Rahmen: bereits empfangen
    empfangen: Vec<bool>,
    feedback_fenster: u32,
    seit_feedback: u32,
    verloren_basis: u64,
}

impl Auswertung {
    pub(crate) fn neu(config: &BenchConfig) -> anyhow::Result<Self> {
        Ok(Self {
            decoder: codec_erstellen(config.codec.typ, config.audio, config.codec.bitrate)?,
            metrics: QualityMetrics::neu(config.mos.clone()),
            stille: StilleAnalyse::default(),
            empfangen: Vec::new(),
            feedback_fenster: config.benchmark.feedback_fenster,
            seit_feedback: 0,
            verloren_basis: 0,
        })
    }

    /// Meldet einen gesendeten Rahmen und liefert seinen Index
    pub(crate) fn gesendet(&mut self) -> usize {
        self.metrics.paket_gesendet();
        self.empfangen.push(false);
        self.empfangen.len() - 1
    }

    /// Wertet ein eingetroffenes Paket aus
    ///
    /// Duplikate und Pakete jenseits des Verlust-Fensters gehen nicht in
    /// die Metriken ein.
    pub(crate) fn empfangen(
        &mut self,
        index: usize,
        ankunft: Ankunft,
        gesendet_ms: f64,
        empfangen_ms: f64,
        paket: &RtpPacket,
    ) {
        if matches!(ankunft, Ankunft::Duplikat | Ankunft::ZuSpaet) {
            trace!(seq = paket.sequence_number, ?ankunft, "Paket nicht gewertet");
            return;
        }
        match self.empfangen.get_mut(index) {
            Some(schon) if !*schon => *schon = true,
            _ => return,
        }

        self.metrics
            .paket_empfangen(gesendet_ms, empfangen_ms, paket.groesse());
        match self.decoder.decode(&paket.payload) {
            Ok(pcm) => {
                self.stille.rahmen_pruefen(&pcm);
            }
            Err(e) => {
                debug!(seq = paket.sequence_number, fehler = %e, "Rahmen nicht dekodierbar");
                self.stille.rahmen_verloren(1);
            }
        }
        self.seit_feedback += 1;
    }

    pub(crate) fn feedback_faellig(&self) -> bool {
        self.seit_feedback >= self.feedback_fenster
    }

    /// Feedback seit dem letzten Fenster
    ///
    /// `verloren_gesamt` ist der laufende Verlustzaehler des Verlust-Fensters.
    pub(crate) fn feedback(&mut self, verloren_gesamt: u64) -> BitrateFeedback {
        let verloren = verloren_gesamt.saturating_sub(self.verloren_basis);
        self.verloren_basis = verloren_gesamt;
        self.seit_feedback = 0;
        self.metrics.fenster_feedback(verloren)
    }

    /// Erstellt den Bericht; nie empfangene Rahmen zaehlen als Stille
    pub(crate) fn abschliessen(mut self, dauer_s: f64) -> QualityReport {
        let muster: Vec<bool> = self.empfangen.iter().map(|e| !e).collect();
        let verloren = muster.iter().filter(|&&v| v).count() as u64;
        self.stille.rahmen_verloren(verloren);
        self.metrics.verlustmuster_setzen(muster);

        let mut bericht = self.metrics.bericht(dauer_s);
        bericht.stille_anteil_prozent = self.stille.anteil_prozent();
        bericht
    }
}

/// Ergebnis eines einzelnen Laufs vor dem Zusammenfuehren
#[derive(Debug, Clone)]
pub(crate) struct Laufdaten {
    pub bericht: QualityReport,
    pub netzwerk: NetsimStatistik,
    pub bitrate: BitrateDaten,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paket(seq: u16, payload: Vec<u8>) -> RtpPacket {
        RtpPacket::neu(96, seq, seq as u32 * 960, 1, payload)
    }

    fn config() -> BenchConfig {
        let mut config = BenchConfig::default();
        config.benchmark.feedback_fenster = 2;
        config
    }

    #[test]
    fn duplikate_zaehlen_nicht() {
        let mut auswertung = Auswertung::neu(&config()).unwrap();
        let i = auswertung.gesendet();
        let p = paket(0, vec![0; 1920]);

        auswertung.empfangen(i, Ankunft::InOrdnung, 0.0, 20.0, &p);
        auswertung.empfangen(i, Ankunft::InOrdnung, 0.0, 21.0, &p);
        auswertung.empfangen(i, Ankunft::Duplikat, 0.0, 22.0, &p);

        let bericht = auswertung.abschliessen(0.02);
        assert_eq!(bericht.pakete_empfangen, 1);
        assert_eq!(bericht.latenz_ms.avg, 20.0);
    }

    #[test]
    fn feedback_nach_fenster() {
        let mut auswertung = Auswertung::neu(&config()).unwrap();
        for seq in 0..3u16 {
            let i = auswertung.gesendet();
            assert!(!auswertung.feedback_faellig());
            auswertung.empfangen(i, Ankunft::InOrdnung, 0.0, 10.0, &paket(seq, vec![0; 4]));
        }
        assert!(auswertung.feedback_faellig());

        // 3 empfangen, 1 verloren
        let fb = auswertung.feedback(1);
        assert_eq!(fb.verlust_prozent, 25.0);
        assert!(!auswertung.feedback_faellig());

        // Zaehler ist kumulativ: nur die Differenz zaehlt
        let fb = auswertung.feedback(1);
        assert_eq!(fb.verlust_prozent, 0.0);
    }

    #[test]
    fn verlorene_rahmen_sind_still() {
        let mut auswertung = Auswertung::neu(&config()).unwrap();
        let laut: Vec<u8> = std::iter::repeat([0x00, 0x40]).take(960).flatten().collect();

        let a = auswertung.gesendet();
        let _verloren = auswertung.gesendet();
        auswertung.empfangen(a, Ankunft::InOrdnung, 0.0, 5.0, &paket(0, laut));

        let bericht = auswertung.abschliessen(0.04);
        assert_eq!(bericht.pakete_verloren, 1);
        assert_eq!(bericht.stille_anteil_prozent, Some(50.0));
    }

    #[test]
    fn quelle_regelt_bei_verlust_herunter() {
        let mut quelle = Quelle::neu(&config()).unwrap();
        assert_eq!(quelle.payload_type(), 96);
        assert_eq!(quelle.naechste_nutzdaten().unwrap().len(), 1920);

        quelle
            .regeln(BitrateFeedback {
                verlust_prozent: 20.0,
                jitter_avg_ms: 0.0,
            })
            .unwrap();
        let daten = quelle.bitrate_daten();
        assert_eq!(daten.ziel_bitrate, 56_000);
        assert_eq!(daten.senkungen, 1);
        assert_eq!(daten.codec_bitrate, 768_000);
    }

    #[test]
    fn kompression_wird_mitgezaehlt() {
        let mut quelle = Quelle::neu(&config()).unwrap();
        assert_eq!(quelle.bitrate_daten().kompressionsrate, 0.0);

        for _ in 0..5 {
            quelle.naechste_nutzdaten().unwrap();
        }
        let daten = quelle.bitrate_daten();
        assert_eq!(daten.pcm_bytes, 5 * 1920);
        // Roh-PCM: Nutzdaten so gross wie der Rahmen
        assert_eq!(daten.kodierte_bytes, daten.pcm_bytes);
        assert_eq!(daten.kompressionsrate, 1.0);
    }

    #[cfg(feature = "opus")]
    #[test]
    fn opus_komprimiert() {
        let mut config = config();
        config.codec.typ = voipbench_protocol::CodecTyp::Opus;
        config.codec.bitrate = 32_000;
        let mut quelle = Quelle::neu(&config).unwrap();
        for _ in 0..50 {
            quelle.naechste_nutzdaten().unwrap();
        }
        assert!(quelle.bitrate_daten().kompressionsrate < 0.5);
    }
}
