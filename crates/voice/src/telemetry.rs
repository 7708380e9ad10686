//! Quality-Metriken – Latenz, Jitter, Verlust und MOS-Schaetzung
//!
//! Sammelt Zeitmessungen pro empfangenem Paket und fasst sie zu einem
//! [`QualityReport`] zusammen.
//!
//! ## Gesammelte Metriken
//! - Latenz pro Paket (Ankunft minus Sendezeit)
//! - Jitter pro Ankunft: |Transit_i − Transit_{i−1}|
//! - Verlustrate und Burst-Anteil
//! - Bandbreite (empfangene Bytes * 8 / Dauer)
//!
//! ## MOS
//! Vereinfachtes E-Modell:
//!
//! ```text
//! R   = 100 − Verlust% * 2.5 − max(0, Latenz − 150) * 0.1 − Jitter * 0.2   (auf [0, 100])
//! MOS = 1 + 0.035 R + R (R − 60)(100 − R) * 7e-6                         (auf [1.0, 4.5])
//! ```
//!
//! Die Faktoren sind ueber [`MosParameter`] einstellbar.

use serde::{Deserialize, Serialize};

use crate::congestion::BitrateFeedback;

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

/// Kennzahlen einer Stichprobe (leere Stichprobe = alles 0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Statistik {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    /// 95. Perzentil (Nearest-Rank)
    pub p95: f64,
    pub anzahl: usize,
}

impl Statistik {
    /// Berechnet min, avg, max und p95 ueber die Werte
    pub fn aus_werten(werte: &[f64]) -> Self {
        if werte.is_empty() {
            return Self::default();
        }

        let mut sortiert = werte.to_vec();
        sortiert.sort_by(f64::total_cmp);

        let summe: f64 = sortiert.iter().sum();
        Self {
            min: sortiert[0],
            avg: summe / sortiert.len() as f64,
            max: sortiert[sortiert.len() - 1],
            p95: perzentil(&sortiert, 95.0),
            anzahl: sortiert.len(),
        }
    }
}

/// Nearest-Rank-Perzentil ueber eine aufsteigend sortierte, nicht leere Liste
///
/// Index = ceil(p/100 * n) − 1
pub fn perzentil(sortiert: &[f64], p: f64) -> f64 {
    let n = sortiert.len();
    let rang = ((p / 100.0) * n as f64).ceil() as usize;
    sortiert[rang.clamp(1, n) - 1]
}

/// Verlust-Burst-Anteil: Anteil der Verluste, die in Serien von mindestens
/// zwei aufeinanderfolgenden Verlusten auftreten (0.0 ohne Verluste)
pub fn verlust_burst_anteil(verlustmuster: &[bool]) -> f64 {
    let verluste = verlustmuster.iter().filter(|&&v| v).count();
    if verluste == 0 {
        return 0.0;
    }

    let mut in_bursts = 0usize;
    let mut laenge = 0usize;
    for &verloren in verlustmuster.iter().chain(std::iter::once(&false)) {
        if verloren {
            laenge += 1;
        } else {
            if laenge > 1 {
                in_bursts += laenge;
            }
            laenge = 0;
        }
    }
    in_bursts as f64 / verluste as f64
}

// ---------------------------------------------------------------------------
// MOS
// ---------------------------------------------------------------------------

/// Einstellbare Faktoren der MOS-Schaetzung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosParameter {
    /// Abzug pro Prozent Verlust
    pub verlust_faktor: f64,
    /// Latenz in ms ab der abgezogen wird
    pub latenz_schwelle_ms: f64,
    /// Abzug pro ms Latenz ueber der Schwelle
    pub latenz_faktor: f64,
    /// Abzug pro ms mittlerem Jitter
    pub jitter_faktor: f64,
}

impl Default for MosParameter {
    fn default() -> Self {
        Self {
            verlust_faktor: 2.5,
            latenz_schwelle_ms: 150.0,
            latenz_faktor: 0.1,
            jitter_faktor: 0.2,
        }
    }
}

impl MosParameter {
    /// R-Faktor, auf [0, 100] begrenzt
    pub fn r_faktor(&self, verlust_prozent: f64, latenz_avg_ms: f64, jitter_avg_ms: f64) -> f64 {
        let r = 100.0
            - verlust_prozent * self.verlust_faktor
            - (latenz_avg_ms - self.latenz_schwelle_ms).max(0.0) * self.latenz_faktor
            - jitter_avg_ms * self.jitter_faktor;
        r.clamp(0.0, 100.0)
    }

    /// MOS aus Verlust, Latenz und Jitter
    pub fn mos(&self, verlust_prozent: f64, latenz_avg_ms: f64, jitter_avg_ms: f64) -> f64 {
        mos_aus_r(self.r_faktor(verlust_prozent, latenz_avg_ms, jitter_avg_ms))
    }
}

/// Abbildung R-Faktor -> MOS, auf [1.0, 4.5] begrenzt
pub fn mos_aus_r(r: f64) -> f64 {
    let mos = 1.0 + 0.035 * r + r * (r - 60.0) * (100.0 - r) * 7e-6;
    mos.clamp(1.0, 4.5)
}

/// Qualitaetsstufe eines MOS-Werts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MosKategorie {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

impl MosKategorie {
    pub fn aus_mos(mos: f64) -> Self {
        if mos >= 4.0 {
            MosKategorie::Excellent
        } else if mos >= 3.5 {
            MosKategorie::Good
        } else if mos >= 3.0 {
            MosKategorie::Fair
        } else if mos >= 2.0 {
            MosKategorie::Poor
        } else {
            MosKategorie::Bad
        }
    }

    pub fn bezeichnung(&self) -> &'static str {
        match self {
            MosKategorie::Excellent => "Excellent",
            MosKategorie::Good => "Good",
            MosKategorie::Fair => "Fair",
            MosKategorie::Poor => "Poor",
            MosKategorie::Bad => "Bad",
        }
    }
}

impl std::fmt::Display for MosKategorie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.bezeichnung())
    }
}

// ---------------------------------------------------------------------------
// QualityReport
// ---------------------------------------------------------------------------

/// Zusammenfassung eines Laufs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub pakete_gesendet: u64,
    pub pakete_empfangen: u64,
    pub pakete_verloren: u64,
    pub bytes_empfangen: u64,
    pub dauer_s: f64,
    pub verlustrate_prozent: f64,
    pub latenz_ms: Statistik,
    pub jitter_ms: Statistik,
    pub bandbreite_bps: f64,
    /// `None` ohne Latenz-Stichproben
    pub r_faktor: Option<f64>,
    /// `None` ohne Latenz-Stichproben
    pub mos: Option<f64>,
    pub mos_kategorie: Option<MosKategorie>,
    pub burst_anteil: f64,
    /// Wird vom Orchestrator aus der Audio-Analyse ergaenzt
    pub stille_anteil_prozent: Option<f64>,
}

impl QualityReport {
    /// Gibt eine lesbare Zusammenfassung zurueck
    pub fn zusammenfassung(&self) -> String {
        let mos = match (self.mos, self.mos_kategorie) {
            (Some(mos), Some(kategorie)) => format!("{mos:.2} ({kategorie})"),
            _ => "n/a".to_string(),
        };
        format!(
            "Loss={:.2}% Latenz={:.1}ms (p95={:.1}) Jitter={:.1}ms (p95={:.1}) Bandbreite={:.1}kbps MOS={}",
            self.verlustrate_prozent,
            self.latenz_ms.avg,
            self.latenz_ms.p95,
            self.jitter_ms.avg,
            self.jitter_ms.p95,
            self.bandbreite_bps / 1000.0,
            mos,
        )
    }
}

// ---------------------------------------------------------------------------
// QualityMetrics
// ---------------------------------------------------------------------------

/// Akkumuliert Messwerte eines Laufs
#[derive(Debug, Clone, Default)]
pub struct QualityMetrics {
    parameter: MosParameter,
    latenzen: Vec<f64>,
    jitter: Vec<f64>,
    letzter_transit: Option<f64>,
    gesendet: u64,
    empfangen: u64,
    bytes_empfangen: u64,
    verlustmuster: Vec<bool>,
    /// Stand bei der letzten Fenster-Auswertung (empfangen, Jitter-Index)
    fenster_start: (u64, usize),
}

impl QualityMetrics {
    pub fn neu(parameter: MosParameter) -> Self {
        Self {
            parameter,
            ..Default::default()
        }
    }

    /// Meldet ein gesendetes Paket
    pub fn paket_gesendet(&mut self) {
        self.gesendet += 1;
    }

    /// Meldet ein empfangenes Original (keine Duplikate)
    ///
    /// Zeiten in ms auf derselben Zeitachse.
    pub fn paket_empfangen(&mut self, gesendet_ms: f64, empfangen_ms: f64, bytes: usize) {
        let transit = (empfangen_ms - gesendet_ms).max(0.0);
        self.latenzen.push(transit);
        if let Some(letzter) = self.letzter_transit {
            self.jitter.push((transit - letzter).abs());
        }
        self.letzter_transit = Some(transit);
        self.empfangen += 1;
        self.bytes_empfangen += bytes as u64;
    }

    /// Hinterlegt das Verlustmuster in Sendereihenfolge (true = verloren)
    pub fn verlustmuster_setzen(&mut self, muster: Vec<bool>) {
        self.verlustmuster = muster;
    }

    pub fn gesendet(&self) -> u64 {
        self.gesendet
    }

    pub fn empfangen(&self) -> u64 {
        self.empfangen
    }

    /// Feedback seit der letzten Auswertung
    ///
    /// `verloren` = im selben Zeitraum endgueltig als verloren gewertete Pakete.
    pub fn fenster_feedback(&mut self, verloren: u64) -> BitrateFeedback {
        let (empfangen_start, jitter_start) = self.fenster_start;
        let empfangen = self.empfangen - empfangen_start;
        let jitter = &self.jitter[jitter_start..];

        let gesamt = empfangen + verloren;
        let verlust_prozent = if gesamt == 0 {
            0.0
        } else {
            verloren as f64 / gesamt as f64 * 100.0
        };
        let jitter_avg_ms = if jitter.is_empty() {
            0.0
        } else {
            jitter.iter().sum::<f64>() / jitter.len() as f64
        };

        self.fenster_start = (self.empfangen, self.jitter.len());
        BitrateFeedback {
            verlust_prozent,
            jitter_avg_ms,
        }
    }

    /// Erstellt den Bericht ueber den gesamten Lauf
    pub fn bericht(&self, dauer_s: f64) -> QualityReport {
        let verloren = self.gesendet.saturating_sub(self.empfangen);
        let verlustrate_prozent = if self.gesendet == 0 {
            0.0
        } else {
            verloren as f64 / self.gesendet as f64 * 100.0
        };

        let latenz_ms = Statistik::aus_werten(&self.latenzen);
        let jitter_ms = Statistik::aus_werten(&self.jitter);

        let bandbreite_bps = if dauer_s > 0.0 {
            self.bytes_empfangen as f64 * 8.0 / dauer_s
        } else {
            0.0
        };

        let (r_faktor, mos) = if latenz_ms.anzahl == 0 {
            (None, None)
        } else {
            let r = self
                .parameter
                .r_faktor(verlustrate_prozent, latenz_ms.avg, jitter_ms.avg);
            (Some(r), Some(mos_aus_r(r)))
        };

        QualityReport {
            pakete_gesendet: self.gesendet,
            pakete_empfangen: self.empfangen,
            pakete_verloren: verloren,
            bytes_empfangen: self.bytes_empfangen,
            dauer_s,
            verlustrate_prozent,
            latenz_ms,
            jitter_ms,
            bandbreite_bps,
            r_faktor,
            mos,
            mos_kategorie: mos.map(MosKategorie::aus_mos),
            burst_anteil: verlust_burst_anteil(&self.verlustmuster),
            stille_anteil_prozent: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
