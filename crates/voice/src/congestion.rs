//! Adaptive Bitrate – Regelkreis ueber Verlust- und Jitter-Feedback
//!
//! Wird einmal pro Feedback-Fenster mit den gemessenen Werten aufgerufen und
//! liefert die neue Ziel-Bitrate fuer den Codec.
//!
//! ## Strategie
//! - **Verlust > Obergrenze**: Bitrate um `schritt` senken, Gut-Zaehler
//!   zuruecksetzen, `cooldown_fenster` lang nicht erhoehen
//! - **Verlust < Untergrenze und Jitter < Schwelle**: nach `hysterese_fenster`
//!   guten Fenstern in Folge um `schritt` erhoehen
//! - sonst keine Aenderung
//!
//! Die Bitrate bleibt immer in `[min_bitrate, max_bitrate]`; Begrenzung ist
//! kein Fehler.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Maximale Laenge des Bitrate-Verlaufs
pub const VERLAUF_LAENGE: usize = 100;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Voreinstellung der Schwellwerte
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitrateStrategie {
    /// Frueh reagieren (3 % Verlust, 20 ms Jitter)
    #[serde(rename = "quality")]
    Qualitaet,
    /// 5 % Verlust, 30 ms Jitter
    #[default]
    #[serde(rename = "balanced")]
    Ausgewogen,
    /// Spaet reagieren (10 % Verlust, 50 ms Jitter)
    #[serde(rename = "aggressive")]
    Aggressiv,
}

impl BitrateStrategie {
    /// (Verlust-Obergrenze %, Verlust-Untergrenze %, Jitter-Schwelle ms)
    pub fn schwellwerte(&self) -> (f64, f64, f64) {
        match self {
            BitrateStrategie::Qualitaet => (3.0, 0.5, 20.0),
            BitrateStrategie::Ausgewogen => (5.0, 1.0, 30.0),
            BitrateStrategie::Aggressiv => (10.0, 2.0, 50.0),
        }
    }
}

/// Parameter des Bitrate-Reglers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitrateConfig {
    /// Minimale Bitrate in bit/s
    pub min_bitrate: u32,
    /// Maximale Bitrate in bit/s
    pub max_bitrate: u32,
    /// Schrittweite in bit/s
    pub schritt: u32,
    /// Verlust in % oberhalb dessen gesenkt wird
    pub verlust_obergrenze_prozent: f64,
    /// Verlust in % unterhalb dessen ein Fenster als gut gilt
    pub verlust_untergrenze_prozent: f64,
    /// Jitter-Schwelle fuer gute Fenster in ms
    pub jitter_schwelle_ms: f64,
    /// Gute Fenster in Folge vor einer Erhoehung
    pub hysterese_fenster: u32,
    /// Fenster ohne Erhoehung nach einer Senkung
    pub cooldown_fenster: u32,
}

impl Default for BitrateConfig {
    fn default() -> Self {
        Self::fuer_strategie(BitrateStrategie::default())
    }
}

impl BitrateConfig {
    /// Standardwerte mit den Schwellwerten einer Strategie
    pub fn fuer_strategie(strategie: BitrateStrategie) -> Self {
        let (ober, unter, jitter) = strategie.schwellwerte();
        Self {
            min_bitrate: 8_000,
            max_bitrate: 128_000,
            schritt: 8_000,
            verlust_obergrenze_prozent: ober,
            verlust_untergrenze_prozent: unter,
            jitter_schwelle_ms: jitter,
            hysterese_fenster: 3,
            cooldown_fenster: 2,
        }
    }

    /// Validiert die Konfiguration
    pub fn validieren(&self) -> Result<(), String> {
        if self.min_bitrate == 0 || self.min_bitrate > self.max_bitrate {
            return Err(format!(
                "Ungueltiger Bitrate-Bereich: {}..{}",
                self.min_bitrate, self.max_bitrate
            ));
        }
        if self.verlust_untergrenze_prozent > self.verlust_obergrenze_prozent {
            return Err("Verlust-Untergrenze liegt ueber der Obergrenze".into());
        }
        if self.hysterese_fenster == 0 {
            return Err("hysterese_fenster muss mindestens 1 sein".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

/// Messwerte eines Feedback-Fensters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BitrateFeedback {
    /// Verlustrate in Prozent
    pub verlust_prozent: f64,
    /// Mittlerer Jitter in ms
    pub jitter_avg_ms: f64,
}

// ---------------------------------------------------------------------------
// AdaptiveBitrateController
// ---------------------------------------------------------------------------

/// Geschlossener Regelkreis fuer die Codec-Bitrate
#[derive(Debug, Clone)]
pub struct AdaptiveBitrateController {
    config: BitrateConfig,
    aktuelle_bitrate: u32,
    gute_fenster_in_folge: u32,
    cooldown_verbleibend: u32,
    erhoehungen: u64,
    senkungen: u64,
    verlauf: VecDeque<u32>,
}

impl AdaptiveBitrateController {
    /// Erstellt einen Regler; die Startbitrate wird auf den Bereich begrenzt
    pub fn neu(config: BitrateConfig, start_bitrate: u32) -> Self {
        let mut ctrl = Self {
            aktuelle_bitrate: 0,
            gute_fenster_in_folge: 0,
            cooldown_verbleibend: 0,
            erhoehungen: 0,
            senkungen: 0,
            verlauf: VecDeque::with_capacity(VERLAUF_LAENGE),
            config,
        };
        ctrl.zuruecksetzen(start_bitrate);
        ctrl
    }

    /// Setzt Zustand und Verlauf zurueck
    pub fn zuruecksetzen(&mut self, start_bitrate: u32) {
        self.aktuelle_bitrate = self.begrenzen(start_bitrate);
        self.gute_fenster_in_folge = 0;
        self.cooldown_verbleibend = 0;
        self.erhoehungen = 0;
        self.senkungen = 0;
        self.verlauf.clear();
        self.verlauf.push_back(self.aktuelle_bitrate);
    }

    pub fn config(&self) -> &BitrateConfig {
        &self.config
    }

    pub fn aktuelle_bitrate(&self) -> u32 {
        self.aktuelle_bitrate
    }

    pub fn gute_fenster_in_folge(&self) -> u32 {
        self.gute_fenster_in_folge
    }

    pub fn cooldown_verbleibend(&self) -> u32 {
        self.cooldown_verbleibend
    }

    /// Anzahl der Erhoehungen seit dem letzten Reset
    pub fn erhoehungen(&self) -> u64 {
        self.erhoehungen
    }

    /// Anzahl der Senkungen seit dem letzten Reset
    pub fn senkungen(&self) -> u64 {
        self.senkungen
    }

    /// Die letzten (bis zu 100) Bitraten, aelteste zuerst
    pub fn verlauf(&self) -> Vec<u32> {
        self.verlauf.iter().copied().collect()
    }

    /// Wertet ein Feedback-Fenster aus und liefert die neue Bitrate
    pub fn anpassen(&mut self, feedback: BitrateFeedback) -> u32 {
        let alt = self.aktuelle_bitrate;

        if feedback.verlust_prozent > self.config.verlust_obergrenze_prozent {
            self.aktuelle_bitrate = self.begrenzen(alt.saturating_sub(self.config.schritt));
            self.gute_fenster_in_folge = 0;
            self.cooldown_verbleibend = self.config.cooldown_fenster;
        } else if self.cooldown_verbleibend > 0 {
            self.cooldown_verbleibend -= 1;
            self.gute_fenster_in_folge = 0;
        } else if feedback.verlust_prozent < self.config.verlust_untergrenze_prozent
            && feedback.jitter_avg_ms < self.config.jitter_schwelle_ms
        {
            self.gute_fenster_in_folge += 1;
            if self.gute_fenster_in_folge >= self.config.hysterese_fenster {
                self.aktuelle_bitrate =
                    self.begrenzen(alt.saturating_add(self.config.schritt));
                self.gute_fenster_in_folge = 0;
            }
        } else {
            self.gute_fenster_in_folge = 0;
        }

        let neu = self.aktuelle_bitrate;
        if neu < alt {
            self.senkungen += 1;
            tracing::info!(
                alt,
                neu,
                verlust_prozent = feedback.verlust_prozent,
                "Paketverlust ueber Schwellwert – Bitrate gesenkt"
            );
        } else if neu > alt {
            self.erhoehungen += 1;
            tracing::debug!(alt, neu, "Stabile Verbindung – Bitrate erhoeht");
        }

        if self.verlauf.len() == VERLAUF_LAENGE {
            self.verlauf.pop_front();
        }
        self.verlauf.push_back(neu);

        neu
    }

    fn begrenzen(&self, bitrate: u32) -> u32 {
        bitrate.clamp(
            self.config.min_bitrate,
            self.config.max_bitrate.max(self.config.min_bitrate),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
