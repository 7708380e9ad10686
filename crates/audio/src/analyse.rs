//! Testton-Quelle und Stille-Analyse
//!
//! Die Quelle erzeugt fortlaufende Sinus-Rahmen mit Sprechpausen, damit der
//! Stille-Anteil auf Empfangsseite aussagekraeftig ist. Verlorene Rahmen
//! zaehlen bei der Analyse als Stille.

use std::f64::consts::TAU;

use voipbench_protocol::codec::AudioFormat;

/// RMS-Schwelle (normalisiert) unterhalb der ein Rahmen als still gilt
pub const STANDARD_STILLE_SCHWELLE: f64 = 0.01;

/// Normalisierter RMS-Pegel eines PCM-Rahmens (0.0–1.0)
pub fn rms(pcm: &[i16]) -> f64 {
    if pcm.is_empty() {
        return 0.0;
    }
    let summe: f64 = pcm.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (summe / pcm.len() as f64).sqrt() / 32768.0
}

// ---------------------------------------------------------------------------
// Testton
// ---------------------------------------------------------------------------

/// Sinus-Quelle mit Sprech- und Pausenphasen
#[derive(Debug, Clone)]
pub struct TestTon {
    format: AudioFormat,
    frequenz_hz: f64,
    amplitude: f64,
    /// Rahmen mit Ton pro Zyklus
    ton_rahmen: u32,
    /// Rahmen mit Stille pro Zyklus
    pause_rahmen: u32,
    rahmen_index: u64,
    sample_index: u64,
}

impl TestTon {
    /// 440 Hz, Amplitude 0.5, 1 s Ton / 0.5 s Pause bei 20-ms-Rahmen
    pub fn neu(format: AudioFormat) -> Self {
        Self::mit_parametern(format, 440.0, 0.5, 50, 25)
    }

    pub fn mit_parametern(
        format: AudioFormat,
        frequenz_hz: f64,
        amplitude: f64,
        ton_rahmen: u32,
        pause_rahmen: u32,
    ) -> Self {
        Self {
            format,
            frequenz_hz,
            amplitude: amplitude.clamp(0.0, 1.0),
            ton_rahmen,
            pause_rahmen,
            rahmen_index: 0,
            sample_index: 0,
        }
    }

    /// Erzeugt den naechsten Rahmen (Kanaele verschraenkt)
    pub fn naechster_rahmen(&mut self) -> Vec<i16> {
        let zyklus = (self.ton_rahmen + self.pause_rahmen).max(1) as u64;
        let ton_an = self.rahmen_index % zyklus < self.ton_rahmen as u64;
        self.rahmen_index += 1;

        let kanaele = self.format.channels as usize;
        let mut rahmen = Vec::with_capacity(self.format.frame_size as usize * kanaele);
        for _ in 0..self.format.frame_size {
            let wert = if ton_an {
                let t = self.sample_index as f64 / self.format.sample_rate as f64;
                ((TAU * self.frequenz_hz * t).sin() * self.amplitude * i16::MAX as f64) as i16
            } else {
                0
            };
            self.sample_index += 1;
            rahmen.extend(std::iter::repeat(wert).take(kanaele));
        }
        rahmen
    }
}

// ---------------------------------------------------------------------------
// Stille-Analyse
// ---------------------------------------------------------------------------

/// Zaehlt stille Rahmen auf Empfangsseite
#[derive(Debug, Clone)]
pub struct StilleAnalyse {
    schwelle: f64,
    rahmen: u64,
    still: u64,
}

impl Default for StilleAnalyse {
    fn default() -> Self {
        Self::neu(STANDARD_STILLE_SCHWELLE)
    }
}

impl StilleAnalyse {
    pub fn neu(schwelle: f64) -> Self {
        Self {
            schwelle,
            rahmen: 0,
            still: 0,
        }
    }

    /// Bewertet einen dekodierten Rahmen; gibt true zurueck wenn er still ist
    pub fn rahmen_pruefen(&mut self, pcm: &[i16]) -> bool {
        let still = rms(pcm) < self.schwelle;
        self.rahmen += 1;
        if still {
            self.still += 1;
        }
        still
    }

    /// Zaehlt einen verlorenen Rahmen als Stille
    pub fn rahmen_verloren(&mut self, anzahl: u64) {
        self.rahmen += anzahl;
        self.still += anzahl;
    }

    pub fn rahmen(&self) -> u64 {
        self.rahmen
    }

    /// Stille-Anteil in Prozent (`None` ohne Rahmen)
    pub fn anteil_prozent(&self) -> Option<f64> {
        if self.rahmen == 0 {
            None
        } else {
            Some(self.still as f64 / self.rahmen as f64 * 100.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_grenzen() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0; 960]), 0.0);
        let voll = rms(&[i16::MIN; 10]);
        assert!((voll - 1.0).abs() < 1e-9);
    }

    #[test]
    fn testton_wechselt_zwischen_ton_und_pause() {
        let format = AudioFormat::default();
        let mut ton = TestTon::mit_parametern(format, 440.0, 0.5, 2, 1);
        let pegel: Vec<f64> = (0..6).map(|_| rms(&ton.naechster_rahmen())).collect();

        assert!(pegel[0] > 0.3 && pegel[1] > 0.3);
        assert_eq!(pegel[2], 0.0);
        assert!(pegel[3] > 0.3);
        assert_eq!(pegel[5], 0.0);
    }

    #[test]
    fn testton_stereo_rahmengroesse() {
        let format = AudioFormat {
            channels: 2,
            ..Default::default()
        };
        let rahmen = TestTon::neu(format).naechster_rahmen();
        assert_eq!(rahmen.len(), 1920);
        assert_eq!(rahmen[2], rahmen[3], "Kanaele identisch");
    }

    #[test]
    fn stille_anteil_mit_verlusten() {
        let mut analyse = StilleAnalyse::default();
        assert_eq!(analyse.anteil_prozent(), None);

        let mut ton = TestTon::mit_parametern(AudioFormat::default(), 440.0, 0.5, 1, 1);
        assert!(!analyse.rahmen_pruefen(&ton.naechster_rahmen()));
        assert!(analyse.rahmen_pruefen(&ton.naechster_rahmen()));
        analyse.rahmen_verloren(2);

        assert_eq!(analyse.rahmen(), 4);
        assert_eq!(analyse.anteil_prozent(), Some(75.0));
    }
}
