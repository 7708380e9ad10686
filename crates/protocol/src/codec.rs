//! Codec- und Audioformat-Konfiguration
//!
//! Definiert das PCM-Rahmenformat, das zwischen Audioquelle, Codec und
//! RTP-Session ausgetauscht wird, sowie die waehlbaren Codec-Typen.

use serde::{Deserialize, Serialize};

use crate::rtp::PayloadTyp;

// ---------------------------------------------------------------------------
// Codec-Typ
// ---------------------------------------------------------------------------

/// Auswaehlbare Codec-Implementierungen (geschlossene Menge)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecTyp {
    /// Durchreichen von Roh-PCM ("none")
    #[default]
    None,
    /// Opus (komprimiert)
    Opus,
}

impl CodecTyp {
    /// RTP-Payload-Type fuer diesen Codec
    pub fn payload_type(&self) -> u8 {
        match self {
            CodecTyp::None => PayloadTyp::DYNAMISCH_PCM,
            CodecTyp::Opus => PayloadTyp::OPUS,
        }
    }

    /// Menschenlesbare Bezeichnung
    pub fn bezeichnung(&self) -> &'static str {
        match self {
            CodecTyp::None => "none",
            CodecTyp::Opus => "opus",
        }
    }
}

// ---------------------------------------------------------------------------
// Audioformat
// ---------------------------------------------------------------------------

/// Bytes pro Sample (16-Bit PCM, little-endian)
pub const BYTES_PRO_SAMPLE: usize = 2;

/// PCM-Rahmenformat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Anzahl der Kanaele
    pub channels: u8,
    /// Samples pro Kanal und Rahmen (960 = 20 ms bei 48 kHz)
    pub frame_size: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            frame_size: 960,
        }
    }
}

impl AudioFormat {
    /// Groesse eines PCM-Rahmens in Bytes
    pub fn rahmen_bytes(&self) -> usize {
        self.frame_size as usize * self.channels as usize * BYTES_PRO_SAMPLE
    }

    /// Dauer eines Rahmens in Millisekunden
    pub fn rahmen_dauer_ms(&self) -> f64 {
        self.frame_size as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Bitrate von unkomprimiertem PCM in bit/s
    pub fn pcm_bitrate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * (BYTES_PRO_SAMPLE as u32 * 8)
    }

    /// Validiert das Format
    pub fn validieren(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("Abtastrate muss groesser 0 sein".into());
        }
        if !(1..=2).contains(&self.channels) {
            return Err(format!(
                "Kanalanzahl muss 1 oder 2 sein (war: {})",
                self.channels
            ));
        }
        if self.frame_size == 0 {
            return Err("Frame-Groesse muss groesser 0 sein".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
