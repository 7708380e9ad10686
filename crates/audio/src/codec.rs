//! Codec-Schnittstelle und Implementierungen
//!
//! Ein Codec wandelt 16-Bit-PCM-Rahmen in Nutzdaten und zurueck und meldet
//! seine aktuelle Bitrate. Die Auswahl erfolgt ueber [`CodecTyp`] aus der
//! Konfiguration.
//!
//! - [`PassthroughCodec`] – Roh-PCM (little-endian), feste Bitrate
//! - `OpusCodec` – Opus via audiopus (Feature `opus`)

use tracing::debug;
use voipbench_protocol::codec::{AudioFormat, CodecTyp, BYTES_PRO_SAMPLE};

use crate::error::{AudioError, AudioResult};

/// Faehigkeit eines Audio-Codecs
pub trait AudioCodec: Send {
    /// Art des Codecs
    fn typ(&self) -> CodecTyp;

    /// Kodiert einen PCM-Rahmen
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>>;

    /// Dekodiert Nutzdaten zu PCM
    fn decode(&mut self, daten: &[u8]) -> AudioResult<Vec<i16>>;

    /// Aktuelle Ziel-Bitrate in bit/s
    fn aktuelle_bitrate(&self) -> u32;

    /// Setzt die Ziel-Bitrate in bit/s
    fn bitrate_setzen(&mut self, bitrate: u32) -> AudioResult<()>;

    /// RTP-Payload-Type der erzeugten Nutzdaten
    fn payload_type(&self) -> u8 {
        self.typ().payload_type()
    }
}

/// Erstellt den konfigurierten Codec
///
/// # Fehler
/// - `Konfiguration` bei ungueltigem Format
/// - `CodecNichtVerfuegbar` fuer Opus ohne Feature `opus`
pub fn codec_erstellen(
    typ: CodecTyp,
    format: AudioFormat,
    bitrate: u32,
) -> AudioResult<Box<dyn AudioCodec>> {
    format.validieren().map_err(AudioError::Konfiguration)?;

    let codec: Box<dyn AudioCodec> = match typ {
        CodecTyp::None => Box::new(PassthroughCodec::neu(format)),
        #[cfg(feature = "opus")]
        CodecTyp::Opus => Box::new(opus::OpusCodec::neu(format, bitrate)?),
        #[cfg(not(feature = "opus"))]
        CodecTyp::Opus => {
            let _ = bitrate;
            return Err(AudioError::CodecNichtVerfuegbar(
                "opus (mit --features opus bauen)".into(),
            ));
        }
    };

    debug!(
        codec = typ.bezeichnung(),
        bitrate = codec.aktuelle_bitrate(),
        "Codec erstellt"
    );
    Ok(codec)
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

/// Reicht PCM unveraendert als little-endian Bytes durch
#[derive(Debug, Clone)]
pub struct PassthroughCodec {
    format: AudioFormat,
}

impl PassthroughCodec {
    pub fn neu(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl AudioCodec for PassthroughCodec {
    fn typ(&self) -> CodecTyp {
        CodecTyp::None
    }

    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        Ok(pcm.iter().flat_map(|s| s.to_le_bytes()).collect())
    }

    fn decode(&mut self, daten: &[u8]) -> AudioResult<Vec<i16>> {
        if daten.len() % BYTES_PRO_SAMPLE != 0 {
            return Err(AudioError::UngueltigeNutzdaten(format!(
                "{} Bytes sind kein Vielfaches von {}",
                daten.len(),
                BYTES_PRO_SAMPLE
            )));
        }
        Ok(daten
            .chunks_exact(BYTES_PRO_SAMPLE)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect())
    }

    fn aktuelle_bitrate(&self) -> u32 {
        self.format.pcm_bitrate()
    }

    /// Roh-PCM hat eine feste Bitrate; die Vorgabe wird ignoriert
    fn bitrate_setzen(&mut self, _bitrate: u32) -> AudioResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Opus
// ---------------------------------------------------------------------------

#[cfg(feature = "opus")]
pub use opus::OpusCodec;

#[cfg(feature = "opus")]
mod opus {
    use audiopus::{
        coder::{Decoder, Encoder},
        Application, Bitrate, Channels, SampleRate,
    };
    use tracing::debug;
    use voipbench_protocol::codec::{AudioFormat, CodecTyp};

    use super::AudioCodec;
    use crate::error::{AudioError, AudioResult};

    /// Gueltiger Bitrate-Bereich von Opus in bit/s
    const OPUS_BITRATE_BEREICH: (u32, u32) = (6_000, 510_000);

    /// Maximale Groesse eines Opus-Pakets
    const MAX_OPUS_PAKET: usize = 4000;

    /// Opus-Codec (Application::Voip)
    pub struct OpusCodec {
        encoder: Encoder,
        decoder: Decoder,
        format: AudioFormat,
        bitrate: u32,
    }

    impl OpusCodec {
        /// Erstellt Encoder und Decoder fuer das Format
        pub fn neu(format: AudioFormat, bitrate: u32) -> AudioResult<Self> {
            let sample_rate = sample_rate_zu_audiopus(format.sample_rate)?;
            let channels = match format.channels {
                1 => Channels::Mono,
                2 => Channels::Stereo,
                n => {
                    return Err(AudioError::Konfiguration(format!(
                        "Opus unterstuetzt 1 oder 2 Kanaele, nicht {n}"
                    )))
                }
            };

            let encoder = Encoder::new(sample_rate, channels, Application::Voip)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            let decoder = Decoder::new(sample_rate, channels)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

            let mut codec = Self {
                encoder,
                decoder,
                format,
                bitrate: 0,
            };
            codec.bitrate_setzen(bitrate)?;

            debug!(
                bitrate = codec.bitrate,
                sample_rate = format.sample_rate,
                frame_size = format.frame_size,
                "OpusCodec erstellt"
            );
            Ok(codec)
        }
    }

    impl AudioCodec for OpusCodec {
        fn typ(&self) -> CodecTyp {
            CodecTyp::Opus
        }

        fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
            let erwartet = self.format.frame_size as usize * self.format.channels as usize;
            if pcm.len() != erwartet {
                return Err(AudioError::Rahmengroesse {
                    erwartet,
                    erhalten: pcm.len(),
                });
            }

            let mut output = vec![0u8; MAX_OPUS_PAKET];
            let geschrieben = self
                .encoder
                .encode(pcm, &mut output)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            output.truncate(geschrieben);
            Ok(output)
        }

        fn decode(&mut self, daten: &[u8]) -> AudioResult<Vec<i16>> {
            let kanaele = self.format.channels as usize;
            let mut output = vec![0i16; self.format.frame_size as usize * kanaele];
            let dekodiert = self
                .decoder
                .decode(Some(daten), &mut output, false)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            output.truncate(dekodiert * kanaele);
            Ok(output)
        }

        fn aktuelle_bitrate(&self) -> u32 {
            self.bitrate
        }

        fn bitrate_setzen(&mut self, bitrate: u32) -> AudioResult<()> {
            let bitrate = bitrate.clamp(OPUS_BITRATE_BEREICH.0, OPUS_BITRATE_BEREICH.1);
            self.encoder
                .set_bitrate(Bitrate::BitsPerSecond(bitrate as i32))
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            self.bitrate = bitrate;
            Ok(())
        }
    }

    fn sample_rate_zu_audiopus(hz: u32) -> AudioResult<SampleRate> {
        match hz {
            8_000 => Ok(SampleRate::Hz8000),
            12_000 => Ok(SampleRate::Hz12000),
            16_000 => Ok(SampleRate::Hz16000),
            24_000 => Ok(SampleRate::Hz24000),
            48_000 => Ok(SampleRate::Hz48000),
            andere => Err(AudioError::Konfiguration(format!(
                "Opus unterstuetzt {andere} Hz nicht"
            ))),
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
    fn passthrough_ist_verlustfrei() {
        let mut codec = PassthroughCodec::neu(AudioFormat::default());
        let pcm: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN, 1234];
        let bytes = codec.encode(&pcm).unwrap();
        assert_eq!(bytes.len(), pcm.len() * 2);
        assert_eq!(&bytes[2..4], &[0x01, 0x00], "little-endian");
        assert_eq!(codec.decode(&bytes).unwrap(), pcm);
    }

    #[test]
    fn passthrough_ungerade_laenge() {
        let mut codec = PassthroughCodec::neu(AudioFormat::default());
        assert!(codec.decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn passthrough_bitrate_fest() {
        let mut codec = PassthroughCodec::neu(AudioFormat::default());
        codec.bitrate_setzen(8_000).unwrap();
        assert_eq!(codec.aktuelle_bitrate(), 768_000);
        assert_eq!(codec.payload_type(), 96);
    }

    #[test]
    fn fabrik_waehlt_codec() {
        let codec = codec_erstellen(CodecTyp::None, AudioFormat::default(), 64_000).unwrap();
        assert_eq!(codec.typ(), CodecTyp::None);
    }

    #[test]
    fn fabrik_prueft_format() {
        let format = AudioFormat {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(codec_erstellen(CodecTyp::None, format, 64_000).is_err());
    }

    #[cfg(not(feature = "opus"))]
    #[test]
    fn opus_ohne_feature_nicht_verfuegbar() {
        let result = codec_erstellen(CodecTyp::Opus, AudioFormat::default(), 64_000);
        assert!(matches!(result, Err(AudioError::CodecNichtVerfuegbar(_))));
    }
}
