//! voipbench-protocol – Wire-Format-Definitionen
//!
//! Dieses Crate definiert das RTP-Datagramm sowie das PCM-Rahmenformat,
//! das zwischen Audioquelle, Codec und Transport ausgetauscht wird.

pub mod codec;
pub mod rtp;

pub use codec::{AudioFormat, CodecTyp};
pub use rtp::{PayloadTyp, RtpPacket};
