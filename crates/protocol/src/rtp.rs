//! RTP-Paketformat (RFC 3550)
//!
//! Binaere Kodierung eines einzelnen RTP-Datagramms: fester 12-Byte-Header,
//! optionale CSRC-Liste und Nutzdaten. Der Payload-Type wird nur
//! durchgereicht, nicht interpretiert.
//!
//! ## Paketformat (Header = 12 + 4*CC Bytes, kein serde)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   V(2) | P(1) | X(1) | CC(4)
//!  1       1   M(1) | PT(7)
//!  2       2   Sequenznummer (big-endian)
//!  4       4   Zeitstempel (big-endian)
//!  8       4   SSRC (big-endian)
//! 12     4*CC  CSRC-Liste (big-endian, geordnet)
//! 12+4*CC  N   Nutzdaten (roh)
//! ```
//!
//! Padding- und Extension-Bit werden unveraendert durchgereicht; die
//! Nutzdaten hinter der CSRC-Liste werden nicht umgedeutet. Dadurch gilt
//! `decode(encode(p)) == p` fuer jedes gueltige Paket.

use bytes::{BufMut, Bytes, BytesMut};
use voipbench_core::{Result, VoipError};

/// Einzige unterstuetzte RTP-Version
pub const RTP_VERSION: u8 = 2;

/// Groesse des festen RTP-Headers in Bytes
pub const RTP_HEADER_GROESSE: usize = 12;

/// Maximale Anzahl CSRC-Eintraege (4-Bit-Feld)
pub const MAX_CSRC: usize = 15;

/// Datagrammgroesse, die ohne IP-Fragmentierung uebertragen wird (Ethernet-MTU)
pub const MAX_PAKET_GROESSE: usize = 1500;

/// Groesstes Datagramm, das UDP ueber IPv4 transportieren kann
pub const MAX_DATAGRAMM_GROESSE: usize = 65_507;

// ---------------------------------------------------------------------------
// Payload-Types (RFC 3551 / RFC 7587)
// ---------------------------------------------------------------------------

/// Gaengige Payload-Type-Nummern
pub struct PayloadTyp;

impl PayloadTyp {
    /// G.711 mu-law
    pub const PCMU: u8 = 0;
    /// GSM
    pub const GSM: u8 = 3;
    /// G.723
    pub const G723: u8 = 4;
    /// G.711 A-law
    pub const PCMA: u8 = 8;
    /// G.722
    pub const G722: u8 = 9;
    /// Roh-PCM im dynamischen Bereich
    pub const DYNAMISCH_PCM: u8 = 96;
    /// Opus (dynamisch, Konvention nach RFC 7587)
    pub const OPUS: u8 = 111;
}

// ---------------------------------------------------------------------------
// RtpPacket
// ---------------------------------------------------------------------------

/// Vollstaendiges RTP-Datagramm
///
/// Die Version ist implizit 2; `csrc.len()` bestimmt das CC-Feld.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Padding-Bit
    pub padding: bool,
    /// Extension-Bit
    pub extension: bool,
    /// Marker-Bit (z.B. erstes Paket einer Sprechsequenz)
    pub marker: bool,
    /// Payload-Type (7 Bit)
    pub payload_type: u8,
    /// Sequenznummer (laeuft modulo 2^16 um)
    pub sequence_number: u16,
    /// Zeitstempel in Sample-Ticks (laeuft modulo 2^32 um)
    pub timestamp: u32,
    /// Synchronisation Source
    pub ssrc: u32,
    /// Contributing Sources (0–15, Reihenfolge bleibt erhalten)
    pub csrc: Vec<u32>,
    /// Rohe Nutzdaten
    pub payload: Bytes,
}

impl RtpPacket {
    /// Erstellt ein Paket ohne CSRC-Liste, Padding und Extension
    pub fn neu(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            padding: false,
            extension: false,
            marker: false,
            payload_type: payload_type & 0x7F,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Setzt das Marker-Bit
    pub fn mit_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Setzt die CSRC-Liste
    ///
    /// # Fehler
    /// - `UngueltigesPaket` bei mehr als 15 Eintraegen
    pub fn mit_csrc(mut self, csrc: Vec<u32>) -> Result<Self> {
        if csrc.len() > MAX_CSRC {
            return Err(VoipError::paket(format!(
                "Zu viele CSRC-Eintraege: {} (Maximum {})",
                csrc.len(),
                MAX_CSRC
            )));
        }
        self.csrc = csrc;
        Ok(self)
    }

    /// Anzahl der kodierten CSRC-Eintraege
    pub fn csrc_count(&self) -> usize {
        self.csrc.len().min(MAX_CSRC)
    }

    /// Header-Laenge in Bytes (12 + 4*CC)
    pub fn header_length(&self) -> usize {
        RTP_HEADER_GROESSE + 4 * self.csrc_count()
    }

    /// Nutzdaten-Laenge in Bytes
    pub fn payload_length(&self) -> usize {
        self.payload.len()
    }

    /// Gesamtgroesse des Datagramms in Bytes
    pub fn groesse(&self) -> usize {
        self.header_length() + self.payload_length()
    }

    /// Serialisiert das Paket (big-endian, RFC 3550)
    pub fn encode(&self) -> Bytes {
        let cc = self.csrc_count();
        let mut buf = BytesMut::with_capacity(self.groesse());

        let byte0 = (RTP_VERSION << 6)
            | (u8::from(self.padding) << 5)
            | (u8::from(self.extension) << 4)
            | cc as u8;
        let byte1 = (u8::from(self.marker) << 7) | (self.payload_type & 0x7F);

        buf.put_u8(byte0);
        buf.put_u8(byte1);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in self.csrc.iter().take(cc) {
            buf.put_u32(*csrc);
        }
        buf.put_slice(&self.payload);

        buf.freeze()
    }

    /// Deserialisiert und validiert ein Datagramm
    ///
    /// # Fehler
    /// - `UngueltigesPaket` wenn das Slice kuerzer als 12 Bytes ist
    /// - `UngueltigesPaket` bei Version != 2
    /// - `UngueltigesPaket` wenn die CSRC-Liste ueber das Pufferende reicht
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < RTP_HEADER_GROESSE {
            return Err(VoipError::paket(format!(
                "Header zu kurz: {} Bytes (erwartet mindestens {})",
                buf.len(),
                RTP_HEADER_GROESSE
            )));
        }

        let version = buf[0] >> 6;
        if version != RTP_VERSION {
            return Err(VoipError::paket(format!(
                "Ungueltige RTP-Version: {} (erwartet {})",
                version, RTP_VERSION
            )));
        }

        let cc = (buf[0] & 0x0F) as usize;
        let header_laenge = RTP_HEADER_GROESSE + 4 * cc;
        if header_laenge > buf.len() {
            return Err(VoipError::paket(format!(
                "CSRC-Liste ({} Eintraege) ueberschreitet Puffer: {} > {} Bytes",
                cc,
                header_laenge,
                buf.len()
            )));
        }

        let csrc = buf[RTP_HEADER_GROESSE..header_laenge]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            padding: buf[0] & 0x20 != 0,
            extension: buf[0] & 0x10 != 0,
            marker: buf[1] & 0x80 != 0,
            payload_type: buf[1] & 0x7F,
            sequence_number: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            csrc,
            payload: Bytes::copy_from_slice(&buf[header_laenge..]),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn paket_strategie() -> impl Strategy<Value = RtpPacket> {
        (
            (any::<bool>(), any::<bool>(), any::<bool>(), 0u8..128),
            (any::<u16>(), any::<u32>(), any::<u32>()),
            prop::collection::vec(any::<u32>(), 0..=MAX_CSRC),
            prop::collection::vec(any::<u8>(), 0..1400),
        )
            .prop_map(
                |((padding, extension, marker, payload_type), (seq, ts, ssrc), csrc, payload)| {
                    RtpPacket {
                        padding,
                        extension,
                        marker,
                        payload_type,
                        sequence_number: seq,
                        timestamp: ts,
                        ssrc,
                        csrc,
                        payload: Bytes::from(payload),
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn proptest_encode_decode_round_trip(paket in paket_strategie()) {
            let bytes = paket.encode();
            prop_assert_eq!(bytes.len(), paket.groesse());
            prop_assert_eq!(RtpPacket::decode(&bytes).unwrap(), paket);
        }

        #[test]
        fn proptest_decode_beliebiger_bytes_ohne_panik(
            daten in prop::collection::vec(any::<u8>(), 0..256)
        ) {
            if let Ok(paket) = RtpPacket::decode(&daten) {
                // Gueltige Datagramme kodieren bitgleich zurueck
                prop_assert_eq!(&paket.encode()[..], &daten[..]);
            }
        }
    }

    fn beispiel() -> RtpPacket {
        RtpPacket::neu(PayloadTyp::OPUS, 42, 6720, 0xDEAD_BEEF, vec![0xAB; 120])
    }

    #[test]
    fn encode_decode_round_trip() {
        let paket = beispiel().mit_marker(true);
        let decoded = RtpPacket::decode(&paket.encode()).expect("Decode muss erfolgreich sein");
        assert_eq!(decoded, paket);
    }

    #[test]
    fn round_trip_mit_csrc_padding_extension() {
        let mut paket = beispiel().mit_csrc(vec![1, 2, 0xFFFF_FFFF]).unwrap();
        paket.padding = true;
        paket.extension = true;
        let bytes = paket.encode();
        assert_eq!(bytes.len(), 12 + 3 * 4 + 120);
        assert_eq!(RtpPacket::decode(&bytes).unwrap(), paket);
    }

    #[test]
    fn round_trip_maximale_csrc_und_leere_nutzdaten() {
        let csrc: Vec<u32> = (0..15).collect();
        let paket = RtpPacket::neu(127, u16::MAX, u32::MAX, 0, Vec::new())
            .mit_csrc(csrc)
            .unwrap();
        assert_eq!(paket.header_length(), 12 + 60);
        assert_eq!(paket.payload_length(), 0);
        assert_eq!(RtpPacket::decode(&paket.encode()).unwrap(), paket);
    }

    #[test]
    fn header_big_endian_byte_reihenfolge() {
        let paket = RtpPacket::neu(0x6F, 0x0102, 0x0304_0506, 0x0708_090A, vec![0xFF])
            .mit_marker(true);
        let b = paket.encode();
        assert_eq!(b[0], 0x80, "V=2, P=0, X=0, CC=0");
        assert_eq!(b[1], 0x80 | 0x6F, "Marker + PT 111");
        assert_eq!(&b[2..4], &[0x01, 0x02]);
        assert_eq!(&b[4..8], &[0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&b[8..12], &[0x07, 0x08, 0x09, 0x0A]);
        assert_eq!(b[12], 0xFF);
    }

    #[test]
    fn laengen_invariante() {
        let paket = beispiel().mit_csrc(vec![7, 8]).unwrap();
        assert_eq!(paket.header_length(), 20);
        assert_eq!(paket.groesse(), paket.header_length() + paket.payload_length());
        assert_eq!(paket.encode().len(), paket.groesse());
    }

    #[test]
    fn decode_zu_kurz() {
        let result = RtpPacket::decode(&[0x80; 11]);
        assert!(matches!(result, Err(VoipError::UngueltigesPaket(_))));
    }

    #[test]
    fn decode_falsche_version() {
        let mut bytes = beispiel().encode().to_vec();
        bytes[0] = (1 << 6) | (bytes[0] & 0x3F);
        assert!(matches!(
            RtpPacket::decode(&bytes),
            Err(VoipError::UngueltigesPaket(_))
        ));
    }

    #[test]
    fn decode_csrc_ueber_pufferende() {
        // CC=3 verlangt 24 Header-Bytes, Puffer hat nur 16
        let mut bytes = vec![0x80 | 3, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        bytes.extend_from_slice(&[0, 0, 0, 9]);
        assert!(matches!(
            RtpPacket::decode(&bytes),
            Err(VoipError::UngueltigesPaket(_))
        ));
    }

    #[test]
    fn zu_viele_csrc_abgelehnt() {
        let result = beispiel().mit_csrc((0..16).collect());
        assert!(result.is_err());
    }

    #[test]
    fn payload_type_wird_maskiert() {
        let paket = RtpPacket::neu(0xFF, 0, 0, 0, Vec::new());
        assert_eq!(paket.payload_type, 0x7F);
    }
}
