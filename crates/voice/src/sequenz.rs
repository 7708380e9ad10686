//! Sequenz- und Zeitstempel-Vergabe fuer ausgehende RTP-Pakete
//!
//! Die Sequenznummer waechst pro Paket um 1 (modulo 2^16), der Zeitstempel um
//! die Samples pro Rahmen (modulo 2^32). Die SSRC bleibt fuer die gesamte
//! Lebensdauer fest.

use bytes::Bytes;
use voipbench_protocol::rtp::RtpPacket;

/// Nummerierung ausgehender Pakete einer Session
#[derive(Debug, Clone)]
pub struct RtpSequencer {
    ssrc: u32,
    payload_type: u8,
    naechste_seq: u16,
    naechster_ts: u32,
    samples_pro_rahmen: u32,
    /// Anzahl bereits vergebener Nummern
    vergeben: u64,
}

impl RtpSequencer {
    /// Erstellt einen Sequencer mit festen Startwerten
    pub fn neu(
        ssrc: u32,
        payload_type: u8,
        start_seq: u16,
        start_ts: u32,
        samples_pro_rahmen: u32,
    ) -> Self {
        Self {
            ssrc,
            payload_type: payload_type & 0x7F,
            naechste_seq: start_seq,
            naechster_ts: start_ts,
            samples_pro_rahmen,
            vergeben: 0,
        }
    }

    /// Erstellt einen Sequencer mit zufaelliger SSRC, Sequenz und Zeitstempel-Basis
    pub fn zufaellig(payload_type: u8, samples_pro_rahmen: u32) -> Self {
        Self::neu(
            rand::random(),
            payload_type,
            rand::random(),
            rand::random(),
            samples_pro_rahmen,
        )
    }

    /// SSRC dieser Session
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Payload-Type der erzeugten Pakete
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Sequenznummer, die als naechstes vergeben wird
    pub fn naechste_seq(&self) -> u16 {
        self.naechste_seq
    }

    /// Zeitstempel, der als naechstes vergeben wird
    pub fn naechster_timestamp(&self) -> u32 {
        self.naechster_ts
    }

    /// Anzahl bisher vergebener Sequenznummern
    pub fn vergeben(&self) -> u64 {
        self.vergeben
    }

    /// Vergibt das naechste (Sequenznummer, Zeitstempel)-Paar und schaltet weiter
    pub fn weiter(&mut self) -> (u16, u32) {
        let paar = (self.naechste_seq, self.naechster_ts);
        self.naechste_seq = self.naechste_seq.wrapping_add(1);
        self.naechster_ts = self.naechster_ts.wrapping_add(self.samples_pro_rahmen);
        self.vergeben += 1;
        paar
    }

    /// Erstellt das naechste Paket mit fortlaufender Nummerierung
    pub fn paket_erstellen(&mut self, payload: impl Into<Bytes>, marker: bool) -> RtpPacket {
        let (seq, ts) = self.weiter();
        RtpPacket::neu(self.payload_type, seq, ts, self.ssrc, payload).mit_marker(marker)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fortlaufende_nummerierung() {
        let mut s = RtpSequencer::neu(7, 111, 100, 1000, 960);
        let a = s.paket_erstellen(vec![1], true);
        let b = s.paket_erstellen(vec![2], false);
        assert_eq!((a.sequence_number, a.timestamp), (100, 1000));
        assert_eq!((b.sequence_number, b.timestamp), (101, 1960));
        assert!(a.marker);
        assert!(!b.marker);
        assert_eq!(a.ssrc, 7);
        assert_eq!(b.ssrc, 7);
    }

    #[test]
    fn sequenz_umlauf_ohne_duplikate() {
        let mut s = RtpSequencer::neu(1, 96, 65500, 0, 960);
        let nummern: Vec<u16> = (0..70_000).map(|_| s.weiter().0).collect();

        // 65535 -> 0 Uebergang an der erwarteten Stelle
        assert_eq!(nummern[35], 65535);
        assert_eq!(nummern[36], 0);

        // Jedes Fenster von 65536 aufeinanderfolgenden Nummern ist duplikatfrei
        for start in [0usize, 1000, 70_000 - 65_536] {
            let fenster: HashSet<u16> = nummern[start..start + 65_536].iter().copied().collect();
            assert_eq!(fenster.len(), 65_536, "Duplikat im Fenster ab {start}");
        }
        assert_eq!(s.vergeben(), 70_000);
    }

    #[test]
    fn zeitstempel_umlauf() {
        let mut s = RtpSequencer::neu(1, 96, 0, u32::MAX - 500, 960);
        s.weiter();
        assert_eq!(s.naechster_timestamp(), 459);
    }
}
