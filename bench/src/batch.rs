//! Batch-Lauf: diskrete Ereignissimulation ohne Sockets
//!
//! Rahmen werden im Takt der Rahmendauer auf einer virtuellen Zeitachse
//! erzeugt. Vor jedem Senden werden alle Pakete ausgewertet, deren simulierte
//! Ankunft bereits erreicht ist, sodass der Bitrate-Regler dieselbe
//! Rueckkopplung sieht wie im Echtzeit-Lauf.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use voipbench_voice::netsim::{NetworkCondition, NetworkSimulator, SimulierteZustellung};
use voipbench_voice::sequenz::RtpSequencer;
use voipbench_voice::verlust::VerlustFenster;

use crate::auswertung::{Auswertung, Laufdaten, Quelle};
use crate::config::BenchConfig;

/// Zustellung mit Rahmenindex, geordnet nach Ankunft
#[derive(Debug)]
struct Eintreffen {
    lfd_nr: u64,
    index: usize,
    zustellung: SimulierteZustellung,
}

impl PartialEq for Eintreffen {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Eintreffen {}

impl PartialOrd for Eintreffen {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Eintreffen {
    fn cmp(&self, other: &Self) -> Ordering {
        self.zustellung
            .ankunft_ms
            .total_cmp(&other.zustellung.ankunft_ms)
            .then(self.lfd_nr.cmp(&other.lfd_nr))
    }
}

struct BatchLauf {
    quelle: Quelle,
    auswertung: Auswertung,
    sequencer: RtpSequencer,
    simulator: NetworkSimulator,
    fenster: VerlustFenster,
    unterwegs: BinaryHeap<Reverse<Eintreffen>>,
    lfd_nr: u64,
}

/// Fuehrt einen Batch-Lauf fuer eine Bedingung aus
pub(crate) fn ausfuehren(
    config: &BenchConfig,
    bedingung: &NetworkCondition,
    seed: u64,
) -> anyhow::Result<Laufdaten> {
    let quelle = Quelle::neu(config)?;

    // SSRC und Startwerte aus dem Seed, damit Laeufe reproduzierbar sind
    let mut rng = StdRng::seed_from_u64(seed.rotate_left(32));
    let sequencer = RtpSequencer::neu(
        rng.gen(),
        quelle.payload_type(),
        rng.gen(),
        rng.gen(),
        config.audio.frame_size,
    );

    let mut lauf = BatchLauf {
        quelle,
        auswertung: Auswertung::neu(config)?,
        sequencer,
        simulator: NetworkSimulator::neu(bedingung.clone(), seed),
        fenster: VerlustFenster::neu(config.netzwerk.verlust_fenster),
        unterwegs: BinaryHeap::new(),
        lfd_nr: 0,
    };

    let rahmen_ms = config.audio.rahmen_dauer_ms();
    let anzahl = (config.benchmark.dauer_s * 1000.0 / rahmen_ms).ceil() as u64;

    for i in 0..anzahl {
        let jetzt_ms = i as f64 * rahmen_ms;
        lauf.zustellen_bis(jetzt_ms)?;
        lauf.rahmen_senden(jetzt_ms, i == 0)?;
    }

    let nachzuegler = lauf.simulator.leeren();
    lauf.einreihen(nachzuegler);

    let sende_ende_ms = anzahl as f64 * rahmen_ms;
    lauf.zustellen_bis(sende_ende_ms + config.benchmark.cooldown_s * 1000.0)?;
    if !lauf.unterwegs.is_empty() {
        debug!(
            anzahl = lauf.unterwegs.len(),
            "Pakete nach Ende der Nachlaufzeit verworfen"
        );
    }
    lauf.fenster.abschliessen();

    Ok(Laufdaten {
        bericht: lauf.auswertung.abschliessen(sende_ende_ms / 1000.0),
        netzwerk: lauf.simulator.statistik(),
        bitrate: lauf.quelle.bitrate_daten(),
    })
}

impl BatchLauf {
    fn rahmen_senden(&mut self, jetzt_ms: f64, erster: bool) -> anyhow::Result<()> {
        let nutzdaten = self.quelle.naechste_nutzdaten()?;
        let paket = self.sequencer.paket_erstellen(nutzdaten, erster);
        self.auswertung.gesendet();

        let zustellungen = self.simulator.verarbeiten(paket, jetzt_ms);
        self.einreihen(zustellungen);
        Ok(())
    }

    /// Uebernimmt Zustellungen in die Ankunfts-Warteschlange
    ///
    /// Der Rahmenindex ergibt sich aus dem Abstand zur zuletzt vergebenen
    /// Sequenznummer.
    fn einreihen(&mut self, zustellungen: Vec<SimulierteZustellung>) {
        let letzter_index = self.sequencer.vergeben().saturating_sub(1) as usize;
        let letzte_seq = self.sequencer.naechste_seq().wrapping_sub(1);

        for zustellung in zustellungen {
            if zustellung.verworfen {
                continue;
            }
            let abstand = letzte_seq.wrapping_sub(zustellung.paket.sequence_number) as usize;
            let Some(index) = letzter_index.checked_sub(abstand) else {
                continue;
            };
            self.lfd_nr += 1;
            self.unterwegs.push(Reverse(Eintreffen {
                lfd_nr: self.lfd_nr,
                index,
                zustellung,
            }));
        }
    }

    /// Wertet alle Pakete aus, die bis `bis_ms` eingetroffen sind
    fn zustellen_bis(&mut self, bis_ms: f64) -> anyhow::Result<()> {
        while self
            .unterwegs
            .peek()
            .is_some_and(|Reverse(e)| e.zustellung.ankunft_ms <= bis_ms)
        {
            let Some(Reverse(e)) = self.unterwegs.pop() else {
                break;
            };
            let z = &e.zustellung;
            let ankunft = self.fenster.paket_empfangen(z.paket.sequence_number);
            self.auswertung
                .empfangen(e.index, ankunft, z.gesendet_ms, z.ankunft_ms, &z.paket);

            if self.quelle.adaptiv() && self.auswertung.feedback_faellig() {
                let feedback = self.auswertung.feedback(self.fenster.statistik().verloren);
                self.quelle.regeln(feedback)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kurz(dauer_s: f64) -> BenchConfig {
        let mut config = BenchConfig::default();
        config.benchmark.dauer_s = dauer_s;
        config.benchmark.cooldown_s = 1.0;
        config
    }

    #[test]
    fn perfekte_strecke_verliert_nichts() {
        let daten = ausfuehren(&kurz(1.0), &NetworkCondition::perfekt(), 1).unwrap();
        let b = &daten.bericht;

        assert_eq!(b.pakete_gesendet, 50);
        assert_eq!(b.pakete_empfangen, 50);
        assert_eq!(b.pakete_verloren, 0);
        assert_eq!(b.latenz_ms.max, 0.0);
        assert_eq!(b.jitter_ms.max, 0.0);
        assert_eq!(daten.netzwerk.verworfen, 0);
        // Testton: 50 Rahmen Ton, keine Pause innerhalb der ersten Sekunde
        assert_eq!(b.stille_anteil_prozent, Some(0.0));
    }

    #[test]
    fn totalverlust_liefert_keinen_mos() {
        let tot = NetworkCondition::neu("tot", 1.0, 0.0, 0.0);
        let daten = ausfuehren(&kurz(0.5), &tot, 1).unwrap();

        assert_eq!(daten.bericht.pakete_empfangen, 0);
        assert_eq!(daten.bericht.verlustrate_prozent, 100.0);
        assert_eq!(daten.bericht.mos, None);
        assert_eq!(daten.bericht.stille_anteil_prozent, Some(100.0));
    }

    #[test]
    fn gleicher_seed_gleiches_ergebnis() {
        let config = kurz(2.0);
        let bedingung = NetworkCondition::schlecht().mit_reorder(0.05, 3);
        let a = ausfuehren(&config, &bedingung, 99).unwrap();
        let b = ausfuehren(&config, &bedingung, 99).unwrap();

        assert_eq!(a.bericht, b.bericht);
        assert_eq!(a.netzwerk, b.netzwerk);
        assert_eq!(a.bitrate, b.bitrate);
    }

    #[test]
    fn starker_verlust_senkt_bitrate() {
        let mut config = kurz(5.0);
        config.benchmark.feedback_fenster = 20;
        let verlustreich = NetworkCondition::neu("verlustreich", 0.3, 10.0, 0.0);

        let daten = ausfuehren(&config, &verlustreich, 7).unwrap();
        assert!(daten.bitrate.senkungen > 0);
        assert!(daten.bitrate.ziel_bitrate < 64_000);
        assert!(daten.bitrate.ziel_bitrate >= 8_000);
    }

    #[test]
    fn ohne_adaption_bleibt_bitrate() {
        let mut config = kurz(2.0);
        config.codec.adaptiv = false;
        let verlustreich = NetworkCondition::neu("verlustreich", 0.3, 10.0, 0.0);

        let daten = ausfuehren(&config, &verlustreich, 7).unwrap();
        assert_eq!(daten.bitrate.ziel_bitrate, 64_000);
        assert_eq!(daten.bitrate.senkungen, 0);
    }

    #[test]
    fn duplikate_werden_nicht_doppelt_gezaehlt() {
        let bedingung = NetworkCondition::neu("doppelt", 0.0, 5.0, 0.0).mit_stoerungen(0.5, 0.0);
        let daten = ausfuehren(&kurz(1.0), &bedingung, 3).unwrap();

        assert!(daten.netzwerk.dupliziert > 0);
        assert_eq!(daten.bericht.pakete_empfangen, 50);
        assert_eq!(daten.bericht.pakete_verloren, 0);
    }
}
