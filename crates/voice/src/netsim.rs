//! Netzwerk-Simulator – Verlust, Verzoegerung, Umordnung
//!
//! Wandelt einen geordneten Strom ausgehender Pakete in einen Zustellplan um.
//! Pro Paket wird unabhaengig entschieden:
//!
//! 1. Verlust (Bernoulli mit `packet_loss`)
//! 2. Verzoegerung ~ Normal(`latenz_ms`, `jitter_ms`), auf >= 0 begrenzt
//! 3. Korruption (1–3 Nutzdaten-Bytes ueberschrieben)
//! 4. Duplikat (Kopie 1–5 ms nach dem Original)
//! 5. Umordnung: Paket zurueckhalten, bis 1..=`reorder_fenster` spaetere
//!    Pakete eingeplant wurden
//!
//! ## Zustellung
//! - **Batch**: [`NetworkSimulator::batch_zustellen`] sortiert alle
//!   Zustellungen stabil nach Ankunftszeit (synthetische Zeitachse).
//! - **Echtzeit**: [`Echtzeitplaner`] haelt eine nach Freigabezeit geordnete
//!   Warteschlange in einem eigenen Task, schlaeft bis zur jeweils naechsten
//!   Freigabe und sendet dann ueber [`RtpSession::paket_senden`].
//!
//! Beide Modi nutzen denselben Entscheidungscode; gleicher Seed und gleiche
//! Bedingung ergeben dieselbe Statistik.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use voipbench_core::{Result, VoipError};
use voipbench_protocol::rtp::RtpPacket;

use crate::session::RtpSession;

/// Obergrenze fuer Latenz und Jitter einer Bedingung in ms
pub const MAX_VERZOEGERUNG_MS: f64 = 60_000.0;

// ---------------------------------------------------------------------------
// Netzwerkbedingung
// ---------------------------------------------------------------------------

/// Parameter einer simulierten Netzwerkstrecke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCondition {
    /// Bezeichnung fuer Berichte
    pub name: String,
    /// Verlustwahrscheinlichkeit (0.0–1.0)
    pub packet_loss: f64,
    /// Mittlere Einweg-Latenz in ms
    pub latenz_ms: f64,
    /// Standardabweichung der Latenz in ms
    pub jitter_ms: f64,
    /// Wahrscheinlichkeit fuer Umordnung (0.0–1.0)
    pub reorder_wahrscheinlichkeit: f64,
    /// Maximale Anzahl spaeterer Pakete, die ein umgeordnetes Paket ueberholen
    pub reorder_fenster: u32,
    /// Wahrscheinlichkeit fuer Duplikate (0.0–1.0)
    pub duplikat_wahrscheinlichkeit: f64,
    /// Wahrscheinlichkeit fuer Nutzdaten-Korruption (0.0–1.0)
    pub korruption_wahrscheinlichkeit: f64,
}

impl Default for NetworkCondition {
    fn default() -> Self {
        Self::perfekt()
    }
}

impl NetworkCondition {
    /// Bedingung mit Verlust, Latenz und Jitter (Werte werden begrenzt)
    pub fn neu(name: impl Into<String>, packet_loss: f64, latenz_ms: f64, jitter_ms: f64) -> Self {
        Self {
            name: name.into(),
            packet_loss,
            latenz_ms,
            jitter_ms,
            reorder_wahrscheinlichkeit: 0.0,
            reorder_fenster: 0,
            duplikat_wahrscheinlichkeit: 0.0,
            korruption_wahrscheinlichkeit: 0.0,
        }
        .begrenzt()
    }

    /// Verlustfreie Strecke ohne Verzoegerung
    pub fn perfekt() -> Self {
        Self::neu("perfect", 0.0, 0.0, 0.0)
    }

    /// 1 % Verlust, 20 ms Latenz, 5 ms Jitter
    pub fn gut() -> Self {
        Self::neu("good", 0.01, 20.0, 5.0)
    }

    /// 5 % Verlust, 100 ms Latenz, 30 ms Jitter
    pub fn schlecht() -> Self {
        Self::neu("poor", 0.05, 100.0, 30.0)
    }

    /// Aktiviert Umordnung
    pub fn mit_reorder(mut self, wahrscheinlichkeit: f64, fenster: u32) -> Self {
        self.reorder_wahrscheinlichkeit = wahrscheinlichkeit;
        self.reorder_fenster = fenster;
        self.begrenzt()
    }

    /// Aktiviert Duplikate und Korruption
    pub fn mit_stoerungen(mut self, duplikat: f64, korruption: f64) -> Self {
        self.duplikat_wahrscheinlichkeit = duplikat;
        self.korruption_wahrscheinlichkeit = korruption;
        self.begrenzt()
    }

    /// Begrenzt alle Werte auf ihren gueltigen Bereich
    ///
    /// NaN wird 0; Latenz und Jitter werden auf `MAX_VERZOEGERUNG_MS`
    /// gekappt (auch `inf`).
    pub fn begrenzt(mut self) -> Self {
        fn wahrscheinlichkeit(p: f64) -> f64 {
            if p.is_nan() {
                0.0
            } else {
                p.clamp(0.0, 1.0)
            }
        }
        fn verzoegerung(v: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, MAX_VERZOEGERUNG_MS)
            }
        }

        self.packet_loss = wahrscheinlichkeit(self.packet_loss);
        self.reorder_wahrscheinlichkeit = wahrscheinlichkeit(self.reorder_wahrscheinlichkeit);
        self.duplikat_wahrscheinlichkeit = wahrscheinlichkeit(self.duplikat_wahrscheinlichkeit);
        self.korruption_wahrscheinlichkeit =
            wahrscheinlichkeit(self.korruption_wahrscheinlichkeit);
        self.latenz_ms = verzoegerung(self.latenz_ms);
        self.jitter_ms = verzoegerung(self.jitter_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Zustellung und Statistik
// ---------------------------------------------------------------------------

/// Entscheidung des Simulators fuer ein Paket (oder ein Duplikat)
#[derive(Debug, Clone, PartialEq)]
pub struct SimulierteZustellung {
    pub paket: RtpPacket,
    /// Sendezeitpunkt in ms relativ zum Laufbeginn
    pub gesendet_ms: f64,
    /// Geplante Ankunft in ms relativ zum Laufbeginn
    pub ankunft_ms: f64,
    pub verworfen: bool,
    pub duplikat: bool,
    pub korrumpiert: bool,
    pub umgeordnet: bool,
}

impl SimulierteZustellung {
    /// Simulierte Einweg-Verzoegerung in ms
    pub fn verzoegerung_ms(&self) -> f64 {
        self.ankunft_ms - self.gesendet_ms
    }
}

/// Zaehlerstaende des Simulators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetsimStatistik {
    pub verarbeitet: u64,
    pub verworfen: u64,
    /// Zugestellte Originale (ohne Duplikate)
    pub zugestellt: u64,
    pub dupliziert: u64,
    pub korrumpiert: u64,
    pub umgeordnet: u64,
}

impl NetsimStatistik {
    /// Anteil verworfener Pakete in Prozent
    pub fn verlustrate_prozent(&self) -> f64 {
        if self.verarbeitet == 0 {
            0.0
        } else {
            self.verworfen as f64 / self.verarbeitet as f64 * 100.0
        }
    }
}

/// Ergebnis einer Batch-Simulation
#[derive(Debug, Clone, Default)]
pub struct Zustellplan {
    /// Zugestellte Pakete, stabil nach Ankunftszeit sortiert
    pub zustellungen: Vec<SimulierteZustellung>,
    /// Verworfene Pakete in Sendereihenfolge
    pub verworfen: Vec<SimulierteZustellung>,
}

/// Zurueckgehaltenes Paket (Umordnung)
#[derive(Debug)]
struct Zurueckgehalten {
    zustellung: SimulierteZustellung,
    duplikat_versatz_ms: Option<f64>,
    verbleibend: u32,
}

// ---------------------------------------------------------------------------
// NetworkSimulator
// ---------------------------------------------------------------------------

/// Seedbarer Netzwerk-Simulator fuer einen Lauf
#[derive(Debug)]
pub struct NetworkSimulator {
    bedingung: NetworkCondition,
    rng: StdRng,
    zurueckgehalten: Vec<Zurueckgehalten>,
    letzte_ankunft_ms: f64,
    statistik: NetsimStatistik,
}

impl NetworkSimulator {
    /// Erstellt einen Simulator mit festem Seed
    pub fn neu(bedingung: NetworkCondition, seed: u64) -> Self {
        Self {
            bedingung: bedingung.begrenzt(),
            rng: StdRng::seed_from_u64(seed),
            zurueckgehalten: Vec::new(),
            letzte_ankunft_ms: 0.0,
            statistik: NetsimStatistik::default(),
        }
    }

    pub fn bedingung(&self) -> &NetworkCondition {
        &self.bedingung
    }

    pub fn statistik(&self) -> NetsimStatistik {
        self.statistik
    }

    /// Anzahl aktuell zurueckgehaltener Pakete
    pub fn zurueckgehalten(&self) -> usize {
        self.zurueckgehalten.len()
    }

    /// Entscheidet ueber ein Paket
    ///
    /// Gibt alle Zustellungen zurueck, deren Zeitpunkt jetzt feststeht: das
    /// Paket selbst (oder dessen Verwerfung), ggf. sein Duplikat und frei
    /// gewordene zurueckgehaltene Pakete.
    pub fn verarbeiten(&mut self, mut paket: RtpPacket, gesendet_ms: f64) -> Vec<SimulierteZustellung> {
        self.statistik.verarbeitet += 1;
        let mut fertig = Vec::with_capacity(2);

        if self.rng.gen::<f64>() < self.bedingung.packet_loss {
            self.statistik.verworfen += 1;
            tracing::trace!(seq = paket.sequence_number, "Paket verworfen");
            fertig.push(SimulierteZustellung {
                paket,
                gesendet_ms,
                ankunft_ms: gesendet_ms,
                verworfen: true,
                duplikat: false,
                korrumpiert: false,
                umgeordnet: false,
            });
            return fertig;
        }

        let verzoegerung = self.normal(self.bedingung.latenz_ms, self.bedingung.jitter_ms).max(0.0);

        let korrumpiert = self.bedingung.korruption_wahrscheinlichkeit > 0.0
            && self.rng.gen::<f64>() < self.bedingung.korruption_wahrscheinlichkeit;
        if korrumpiert {
            self.korrumpieren(&mut paket);
        }

        let duplikat_versatz_ms = if self.bedingung.duplikat_wahrscheinlichkeit > 0.0
            && self.rng.gen::<f64>() < self.bedingung.duplikat_wahrscheinlichkeit
        {
            Some(self.rng.gen_range(1.0..=5.0))
        } else {
            None
        };

        let zurueckhalten = self.bedingung.reorder_fenster > 0
            && self.bedingung.reorder_wahrscheinlichkeit > 0.0
            && self.rng.gen::<f64>() < self.bedingung.reorder_wahrscheinlichkeit;

        let zustellung = SimulierteZustellung {
            paket,
            gesendet_ms,
            ankunft_ms: gesendet_ms + verzoegerung,
            verworfen: false,
            duplikat: false,
            korrumpiert,
            umgeordnet: zurueckhalten,
        };

        if zurueckhalten {
            let verbleibend = self.rng.gen_range(1..=self.bedingung.reorder_fenster);
            self.statistik.umgeordnet += 1;
            tracing::trace!(
                seq = zustellung.paket.sequence_number,
                verbleibend,
                "Paket zurueckgehalten"
            );
            self.zurueckgehalten.push(Zurueckgehalten {
                zustellung,
                duplikat_versatz_ms,
                verbleibend,
            });
            return fertig;
        }

        self.einplanen(zustellung, duplikat_versatz_ms, &mut fertig);

        // Zurueckgehaltene Pakete zaehlen nur eingeplante Nachfolger
        for gehalten in &mut self.zurueckgehalten {
            gehalten.verbleibend = gehalten.verbleibend.saturating_sub(1);
        }
        let mut i = 0;
        while i < self.zurueckgehalten.len() {
            if self.zurueckgehalten[i].verbleibend == 0 {
                let gehalten = self.zurueckgehalten.remove(i);
                self.freigeben(gehalten, &mut fertig);
            } else {
                i += 1;
            }
        }

        fertig
    }

    /// Gibt alle noch zurueckgehaltenen Pakete frei (Ende des Stroms)
    pub fn leeren(&mut self) -> Vec<SimulierteZustellung> {
        let mut fertig = Vec::new();
        for gehalten in std::mem::take(&mut self.zurueckgehalten) {
            self.freigeben(gehalten, &mut fertig);
        }
        fertig
    }

    /// Diskrete Ereignissimulation ueber einen vollstaendigen Paketstrom
    ///
    /// Erwartet (Paket, Sendezeit in ms) in Sendereihenfolge.
    pub fn batch_zustellen<I>(&mut self, pakete: I) -> Zustellplan
    where
        I: IntoIterator<Item = (RtpPacket, f64)>,
    {
        let mut plan = Zustellplan::default();
        for (paket, gesendet_ms) in pakete {
            for z in self.verarbeiten(paket, gesendet_ms) {
                if z.verworfen {
                    plan.verworfen.push(z);
                } else {
                    plan.zustellungen.push(z);
                }
            }
        }
        plan.zustellungen.extend(self.leeren());
        plan.zustellungen
            .sort_by(|a, b| a.ankunft_ms.total_cmp(&b.ankunft_ms));

        tracing::debug!(
            bedingung = %self.bedingung.name,
            verarbeitet = self.statistik.verarbeitet,
            verworfen = self.statistik.verworfen,
            umgeordnet = self.statistik.umgeordnet,
            "Batch-Simulation abgeschlossen"
        );
        plan
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    fn einplanen(
        &mut self,
        zustellung: SimulierteZustellung,
        duplikat_versatz_ms: Option<f64>,
        fertig: &mut Vec<SimulierteZustellung>,
    ) {
        self.statistik.zugestellt += 1;
        self.letzte_ankunft_ms = self.letzte_ankunft_ms.max(zustellung.ankunft_ms);

        if let Some(versatz) = duplikat_versatz_ms {
            self.statistik.dupliziert += 1;
            let mut kopie = zustellung.clone();
            kopie.ankunft_ms += versatz;
            kopie.duplikat = true;
            fertig.push(zustellung);
            fertig.push(kopie);
        } else {
            fertig.push(zustellung);
        }
    }

    fn freigeben(&mut self, gehalten: Zurueckgehalten, fertig: &mut Vec<SimulierteZustellung>) {
        let mut zustellung = gehalten.zustellung;
        // Nicht vor den Paketen ankommen, die es ueberholt haben
        zustellung.ankunft_ms = zustellung.ankunft_ms.max(self.letzte_ankunft_ms);
        self.einplanen(zustellung, gehalten.duplikat_versatz_ms, fertig);
    }

    /// Normalverteilte Zufallszahl (Box-Muller)
    fn normal(&mut self, mittel: f64, std_abw: f64) -> f64 {
        if std_abw <= 0.0 {
            return mittel;
        }
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        mittel + std_abw * (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }

    fn korrumpieren(&mut self, paket: &mut RtpPacket) {
        if paket.payload.is_empty() {
            return;
        }
        self.statistik.korrumpiert += 1;
        let mut daten = paket.payload.to_vec();
        let anzahl = self.rng.gen_range(1..=3usize).min(daten.len());
        for _ in 0..anzahl {
            let pos = self.rng.gen_range(0..daten.len());
            daten[pos] = self.rng.gen();
        }
        paket.payload = daten.into();
    }
}

// ---------------------------------------------------------------------------
// Echtzeitplaner
// ---------------------------------------------------------------------------

/// Eintrag der Freigabe-Warteschlange
#[derive(Debug)]
struct Freigabe {
    zeit_ms: f64,
    lfd_nr: u64,
    paket: RtpPacket,
}

impl PartialEq for Freigabe {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Freigabe {}

impl PartialOrd for Freigabe {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Freigabe {
    fn cmp(&self, other: &Self) -> Ordering {
        self.zeit_ms
            .total_cmp(&other.zeit_ms)
            .then(self.lfd_nr.cmp(&other.lfd_nr))
    }
}

/// Echtzeit-Zustellung ueber eine echte RTP-Session
///
/// Pakete werden per [`einreihen`](Self::einreihen) uebergeben; der Task
/// stempelt die Sendezeit, trifft die Simulator-Entscheidung und sendet jedes
/// ueberlebende Paket zu seiner Freigabezeit unveraendert ueber die Session.
pub struct Echtzeitplaner {
    tx: mpsc::Sender<RtpPacket>,
    task: JoinHandle<NetsimStatistik>,
}

impl Echtzeitplaner {
    /// Startet den Planer-Task
    pub fn starten(simulator: NetworkSimulator, session: Arc<RtpSession>) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let task = tokio::spawn(planer_schleife(simulator, session, rx));
        Self { tx, task }
    }

    /// Uebergibt ein Paket zum aktuellen Zeitpunkt
    ///
    /// # Fehler
    /// - `SessionNichtOffen` wenn der Planer-Task bereits beendet ist
    pub async fn einreihen(&self, paket: RtpPacket) -> Result<()> {
        self.tx
            .send(paket)
            .await
            .map_err(|_| VoipError::SessionNichtOffen)
    }

    /// Schliesst den Eingang, stellt alle ausstehenden Pakete zu und
    /// liefert die Simulator-Statistik
    pub async fn beenden(self) -> NetsimStatistik {
        drop(self.tx);
        match self.task.await {
            Ok(statistik) => statistik,
            Err(e) => {
                tracing::error!(fehler = %e, "Echtzeitplaner abgebrochen");
                NetsimStatistik::default()
            }
        }
    }
}

/// Abstand zum Planer-Start; nicht endliche oder negative Zeiten gelten als sofort
fn nach_ms(zeit_ms: f64) -> Duration {
    if zeit_ms.is_finite() && zeit_ms > 0.0 {
        Duration::from_secs_f64(zeit_ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

async fn planer_schleife(
    mut simulator: NetworkSimulator,
    session: Arc<RtpSession>,
    mut rx: mpsc::Receiver<RtpPacket>,
) -> NetsimStatistik {
    let start = Instant::now();
    let mut warteschlange: BinaryHeap<Reverse<Freigabe>> = BinaryHeap::new();
    let mut lfd_nr = 0u64;
    let mut eingang_offen = true;

    tracing::debug!(bedingung = %simulator.bedingung().name, "Echtzeitplaner gestartet");

    loop {
        let naechste = warteschlange
            .peek()
            .map(|Reverse(f)| start + nach_ms(f.zeit_ms));

        if !eingang_offen && naechste.is_none() {
            break;
        }

        tokio::select! {
            eingang = rx.recv(), if eingang_offen => {
                let zustellungen = match eingang {
                    Some(paket) => {
                        let gesendet_ms = start.elapsed().as_secs_f64() * 1000.0;
                        simulator.verarbeiten(paket, gesendet_ms)
                    }
                    None => {
                        eingang_offen = false;
                        simulator.leeren()
                    }
                };
                for z in zustellungen.into_iter().filter(|z| !z.verworfen) {
                    lfd_nr += 1;
                    warteschlange.push(Reverse(Freigabe {
                        zeit_ms: z.ankunft_ms,
                        lfd_nr,
                        paket: z.paket,
                    }));
                }
            }

            _ = tokio::time::sleep_until(naechste.unwrap_or(start)), if naechste.is_some() => {
                let jetzt_ms = start.elapsed().as_secs_f64() * 1000.0;
                while warteschlange
                    .peek()
                    .is_some_and(|Reverse(f)| f.zeit_ms <= jetzt_ms)
                {
                    let Some(Reverse(freigabe)) = warteschlange.pop() else {
                        break;
                    };
                    if let Err(e) = session.paket_senden(&freigabe.paket).await {
                        tracing::warn!(
                            fehler = %e,
                            seq = freigabe.paket.sequence_number,
                            "Freigabe fehlgeschlagen"
                        );
                    }
                }
            }
        }
    }

    let statistik = simulator.statistik();
    tracing::debug!(
        verarbeitet = statistik.verarbeitet,
        verworfen = statistik.verworfen,
        "Echtzeitplaner beendet"
    );
    statistik
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unendliche_verzoegerung_wird_gekappt() {
        let b = NetworkCondition::neu("kaputt", 0.0, f64::INFINITY, 1e300).begrenzt();
        assert_eq!(b.latenz_ms, MAX_VERZOEGERUNG_MS);
        assert_eq!(b.jitter_ms, MAX_VERZOEGERUNG_MS);

        let b = NetworkCondition::neu("negativ", 0.0, f64::NEG_INFINITY, f64::NAN).begrenzt();
        assert_eq!((b.latenz_ms, b.jitter_ms), (0.0, 0.0));

        let fern = NetworkCondition::neu("fern", 0.0, f64::INFINITY, f64::INFINITY);
        let mut sim = NetworkSimulator::neu(fern, 3);
        let plan = sim.batch_zustellen(strom(50));
        assert_eq!(plan.zustellungen.len(), 50);
        assert!(plan.zustellungen.iter().all(|z| z.ankunft_ms.is_finite()));
    }

    #[test]
    fn freigabezeit_ist_robust() {
        assert_eq!(nach_ms(f64::NAN), Duration::ZERO);
        assert_eq!(nach_ms(-5.0), Duration::ZERO);
        assert_eq!(nach_ms(f64::INFINITY), Duration::ZERO);
        assert_eq!(nach_ms(1500.0), Duration::from_millis(1500));
    }

    fn strom(anzahl: u16) -> Vec<(RtpPacket, f64)> {
        (0..anzahl)
            .map(|i| {
                let paket = RtpPacket::neu(96, i, i as u32 * 960, 1, vec![i as u8; 32]);
                (paket, i as f64 * 20.0)
            })
            .collect()
    }

    #[test]
    fn verlustfrei_in_ordnung_und_unveraendert() {
        let eingang = strom(500);
        let mut sim = NetworkSimulator::neu(NetworkCondition::perfekt(), 1);
        let plan = sim.batch_zustellen(eingang.clone());

        assert!(plan.verworfen.is_empty());
        assert_eq!(plan.zustellungen.len(), 500);
        for (z, (original, _)) in plan.zustellungen.iter().zip(&eingang) {
            assert_eq!(&z.paket, original);
            assert!(!z.duplikat && !z.korrumpiert);
        }
    }

    #[test]
    fn totalverlust_stellt_nichts_zu() {
        let mut sim = NetworkSimulator::neu(NetworkCondition::neu("tot", 1.0, 10.0, 0.0), 7);
        let plan = sim.batch_zustellen(strom(1000));
        assert!(plan.zustellungen.is_empty());
        assert_eq!(plan.verworfen.len(), 1000);
        assert_eq!(sim.statistik().verworfen, 1000);
    }

    #[test]
    fn verlust_haelfte_statistisch() {
        let mut sim = NetworkSimulator::neu(NetworkCondition::neu("halb", 0.5, 0.0, 0.0), 42);
        let pakete = (0..10_000u32).map(|i| {
            (
                RtpPacket::neu(96, i as u16, i * 960, 1, vec![0u8; 8]),
                i as f64 * 20.0,
            )
        });
        let plan = sim.batch_zustellen(pakete);
        let verworfen = plan.verworfen.len();
        assert!(
            (4_800..=5_200).contains(&verworfen),
            "Verworfen: {verworfen} (erwartet 5000 +/- 2%)"
        );
        assert_eq!(plan.zustellungen.len() + verworfen, 10_000);
    }

    #[test]
    fn gleicher_seed_gleicher_plan() {
        let bedingung = NetworkCondition::schlecht().mit_reorder(0.1, 3);
        let a = NetworkSimulator::neu(bedingung.clone(), 99).batch_zustellen(strom(300));
        let b = NetworkSimulator::neu(bedingung, 99).batch_zustellen(strom(300));
        assert_eq!(a.zustellungen, b.zustellungen);
        assert_eq!(a.verworfen, b.verworfen);
    }

    #[test]
    fn verzoegerung_nie_negativ() {
        let mut sim = NetworkSimulator::neu(NetworkCondition::neu("breit", 0.0, 0.0, 50.0), 3);
        let plan = sim.batch_zustellen(strom(2000));
        assert!(plan.zustellungen.iter().all(|z| z.verzoegerung_ms() >= 0.0));
    }

    #[test]
    fn umordnung_ueberholt_aber_verliert_nichts() {
        let bedingung = NetworkCondition::neu("reorder", 0.0, 10.0, 0.0).mit_reorder(0.2, 4);
        let mut sim = NetworkSimulator::neu(bedingung, 11);
        let plan = sim.batch_zustellen(strom(1000));

        assert_eq!(plan.zustellungen.len(), 1000);
        assert!(sim.statistik().umgeordnet > 0);

        let seqs: Vec<u16> = plan.zustellungen.iter().map(|z| z.paket.sequence_number).collect();
        assert!(seqs.windows(2).any(|w| w[1] < w[0]), "mindestens eine Umordnung");

        let mut sortiert = seqs.clone();
        sortiert.sort_unstable();
        assert_eq!(sortiert, (0..1000).collect::<Vec<u16>>());
    }

    #[test]
    fn fenster_eins_ueberholt_genau_einmal() {
        let bedingung = NetworkCondition::neu("reorder", 0.0, 0.0, 0.0).mit_reorder(0.3, 1);
        let mut sim = NetworkSimulator::neu(bedingung, 5);
        let plan = sim.batch_zustellen(strom(500));

        for (pos, z) in plan.zustellungen.iter().enumerate() {
            let seq = z.paket.sequence_number as usize;
            if z.umgeordnet {
                // Nur am Stromende bleibt ein Paket ohne Nachfolger an seinem Platz
                assert!(pos == seq + 1 || pos == seq, "seq {seq} an Position {pos}");
            }
        }
    }

    #[test]
    fn duplikate_kommen_kurz_nach_dem_original() {
        let bedingung = NetworkCondition::neu("dup", 0.0, 10.0, 0.0).mit_stoerungen(1.0, 0.0);
        let mut sim = NetworkSimulator::neu(bedingung, 8);
        let plan = sim.batch_zustellen(strom(50));

        assert_eq!(plan.zustellungen.len(), 100);
        assert_eq!(sim.statistik().dupliziert, 50);
        for kopie in plan.zustellungen.iter().filter(|z| z.duplikat) {
            let original = plan
                .zustellungen
                .iter()
                .find(|z| !z.duplikat && z.paket.sequence_number == kopie.paket.sequence_number)
                .unwrap();
            let abstand = kopie.ankunft_ms - original.ankunft_ms;
            assert!((1.0..=5.0).contains(&abstand), "Abstand {abstand}");
        }
    }

    #[test]
    fn korruption_aendert_nur_nutzdaten() {
        let bedingung = NetworkCondition::neu("korrupt", 0.0, 0.0, 0.0).mit_stoerungen(0.0, 1.0);
        let eingang = strom(200);
        let mut sim = NetworkSimulator::neu(bedingung, 21);
        let plan = sim.batch_zustellen(eingang.clone());

        assert_eq!(sim.statistik().korrumpiert, 200);
        for (z, (original, _)) in plan.zustellungen.iter().zip(&eingang) {
            assert!(z.korrumpiert);
            assert_eq!(z.paket.sequence_number, original.sequence_number);
            assert_eq!(z.paket.payload.len(), original.payload.len());
            let geaendert = z
                .paket
                .payload
                .iter()
                .zip(original.payload.iter())
                .filter(|(a, b)| a != b)
                .count();
            assert!(geaendert <= 3);
        }
    }

    #[test]
    fn bedingung_wird_begrenzt() {
        let b = NetworkCondition::neu("x", 1.5, -10.0, f64::NAN).mit_reorder(-0.5, 3);
        assert_eq!(b.packet_loss, 1.0);
        assert_eq!(b.latenz_ms, 0.0);
        assert_eq!(b.jitter_ms, 0.0);
        assert_eq!(b.reorder_wahrscheinlichkeit, 0.0);
    }

    #[test]
    fn bedingung_serde_mit_defaults() {
        let b: NetworkCondition =
            serde_json::from_str(r#"{"name":"good","packet_loss":0.01,"latenz_ms":20}"#).unwrap();
        assert_eq!(b.jitter_ms, 0.0);
        assert_eq!(b.reorder_fenster, 0);
        assert_eq!(b.name, "good");
    }
}
