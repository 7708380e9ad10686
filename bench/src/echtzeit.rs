//! Echtzeit-Lauf ueber zwei RTP-Sessions auf Loopback
//!
//! Der Sender gibt Rahmen im Takt der Rahmendauer an den Echtzeitplaner,
//! der sie nach der Simulator-Entscheidung verzoegert ueber UDP verschickt.
//! Nach `dauer_s` wird nicht mehr gesendet; waehrend `cooldown_s` laufen
//! verspaetete Pakete noch ein, danach werden beide Sessions geschlossen.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use voipbench_voice::netsim::{Echtzeitplaner, NetsimStatistik, NetworkCondition, NetworkSimulator};
use voipbench_voice::session::{RtpSession, SessionConfig};
use voipbench_voice::verlust::Ankunft;

use crate::auswertung::{Auswertung, Laufdaten, Quelle};
use crate::config::BenchConfig;

/// Fuehrt einen Echtzeit-Lauf fuer eine Bedingung aus
pub(crate) async fn ausfuehren(
    config: &BenchConfig,
    bedingung: &NetworkCondition,
    seed: u64,
) -> anyhow::Result<Laufdaten> {
    let mut quelle = Quelle::neu(config)?;
    let mut auswertung = Auswertung::neu(config)?;

    let ungueltig = || format!("Ungueltige Bind-Adresse: {}", config.netzwerk.bind_adresse);
    let sender_adresse = config.sender_bind_adresse().with_context(ungueltig)?;
    let empfaenger_adresse = config.empfaenger_bind_adresse().with_context(ungueltig)?;

    let session_config = |adresse: SocketAddr| {
        let mut c = SessionConfig::neu(adresse);
        c.payload_type = quelle.payload_type();
        c.samples_pro_rahmen = config.audio.frame_size;
        c.verlust_fenster = config.netzwerk.verlust_fenster;
        c
    };

    let empfaenger = RtpSession::neu(session_config(empfaenger_adresse));
    empfaenger.oeffnen().await?;
    let mut rx = empfaenger
        .empfaenger()
        .context("Empfangskanal bereits vergeben")?;
    let ziel = empfaenger
        .lokale_adresse()
        .context("Empfaenger hat keine lokale Adresse")?;

    let sender = Arc::new(RtpSession::neu(
        session_config(sender_adresse).mit_remote(ziel),
    ));
    sender.oeffnen().await?;

    info!(
        sender = ?sender.lokale_adresse(),
        empfaenger = %ziel,
        ssrc = sender.ssrc(),
        "Echtzeit-Lauf gestartet"
    );

    let rahmen_ms = config.audio.rahmen_dauer_ms();
    let anzahl = (config.benchmark.dauer_s * 1000.0 / rahmen_ms).ceil() as u64;

    let mut planer = Some(Echtzeitplaner::starten(
        NetworkSimulator::neu(bedingung.clone(), seed),
        Arc::clone(&sender),
    ));
    let mut abschluss: Option<JoinHandle<NetsimStatistik>> = None;

    let start = Instant::now();
    let mut sendezeiten = Sendezeiten::default();
    let mut gesendet = 0u64;

    let mut takt = tokio::time::interval(Duration::from_secs_f64(rahmen_ms / 1000.0));
    let frist = tokio::time::sleep(Duration::from_secs_f64(
        config.benchmark.dauer_s + config.benchmark.cooldown_s,
    ));
    tokio::pin!(frist);

    loop {
        tokio::select! {
            _ = &mut frist => break,

            _ = takt.tick(), if gesendet < anzahl => {
                let nutzdaten = quelle.naechste_nutzdaten()?;
                let paket = sender.paket_erstellen(nutzdaten, gesendet == 0);
                let index = auswertung.gesendet();
                sendezeiten.eintragen(paket.sequence_number, index, Instant::now());
                if let Some(p) = &planer {
                    p.einreihen(paket).await?;
                }
                gesendet += 1;

                if gesendet == anzahl {
                    debug!(gesendet, "Senden beendet, Nachlaufzeit beginnt");
                    abschluss = planer.take().map(|p| tokio::spawn(p.beenden()));
                }
            }

            empfangen = rx.recv() => {
                let Some(e) = empfangen else { break };
                let seq = e.paket.sequence_number;
                if e.ankunft == Ankunft::Duplikat {
                    trace!(seq, "Duplikat ignoriert");
                    continue;
                }
                let Some((index, gesendet_um)) = sendezeiten.abholen(seq) else {
                    warn!(seq, "Paket mit unbekannter Sequenznummer");
                    continue;
                };
                let gesendet_ms = ms_seit(start, gesendet_um);
                let empfangen_ms = ms_seit(start, e.empfangen_um);
                auswertung.empfangen(index, e.ankunft, gesendet_ms, empfangen_ms, &e.paket);

                if quelle.adaptiv() && auswertung.feedback_faellig() {
                    let feedback = auswertung.feedback(empfaenger.statistik().verloren);
                    quelle.regeln(feedback)?;
                }
            }
        }
    }

    if abschluss.is_none() {
        abschluss = planer.take().map(|p| tokio::spawn(p.beenden()));
    }
    let netzwerk = match abschluss {
        Some(task) => task.await?,
        None => NetsimStatistik::default(),
    };

    sender.schliessen().await;
    empfaenger.schliessen().await;
    debug!(offen = sendezeiten.len(), "Nie eingetroffene Rahmen");

    let empfangs_statistik = empfaenger.statistik();
    debug!(
        empfangen = empfangs_statistik.empfangene_pakete,
        verloren = empfangs_statistik.verloren,
        duplikate = empfangs_statistik.duplikate,
        ungueltig = empfangs_statistik.ungueltig,
        queue_verworfen = empfangs_statistik.queue_verworfen,
        "Empfaenger geschlossen"
    );

    Ok(Laufdaten {
        bericht: auswertung.abschliessen(gesendet as f64 * rahmen_ms / 1000.0),
        netzwerk,
        bitrate: quelle.bitrate_daten(),
    })
}

/// Sendezeitpunkte der noch nicht eingetroffenen Rahmen
///
/// Ein Eintrag wird beim ersten Eintreffen entfernt. Es bleiben nur verlorene
/// Rahmen stehen; nach einem Sequenz-Umlauf ersetzt der neue Rahmen den alten
/// Eintrag, die Tabelle waechst also nie ueber 65536 Eintraege.
#[derive(Debug, Default)]
struct Sendezeiten {
    offen: HashMap<u16, (usize, Instant)>,
}

impl Sendezeiten {
    fn eintragen(&mut self, seq: u16, index: usize, zeitpunkt: Instant) {
        if let Some((alt, _)) = self.offen.insert(seq, (index, zeitpunkt)) {
            trace!(seq, alt, neu = index, "Verlorener Rahmen nach Sequenz-Umlauf ersetzt");
        }
    }

    fn abholen(&mut self, seq: u16) -> Option<(usize, Instant)> {
        self.offen.remove(&seq)
    }

    fn len(&self) -> usize {
        self.offen.len()
    }
}

fn ms_seit(start: Instant, zeitpunkt: Instant) -> f64 {
    zeitpunkt.saturating_duration_since(start).as_secs_f64() * 1000.0
}
