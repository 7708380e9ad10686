//! RTP-Session – UDP-Endpunkt mit Sende-Pfad und Empfangs-Task
//!
//! Eine Session besitzt genau einen UDP-Socket, vergibt Sequenznummern und
//! Zeitstempel fuer ausgehende Pakete und fuehrt Zaehler fuer beide Richtungen.
//!
//! ## Lebenszyklus
//!
//! ```text
//! Erstellt --oeffnen()--> Oeffnend --bind ok--> Offen --schliessen()--> Geschlossen (terminal)
//!                            |
//!                            +--bind fehlgeschlagen--> Erstellt
//! ```
//!
//! ## Architektur
//!
//! ```text
//! senden()/paket_senden()        Empfangs-Task (tokio::spawn)
//!     |                               |
//!     v                               v
//! RtpPacket::encode()           socket.recv_from()  <-- select! --> Stop-Signal
//!     |                               |
//!     v                               v
//! socket.send_to(remote)        RtpPacket::decode() + VerlustFenster
//!                                     |
//!                                     v
//!                               mpsc::Sender<EmpfangenesPaket>
//! ```
//!
//! `schliessen()` sendet das Stop-Signal, wartet auf das Ende des Tasks und
//! gibt erst danach den Socket frei. Nach der Rueckkehr wird kein Paket mehr
//! zugestellt.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use voipbench_core::{Result, VoipError};
use voipbench_protocol::rtp::{PayloadTyp, RtpPacket, MAX_DATAGRAMM_GROESSE};

use crate::sequenz::RtpSequencer;
use crate::verlust::{Ankunft, VerlustFenster, STANDARD_FENSTER};

/// Empfangspuffer (groesstmoegliche UDP-Nutzlast)
const UDP_BUFFER_SIZE: usize = 65_535;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration einer RTP-Session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lokaler Bind-Endpunkt (Port 0 = vom OS vergeben)
    pub lokale_adresse: SocketAddr,
    /// Remote-Endpunkt; `None` = nur Empfang
    pub remote_adresse: Option<SocketAddr>,
    /// Payload-Type der gesendeten Pakete
    pub payload_type: u8,
    /// Zeitstempel-Inkrement pro Paket
    pub samples_pro_rahmen: u32,
    /// Feste SSRC (sonst zufaellig)
    pub ssrc: Option<u32>,
    /// Start-Sequenznummer (sonst zufaellig)
    pub start_seq: Option<u16>,
    /// Zeitstempel-Basis (sonst zufaellig)
    pub start_timestamp: Option<u32>,
    /// Groesse des Verlust-Fensters in Paketen
    pub verlust_fenster: u16,
    /// Kapazitaet des Empfangskanals
    pub empfangs_queue_groesse: usize,
}

impl SessionConfig {
    /// Erstellt eine Konfiguration mit Standard-Werten
    pub fn neu(lokale_adresse: SocketAddr) -> Self {
        Self {
            lokale_adresse,
            remote_adresse: None,
            payload_type: PayloadTyp::DYNAMISCH_PCM,
            samples_pro_rahmen: 960,
            ssrc: None,
            start_seq: None,
            start_timestamp: None,
            verlust_fenster: STANDARD_FENSTER,
            empfangs_queue_groesse: 1024,
        }
    }

    /// Konfiguration auf 127.0.0.1 mit vom OS vergebenem Port
    pub fn loopback() -> Self {
        Self::neu(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
    }

    /// Setzt den Remote-Endpunkt
    pub fn mit_remote(mut self, remote: SocketAddr) -> Self {
        self.remote_adresse = Some(remote);
        self
    }
}

// ---------------------------------------------------------------------------
// Zustand und Statistik
// ---------------------------------------------------------------------------

/// Lebenszyklus-Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    Erstellt,
    /// `oeffnen()` laeuft gerade (Bind noch nicht abgeschlossen)
    Oeffnend,
    Offen,
    Geschlossen,
}

/// Konsistenter Schnappschuss der Session-Zaehler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatistik {
    pub gesendete_pakete: u64,
    pub gesendete_bytes: u64,
    pub empfangene_pakete: u64,
    pub empfangene_bytes: u64,
    /// Endgueltig verlorene Pakete
    pub verloren: u64,
    pub out_of_order: u64,
    pub duplikate: u64,
    /// Erst nach Ablauf des Verlust-Fensters eingetroffen
    pub zu_spaet: u64,
    /// Noch nicht entschiedene Luecken
    pub ausstehend: u64,
    /// Nicht dekodierbare Datagramme
    pub ungueltig: u64,
    /// Wegen vollem Empfangskanal verworfene Pakete
    pub queue_verworfen: u64,
    /// Zeit seit `oeffnen()`
    pub laufzeit: Duration,
}

/// Ein empfangenes und dekodiertes Paket
#[derive(Debug, Clone)]
pub struct EmpfangenesPaket {
    pub paket: RtpPacket,
    pub absender: SocketAddr,
    pub empfangen_um: Instant,
    pub ankunft: Ankunft,
    /// Groesse des Datagramms in Bytes
    pub bytes: usize,
}

/// Zaehler, die Sende-Pfad und Empfangs-Task gemeinsam nutzen
#[derive(Debug)]
struct Zaehler {
    gesendete_pakete: u64,
    gesendete_bytes: u64,
    empfangene_pakete: u64,
    empfangene_bytes: u64,
    ungueltig: u64,
    queue_verworfen: u64,
    verlust: VerlustFenster,
    gestartet: Option<Instant>,
    beendet: Option<Instant>,
}

impl Zaehler {
    fn neu(fenster: u16) -> Self {
        Self {
            gesendete_pakete: 0,
            gesendete_bytes: 0,
            empfangene_pakete: 0,
            empfangene_bytes: 0,
            ungueltig: 0,
            queue_verworfen: 0,
            verlust: VerlustFenster::neu(fenster),
            gestartet: None,
            beendet: None,
        }
    }

    fn snapshot(&self) -> SessionStatistik {
        let verlust = self.verlust.statistik();
        let laufzeit = match (self.gestartet, self.beendet) {
            (Some(start), Some(ende)) => ende.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        SessionStatistik {
            gesendete_pakete: self.gesendete_pakete,
            gesendete_bytes: self.gesendete_bytes,
            empfangene_pakete: self.empfangene_pakete,
            empfangene_bytes: self.empfangene_bytes,
            verloren: verlust.verloren,
            out_of_order: verlust.out_of_order,
            duplikate: verlust.duplikate,
            zu_spaet: verlust.zu_spaet,
            ausstehend: verlust.ausstehend,
            ungueltig: self.ungueltig,
            queue_verworfen: self.queue_verworfen,
            laufzeit,
        }
    }
}

/// Veraenderlicher Teil der Session
struct Innen {
    zustand: SessionZustand,
    remote: Option<SocketAddr>,
    socket: Option<Arc<UdpSocket>>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    empfaenger: Option<mpsc::Receiver<EmpfangenesPaket>>,
}

// ---------------------------------------------------------------------------
// RtpSession
// ---------------------------------------------------------------------------

/// RTP-Session ueber UDP
///
/// Alle Methoden nehmen `&self`, damit die Session per `Arc` zwischen
/// Sende-Schleife und Echtzeitplaner geteilt werden kann.
pub struct RtpSession {
    config: SessionConfig,
    sequencer: Mutex<RtpSequencer>,
    zaehler: Arc<Mutex<Zaehler>>,
    innen: Mutex<Innen>,
}

impl RtpSession {
    /// Erstellt eine Session im Zustand `Erstellt` (noch kein Socket)
    pub fn neu(config: SessionConfig) -> Self {
        let mut sequencer = RtpSequencer::zufaellig(config.payload_type, config.samples_pro_rahmen);
        if config.ssrc.is_some() || config.start_seq.is_some() || config.start_timestamp.is_some() {
            sequencer = RtpSequencer::neu(
                config.ssrc.unwrap_or_else(|| sequencer.ssrc()),
                config.payload_type,
                config.start_seq.unwrap_or_else(|| sequencer.naechste_seq()),
                config
                    .start_timestamp
                    .unwrap_or_else(|| sequencer.naechster_timestamp()),
                config.samples_pro_rahmen,
            );
        }

        Self {
            zaehler: Arc::new(Mutex::new(Zaehler::neu(config.verlust_fenster))),
            innen: Mutex::new(Innen {
                zustand: SessionZustand::Erstellt,
                remote: config.remote_adresse,
                socket: None,
                stop_tx: None,
                task: None,
                empfaenger: None,
            }),
            sequencer: Mutex::new(sequencer),
            config,
        }
    }

    /// Aktueller Lebenszyklus-Zustand
    pub fn zustand(&self) -> SessionZustand {
        self.innen.lock().zustand
    }

    /// SSRC dieser Session (fest fuer die gesamte Lebensdauer)
    pub fn ssrc(&self) -> u32 {
        self.sequencer.lock().ssrc()
    }

    /// Tatsaechlich gebundene lokale Adresse (erst nach `oeffnen()`)
    pub fn lokale_adresse(&self) -> Option<SocketAddr> {
        self.innen
            .lock()
            .socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    /// Bindet den Socket und startet den Empfangs-Task
    ///
    /// Mehrfacher Aufruf im Zustand `Offen` ist wirkungslos. Der Uebergang
    /// wird unter dem Lock reserviert, sodass nur ein Aufruf bindet.
    ///
    /// # Fehler
    /// - `Bind` wenn der Endpunkt belegt ist (Zustand bleibt `Erstellt`)
    /// - `SessionNichtOffen` nach `schliessen()` oder waehrend ein anderer
    ///   Aufruf noch bindet
    pub async fn oeffnen(&self) -> Result<()> {
        {
            let mut innen = self.innen.lock();
            match innen.zustand {
                SessionZustand::Offen => return Ok(()),
                SessionZustand::Oeffnend | SessionZustand::Geschlossen => {
                    return Err(VoipError::SessionNichtOffen)
                }
                SessionZustand::Erstellt => innen.zustand = SessionZustand::Oeffnend,
            }
        }

        let adresse = self.config.lokale_adresse;
        let gebunden = UdpSocket::bind(adresse)
            .await
            .and_then(|socket| Ok((socket.local_addr()?, socket)));
        let (gebunden, socket) = match gebunden {
            Ok(ok) => ok,
            Err(e) => {
                let mut innen = self.innen.lock();
                // schliessen() waehrend des Binds bleibt terminal
                if innen.zustand == SessionZustand::Oeffnend {
                    innen.zustand = SessionZustand::Erstellt;
                }
                return Err(VoipError::Bind {
                    adresse: adresse.to_string(),
                    grund: e.to_string(),
                });
            }
        };
        let socket = Arc::new(socket);

        let (tx, rx) = mpsc::channel(self.config.empfangs_queue_groesse.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();

        {
            let mut innen = self.innen.lock();
            if innen.zustand != SessionZustand::Oeffnend {
                // Waehrend des Binds geschlossen: Socket wird hier freigegeben
                return Err(VoipError::SessionNichtOffen);
            }

            self.zaehler.lock().gestartet = Some(Instant::now());
            let task = tokio::spawn(empfangs_schleife(
                Arc::clone(&socket),
                Arc::clone(&self.zaehler),
                tx,
                stop_rx,
            ));

            innen.zustand = SessionZustand::Offen;
            innen.socket = Some(socket);
            innen.stop_tx = Some(stop_tx);
            innen.task = Some(task);
            innen.empfaenger = Some(rx);
        }

        tracing::info!(
            addr = %gebunden,
            ssrc = self.ssrc(),
            "RTP-Session geoeffnet"
        );
        Ok(())
    }

    /// Uebernimmt den Empfangskanal (nur einmal moeglich)
    pub fn empfaenger(&self) -> Option<mpsc::Receiver<EmpfangenesPaket>> {
        self.innen.lock().empfaenger.take()
    }

    /// Erstellt das naechste Paket mit fortlaufender Nummerierung, ohne es zu senden
    pub fn paket_erstellen(&self, payload: impl Into<Bytes>, marker: bool) -> RtpPacket {
        self.sequencer.lock().paket_erstellen(payload, marker)
    }

    /// Nummeriert, serialisiert und sendet Nutzdaten
    ///
    /// Gibt die Anzahl gesendeter Bytes zurueck.
    ///
    /// # Fehler
    /// - `SessionNichtOffen` vor `oeffnen()` oder nach `schliessen()`
    /// - `KeinRemoteEndpunkt` bei einer reinen Empfangs-Session
    /// - `Transport` bei Socket-Fehlern
    pub async fn senden(&self, payload: impl Into<Bytes>, marker: bool) -> Result<usize> {
        // Vor der Nummernvergabe pruefen, damit Fehlbenutzung keine Luecke erzeugt
        self.sende_ziel()?;
        let paket = self.paket_erstellen(payload, marker);
        self.paket_senden(&paket).await
    }

    /// Sendet ein fertiges Paket unveraendert (Nummern bleiben erhalten)
    ///
    /// # Fehler
    /// - `UngueltigesPaket` wenn das Datagramm nicht in ein UDP-Paket passt
    pub async fn paket_senden(&self, paket: &RtpPacket) -> Result<usize> {
        let (socket, remote) = self.sende_ziel()?;
        if paket.groesse() > MAX_DATAGRAMM_GROESSE {
            return Err(VoipError::paket(format!(
                "Datagramm zu gross: {} Bytes (maximal {})",
                paket.groesse(),
                MAX_DATAGRAMM_GROESSE
            )));
        }
        let daten = paket.encode();

        let gesendet = match socket.send_to(&daten, remote).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    fehler = %e,
                    seq = paket.sequence_number,
                    ziel = %remote,
                    "RTP-Senden fehlgeschlagen"
                );
                return Err(e.into());
            }
        };

        {
            let mut z = self.zaehler.lock();
            z.gesendete_pakete += 1;
            z.gesendete_bytes += gesendet as u64;
        }

        tracing::trace!(
            seq = paket.sequence_number,
            ts = paket.timestamp,
            bytes = gesendet,
            ziel = %remote,
            "RTP-Paket gesendet"
        );
        Ok(gesendet)
    }

    /// Konsistenter Schnappschuss aller Zaehler
    pub fn statistik(&self) -> SessionStatistik {
        self.zaehler.lock().snapshot()
    }

    /// Stoppt den Empfangs-Task, wartet auf dessen Ende und gibt den Socket frei
    ///
    /// Idempotent. Noch ausstehende Luecken werden als verloren gewertet.
    pub async fn schliessen(&self) {
        let (stop_tx, task) = {
            let mut innen = self.innen.lock();
            if innen.zustand == SessionZustand::Geschlossen {
                return;
            }
            innen.zustand = SessionZustand::Geschlossen;
            (innen.stop_tx.take(), innen.task.take())
        };

        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(());
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Empfangs-Task nicht sauber beendet");
            }
        }

        // Socket erst nach dem Join freigeben
        self.innen.lock().socket = None;

        let statistik = {
            let mut z = self.zaehler.lock();
            z.verlust.abschliessen();
            if z.gestartet.is_some() {
                z.beendet = Some(Instant::now());
            }
            z.snapshot()
        };

        tracing::info!(
            ssrc = self.ssrc(),
            gesendet = statistik.gesendete_pakete,
            empfangen = statistik.empfangene_pakete,
            verloren = statistik.verloren,
            "RTP-Session geschlossen"
        );
    }

    fn sende_ziel(&self) -> Result<(Arc<UdpSocket>, SocketAddr)> {
        let innen = self.innen.lock();
        if innen.zustand != SessionZustand::Offen {
            return Err(VoipError::SessionNichtOffen);
        }
        let socket = innen.socket.clone().ok_or(VoipError::SessionNichtOffen)?;
        let remote = innen.remote.ok_or(VoipError::KeinRemoteEndpunkt)?;
        Ok((socket, remote))
    }
}

impl Drop for RtpSession {
    fn drop(&mut self) {
        // Ohne schliessen() gedroppt: Task nicht verwaisen lassen
        let innen = self.innen.get_mut();
        if let Some(task) = innen.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Empfangs-Task
// ---------------------------------------------------------------------------

async fn empfangs_schleife(
    socket: Arc<UdpSocket>,
    zaehler: Arc<Mutex<Zaehler>>,
    tx: mpsc::Sender<EmpfangenesPaket>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; UDP_BUFFER_SIZE];

    tracing::debug!("RTP-Empfangs-Task gestartet");

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                break;
            }

            result = socket.recv_from(&mut buf) => {
                match result {
                    // Puffer voll ausgeschoepft: Datagramm wurde abgeschnitten
                    Ok((len, absender)) if len == buf.len() => {
                        zaehler.lock().ungueltig += 1;
                        tracing::debug!(absender = %absender, "Datagramm abgeschnitten, verworfen");
                    }
                    Ok((len, absender)) => {
                        datagramm_verarbeiten(&buf[..len], absender, &zaehler, &tx);
                    }
                    Err(e) => {
                        if !empfang_fortsetzen(e) {
                            break;
                        }
                        // Kurze Pause gegen Busy-Loop
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
            }
        }
    }

    tracing::debug!("RTP-Empfangs-Task beendet");
}

/// Entscheidet nach einem Lesefehler, ob der Socket weiter nutzbar ist
fn empfang_fortsetzen(e: std::io::Error) -> bool {
    let fehler = VoipError::Transport(e);
    if fehler.ist_wiederholbar() {
        tracing::warn!(fehler = %fehler, "RTP-Empfangsfehler");
        true
    } else {
        tracing::error!(fehler = %fehler, "Socket nicht mehr nutzbar, Empfang beendet");
        false
    }
}

fn datagramm_verarbeiten(
    daten: &[u8],
    absender: SocketAddr,
    zaehler: &Mutex<Zaehler>,
    tx: &mpsc::Sender<EmpfangenesPaket>,
) {
    let empfangen_um = Instant::now();

    let paket = match RtpPacket::decode(daten) {
        Ok(p) => p,
        Err(e) => {
            zaehler.lock().ungueltig += 1;
            tracing::debug!(fehler = %e, absender = %absender, "Ungueltiges RTP-Datagramm");
            return;
        }
    };

    let ankunft = {
        let mut z = zaehler.lock();
        z.empfangene_pakete += 1;
        z.empfangene_bytes += daten.len() as u64;
        z.verlust.paket_empfangen(paket.sequence_number)
    };

    tracing::trace!(
        seq = paket.sequence_number,
        ssrc = paket.ssrc,
        bytes = daten.len(),
        ankunft = ?ankunft,
        "RTP-Paket empfangen"
    );

    let empfangen = EmpfangenesPaket {
        paket,
        absender,
        empfangen_um,
        ankunft,
        bytes: daten.len(),
    };

    match tx.try_send(empfangen) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            zaehler.lock().queue_verworfen += 1;
            tracing::warn!("Empfangskanal voll – Paket verworfen");
        }
        // Konsument hat den Kanal nicht abgeholt oder fallen gelassen
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn senden_vor_oeffnen_schlaegt_fehl() {
        let session = RtpSession::neu(
            SessionConfig::loopback().mit_remote("127.0.0.1:9".parse().unwrap()),
        );
        let result = session.senden(vec![1, 2, 3], false).await;
        assert!(matches!(result, Err(VoipError::SessionNichtOffen)));
    }

    #[tokio::test]
    async fn senden_ohne_remote_schlaegt_fehl() {
        let session = RtpSession::neu(SessionConfig::loopback());
        session.oeffnen().await.unwrap();
        let result = session.senden(vec![1], false).await;
        assert!(matches!(result, Err(VoipError::KeinRemoteEndpunkt)));
        session.schliessen().await;
    }

    #[tokio::test]
    async fn bind_konflikt() {
        let belegt = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = belegt.local_addr().unwrap();

        let session = RtpSession::neu(SessionConfig::neu(addr));
        let result = session.oeffnen().await;
        assert!(matches!(result, Err(VoipError::Bind { .. })));
        assert_eq!(session.zustand(), SessionZustand::Erstellt);
    }

    #[tokio::test]
    async fn oeffnen_nach_bind_konflikt_erneut_moeglich() {
        let belegt = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = belegt.local_addr().unwrap();

        let session = RtpSession::neu(SessionConfig::neu(addr));
        assert!(session.oeffnen().await.is_err());
        drop(belegt);

        session.oeffnen().await.unwrap();
        assert_eq!(session.zustand(), SessionZustand::Offen);
        assert_eq!(session.lokale_adresse(), Some(addr));
        session.schliessen().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn gleichzeitiges_oeffnen_bindet_nur_einmal() {
        let session = Arc::new(RtpSession::neu(SessionConfig::loopback()));

        let aufrufe: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&session);
                tokio::spawn(async move { s.oeffnen().await })
            })
            .collect();

        let mut erfolgreich = 0;
        for aufruf in aufrufe {
            match aufruf.await.unwrap() {
                Ok(()) => erfolgreich += 1,
                Err(e) => assert!(matches!(e, VoipError::SessionNichtOffen)),
            }
        }
        assert!(erfolgreich >= 1);
        assert_eq!(session.zustand(), SessionZustand::Offen);

        // Genau ein Empfangskanal existiert
        assert!(session.empfaenger().is_some());
        assert!(session.empfaenger().is_none());
        session.schliessen().await;
    }

    #[tokio::test]
    async fn zu_grosses_datagramm_wird_nicht_gesendet() {
        let session = RtpSession::neu(
            SessionConfig::loopback().mit_remote("127.0.0.1:9".parse().unwrap()),
        );
        session.oeffnen().await.unwrap();

        let paket = session.paket_erstellen(vec![0u8; MAX_DATAGRAMM_GROESSE], false);
        let result = session.paket_senden(&paket).await;
        assert!(matches!(result, Err(VoipError::UngueltigesPaket(_))));
        assert_eq!(session.statistik().gesendete_pakete, 0);
        session.schliessen().await;
    }

    #[tokio::test]
    async fn sendefehler_wird_gemeldet_und_nicht_gezaehlt() {
        // IPv4-Socket kann keine IPv6-Adresse erreichen
        let session = RtpSession::neu(
            SessionConfig::loopback().mit_remote("[::1]:9".parse().unwrap()),
        );
        session.oeffnen().await.unwrap();

        let result = session.senden(vec![1, 2, 3], false).await;
        assert!(matches!(result, Err(VoipError::Transport(_))));
        assert_eq!(session.statistik().gesendete_pakete, 0);
        session.schliessen().await;
    }

    #[test]
    fn empfangsfehler_klassifizierung() {
        use std::io::{Error, ErrorKind};

        assert!(empfang_fortsetzen(Error::from(ErrorKind::ConnectionRefused)));
        assert!(empfang_fortsetzen(Error::from(ErrorKind::Interrupted)));
        assert!(!empfang_fortsetzen(Error::from(ErrorKind::NotConnected)));
        assert!(!empfang_fortsetzen(Error::from(ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn schliessen_ist_idempotent_und_terminal() {
        let session = RtpSession::neu(
            SessionConfig::loopback().mit_remote("127.0.0.1:9".parse().unwrap()),
        );
        session.oeffnen().await.unwrap();
        session.schliessen().await;
        session.schliessen().await;
        assert_eq!(session.zustand(), SessionZustand::Geschlossen);

        assert!(matches!(
            session.senden(vec![0], false).await,
            Err(VoipError::SessionNichtOffen)
        ));
        assert!(session.oeffnen().await.is_err());
    }

    #[tokio::test]
    async fn loopback_senden_und_empfangen() {
        let empfaenger = RtpSession::neu(SessionConfig::loopback());
        empfaenger.oeffnen().await.unwrap();
        let ziel = empfaenger.lokale_adresse().unwrap();
        let mut rx = empfaenger.empfaenger().unwrap();

        let mut config = SessionConfig::loopback().mit_remote(ziel);
        config.ssrc = Some(0x1234);
        config.start_seq = Some(10);
        let sender = RtpSession::neu(config);
        sender.oeffnen().await.unwrap();

        let bytes = sender.senden(vec![0xAA; 40], true).await.unwrap();
        assert_eq!(bytes, 12 + 40);

        let empfangen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timeout beim Empfang")
            .expect("Kanal geschlossen");
        assert_eq!(empfangen.paket.sequence_number, 10);
        assert_eq!(empfangen.paket.ssrc, 0x1234);
        assert!(empfangen.paket.marker);
        assert_eq!(empfangen.paket.payload.as_ref(), &[0xAA; 40][..]);

        let s = sender.statistik();
        assert_eq!((s.gesendete_pakete, s.gesendete_bytes), (1, 52));
        let r = empfaenger.statistik();
        assert_eq!((r.empfangene_pakete, r.empfangene_bytes), (1, 52));

        sender.schliessen().await;
        empfaenger.schliessen().await;
    }

    #[tokio::test]
    async fn ungueltige_datagramme_werden_gezaehlt() {
        let session = RtpSession::neu(SessionConfig::loopback());
        session.oeffnen().await.unwrap();
        let ziel = session.lokale_adresse().unwrap();

        let roh = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        roh.send_to(&[0x80, 0x00, 0x01], ziel).await.unwrap();

        for _ in 0..100 {
            if session.statistik().ungueltig == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(session.statistik().ungueltig, 1);
        assert_eq!(session.statistik().empfangene_pakete, 0);
        session.schliessen().await;
    }
}
