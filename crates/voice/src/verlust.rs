//! Verlust-Erkennung ueber ein gleitendes Sequenzfenster
//!
//! Intern wird mit erweiterten (64-Bit) Sequenznummern gerechnet, damit der
//! Umlauf 65535 -> 0 keine Sonderfaelle erzeugt. Die Distanz zur hoechsten
//! gesehenen Nummer ist `s - hoechste` als vorzeichenbehaftete 16-Bit-Differenz.
//!
//! - `d > 0`: die `d - 1` uebersprungenen Nummern werden ausstehend
//! - `d <= 0` im Fenster: ausstehende Markierung loeschen (verspaetet, nicht verloren)
//! - ausstehende Nummern, die aus dem Fenster fallen, zaehlen als verloren
//!
//! Jede Nummer wird hoechstens einmal als verloren gezaehlt.

use std::collections::BTreeSet;

/// Standard-Fenstergroesse in Paketen
pub const STANDARD_FENSTER: u16 = 64;

/// Offset fuer erweiterte Nummern (erlaubt Ankuenfte vor dem ersten Paket)
const ERWEITERUNGS_BASIS: u64 = 1 << 16;

/// Einordnung eines eingehenden Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ankunft {
    /// Erstes Paket oder direkter Nachfolger
    InOrdnung,
    /// Neues hoechstes Paket nach einer Luecke
    Luecke { fehlend: u32 },
    /// Verspaetet, aber noch im Fenster (war ausstehend)
    Verspaetet,
    /// Bereits empfangen
    Duplikat,
    /// Aelter als das Fenster, bereits als verloren gewertet
    ZuSpaet,
}

/// Zaehlerstaende der Verlust-Erkennung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerlustStatistik {
    /// Endgueltig als verloren gewertete Pakete
    pub verloren: u64,
    /// Verspaetete Pakete innerhalb des Fensters
    pub out_of_order: u64,
    /// Doppelt empfangene Pakete
    pub duplikate: u64,
    /// Pakete, die erst nach Ablauf des Fensters eintrafen
    pub zu_spaet: u64,
    /// Aktuell ausstehende (noch nicht entschiedene) Nummern
    pub ausstehend: u64,
}

/// Gleitendes Verlust-Fenster
#[derive(Debug, Clone)]
pub struct VerlustFenster {
    groesse: u64,
    hoechste: Option<u64>,
    ausstehend: BTreeSet<u64>,
    empfangen: BTreeSet<u64>,
    statistik: VerlustStatistik,
}

impl Default for VerlustFenster {
    fn default() -> Self {
        Self::neu(STANDARD_FENSTER)
    }
}

impl VerlustFenster {
    /// Erstellt ein Fenster mit `groesse` Paketen (mindestens 1)
    pub fn neu(groesse: u16) -> Self {
        Self {
            groesse: groesse.max(1) as u64,
            hoechste: None,
            ausstehend: BTreeSet::new(),
            empfangen: BTreeSet::new(),
            statistik: VerlustStatistik::default(),
        }
    }

    /// Hoechste bisher gesehene Sequenznummer
    pub fn hoechste_seq(&self) -> Option<u16> {
        self.hoechste.map(|h| h as u16)
    }

    /// Ordnet eine empfangene Sequenznummer ein
    pub fn paket_empfangen(&mut self, seq: u16) -> Ankunft {
        let Some(hoechste) = self.hoechste else {
            let erweitert = ERWEITERUNGS_BASIS + seq as u64;
            self.hoechste = Some(erweitert);
            self.empfangen.insert(erweitert);
            return Ankunft::InOrdnung;
        };

        let d = seq.wrapping_sub(hoechste as u16) as i16 as i64;

        if d > 0 {
            let neue_hoechste = hoechste + d as u64;
            for erweitert in hoechste + 1..neue_hoechste {
                if neue_hoechste - erweitert >= self.groesse {
                    self.statistik.verloren += 1;
                } else {
                    self.ausstehend.insert(erweitert);
                }
            }
            self.hoechste = Some(neue_hoechste);
            self.empfangen.insert(neue_hoechste);
            self.altern(neue_hoechste);
            self.statistik.ausstehend = self.ausstehend.len() as u64;

            return if d == 1 {
                Ankunft::InOrdnung
            } else {
                Ankunft::Luecke {
                    fehlend: (d - 1) as u32,
                }
            };
        }

        if d == 0 {
            self.statistik.duplikate += 1;
            return Ankunft::Duplikat;
        }

        let abstand = (-d) as u64;
        if abstand >= self.groesse || abstand > hoechste {
            self.statistik.zu_spaet += 1;
            return Ankunft::ZuSpaet;
        }

        let erweitert = hoechste - abstand;
        if self.ausstehend.remove(&erweitert) {
            self.empfangen.insert(erweitert);
            self.statistik.out_of_order += 1;
            self.statistik.ausstehend = self.ausstehend.len() as u64;
            Ankunft::Verspaetet
        } else if self.empfangen.contains(&erweitert) {
            self.statistik.duplikate += 1;
            Ankunft::Duplikat
        } else {
            // Vor dem ersten Paket der Session gesendet
            self.empfangen.insert(erweitert);
            self.statistik.out_of_order += 1;
            Ankunft::Verspaetet
        }
    }

    /// Wertet alle noch ausstehenden Nummern als verloren (Session-Ende)
    pub fn abschliessen(&mut self) -> u64 {
        let rest = self.ausstehend.len() as u64;
        self.statistik.verloren += rest;
        self.ausstehend.clear();
        self.statistik.ausstehend = 0;
        rest
    }

    /// Aktueller Zaehlerstand
    pub fn statistik(&self) -> VerlustStatistik {
        self.statistik
    }

    /// Entfernt Eintraege, die aus dem Fenster gefallen sind
    fn altern(&mut self, hoechste: u64) {
        let grenze = hoechste.saturating_sub(self.groesse - 1);

        let behalten = self.ausstehend.split_off(&grenze);
        self.statistik.verloren += self.ausstehend.len() as u64;
        self.ausstehend = behalten;

        self.empfangen = self.empfangen.split_off(&grenze);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
