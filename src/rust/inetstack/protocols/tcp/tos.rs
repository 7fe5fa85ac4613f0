// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Type-of-service and emulation classification of connections by port.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::{
        ip::tos::{
            LOWDELAY,
            THROUGHPUT,
        },
        tcp::emu::EmuClass,
    },
    runtime::fail::Fail,
};
use ::libc::EINVAL;
use ::std::str::FromStr;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Well-known services. Consulted before any user entry.
const STATIC_TOS_TABLE: [TosEntry; 12] = [
    TosEntry::new(0, 20, THROUGHPUT, EmuClass::None),
    TosEntry::new(21, 21, LOWDELAY, EmuClass::Ftp),
    TosEntry::new(0, 23, LOWDELAY, EmuClass::None),
    TosEntry::new(0, 80, THROUGHPUT, EmuClass::None),
    TosEntry::new(0, 513, LOWDELAY, EmuClass::Rlogin),
    TosEntry::new(0, 514, LOWDELAY, EmuClass::Rsh),
    TosEntry::new(0, 544, LOWDELAY, EmuClass::Ksh),
    TosEntry::new(0, 543, LOWDELAY, EmuClass::None),
    TosEntry::new(0, 6667, THROUGHPUT, EmuClass::Irc),
    TosEntry::new(0, 6668, THROUGHPUT, EmuClass::Irc),
    TosEntry::new(0, 7070, LOWDELAY, EmuClass::RealAudio),
    TosEntry::new(0, 113, LOWDELAY, EmuClass::Ident),
];

//======================================================================================================================
// Structures
//======================================================================================================================

/// A classification rule. A zero port never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TosEntry {
    lport: u16,
    fport: u16,
    tos: u8,
    emu: EmuClass,
}

/// Outcome of classifying a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub tos: u8,
    pub emu: EmuClass,
}

/// Static rules plus user rules, newest user rule first.
#[derive(Debug, Clone, Default)]
pub struct TosTable {
    user: Vec<TosEntry>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TosEntry {
    pub const fn new(lport: u16, fport: u16, tos: u8, emu: EmuClass) -> Self {
        Self { lport, fport, tos, emu }
    }

    fn matches(&self, lport: u16, fport: u16) -> bool {
        (self.fport != 0 && self.fport == fport) || (self.lport != 0 && self.lport == lport)
    }
}

impl TosTable {
    /// Adds a user rule. It takes priority over older user rules, never over the static table.
    pub fn add(&mut self, entry: TosEntry) {
        trace!("add(): entry={:?}", entry);
        self.user.insert(0, entry);
    }

    /// Classifies a connection by its guest (`lport`) and foreign (`fport`) ports. The first matching rule wins.
    pub fn classify(&self, lport: u16, fport: u16) -> Classification {
        STATIC_TOS_TABLE
            .iter()
            .chain(self.user.iter())
            .find(|entry| entry.matches(lport, fport))
            .map(|entry| Classification {
                tos: entry.tos,
                emu: entry.emu,
            })
            .unwrap_or_default()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Parses `[lport:]fport:emu[:tos]`, where `emu` is a helper name and `tos` one of `lowdelay`, `throughput`,
/// `reliability` or a number.
impl FromStr for TosEntry {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Fail> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let parse_port = |part: &str| -> Result<u16, Fail> {
            part.parse::<u16>()
                .map_err(|_| Fail::new(EINVAL, "invalid port in emulation entry"))
        };

        // A numeric second field means the local port was given.
        let (lport, rest): (u16, &[&str]) = match parts.get(1) {
            Some(second) if second.parse::<u16>().is_ok() => (parse_port(parts[0])?, &parts[1..]),
            _ => (0, &parts[..]),
        };
        let (fport, emu, tos): (u16, EmuClass, Option<&str>) = match rest {
            [fport, emu] => (parse_port(fport)?, emu.parse()?, None),
            [fport, emu, tos] => (parse_port(fport)?, emu.parse()?, Some(*tos)),
            _ => return Err(Fail::new(EINVAL, "malformed emulation entry")),
        };
        if lport == 0 && fport == 0 {
            return Err(Fail::new(EINVAL, "emulation entry matches no port"));
        }
        let tos: u8 = match tos {
            None => 0,
            Some(tos) => match tos.to_ascii_lowercase().as_str() {
                "lowdelay" => LOWDELAY,
                "throughput" => THROUGHPUT,
                "reliability" => crate::inetstack::protocols::ip::tos::RELIABILITY,
                number => number
                    .parse::<u8>()
                    .map_err(|_| Fail::new(EINVAL, "invalid type of service in emulation entry"))?,
            },
        };

        Ok(TosEntry::new(lport, fport, tos, emu))
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
