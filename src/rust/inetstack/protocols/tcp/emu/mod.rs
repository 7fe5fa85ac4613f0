// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Application-layer NAT helpers.
//!
//! Some protocols carry addresses and ports inside their byte stream. A helper inspects the in-order payload a guest
//! sends on such a connection, opens the host-side listener the peer will need, and rewrites the embedded address so
//! that it names that listener instead of the guest.

mod ftp;
mod ident;
mod irc;
mod port;
mod realaudio;
mod scan;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::libc::EINVAL;
use ::std::{
    net::SocketAddrV4,
    str::FromStr,
};

pub use self::realaudio::RealAudioState;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Protocol helper attached to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmuClass {
    #[default]
    None,
    Ftp,
    Irc,
    RealAudio,
    Rlogin,
    Rsh,
    Ksh,
    Ident,
}

/// Per-connection helper state.
#[derive(Debug, Clone, Default)]
pub struct Emulation {
    class: EmuClass,
    realaudio: RealAudioState,
    ident_line: Vec<u8>,
}

/// Endpoints of the connection whose payload is being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct EmuContext {
    /// Guest side.
    pub guest: SocketAddrV4,
    /// Remote side.
    pub remote: SocketAddrV4,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// Services of the connection manager the helpers call back into.
pub trait EmuHost {
    /// Opens an accept-once listener whose connection is forwarded to `guest`. Returns the address remote peers
    /// should connect to.
    fn listen_once(&mut self, guest: SocketAddrV4) -> Option<SocketAddrV4>;

    /// Opens an accept-once UDP redirection from `host_port` to `guest`. Returns false if the port is taken.
    fn udp_listen_once(&mut self, host_port: u16, guest: SocketAddrV4) -> bool;

    /// Host-side port of the connection between `guest` and `remote`, if there is one.
    fn host_port_of(&self, guest: SocketAddrV4, remote: SocketAddrV4) -> Option<u16>;
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Emulation {
    pub fn new(class: EmuClass) -> Self {
        Self {
            class,
            ..Default::default()
        }
    }

    pub fn get_class(&self) -> EmuClass {
        self.class
    }

    pub fn is_active(&self) -> bool {
        self.class != EmuClass::None
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Runs the helper of `emu` over in-order guest payload. Returns the bytes to forward to the host, which may be
/// shorter or longer than the input, or empty while a helper is still buffering.
pub fn emulate<H: EmuHost + ?Sized>(emu: &mut Emulation, ctx: &EmuContext, data: Vec<u8>, host: &mut H) -> Vec<u8> {
    match emu.class {
        EmuClass::None => data,
        EmuClass::Ftp => ftp::emulate(data, host),
        EmuClass::Irc => irc::emulate(data, host),
        EmuClass::RealAudio => realaudio::emulate(&mut emu.realaudio, ctx, data, host),
        EmuClass::Rlogin | EmuClass::Rsh | EmuClass::Ksh => match port::emulate(ctx, &data, host) {
            Some(rewritten) => {
                // The port is only sent once per connection.
                emu.class = EmuClass::None;
                rewritten
            },
            None => data,
        },
        EmuClass::Ident => ident::emulate(&mut emu.ident_line, ctx, data, &*host),
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl FromStr for EmuClass {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Fail> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(EmuClass::None),
            "ftp" => Ok(EmuClass::Ftp),
            "irc" => Ok(EmuClass::Irc),
            "realaudio" => Ok(EmuClass::RealAudio),
            "rlogin" => Ok(EmuClass::Rlogin),
            "rsh" => Ok(EmuClass::Rsh),
            "ksh" | "kshell" => Ok(EmuClass::Ksh),
            "ident" => Ok(EmuClass::Ident),
            _ => Err(Fail::new(EINVAL, "unknown emulation")),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
