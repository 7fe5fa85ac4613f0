// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! RealAudio control connections.
//!
//! The client announces the UDP port it receives the stream on inside a binary `PNA\0` header. The header may arrive
//! split across any number of segments, so the scan position is kept per connection. Version 2 headers are longer
//! than version 1 headers; the second layout byte tells them apart.

use super::{
    EmuContext,
    EmuHost,
};
use ::std::{
    net::SocketAddrV4,
    ops::{
        Range,
        RangeInclusive,
    },
};

/// Ports a client may announce.
const CLIENT_PORTS: RangeInclusive<u16> = 6970..=7170;

/// Host ports tried for the redirection.
const REDIRECT_PORTS: Range<u16> = 6970..7071;

/// Ports below the client range are shifted up by this much.
const PORT_ADJUST: u16 = 256;

/// Scan position within a `PNA` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RealAudioState {
    #[default]
    MatchP,
    MatchN,
    MatchA,
    MatchNul,
    Version,
    Layout,
    LayoutProbe,
    Skip(u8),
    Port,
}

fn redirect<H: EmuHost + ?Sized>(ctx: &EmuContext, port: u16, host: &mut H) -> Option<u16> {
    let port: u16 = if port < *CLIENT_PORTS.start() { port.wrapping_add(PORT_ADJUST) } else { port };
    if !CLIENT_PORTS.contains(&port) {
        warn!("emulate(): realaudio client port {} out of range", port);
        return None;
    }
    let guest: SocketAddrV4 = SocketAddrV4::new(*ctx.guest.ip(), port);
    let host_port: u16 = REDIRECT_PORTS
        .clone()
        .find(|&p| host.udp_listen_once(p, guest))
        .unwrap_or(0);
    debug!("emulate(): realaudio stream {:?} redirected from port {}", guest, host_port);
    Some(host_port)
}

pub fn emulate<H: EmuHost + ?Sized>(
    state: &mut RealAudioState,
    ctx: &EmuContext,
    mut data: Vec<u8>,
    host: &mut H,
) -> Vec<u8> {
    let mut i: usize = 0;
    while i < data.len() {
        let byte: u8 = data[i];
        *state = match *state {
            RealAudioState::MatchP => {
                i += 1;
                if byte == b'P' {
                    RealAudioState::MatchN
                } else {
                    RealAudioState::MatchP
                }
            },
            RealAudioState::MatchN => {
                i += 1;
                match byte {
                    b'N' => RealAudioState::MatchA,
                    // Repeated P.
                    b'P' => RealAudioState::MatchN,
                    _ => RealAudioState::MatchP,
                }
            },
            RealAudioState::MatchA => {
                i += 1;
                if byte == b'A' {
                    RealAudioState::MatchNul
                } else {
                    RealAudioState::MatchP
                }
            },
            RealAudioState::MatchNul => {
                i += 1;
                if byte == 0 {
                    RealAudioState::Version
                } else {
                    RealAudioState::MatchP
                }
            },
            RealAudioState::Version => {
                i += 1;
                RealAudioState::Layout
            },
            RealAudioState::Layout => {
                i += 1;
                RealAudioState::LayoutProbe
            },
            RealAudioState::LayoutProbe => {
                i += 1;
                if byte == 0x02 {
                    RealAudioState::Skip(6)
                } else {
                    RealAudioState::Skip(2)
                }
            },
            RealAudioState::Skip(n) => {
                i += 1;
                if n > 1 {
                    RealAudioState::Skip(n - 1)
                } else {
                    RealAudioState::Port
                }
            },
            RealAudioState::Port => {
                if i + 1 >= data.len() {
                    // The port straddles two segments. Give up on this header.
                    warn!("emulate(): realaudio port split across segments");
                    *state = RealAudioState::MatchP;
                    return data;
                }
                let port: u16 = u16::from_be_bytes([data[i], data[i + 1]]);
                *state = RealAudioState::MatchP;
                if let Some(host_port) = redirect(ctx, port, host) {
                    data[i..i + 2].copy_from_slice(&host_port.to_be_bytes());
                }
                return data;
            },
        };
    }
    data
}
