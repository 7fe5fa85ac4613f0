// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! IRC `DCC CHAT`, `DCC SEND` and `DCC MOVE` offers.

use super::{
    scan::{
        find,
        Scanner,
    },
    EmuHost,
};
use ::std::net::{
    Ipv4Addr,
    SocketAddrV4,
};

/// Longest argument accepted before the address.
const MAX_ARG_LEN: usize = 256;

/// CTCP delimiter.
const CTCP_DELIM: char = '\x01';

#[derive(Clone, Copy)]
enum DccOffer<'a> {
    Chat,
    Send(&'a [u8], u32),
    Move(&'a [u8], u32),
}

fn parse(line: &[u8]) -> Option<(DccOffer, SocketAddrV4)> {
    let mut scanner: Scanner = Scanner::new(line);
    if !scanner.literal("DCC ") {
        return None;
    }
    let kind: &[u8] = scanner.word(MAX_ARG_LEN)?;
    let arg: &[u8] = scanner.word(MAX_ARG_LEN)?;
    let addr: Ipv4Addr = Ipv4Addr::from(scanner.unsigned()?);
    let port: u16 = u16::try_from(scanner.unsigned()?).ok()?;
    let offer: DccOffer = match kind {
        b"CHAT" => DccOffer::Chat,
        b"SEND" => DccOffer::Send(arg, scanner.unsigned()?),
        b"MOVE" => DccOffer::Move(arg, scanner.unsigned()?),
        _ => return None,
    };
    Some((offer, SocketAddrV4::new(addr, port)))
}

pub fn emulate<H: EmuHost + ?Sized>(data: Vec<u8>, host: &mut H) -> Vec<u8> {
    let Some(start) = find(&data, b"DCC") else {
        return data;
    };
    let Some((offer, target)) = parse(&data[start..]) else {
        return data;
    };
    let Some(listener) = host.listen_once(target) else {
        warn!("emulate(): cannot open dcc listener for {:?}", target);
        return data;
    };
    debug!("emulate(): dcc connection {:?} redirected through {:?}", target, listener);

    let ip: u32 = u32::from(*listener.ip());
    let port: u16 = listener.port();
    let mut out: Vec<u8> = data[..start].to_vec();
    match offer {
        DccOffer::Chat => {
            out.extend_from_slice(format!("DCC CHAT chat {} {}{}\n", ip, port, CTCP_DELIM).as_bytes());
        },
        DccOffer::Send(file, size) | DccOffer::Move(file, size) => {
            let verb: &str = if matches!(offer, DccOffer::Send(..)) {
                "SEND"
            } else {
                "MOVE"
            };
            out.extend_from_slice(format!("DCC {} ", verb).as_bytes());
            out.extend_from_slice(file);
            out.extend_from_slice(format!(" {} {} {}{}\n", ip, port, size, CTCP_DELIM).as_bytes());
        },
    }
    out
}
