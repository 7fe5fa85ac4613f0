// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Identification protocol (RFC 1413) queries. A remote server asks about one of its connections from the guest by
//! port pair; the guest port in the query is replaced by the host port that connection really uses.

use super::{
    scan::Scanner,
    EmuContext,
    EmuHost,
};
use ::std::net::SocketAddrV4;

/// Longest query buffered while waiting for the end of the line.
const MAX_QUERY_LEN: usize = 512;

fn parse(line: &[u8]) -> Option<(u16, u16)> {
    let mut scanner: Scanner = Scanner::new(line);
    let remote_port: u32 = scanner.unsigned()?;
    if !scanner.one_or_more_of(b" ,") {
        return None;
    }
    let guest_port: u32 = scanner.unsigned()?;
    Some((remote_port as u16, guest_port as u16))
}

pub fn emulate<H: EmuHost + ?Sized>(line: &mut Vec<u8>, ctx: &EmuContext, data: Vec<u8>, host: &H) -> Vec<u8> {
    line.extend_from_slice(&data);
    let complete: bool = line.iter().any(|&b| b == b'\r' || b == b'\n');
    if !complete && line.len() < MAX_QUERY_LEN {
        return Vec::new();
    }
    let query: Vec<u8> = ::std::mem::take(line);

    let Some((remote_port, guest_port)) = parse(&query) else {
        trace!("emulate(): unparseable ident query passed through");
        return query;
    };
    let guest: SocketAddrV4 = SocketAddrV4::new(*ctx.guest.ip(), guest_port);
    let remote: SocketAddrV4 = SocketAddrV4::new(*ctx.remote.ip(), remote_port);
    let host_port: u16 = host.host_port_of(guest, remote).unwrap_or(guest_port);
    format!("{},{}\r\n", remote_port, host_port).into_bytes()
}
