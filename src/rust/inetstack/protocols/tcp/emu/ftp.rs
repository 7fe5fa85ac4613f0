// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! FTP `PORT` commands and `227` passive-mode replies.

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

/// Command prefix and the literal text before the first address field.
const PORT_COMMAND: (&str, &str) = ("ORT", "ORT ");
const PASV_REPLY: (&str, &str) = ("27 Entering", "27 Entering Passive Mode (");

/// Reads `a,b,c,d,e,f` as an address and port.
fn parse_fields(scanner: &mut Scanner) -> Option<SocketAddrV4> {
    let mut fields: [u8; 6] = [0; 6];
    for (i, field) in fields.iter_mut().enumerate() {
        if i > 0 && !scanner.literal(",") {
            return None;
        }
        *field = u8::try_from(scanner.unsigned()?).ok()?;
    }
    let addr: Ipv4Addr = Ipv4Addr::new(fields[0], fields[1], fields[2], fields[3]);
    let port: u16 = u16::from_be_bytes([fields[4], fields[5]]);
    Some(SocketAddrV4::new(addr, port))
}

fn format_fields(addr: SocketAddrV4) -> String {
    let [a, b, c, d] = addr.ip().octets();
    let [e, f] = addr.port().to_be_bytes();
    format!("{},{},{},{},{},{}", a, b, c, d, e, f)
}

pub fn emulate<H: EmuHost + ?Sized>(data: Vec<u8>, host: &mut H) -> Vec<u8> {
    let (start, (marker, prefix)) = match find(&data, PORT_COMMAND.0.as_bytes()) {
        Some(start) => (start, PORT_COMMAND),
        None => match find(&data, PASV_REPLY.0.as_bytes()) {
            Some(start) => (start, PASV_REPLY),
            None => return data,
        },
    };

    let mut scanner: Scanner = Scanner::new(&data[start..]);
    if !scanner.literal(prefix) {
        return data;
    }
    let Some(target) = parse_fields(&mut scanner) else {
        trace!("emulate(): incomplete {:?} line left as is", marker);
        return data;
    };
    let is_pasv: bool = marker == PASV_REPLY.0;
    if is_pasv && !scanner.literal(")") {
        return data;
    }
    scanner.literal("\r\n");
    let rest: &[u8] = scanner.rest();

    let Some(listener) = host.listen_once(target) else {
        warn!("emulate(): cannot open ftp data listener for {:?}", target);
        return data;
    };
    debug!("emulate(): ftp data connection {:?} redirected through {:?}", target, listener);

    let close: &str = if is_pasv { ")" } else { "" };
    let mut out: Vec<u8> = Vec::with_capacity(data.len() + 16);
    out.extend_from_slice(&data[..start]);
    out.extend_from_slice(format!("{}{}{}\r\n", prefix, format_fields(listener), close).as_bytes());
    out.extend_from_slice(rest);
    out
}
