// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! kshell, rsh and rlogin open with the port of a secondary channel (stderr and signals) as a NUL-terminated decimal
//! string.

use super::{
    EmuContext,
    EmuHost,
};
use ::std::net::SocketAddrV4;

/// Returns the rewritten payload, or `None` if it is not a port announcement or no listener could be opened.
pub fn emulate<H: EmuHost + ?Sized>(ctx: &EmuContext, data: &[u8], host: &mut H) -> Option<Vec<u8>> {
    let (&last, digits) = data.split_last()?;
    if last != 0 || digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let port: u16 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    if port == 0 {
        return None;
    }

    let guest: SocketAddrV4 = SocketAddrV4::new(*ctx.guest.ip(), port);
    let listener: SocketAddrV4 = host.listen_once(guest)?;
    debug!("emulate(): secondary channel {:?} redirected through {:?}", guest, listener);

    let mut out: Vec<u8> = listener.port().to_string().into_bytes();
    out.push(0);
    Some(out)
}
