// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod handshake;

use crate::{
    inetstack::{
        protocols::tcp::{
            segment::{
                TcpFlags,
                TcpOption,
                TcpSegment,
            },
            socket::{
                Socket,
                SocketId,
            },
            SeqNumber,
            TcpState,
        },
        test_helpers::{
            self,
            TestPeer,
            GUEST_IPV4,
            GUEST_ISS,
        },
    },
    runtime::network::socket::HostFd,
};
use ::anyhow::Result;
use ::std::{
    net::SocketAddrV4,
    time::Instant,
};

//=============================================================================

/// Connection whose guest side is `guest_port`.
pub fn find_connection(peer: &TestPeer, guest_port: u16) -> Result<SocketId> {
    let guest: SocketAddrV4 = SocketAddrV4::new(GUEST_IPV4, guest_port);
    peer.get_connections()
        .iter()
        .copied()
        .find(|sid| {
            peer.get_socket(*sid)
                .is_some_and(|socket| !socket.is_listening() && socket.get_local() == guest)
        })
        .ok_or_else(|| ::anyhow::anyhow!("no connection for guest port {}", guest_port))
}

pub fn host_fd_of(peer: &TestPeer, sid: SocketId) -> Result<HostFd> {
    peer.get_socket(sid)
        .and_then(Socket::get_host_fd)
        .ok_or_else(|| ::anyhow::anyhow!("{} has no host socket", sid))
}

pub fn state_of(peer: &TestPeer, sid: SocketId) -> Result<TcpState> {
    peer.get_tcb(sid)
        .map(|tcb| tcb.get_state())
        .ok_or_else(|| ::anyhow::anyhow!("{} has no control block", sid))
}

/// Guest SYN carrying an MSS option.
pub fn guest_syn(guest_port: u16, remote: SocketAddrV4, mss: u16) -> TcpSegment {
    let mut syn: TcpSegment = test_helpers::guest_segment(guest_port, remote, GUEST_ISS, 0, TcpFlags::SYN, &[]);
    syn.tcp_hdr.push_option(TcpOption::MaximumSegmentSize(mss));
    syn
}

//=============================================================================

/// Opens a guest connection to `remote` whose host connect succeeds right away. Returns the connection and the next
/// sequence number the guest expects from us.
pub fn establish(peer: &mut TestPeer, guest_port: u16, remote: SocketAddrV4) -> Result<(SocketId, SeqNumber)> {
    test_helpers::send_to_peer(peer, &guest_syn(guest_port, remote, 1460))?;
    crate::ensure_eq!(peer.get_network().pending(), 0);

    let now: Instant = peer.now();
    peer.poll(now);
    let syn_ack: TcpSegment = test_helpers::next_to_guest(peer)?;
    crate::ensure_eq!(syn_ack.tcp_hdr.flags, TcpFlags::SYN | TcpFlags::ACK);
    crate::ensure_eq!(syn_ack.tcp_hdr.ack_num, SeqNumber::from(GUEST_ISS + 1));

    let snd_nxt: SeqNumber = syn_ack.tcp_hdr.seq_num + 1;
    let ack: TcpSegment = test_helpers::guest_segment(
        guest_port,
        remote,
        GUEST_ISS + 1,
        u32::from(snd_nxt),
        TcpFlags::ACK,
        &[],
    );
    test_helpers::send_to_peer(peer, &ack)?;

    let sid: SocketId = find_connection(peer, guest_port)?;
    crate::ensure_eq!(state_of(peer, sid)?, TcpState::Established);
    crate::ensure_eq!(peer.get_network().pending(), 0);

    Ok((sid, snd_nxt))
}
