// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use super::{
    establish,
    find_connection,
    guest_syn,
    host_fd_of,
    state_of,
};
use crate::{
    inetstack::{
        protocols::{
            ipv4::MAXTTL,
            tcp::{
                ctrlblk::ControlBlock,
                segment::{
                    TcpFlags,
                    TcpOption,
                    TcpSegment,
                },
                socket::{
                    SocketId,
                    SocketState,
                },
                SeqNumber,
                TcpState,
            },
        },
        test_helpers::{
            self,
            sockets::ConnectOutcome,
            TestPeer,
            ALIAS_IPV4,
            GUEST_IPV4,
            GUEST_ISS,
            REMOTE_IPV4,
        },
    },
    runtime::{
        fail::Fail,
        network::{
            config::TcpConfig,
            socket::HostFd,
        },
    },
};
use ::anyhow::Result;
use ::libc::{
    ECONNREFUSED,
    EINVAL,
    ETIMEDOUT,
};
use ::std::{
    net::{
        Ipv4Addr,
        SocketAddrV4,
    },
    time::{
        Duration,
        Instant,
    },
};

//=============================================================================

const REMOTE_HTTP: SocketAddrV4 = SocketAddrV4::new(REMOTE_IPV4, 80);

/// Host peer of forwarded connections.
const OUTSIDE: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 9), 5555);

//=============================================================================

#[test]
fn guest_syn_is_answered_once_the_host_connects() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    let sid: SocketId = find_connection(&peer, 5000)?;
    crate::ensure_eq!(peer.get_network().pending(), 0);
    crate::ensure_eq!(state_of(&peer, sid)?, TcpState::SynReceived);
    let fd: HostFd = host_fd_of(&peer, sid)?;
    crate::ensure_eq!(
        peer.get_host_sockets().get(fd).and_then(|socket| socket.remote),
        Some(REMOTE_HTTP)
    );

    // Segments arriving while the host connect is pending are ignored.
    let retransmitted: TcpSegment = guest_syn(5000, REMOTE_HTTP, 1460);
    test_helpers::send_to_peer(&mut peer, &retransmitted)?;
    crate::ensure_eq!(peer.get_network().pending(), 0);

    peer.poll(now);
    let syn_ack: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(syn_ack.tcp_hdr.flags, TcpFlags::SYN | TcpFlags::ACK);
    crate::ensure_eq!(syn_ack.ipv4_hdr.get_src_addr(), REMOTE_IPV4);
    crate::ensure_eq!(syn_ack.ipv4_hdr.get_dest_addr(), GUEST_IPV4);
    crate::ensure_eq!((syn_ack.tcp_hdr.src_port, syn_ack.tcp_hdr.dst_port), (80, 5000));
    crate::ensure_eq!(syn_ack.tcp_hdr.ack_num, SeqNumber::from(GUEST_ISS + 1));
    crate::ensure_eq!(syn_ack.tcp_hdr.get_mss(), Some(1460));
    crate::ensure_eq!(syn_ack.tcp_hdr.get_window_scale(), None);
    crate::ensure_eq!(syn_ack.data.len(), 0);

    let ack: TcpSegment = test_helpers::guest_segment(
        5000,
        REMOTE_HTTP,
        GUEST_ISS + 1,
        u32::from(syn_ack.tcp_hdr.seq_num + 1),
        TcpFlags::ACK,
        &[],
    );
    test_helpers::send_to_peer(&mut peer, &ack)?;
    crate::ensure_eq!(state_of(&peer, sid)?, TcpState::Established);
    crate::ensure_eq!(peer.get_network().pending(), 0);
    let connected: bool = peer
        .get_socket(sid)
        .is_some_and(|socket| socket.get_state().contains(SocketState::ISFCONNECTED));
    crate::ensure_eq!(connected, true);
    crate::ensure_eq!(peer.get_stats().accepts, 1);
    crate::ensure_eq!(peer.get_stats().connects, 1);

    Ok(())
}

#[test]
fn guest_mss_offer_caps_the_segment_size() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 536))?;
    peer.poll(now);
    let syn_ack: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(syn_ack.tcp_hdr.get_mss(), Some(536));

    let sid: SocketId = find_connection(&peer, 5000)?;
    crate::ensure_eq!(peer.get_tcb(sid).map(|tcb| tcb.get_mss()), Some(536));
    crate::ensure_eq!(peer.get_tcb(sid).map(|tcb| tcb.get_cwnd()), Some(536));
    // Buffers are rounded up to whole segments.
    crate::ensure_eq!(peer.get_socket(sid).map(|s| s.get_rcv().capacity()), Some(8576));

    Ok(())
}

#[test]
fn refused_host_connect_resets_the_guest() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    peer.get_host_sockets_mut().set_outcome(REMOTE_HTTP, ConnectOutcome::Refused);

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    let rst: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(rst.tcp_hdr.flags, TcpFlags::RST | TcpFlags::ACK);
    crate::ensure_eq!(rst.tcp_hdr.seq_num, SeqNumber::from(0));
    crate::ensure_eq!(rst.tcp_hdr.ack_num, SeqNumber::from(GUEST_ISS + 1));
    crate::ensure_eq!(rst.tcp_hdr.dst_port, 5000);
    crate::ensure_eq!(rst.ipv4_hdr.get_ttl(), MAXTTL);

    crate::ensure_eq!(peer.get_connections().len(), 0);
    crate::ensure_eq!(peer.get_host_sockets().is_closed(HostFd::from(0)), true);

    Ok(())
}

#[test]
fn failed_host_connect_resets_the_guest() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    peer.get_host_sockets_mut().set_outcome(REMOTE_HTTP, ConnectOutcome::FailLater);

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    let fd: HostFd = host_fd_of(&peer, find_connection(&peer, 5000)?)?;
    crate::ensure_eq!(peer.get_network().pending(), 0);

    peer.poll(now);
    let rst: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(rst.tcp_hdr.flags, TcpFlags::RST | TcpFlags::ACK);
    crate::ensure_eq!(rst.tcp_hdr.ack_num, SeqNumber::from(GUEST_ISS + 1));
    crate::ensure_eq!(peer.get_connections().len(), 0);
    crate::ensure_eq!(peer.get_host_sockets().is_closed(fd), true);

    Ok(())
}

#[test]
fn alias_destination_connects_to_loopback() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    peer.get_proxy_mut().enable();

    let gateway: SocketAddrV4 = SocketAddrV4::new(ALIAS_IPV4, 8080);
    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, gateway, 1460))?;

    let loopback: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080);
    crate::ensure_eq!(peer.get_host_sockets().find_connected_to(loopback).is_some(), true);
    // Alias destinations never go through the proxy.
    crate::ensure_eq!(peer.get_proxy_mut().get_requests().len(), 0);

    // The guest still talks to the gateway.
    peer.poll(now);
    let syn_ack: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(syn_ack.ipv4_hdr.get_src_addr(), ALIAS_IPV4);
    crate::ensure_eq!(syn_ack.tcp_hdr.src_port, 8080);

    Ok(())
}

#[test]
fn proxied_connect_resumes_the_handshake() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    peer.get_proxy_mut().enable();

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    let sid: SocketId = find_connection(&peer, 5000)?;
    crate::ensure_eq!(peer.get_proxy_mut().get_requests(), vec![REMOTE_HTTP]);
    crate::ensure_eq!(peer.get_socket(sid).map(|s| s.is_proxied()), Some(true));
    crate::ensure_eq!(peer.get_socket(sid).and_then(|s| s.get_host_fd()), None);
    crate::ensure_eq!(peer.pending_proxy_connects(), 1);

    // Nothing happens until the proxy reports back.
    peer.poll(now);
    crate::ensure_eq!(peer.get_network().pending(), 0);

    let fd: HostFd = peer.get_host_sockets_mut().connected_socket(REMOTE_HTTP);
    crate::ensure_eq!(peer.get_proxy_mut().complete(0, Ok(fd)), true);
    peer.poll(now);

    let syn_ack: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(syn_ack.tcp_hdr.flags, TcpFlags::SYN | TcpFlags::ACK);
    crate::ensure_eq!(peer.pending_proxy_connects(), 0);
    crate::ensure_eq!(peer.get_socket(sid).map(|s| s.is_proxied()), Some(false));
    crate::ensure_eq!(host_fd_of(&peer, sid)?, fd);

    Ok(())
}

#[test]
fn failed_proxied_connect_resets_the_guest() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    peer.get_proxy_mut().enable();

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    let refused: Fail = Fail::new(ECONNREFUSED, "proxy refused");
    crate::ensure_eq!(peer.get_proxy_mut().complete(0, Err(refused)), true);
    peer.poll(now);

    let rst: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(rst.tcp_hdr.flags, TcpFlags::RST | TcpFlags::ACK);
    crate::ensure_eq!(peer.get_connections().len(), 0);

    Ok(())
}

#[test]
fn closing_cancels_a_pending_proxied_connect() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    peer.get_proxy_mut().enable();

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    let sid: SocketId = find_connection(&peer, 5000)?;
    crate::ensure_eq!(peer.get_proxy_mut().is_cancelled(0), false);

    peer.close(sid).map_err(|e| ::anyhow::anyhow!("close failed: {:?}", e))?;
    crate::ensure_eq!(peer.pending_proxy_connects(), 0);
    crate::ensure_eq!(peer.get_proxy_mut().is_cancelled(0), true);
    crate::ensure_eq!(peer.get_proxy_mut().complete(0, Err(Fail::new(ECONNREFUSED, "late"))), false);

    Ok(())
}

#[test]
fn full_connection_table_rejects_new_syns() -> Result<()> {
    let now: Instant = Instant::now();
    let config: TcpConfig = TcpConfig::new(None, None, None, None, None, None, Some(1));
    let mut peer: TestPeer = test_helpers::new_peer_with(now, config);

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    crate::ensure_eq!(peer.get_connections().len(), 1);

    let result: Result<()> = test_helpers::send_to_peer(&mut peer, &guest_syn(5001, REMOTE_HTTP, 1460));
    crate::ensure_eq!(result.is_err(), true);
    let rst: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(rst.tcp_hdr.flags, TcpFlags::RST | TcpFlags::ACK);
    crate::ensure_eq!(rst.tcp_hdr.dst_port, 5001);
    crate::ensure_eq!(peer.get_connections().len(), 1);

    Ok(())
}

#[test]
fn stray_segments_are_reset() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);

    // An ACK is answered with a bare RST at the sequence number it acknowledged.
    let ack: TcpSegment = test_helpers::guest_segment(5000, REMOTE_HTTP, 4000, 777, TcpFlags::ACK, b"data");
    test_helpers::send_to_peer(&mut peer, &ack)?;
    let rst: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(rst.tcp_hdr.flags, TcpFlags::RST);
    crate::ensure_eq!(rst.tcp_hdr.seq_num, SeqNumber::from(777));
    crate::ensure_eq!(rst.tcp_hdr.window_size, 0);
    crate::ensure_eq!(rst.data.len(), 0);

    // Anything else gets RST+ACK covering its sequence space.
    let fin: TcpSegment = test_helpers::guest_segment(5000, REMOTE_HTTP, 4000, 0, TcpFlags::FIN, b"data");
    test_helpers::send_to_peer(&mut peer, &fin)?;
    let rst: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(rst.tcp_hdr.flags, TcpFlags::RST | TcpFlags::ACK);
    crate::ensure_eq!(rst.tcp_hdr.ack_num, SeqNumber::from(4004));

    // Resets are never answered.
    let reset: TcpSegment = test_helpers::guest_segment(5000, REMOTE_HTTP, 4000, 0, TcpFlags::RST, &[]);
    test_helpers::send_to_peer(&mut peer, &reset)?;
    crate::ensure_eq!(peer.get_network().pending(), 0);
    crate::ensure_eq!(peer.get_connections().len(), 0);

    Ok(())
}

#[test]
fn malformed_input_is_counted_and_dropped() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);

    let mut datagram: Vec<u8> = guest_syn(5000, REMOTE_HTTP, 1460).encode();
    crate::ensure_eq!(peer.tcp_input(Some(&datagram), 24, None).is_err(), true);
    crate::ensure_eq!(peer.get_stats().rcvbadoff, 1);

    let last: usize = datagram.len() - 1;
    datagram[last] ^= 0x01;
    crate::ensure_eq!(peer.tcp_input(Some(&datagram), 20, None).is_err(), true);
    crate::ensure_eq!(peer.get_stats().rcvbadsum, 1);

    match peer.tcp_input(None, 20, None) {
        Err(e) => crate::ensure_eq!(e.errno, EINVAL),
        Ok(()) => ::anyhow::bail!("resuming nothing should fail"),
    }

    crate::ensure_eq!(peer.get_stats().rcvtotal, 2);
    crate::ensure_eq!(peer.get_connections().len(), 0);
    crate::ensure_eq!(peer.get_network().pending(), 0);

    Ok(())
}

#[test]
fn unanswered_handshake_is_dropped_by_keepalive() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    peer.get_host_sockets_mut().set_outcome(REMOTE_HTTP, ConnectOutcome::Pending);

    test_helpers::send_to_peer(&mut peer, &guest_syn(5000, REMOTE_HTTP, 1460))?;
    let fd: HostFd = host_fd_of(&peer, find_connection(&peer, 5000)?)?;

    peer.poll(now + Duration::from_secs(74));
    crate::ensure_eq!(peer.get_connections().len(), 1);

    peer.poll(now + Duration::from_secs(75));
    crate::ensure_eq!(peer.get_stats().keepdrops, 1);
    crate::ensure_eq!(peer.get_connections().len(), 0);
    crate::ensure_eq!(peer.get_host_sockets().is_closed(fd), true);

    Ok(())
}

#[test]
fn forwarded_connection_opens_towards_the_guest() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    let guest: SocketAddrV4 = SocketAddrV4::new(GUEST_IPV4, 22);

    let listener: SocketId = peer
        .listen(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 2222), guest, false)
        .map_err(|e| ::anyhow::anyhow!("listen failed: {:?}", e))?;
    crate::ensure_eq!(
        peer.get_socket(listener).map(|s| s.get_foreign()),
        Some(SocketAddrV4::new(ALIAS_IPV4, 2222))
    );
    let listen_fd: HostFd = host_fd_of(&peer, listener)?;
    peer.get_host_sockets_mut().queue_connection(listen_fd, OUTSIDE);

    peer.poll(now);
    let syn: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(syn.tcp_hdr.flags, TcpFlags::SYN);
    crate::ensure_eq!(syn.ipv4_hdr.get_src_addr(), *OUTSIDE.ip());
    crate::ensure_eq!((syn.tcp_hdr.src_port, syn.tcp_hdr.dst_port), (5555, 22));
    crate::ensure_eq!(syn.tcp_hdr.get_mss(), Some(1460));
    crate::ensure_eq!(peer.get_connections().len(), 2);
    crate::ensure_eq!(peer.get_socket(listener).map(|s| s.is_listening()), Some(true));

    let sid: SocketId = find_connection(&peer, 22)?;
    crate::ensure_eq!(state_of(&peer, sid)?, TcpState::SynSent);
    crate::ensure_eq!(peer.get_stats().connattempt, 1);

    // The guest answers 300ms later.
    let later: Instant = now + Duration::from_millis(300);
    peer.poll(later);
    let mut syn_ack: TcpSegment = test_helpers::guest_segment(
        22,
        OUTSIDE,
        7000,
        u32::from(syn.tcp_hdr.seq_num + 1),
        TcpFlags::SYN | TcpFlags::ACK,
        &[],
    );
    syn_ack.tcp_hdr.push_option(TcpOption::MaximumSegmentSize(1200));
    test_helpers::send_to_peer(&mut peer, &syn_ack)?;

    crate::ensure_eq!(state_of(&peer, sid)?, TcpState::Established);
    crate::ensure_eq!(peer.get_tcb(sid).map(|tcb| tcb.get_mss()), Some(1200));
    crate::ensure_eq!(
        peer.get_tcb(sid).map(|tcb| tcb.get_rto().srtt()),
        Some(Duration::from_millis(300))
    );
    crate::ensure_eq!(peer.get_stats().connects, 1);

    let ack: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(ack.tcp_hdr.flags, TcpFlags::ACK);
    crate::ensure_eq!(ack.tcp_hdr.seq_num, syn.tcp_hdr.seq_num + 1);
    crate::ensure_eq!(ack.tcp_hdr.ack_num, SeqNumber::from(7001));

    Ok(())
}

#[test]
fn accept_once_listener_becomes_its_connection() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    let guest: SocketAddrV4 = SocketAddrV4::new(GUEST_IPV4, 20);

    let sid: SocketId = peer
        .listen(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0), guest, true)
        .map_err(|e| ::anyhow::anyhow!("listen failed: {:?}", e))?;
    let listen_fd: HostFd = host_fd_of(&peer, sid)?;
    let accepted: Option<HostFd> = peer.get_host_sockets_mut().queue_connection(listen_fd, OUTSIDE);

    peer.poll(now);
    let syn: TcpSegment = test_helpers::next_to_guest(&mut peer)?;
    crate::ensure_eq!(syn.tcp_hdr.flags, TcpFlags::SYN);
    crate::ensure_eq!(peer.get_connections(), &[sid][..]);
    crate::ensure_eq!(peer.get_socket(sid).map(|s| s.is_listening()), Some(false));
    crate::ensure_eq!(peer.get_socket(sid).and_then(|s| s.get_host_fd()), accepted);
    crate::ensure_eq!(peer.get_host_sockets().is_closed(listen_fd), true);
    crate::ensure_eq!(state_of(&peer, sid)?, TcpState::SynSent);

    Ok(())
}

#[test]
fn dropping_before_the_guest_syn_sends_no_reset() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);
    let guest: SocketAddrV4 = SocketAddrV4::new(GUEST_IPV4, 22);

    let listener: SocketId = peer
        .listen(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 2222), guest, false)
        .map_err(|e| ::anyhow::anyhow!("listen failed: {:?}", e))?;
    let listen_fd: HostFd = host_fd_of(&peer, listener)?;
    peer.get_host_sockets_mut().queue_connection(listen_fd, OUTSIDE);
    peer.poll(now);
    test_helpers::next_to_guest(&mut peer)?;

    let sid: SocketId = find_connection(&peer, 22)?;
    let fd: HostFd = host_fd_of(&peer, sid)?;
    peer.drop_connection(sid, Fail::new(ETIMEDOUT, "gave up"))
        .map_err(|e| ::anyhow::anyhow!("drop failed: {:?}", e))?;

    crate::ensure_eq!(peer.get_network().pending(), 0);
    crate::ensure_eq!(peer.get_stats().conndrops, 1);
    crate::ensure_eq!(peer.get_stats().drops, 0);
    crate::ensure_eq!(peer.get_connections(), &[listener][..]);
    crate::ensure_eq!(peer.get_host_sockets().is_closed(fd), true);

    Ok(())
}

#[test]
fn handshake_keeps_send_sequence_ordered() -> Result<()> {
    let now: Instant = Instant::now();
    let mut peer: TestPeer = test_helpers::new_peer(now);

    let (sid, snd_nxt): (SocketId, SeqNumber) = establish(&mut peer, 5000, REMOTE_HTTP)?;
    let tcb: &ControlBlock = peer.get_tcb(sid).ok_or_else(|| ::anyhow::anyhow!("no control block"))?;
    crate::ensure_eq!(tcb.get_snd_una(), snd_nxt);
    crate::ensure_eq!(tcb.get_snd_nxt(), snd_nxt);
    crate::ensure_eq!(tcb.get_snd_max(), snd_nxt);
    crate::ensure_eq!(tcb.get_iss() + 1, snd_nxt);
    crate::ensure_eq!(tcb.get_rcv_nxt(), SeqNumber::from(GUEST_ISS + 1));

    Ok(())
}
