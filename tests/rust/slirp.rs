// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::slirpnet::{
    inetstack::protocols::{
        ip::IpProtocol,
        ipv4::Ipv4Header,
        tcp::{
            segment::{
                TcpFlags,
                TcpHeader,
                TcpSegment,
            },
            SeqNumber,
        },
    },
    runtime::logging,
    Config,
    Fail,
    NetworkRuntime,
    NoProxy,
    OsSockets,
    SocketId,
    TcpPeer,
    TcpState,
};
use ::std::{
    collections::VecDeque,
    io::{
        Read,
        Write,
    },
    net::{
        Ipv4Addr,
        SocketAddrV4,
        TcpListener,
        TcpStream,
    },
    thread,
    time::{
        Duration,
        Instant,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

const GUEST: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(10, 0, 2, 15), 5000);
const ALIAS_IPV4: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);
const GUEST_ISS: u32 = 4242;
const DEADLINE: Duration = Duration::from_secs(5);

const CONFIG: &str = "
slirp:
  loopback_addr: 127.0.0.1
tcp:
  max_connections: 4
emulation:
  - \"6000:irc\"
";

//======================================================================================================================
// Structures
//======================================================================================================================

/// Collects the datagrams sent to the guest.
#[derive(Default)]
struct Capture {
    datagrams: VecDeque<Vec<u8>>,
}

impl NetworkRuntime for Capture {
    fn ip_output(&mut self, _socket: Option<SocketId>, datagram: Vec<u8>) {
        self.datagrams.push_back(datagram);
    }

    fn udp_listen(&mut self, _host_port: u16, _guest: SocketAddrV4) -> Result<(), Fail> {
        Ok(())
    }
}

type Peer = TcpPeer<Capture, OsSockets, NoProxy>;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn guest_segment(remote: SocketAddrV4, seq: u32, ack: SeqNumber, flags: TcpFlags, data: &[u8]) -> Vec<u8> {
    let mut tcp_hdr: TcpHeader = TcpHeader::new(GUEST.port(), remote.port());
    tcp_hdr.seq_num = SeqNumber::from(seq);
    tcp_hdr.ack_num = ack;
    tcp_hdr.flags = flags;
    tcp_hdr.window_size = 16384;
    TcpSegment {
        ipv4_hdr: Ipv4Header::new(*GUEST.ip(), *remote.ip(), IpProtocol::TCP),
        tcp_hdr,
        data: data.to_vec(),
    }
    .encode()
}

/// Polls the peer until it sends the guest a segment that `wanted` accepts. Other segments are skipped.
fn wait_for<F: Fn(&TcpSegment) -> bool>(peer: &mut Peer, wanted: F) -> Result<TcpSegment> {
    let start: Instant = Instant::now();
    while start.elapsed() < DEADLINE {
        peer.poll(Instant::now());
        while let Some(datagram) = peer.get_network_mut().datagrams.pop_front() {
            let segment: TcpSegment = TcpSegment::decode(&datagram, 20)?;
            if wanted(&segment) {
                return Ok(segment);
            }
        }
        thread::sleep(Duration::from_millis(5));
    }
    ::anyhow::bail!("the peer never sent the expected segment")
}

fn connection_state(peer: &Peer) -> Option<TcpState> {
    peer.get_connections()
        .first()
        .and_then(|sid| peer.get_tcb(*sid))
        .map(|tcb| tcb.get_state())
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// A guest connection to the alias host reaches a listener on the loopback interface, carries data both ways and is
/// closed by the host.
#[test]
fn guest_reaches_a_loopback_server() -> Result<()> {
    logging::initialize();
    let listener: TcpListener = TcpListener::bind("127.0.0.1:0")?;
    let port: u16 = listener.local_addr()?.port();
    let remote: SocketAddrV4 = SocketAddrV4::new(ALIAS_IPV4, port);

    let config: Config = CONFIG.parse()?;
    let mut peer: Peer = config.new_peer(Capture::default(), OsSockets::default(), NoProxy, [3; 32], Instant::now())?;

    // Handshake.
    peer.tcp_input(Some(&guest_segment(remote, GUEST_ISS, SeqNumber::from(0), TcpFlags::SYN, &[])), 20, None)?;
    let syn_ack: TcpSegment = wait_for(&mut peer, |s| s.tcp_hdr.flags.contains(TcpFlags::SYN))?;
    slirpnet::ensure_eq!(syn_ack.tcp_hdr.flags, TcpFlags::SYN | TcpFlags::ACK);
    slirpnet::ensure_eq!(syn_ack.tcp_hdr.ack_num, SeqNumber::from(GUEST_ISS + 1));
    slirpnet::ensure_eq!(syn_ack.ipv4_hdr.get_src_addr(), ALIAS_IPV4);
    let mut snd_nxt: SeqNumber = syn_ack.tcp_hdr.seq_num + 1;

    let (mut server, _): (TcpStream, _) = listener.accept()?;
    server.set_read_timeout(Some(DEADLINE))?;
    peer.tcp_input(Some(&guest_segment(remote, GUEST_ISS + 1, snd_nxt, TcpFlags::ACK, &[])), 20, None)?;
    slirpnet::ensure_eq!(connection_state(&peer), Some(TcpState::Established));

    // Guest to host.
    let ping: Vec<u8> = guest_segment(remote, GUEST_ISS + 1, snd_nxt, TcpFlags::ACK | TcpFlags::PSH, b"ping");
    peer.tcp_input(Some(&ping), 20, None)?;
    let mut buf: [u8; 4] = [0; 4];
    server.read_exact(&mut buf)?;
    slirpnet::ensure_eq!(&buf, b"ping");

    // Host to guest.
    server.write_all(b"pong")?;
    let pong: TcpSegment = wait_for(&mut peer, |s| !s.data.is_empty())?;
    slirpnet::ensure_eq!(pong.data, b"pong".to_vec());
    slirpnet::ensure_eq!(pong.tcp_hdr.seq_num, snd_nxt);
    slirpnet::ensure_eq!(pong.tcp_hdr.ack_num, SeqNumber::from(GUEST_ISS + 5));
    snd_nxt = snd_nxt + 4;
    peer.tcp_input(Some(&guest_segment(remote, GUEST_ISS + 5, snd_nxt, TcpFlags::ACK, &[])), 20, None)?;

    // The host hangs up.
    drop(server);
    let fin: TcpSegment = wait_for(&mut peer, |s| s.tcp_hdr.flags.contains(TcpFlags::FIN))?;
    slirpnet::ensure_eq!(fin.tcp_hdr.seq_num, snd_nxt);
    slirpnet::ensure_eq!(connection_state(&peer), Some(TcpState::FinWait1));

    Ok(())
}

/// Malformed input never reaches a connection.
#[test]
fn truncated_datagram_is_rejected() -> Result<()> {
    let config: Config = "".parse()?;
    let mut peer: Peer = config.new_peer(Capture::default(), OsSockets::default(), NoProxy, [3; 32], Instant::now())?;

    let mut datagram: Vec<u8> = guest_segment(
        SocketAddrV4::new(ALIAS_IPV4, 9),
        GUEST_ISS,
        SeqNumber::from(0),
        TcpFlags::SYN,
        &[],
    );
    datagram.truncate(30);
    slirpnet::ensure_eq!(peer.tcp_input(Some(&datagram), 20, None).is_err(), true);
    slirpnet::ensure_eq!(peer.get_connections().len(), 0);
    slirpnet::ensure_eq!(peer.get_network().datagrams.len(), 0);

    Ok(())
}
