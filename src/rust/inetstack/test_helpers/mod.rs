// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod proxy;
pub mod runtime;
pub mod sockets;

pub use self::{
    proxy::FakeProxy,
    runtime::TestNetwork,
    sockets::FakeSockets,
};

use crate::{
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
            TcpPeer,
        },
    },
    runtime::{
        logging,
        network::config::{
            AliasConfig,
            TcpConfig,
        },
    },
};
use ::std::{
    net::{
        Ipv4Addr,
        SocketAddrV4,
    },
    time::Instant,
};

//==============================================================================
// Constants
//==============================================================================

pub const GUEST_IPV4: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 15);
pub const ALIAS_IPV4: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);
pub const REMOTE_IPV4: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 7);
pub const HOST_IPV4: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);
pub const GUEST_ISS: u32 = 1000;
pub const RNG_SEED: [u8; 32] = [7; 32];

//==============================================================================
// Types
//==============================================================================

pub type TestPeer = TcpPeer<TestNetwork, FakeSockets, FakeProxy>;

//==============================================================================
// Standalone Functions
//==============================================================================

/// Creates a peer with the default configuration.
pub fn new_peer(now: Instant) -> TestPeer {
    new_peer_with(now, TcpConfig::default())
}

pub fn new_peer_with(now: Instant, tcp_config: TcpConfig) -> TestPeer {
    logging::initialize();
    TcpPeer::new(
        TestNetwork::default(),
        FakeSockets::default(),
        FakeProxy::default(),
        AliasConfig::default(),
        tcp_config,
        RNG_SEED,
        now,
    )
}

/// Builds a segment sent by the guest from `guest_port` to `remote`.
pub fn guest_segment(
    guest_port: u16,
    remote: SocketAddrV4,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    data: &[u8],
) -> TcpSegment {
    let mut tcp_hdr: TcpHeader = TcpHeader::new(guest_port, remote.port());
    tcp_hdr.seq_num = SeqNumber::from(seq);
    tcp_hdr.ack_num = SeqNumber::from(ack);
    tcp_hdr.flags = flags;
    tcp_hdr.window_size = 8192;
    TcpSegment {
        ipv4_hdr: Ipv4Header::new(GUEST_IPV4, *remote.ip(), IpProtocol::TCP),
        tcp_hdr,
        data: data.to_vec(),
    }
}

/// Feeds a guest segment to the peer through the regular input path.
pub fn send_to_peer(peer: &mut TestPeer, segment: &TcpSegment) -> ::anyhow::Result<()> {
    peer.tcp_input(Some(&segment.encode()), 20, None)
        .map_err(|e| ::anyhow::anyhow!("tcp_input failed: {:?}", e))
}

/// Pops and decodes the next segment the peer sent to the guest.
pub fn next_to_guest(peer: &mut TestPeer) -> ::anyhow::Result<TcpSegment> {
    let Some((_, datagram)) = peer.get_network_mut().pop_datagram() else {
        ::anyhow::bail!("no datagram was sent to the guest");
    };
    TcpSegment::decode(&datagram, 20).map_err(|e| ::anyhow::anyhow!("bad datagram: {:?}", e))
}
