// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::protocols::{
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
};
use ::std::net::SocketAddrV4;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Cached headers of the segments a connection sends to the guest. Segments travel from the remote side of the
/// connection to the guest, so the source is the foreign address and the destination the guest address.
#[derive(Debug, Clone)]
pub struct HeaderTemplate {
    ipv4_hdr: Ipv4Header,
    src_port: u16,
    dst_port: u16,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl HeaderTemplate {
    pub fn new(faddr: SocketAddrV4, laddr: SocketAddrV4, tos: u8) -> Self {
        let mut ipv4_hdr: Ipv4Header = Ipv4Header::new(*faddr.ip(), *laddr.ip(), IpProtocol::TCP);
        ipv4_hdr.set_tos(tos);
        Self {
            ipv4_hdr,
            src_port: faddr.port(),
            dst_port: laddr.port(),
        }
    }

    /// Stamps a segment out of the template.
    pub fn segment(
        &self,
        seq_num: SeqNumber,
        ack_num: SeqNumber,
        flags: TcpFlags,
        window_size: u16,
        data: Vec<u8>,
    ) -> TcpSegment {
        let mut tcp_hdr: TcpHeader = TcpHeader::new(self.src_port, self.dst_port);
        tcp_hdr.seq_num = seq_num;
        tcp_hdr.ack_num = ack_num;
        tcp_hdr.flags = flags;
        tcp_hdr.window_size = window_size;
        TcpSegment {
            ipv4_hdr: self.ipv4_hdr,
            tcp_hdr,
            data,
        }
    }

    pub fn get_tos(&self) -> u8 {
        self.ipv4_hdr.get_tos()
    }

    pub fn get_src(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ipv4_hdr.get_src_addr(), self.src_port)
    }

    pub fn get_dst(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ipv4_hdr.get_dest_addr(), self.dst_port)
    }
}
