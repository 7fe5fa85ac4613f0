// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::{
    inetstack::protocols::ip::IpProtocol,
    runtime::fail::Fail,
};
use ::libc::{
    EBADMSG,
    ENOTSUP,
};
use ::std::{
    convert::TryFrom,
    net::Ipv4Addr,
};

//==============================================================================
// Constants
//==============================================================================

/// Minimum size of IPv4 header (in bytes).
pub const IPV4_HEADER_MIN_SIZE: usize = 20;

/// Maximum size of IPv4 header (in bytes).
pub const IPV4_HEADER_MAX_SIZE: usize = 60;

/// IPv4 header length when no options are present (in 32-bit words).
const IPV4_IHL_NO_OPTIONS: u8 = (IPV4_HEADER_MIN_SIZE as u8) / 4;

/// Maximum time to live value.
pub const MAXTTL: u8 = 255;

/// Default time to live value.
pub const IPDEFTTL: u8 = 64;

/// Version number for IPv4.
const IPV4_VERSION: u8 = 4;

/// IPv4 Control Flag: Datagram has evil intent (see RFC 3514).
const IPV4_CTRL_FLAG_EVIL: u8 = 0x4;

/// IPv4 Control Flag: More Fragments.
const IPV4_CTRL_FLAG_MF: u8 = 0x1;

//==============================================================================
// Structures
//==============================================================================

/// IPv4 Datagram Header
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Internet Header Length. (4 bits).
    ihl: u8,
    /// Type of service (8 bits).
    tos: u8,
    /// Used to identify the datagram to which a fragment belongs (16 bits).
    identification: u16,
    /// Control flags (3 bits).
    flags: u8,
    /// Time to Live (8 bits).
    ttl: u8,
    /// Protocol used in the data portion of the datagram (8 bits).
    protocol: IpProtocol,
    /// Source IP address (32 bits).
    src_addr: Ipv4Addr,
    /// Destination IP address (32 bits).
    dst_addr: Ipv4Addr,
}

//==============================================================================
// Associated Functions
//==============================================================================

/// Associated Functions for IPv4 Headers
impl Ipv4Header {
    /// Instantiates an IPv4 header without options.
    pub fn new(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, protocol: IpProtocol) -> Self {
        Self {
            ihl: IPV4_IHL_NO_OPTIONS,
            tos: 0,
            identification: 0,
            flags: 0,
            ttl: IPDEFTTL,
            protocol,
            src_addr,
            dst_addr,
        }
    }

    /// Computes the size of the target IPv4 header.
    pub fn compute_size(&self) -> usize {
        (self.ihl as usize) << 2
    }

    /// Parses a buffer into an IPv4 header and payload. Link-layer padding past the total length is dropped.
    pub fn parse(buf: &[u8]) -> Result<(Self, &[u8]), Fail> {
        // The datagram should be as big as the header.
        if buf.len() < IPV4_HEADER_MIN_SIZE {
            return Err(Fail::new(EBADMSG, "ipv4 datagram too small"));
        }

        // IP version number.
        let version: u8 = buf[0] >> 4;
        if version != IPV4_VERSION {
            return Err(Fail::new(ENOTSUP, "unsupported IP version"));
        }

        // Internet header length.
        let ihl: u8 = buf[0] & 0xF;
        let hdr_size: usize = (ihl as usize) << 2;
        if hdr_size < IPV4_HEADER_MIN_SIZE {
            return Err(Fail::new(EBADMSG, "ipv4 IHL is too small"));
        }
        if buf.len() < hdr_size {
            return Err(Fail::new(EBADMSG, "ipv4 datagram too small to fit in header"));
        }
        let hdr_buf: &[u8] = &buf[..hdr_size];

        // Type of service.
        let tos: u8 = hdr_buf[1];

        // Total length.
        let total_length: usize = u16::from_be_bytes([hdr_buf[2], hdr_buf[3]]) as usize;
        if total_length < hdr_size {
            return Err(Fail::new(EBADMSG, "ipv4 datagram smaller than header"));
        }
        // NOTE: there may be padding bytes in the buffer.
        if total_length > buf.len() {
            return Err(Fail::new(EBADMSG, "ipv4 datagram size mismatch"));
        }

        // Identification (Id).
        let identification: u16 = u16::from_be_bytes([hdr_buf[4], hdr_buf[5]]);

        // Control flags.
        let flags: u8 = hdr_buf[6] >> 5;
        // Don't accept evil datagrams (see RFC 3514).
        if flags & IPV4_CTRL_FLAG_EVIL != 0 {
            return Err(Fail::new(EBADMSG, "ipv4 datagram is marked as evil"));
        }

        // Reassembly happens below us, so fragments never reach this layer.
        if flags & IPV4_CTRL_FLAG_MF != 0 {
            warn!("fragmentation is not supported flags={:?}", flags);
            return Err(Fail::new(ENOTSUP, "ipv4 fragmentation is not supported"));
        }
        let fragment_offset: u16 = u16::from_be_bytes([hdr_buf[6], hdr_buf[7]]) & 0x1fff;
        if fragment_offset != 0 {
            warn!("fragmentation is not supported offset={:?}", fragment_offset);
            return Err(Fail::new(ENOTSUP, "ipv4 fragmentation is not supported"));
        }

        // Time to live.
        let ttl: u8 = hdr_buf[8];
        if ttl == 0 {
            return Err(Fail::new(EBADMSG, "ipv4 datagram too old"));
        }

        // Protocol.
        let protocol: IpProtocol = IpProtocol::try_from(hdr_buf[9])?;

        // Header checksum.
        let header_checksum: u16 = u16::from_be_bytes([hdr_buf[10], hdr_buf[11]]);
        if header_checksum != Self::compute_checksum(hdr_buf) {
            return Err(Fail::new(EBADMSG, "ipv4 checksum mismatch"));
        }

        let src_addr: Ipv4Addr = Ipv4Addr::new(hdr_buf[12], hdr_buf[13], hdr_buf[14], hdr_buf[15]);
        let dst_addr: Ipv4Addr = Ipv4Addr::new(hdr_buf[16], hdr_buf[17], hdr_buf[18], hdr_buf[19]);

        let header: Ipv4Header = Self {
            ihl,
            tos,
            identification,
            flags,
            ttl,
            protocol,
            src_addr,
            dst_addr,
        };

        Ok((header, &buf[hdr_size..total_length]))
    }

    /// Serializes the target IPv4 header. Options are never emitted.
    pub fn serialize(&self, buf: &mut [u8], payload_len: usize) {
        assert!(buf.len() >= IPV4_HEADER_MIN_SIZE);
        let buf: &mut [u8] = &mut buf[..IPV4_HEADER_MIN_SIZE];

        // Version + IHL.
        buf[0] = (IPV4_VERSION << 4) | IPV4_IHL_NO_OPTIONS;

        // Type of Service.
        buf[1] = self.tos;

        // Total Length.
        buf[2..4].copy_from_slice(&((IPV4_HEADER_MIN_SIZE + payload_len) as u16).to_be_bytes());

        // Identification.
        buf[4..6].copy_from_slice(&self.identification.to_be_bytes());

        // Flags and Fragment Offset.
        buf[6..8].copy_from_slice(&((self.flags as u16) << 13).to_be_bytes());

        // Time to Live.
        buf[8] = self.ttl;

        // Protocol.
        buf[9] = self.protocol as u8;

        // Source Address.
        buf[12..16].copy_from_slice(&self.src_addr.octets());

        // Destination Address.
        buf[16..20].copy_from_slice(&self.dst_addr.octets());

        // Header Checksum.
        let checksum: u16 = Self::compute_checksum(buf);
        buf[10..12].copy_from_slice(&checksum.to_be_bytes());
    }

    /// Returns the source address field stored in the target IPv4 header.
    pub fn get_src_addr(&self) -> Ipv4Addr {
        self.src_addr
    }

    /// Returns the destination address field stored in the target IPv4 header.
    pub fn get_dest_addr(&self) -> Ipv4Addr {
        self.dst_addr
    }

    /// Returns the protocol field stored in the target IPv4 header.
    pub fn get_protocol(&self) -> IpProtocol {
        self.protocol
    }

    pub fn get_tos(&self) -> u8 {
        self.tos
    }

    pub fn get_ttl(&self) -> u8 {
        self.ttl
    }

    pub fn get_identification(&self) -> u16 {
        self.identification
    }

    pub fn set_tos(&mut self, tos: u8) {
        self.tos = tos;
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.ttl = ttl;
    }

    pub fn set_identification(&mut self, identification: u16) {
        self.identification = identification;
    }

    /// Swaps source and destination addresses.
    pub fn swap_addrs(&mut self) {
        ::std::mem::swap(&mut self.src_addr, &mut self.dst_addr);
    }

    /// Computes the checksum of an IPv4 header, options included. The checksum field itself is skipped.
    pub fn compute_checksum(buf: &[u8]) -> u16 {
        let hdr_size: usize = ((buf[0] & 0xF) as usize) << 2;
        let mut state: u32 = 0xffff;
        for (i, word) in buf[..hdr_size].chunks_exact(2).enumerate() {
            // Octets 10-12 hold the header checksum.
            if i == 5 {
                continue;
            }
            state += u16::from_be_bytes([word[0], word[1]]) as u32;
        }
        while state > 0xffff {
            state -= 0xffff;
        }
        !state as u16
    }
}
