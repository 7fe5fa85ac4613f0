// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::{
        compute_generic_checksum,
        fold16,
        ip::IpProtocol,
        ipv4::{
            Ipv4Header,
            IPV4_HEADER_MIN_SIZE,
        },
        tcp::SeqNumber,
    },
    runtime::fail::Fail,
};
use ::arrayvec::ArrayVec;
use ::libc::{
    EBADMSG,
    ENOTSUP,
};
use ::std::{
    fmt,
    ops::{
        BitAnd,
        BitOr,
        BitOrAssign,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

pub const MIN_TCP_HEADER_SIZE: usize = 20;
pub const MAX_TCP_HEADER_SIZE: usize = 60;
pub const MAX_TCP_OPTIONS: usize = 4;

/// Cause of the failure returned for a segment whose checksum does not verify.
pub const BAD_CHECKSUM: &str = "TCP checksum mismatch";

/// Option kinds.
const TCPOPT_EOL: u8 = 0;
const TCPOPT_NOP: u8 = 1;
const TCPOPT_MAXSEG: u8 = 2;
const TCPOPT_WINDOW: u8 = 3;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Control bits of a TCP header.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct TcpFlags(u8);

/// TCP options understood by this stack. Anything else is skipped on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpOption {
    MaximumSegmentSize(u16),
    WindowScale(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_num: SeqNumber,
    pub ack_num: SeqNumber,
    pub flags: TcpFlags,
    pub window_size: u16,
    // The checksum is verified when parsing and computed when serializing.
    pub urgent_pointer: u16,
    pub options: ArrayVec<TcpOption, MAX_TCP_OPTIONS>,
}

/// A TCP segment together with the IPv4 header that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub ipv4_hdr: Ipv4Header,
    pub tcp_hdr: TcpHeader,
    pub data: Vec<u8>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x01);
    pub const SYN: TcpFlags = TcpFlags(0x02);
    pub const RST: TcpFlags = TcpFlags(0x04);
    pub const PSH: TcpFlags = TcpFlags(0x08);
    pub const ACK: TcpFlags = TcpFlags(0x10);
    pub const URG: TcpFlags = TcpFlags(0x20);

    pub const fn empty() -> Self {
        TcpFlags(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        TcpFlags(bits & 0x3f)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Checks whether every flag in `other` is set.
    pub const fn contains(self, other: TcpFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Checks whether any flag in `other` is set.
    pub const fn intersects(self, other: TcpFlags) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn insert(&mut self, other: TcpFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TcpFlags) {
        self.0 &= !other.0;
    }
}

impl TcpOption {
    fn compute_size(&self) -> usize {
        match self {
            TcpOption::MaximumSegmentSize(..) => 4,
            TcpOption::WindowScale(..) => 4,
        }
    }

    fn serialize(&self, buf: &mut [u8]) -> usize {
        match self {
            TcpOption::MaximumSegmentSize(mss) => {
                buf[0] = TCPOPT_MAXSEG;
                buf[1] = 4;
                buf[2..4].copy_from_slice(&mss.to_be_bytes());
                4
            },
            TcpOption::WindowScale(scale) => {
                // Leading NOP keeps the header word-aligned.
                buf[0] = TCPOPT_NOP;
                buf[1] = TCPOPT_WINDOW;
                buf[2] = 3;
                buf[3] = *scale;
                4
            },
        }
    }
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq_num: SeqNumber::from(0),
            ack_num: SeqNumber::from(0),
            flags: TcpFlags::empty(),
            window_size: 0,
            urgent_pointer: 0,
            options: ArrayVec::new(),
        }
    }

    /// Parses a TCP header and verifies the checksum. Returns the header and the segment payload.
    pub fn parse<'a>(ipv4_header: &Ipv4Header, buf: &'a [u8]) -> Result<(Self, &'a [u8]), Fail> {
        if buf.len() < MIN_TCP_HEADER_SIZE {
            return Err(Fail::new(EBADMSG, "TCP segment too small"));
        }
        let data_offset: usize = (buf[12] >> 4) as usize * 4;
        if buf.len() < data_offset {
            return Err(Fail::new(EBADMSG, "TCP segment smaller than data offset"));
        }
        if data_offset < MIN_TCP_HEADER_SIZE {
            return Err(Fail::new(EBADMSG, "TCP data offset too small"));
        }
        let (hdr_buf, data_buf): (&[u8], &[u8]) = buf.split_at(data_offset);

        let checksum: u16 = u16::from_be_bytes([hdr_buf[16], hdr_buf[17]]);
        if checksum != tcp_checksum(ipv4_header, hdr_buf, data_buf) {
            return Err(Fail::new(EBADMSG, BAD_CHECKSUM));
        }

        let mut header: TcpHeader = Self {
            src_port: u16::from_be_bytes([hdr_buf[0], hdr_buf[1]]),
            dst_port: u16::from_be_bytes([hdr_buf[2], hdr_buf[3]]),
            seq_num: SeqNumber::from(u32::from_be_bytes([hdr_buf[4], hdr_buf[5], hdr_buf[6], hdr_buf[7]])),
            ack_num: SeqNumber::from(u32::from_be_bytes([hdr_buf[8], hdr_buf[9], hdr_buf[10], hdr_buf[11]])),
            flags: TcpFlags::from_bits(hdr_buf[13]),
            window_size: u16::from_be_bytes([hdr_buf[14], hdr_buf[15]]),
            urgent_pointer: u16::from_be_bytes([hdr_buf[18], hdr_buf[19]]),
            options: ArrayVec::new(),
        };

        let mut options: &[u8] = &hdr_buf[MIN_TCP_HEADER_SIZE..];
        while let Some(&kind) = options.first() {
            match kind {
                TCPOPT_EOL => break,
                TCPOPT_NOP => {
                    options = &options[1..];
                    continue;
                },
                _ => {},
            }
            let len: usize = match options.get(1) {
                Some(&len) if len >= 2 && (len as usize) <= options.len() => len as usize,
                _ => return Err(Fail::new(EBADMSG, "malformed TCP option")),
            };
            let option: Option<TcpOption> = match (kind, len) {
                (TCPOPT_MAXSEG, 4) => Some(TcpOption::MaximumSegmentSize(u16::from_be_bytes([
                    options[2], options[3],
                ]))),
                (TCPOPT_WINDOW, 3) => Some(TcpOption::WindowScale(options[2])),
                (TCPOPT_MAXSEG, _) | (TCPOPT_WINDOW, _) => {
                    return Err(Fail::new(EBADMSG, "bad TCP option length"));
                },
                _ => {
                    trace!("parse(): skipping TCP option kind={:?} len={:?}", kind, len);
                    None
                },
            };
            if let Some(option) = option {
                if header.options.try_push(option).is_err() {
                    return Err(Fail::new(EBADMSG, "too many TCP options provided"));
                }
            }
            options = &options[len..];
        }

        Ok((header, data_buf))
    }

    /// Serializes the header into `buf`, which must be exactly [TcpHeader::compute_size] bytes long.
    pub fn serialize(&self, buf: &mut [u8], ipv4_hdr: &Ipv4Header, data: &[u8]) {
        let hdr_size: usize = self.compute_size();
        assert_eq!(buf.len(), hdr_size);

        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..8].copy_from_slice(&u32::from(self.seq_num).to_be_bytes());
        buf[8..12].copy_from_slice(&u32::from(self.ack_num).to_be_bytes());
        buf[12] = ((hdr_size / 4) as u8) << 4;
        buf[13] = self.flags.bits();
        buf[14..16].copy_from_slice(&self.window_size.to_be_bytes());
        buf[16..18].copy_from_slice(&[0, 0]);
        buf[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());

        let mut cur_pos: usize = MIN_TCP_HEADER_SIZE;
        for option in &self.options {
            cur_pos += option.serialize(&mut buf[cur_pos..]);
        }
        // Pad with end-of-options.
        for byte in &mut buf[cur_pos..] {
            *byte = TCPOPT_EOL;
        }

        let checksum: u16 = tcp_checksum(ipv4_hdr, buf, data);
        buf[16..18].copy_from_slice(&checksum.to_be_bytes());
    }

    pub fn compute_size(&self) -> usize {
        let size: usize = MIN_TCP_HEADER_SIZE + self.options.iter().map(|o| o.compute_size()).sum::<usize>();
        // Round up so that the payload is 32-bit aligned.
        (size + 3) & !0x3
    }

    pub fn push_option(&mut self, option: TcpOption) {
        self.options.push(option);
    }

    pub fn get_mss(&self) -> Option<u16> {
        self.options.iter().find_map(|option| match option {
            TcpOption::MaximumSegmentSize(mss) => Some(*mss),
            _ => None,
        })
    }

    pub fn get_window_scale(&self) -> Option<u8> {
        self.options.iter().find_map(|option| match option {
            TcpOption::WindowScale(scale) => Some(*scale),
            _ => None,
        })
    }
}

impl TcpSegment {
    /// Decodes an IPv4 datagram carrying TCP. `header_offset` is the length of the IPv4 header, at which the TCP
    /// header starts.
    pub fn decode(datagram: &[u8], header_offset: usize) -> Result<Self, Fail> {
        let (ipv4_hdr, payload): (Ipv4Header, &[u8]) = Ipv4Header::parse(datagram)?;
        if ipv4_hdr.get_protocol() != IpProtocol::TCP {
            return Err(Fail::new(ENOTSUP, "not a TCP datagram"));
        }
        if ipv4_hdr.compute_size() != header_offset {
            return Err(Fail::new(EBADMSG, "TCP header offset does not match the IPv4 header"));
        }
        let (tcp_hdr, data): (TcpHeader, &[u8]) = TcpHeader::parse(&ipv4_hdr, payload)?;
        Ok(Self {
            ipv4_hdr,
            tcp_hdr,
            data: data.to_vec(),
        })
    }

    /// Encodes the segment into a complete IPv4 datagram with fresh checksums.
    pub fn encode(&self) -> Vec<u8> {
        let tcp_hdr_size: usize = self.tcp_hdr.compute_size();
        let tcp_len: usize = tcp_hdr_size + self.data.len();
        let mut buf: Vec<u8> = vec![0; IPV4_HEADER_MIN_SIZE + tcp_len];

        self.ipv4_hdr.serialize(&mut buf[..IPV4_HEADER_MIN_SIZE], tcp_len);
        let (tcp_buf, data_buf): (&mut [u8], &mut [u8]) =
            buf[IPV4_HEADER_MIN_SIZE..].split_at_mut(tcp_hdr_size);
        data_buf.copy_from_slice(&self.data);
        self.tcp_hdr.serialize(tcp_buf, &self.ipv4_hdr, &self.data);

        buf
    }

    /// Sequence space occupied by the segment: payload plus one for each of SYN and FIN.
    pub fn seq_len(&self) -> u32 {
        let mut len: u32 = self.data.len() as u32;
        if self.tcp_hdr.flags.contains(TcpFlags::SYN) {
            len += 1;
        }
        if self.tcp_hdr.flags.contains(TcpFlags::FIN) {
            len += 1;
        }
        len
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Computes the TCP checksum over the pseudo-header, the TCP header (checksum field skipped) and the payload.
pub fn tcp_checksum(ipv4_header: &Ipv4Header, header: &[u8], data: &[u8]) -> u16 {
    let tcp_len: u16 = (header.len() + data.len()) as u16;
    let mut pseudo: [u8; 12] = [0; 12];
    pseudo[0..4].copy_from_slice(&ipv4_header.get_src_addr().octets());
    pseudo[4..8].copy_from_slice(&ipv4_header.get_dest_addr().octets());
    pseudo[9] = IpProtocol::TCP as u8;
    pseudo[10..12].copy_from_slice(&tcp_len.to_be_bytes());

    let mut state: u32 = compute_generic_checksum(&pseudo, None);
    state = compute_generic_checksum(&header[..16], Some(state));
    // Header length is a multiple of four, so the words stay aligned.
    state = compute_generic_checksum(&header[18..], Some(state));
    state = compute_generic_checksum(data, Some(state));
    fold16(state)
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for TcpFlags {
    fn bitor_assign(&mut self, rhs: TcpFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TcpFlags {
    type Output = TcpFlags;

    fn bitand(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TcpFlags, &str); 6] = [
            (TcpFlags::FIN, "FIN"),
            (TcpFlags::SYN, "SYN"),
            (TcpFlags::RST, "RST"),
            (TcpFlags::PSH, "PSH"),
            (TcpFlags::ACK, "ACK"),
            (TcpFlags::URG, "URG"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
