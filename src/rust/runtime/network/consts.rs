// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::net::Ipv4Addr;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Minimum MSS Parameter for TCP
pub const MIN_MSS: usize = 32;

/// Maximum MSS Parameter for TCP
pub const MAX_MSS: usize = u16::MAX as usize;

/// Largest window shift allowed by RFC 7323.
pub const MAX_WINDOW_SCALE: u8 = 14;

/// Default MSS Parameter for TCP
pub const DEFAULT_MSS: usize = 1460;

/// Default MTU of the virtual interface facing the guest.
pub const DEFAULT_MTU: usize = 1500;

/// Combined size of the IPv4 and TCP headers without options.
pub const TCPIP_HEADER_SIZE: usize = 40;

/// Default size of the per-connection socket buffers.
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 8192;

/// Default limit on the number of live connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default network the guest lives in.
pub const DEFAULT_ALIAS_NETWORK: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 0);

/// Default address of the virtual gateway (the host as seen by the guest).
pub const DEFAULT_ALIAS_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

/// Last byte of the first alias address that maps to a DNS server.
pub const ALIAS_DNS_BASE: u8 = 3;

/// Mask selecting the alias network from an address.
pub const ALIAS_NETMASK: u32 = 0xffff_ff00;
