// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod protocol;

pub use self::protocol::IpProtocol;

//==============================================================================
// Constants
//==============================================================================

/// Type-of-service values (RFC 791 / RFC 1349).
pub mod tos {
    /// Minimize delay.
    pub const LOWDELAY: u8 = 0x10;
    /// Maximize throughput.
    pub const THROUGHPUT: u8 = 0x08;
    /// Maximize reliability.
    pub const RELIABILITY: u8 = 0x04;
}
