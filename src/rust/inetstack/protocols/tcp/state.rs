// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::segment::TcpFlags;

/// Connection states, in the order of the BSD implementation. States at or after [TcpState::SynReceived] have seen
/// the peer's SYN; states after [TcpState::CloseWait] have seen a FIN from the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    CloseWait,
    FinWait1,
    Closing,
    LastAck,
    FinWait2,
    TimeWait,
}

impl TcpState {
    pub fn have_received_syn(self) -> bool {
        self >= TcpState::SynReceived
    }

    /// States that can no longer receive data from the guest.
    pub fn have_received_fin(self) -> bool {
        matches!(
            self,
            TcpState::CloseWait | TcpState::Closing | TcpState::LastAck | TcpState::TimeWait
        )
    }

    /// Control bits carried by a segment sent in this state.
    pub fn outflags(self) -> TcpFlags {
        match self {
            TcpState::Closed => TcpFlags::RST | TcpFlags::ACK,
            TcpState::Listen => TcpFlags::empty(),
            TcpState::SynSent => TcpFlags::SYN,
            TcpState::SynReceived => TcpFlags::SYN | TcpFlags::ACK,
            TcpState::Established | TcpState::CloseWait | TcpState::FinWait2 | TcpState::TimeWait => TcpFlags::ACK,
            TcpState::FinWait1 | TcpState::Closing | TcpState::LastAck => TcpFlags::FIN | TcpFlags::ACK,
        }
    }
}
