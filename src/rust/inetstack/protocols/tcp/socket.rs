// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        ctrlblk::ControlBlock,
        emu::{
            EmuClass,
            EmuContext,
            Emulation,
        },
        segment::TcpSegment,
        sockbuf::SockBuf,
    },
    runtime::{
        network::socket::HostFd,
        scheduler::TaskId,
    },
};
use ::std::{
    fmt,
    net::{
        Ipv4Addr,
        SocketAddrV4,
    },
    ops::{
        BitOr,
        BitOrAssign,
    },
};

//======================================================================================================================
// Exports
//======================================================================================================================

pub use crate::runtime::network::socket::SocketId;

//======================================================================================================================
// Structures
//======================================================================================================================

/// State bits of a connection record.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SocketState(u16);

/// A connection record: one guest connection and the host socket it is relayed through.
#[derive(Debug)]
pub struct Socket {
    /// Host socket. `None` while the connection is proxied, not yet connected, or after the host side went away.
    pub(super) host_fd: Option<HostFd>,
    /// Guest side.
    pub(super) laddr: SocketAddrV4,
    /// Remote side, as the guest sees it.
    pub(super) faddr: SocketAddrV4,
    pub(super) state: SocketState,
    pub(super) tcb: Option<ControlBlock>,
    pub(super) emu: Emulation,
    pub(super) tos: u8,
    /// Guest data waiting to be written to the host.
    pub(super) rcv: SockBuf,
    /// Host data waiting to be acknowledged by the guest.
    pub(super) snd: SockBuf,
    /// SYN of a guest connection whose host connect is still in progress.
    pub(super) saved_syn: Option<TcpSegment>,
    /// Pending proxied connect.
    pub(super) proxy_task: Option<TaskId>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SocketState {
    /// No host descriptor is referenced (or it must not be polled yet).
    pub const NOFDREF: SocketState = SocketState(0x001);
    /// Host connect in progress.
    pub const ISFCONNECTING: SocketState = SocketState(0x002);
    /// Host side connected and the guest handshake is complete.
    pub const ISFCONNECTED: SocketState = SocketState(0x004);
    /// Host side sent its last byte.
    pub const FCANTRCVMORE: SocketState = SocketState(0x008);
    /// Host side was shut down for writing.
    pub const FCANTSENDMORE: SocketState = SocketState(0x010);
    /// Guest sent FIN; shut the host side down once the receive buffer drains.
    pub const FWDRAIN: SocketState = SocketState(0x040);
    /// Listening for host connections.
    pub const FACCEPTCONN: SocketState = SocketState(0x100);
    /// Accept a single host connection, then turn into that connection.
    pub const FACCEPTONCE: SocketState = SocketState(0x200);
    /// Host connect handed to the proxy manager.
    pub const PROXIFIED: SocketState = SocketState(0x400);

    pub const fn empty() -> Self {
        SocketState(0)
    }

    pub const fn contains(self, other: SocketState) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(self, other: SocketState) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn insert(&mut self, other: SocketState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SocketState) {
        self.0 &= !other.0;
    }

    /// Both sides connected.
    pub(super) fn set_connected(&mut self) {
        self.remove(SocketState::ISFCONNECTING | SocketState::FWDRAIN | SocketState::NOFDREF);
        self.insert(SocketState::ISFCONNECTED);
    }
}

impl Socket {
    /// Creates a record that does not reference a host socket yet.
    pub fn new(rcv_size: usize, snd_size: usize) -> Self {
        Self {
            host_fd: None,
            laddr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            faddr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            state: SocketState::NOFDREF,
            tcb: None,
            emu: Emulation::default(),
            tos: 0,
            rcv: SockBuf::new(rcv_size),
            snd: SockBuf::new(snd_size),
            saved_syn: None,
            proxy_task: None,
        }
    }

    pub fn get_local(&self) -> SocketAddrV4 {
        self.laddr
    }

    pub fn get_foreign(&self) -> SocketAddrV4 {
        self.faddr
    }

    pub fn get_host_fd(&self) -> Option<HostFd> {
        self.host_fd
    }

    pub fn get_state(&self) -> SocketState {
        self.state
    }

    pub fn get_tcb(&self) -> Option<&ControlBlock> {
        self.tcb.as_ref()
    }

    pub fn get_emu_class(&self) -> EmuClass {
        self.emu.get_class()
    }

    pub fn get_tos(&self) -> u8 {
        self.tos
    }

    pub fn get_rcv(&self) -> &SockBuf {
        &self.rcv
    }

    pub fn get_snd(&self) -> &SockBuf {
        &self.snd
    }

    pub fn is_listening(&self) -> bool {
        self.state.contains(SocketState::FACCEPTCONN)
    }

    pub fn is_proxied(&self) -> bool {
        self.state.contains(SocketState::PROXIFIED)
    }

    /// Host connect started.
    pub(super) fn soisfconnecting(&mut self) {
        self.state.remove(
            SocketState::NOFDREF
                | SocketState::ISFCONNECTED
                | SocketState::FCANTRCVMORE
                | SocketState::FCANTSENDMORE
                | SocketState::FWDRAIN,
        );
        self.state.insert(SocketState::ISFCONNECTING);
    }

    pub(super) fn emu_context(&self) -> EmuContext {
        EmuContext {
            guest: self.laddr,
            remote: self.faddr,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl BitOr for SocketState {
    type Output = SocketState;

    fn bitor(self, rhs: SocketState) -> SocketState {
        SocketState(self.0 | rhs.0)
    }
}

impl BitOrAssign for SocketState {
    fn bitor_assign(&mut self, rhs: SocketState) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(SocketState, &str); 9] = [
            (SocketState::NOFDREF, "NOFDREF"),
            (SocketState::ISFCONNECTING, "ISFCONNECTING"),
            (SocketState::ISFCONNECTED, "ISFCONNECTED"),
            (SocketState::FCANTRCVMORE, "FCANTRCVMORE"),
            (SocketState::FCANTSENDMORE, "FCANTSENDMORE"),
            (SocketState::FWDRAIN, "FWDRAIN"),
            (SocketState::FACCEPTCONN, "FACCEPTCONN"),
            (SocketState::FACCEPTONCE, "FACCEPTONCE"),
            (SocketState::PROXIFIED, "PROXIFIED"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
