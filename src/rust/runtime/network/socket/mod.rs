// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod option;
mod os;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    option::SocketOption,
    os::OsSockets,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    fmt,
    net::{
        Shutdown,
        SocketAddrV4,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Handle to a connection record of the TCP core.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SocketId(usize);

/// Handle to a host socket owned by a [HostSockets] implementation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct HostFd(usize);

//======================================================================================================================
// Traits
//======================================================================================================================

/// Host socket shim. All sockets are IPv4 stream sockets and every operation is non-blocking: operations that would
/// block return `Ok(None)` (or `Ok(false)`) instead of an error.
pub trait HostSockets {
    /// Creates a new stream socket.
    fn socket(&mut self) -> Result<HostFd, Fail>;

    /// Sets an option on a host socket.
    fn set_option(&mut self, fd: HostFd, option: SocketOption) -> Result<(), Fail>;

    /// Starts connecting `fd` to `remote`. A connection that is still in progress is not an error.
    fn connect(&mut self, fd: HostFd, remote: SocketAddrV4) -> Result<(), Fail>;

    /// Checks on a connect started with [HostSockets::connect]. Returns true once connected, false while pending.
    fn poll_connect(&mut self, fd: HostFd) -> Result<bool, Fail>;

    /// Creates a non-blocking listening socket bound to `local`.
    fn listen(&mut self, local: SocketAddrV4) -> Result<HostFd, Fail>;

    /// Accepts one pending connection, if any.
    fn accept(&mut self, fd: HostFd) -> Result<Option<(HostFd, SocketAddrV4)>, Fail>;

    /// Reads into `buf`. `Some(0)` means end of stream.
    fn read(&mut self, fd: HostFd, buf: &mut [u8]) -> Result<Option<usize>, Fail>;

    /// Writes from `buf`, returning how many bytes the host took.
    fn write(&mut self, fd: HostFd, buf: &[u8]) -> Result<Option<usize>, Fail>;

    /// Shuts down one or both directions of a connected socket.
    fn shutdown(&mut self, fd: HostFd, how: Shutdown) -> Result<(), Fail>;

    /// Releases a host socket.
    fn close(&mut self, fd: HostFd) -> Result<(), Fail>;

    /// Returns the address a host socket is bound to.
    fn local_addr(&self, fd: HostFd) -> Result<SocketAddrV4, Fail>;
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<usize> for SocketId {
    fn from(val: usize) -> Self {
        SocketId(val)
    }
}

impl From<SocketId> for usize {
    fn from(val: SocketId) -> Self {
        val.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

impl From<usize> for HostFd {
    fn from(val: usize) -> Self {
        HostFd(val)
    }
}

impl From<HostFd> for usize {
    fn from(val: HostFd) -> Self {
        val.0
    }
}
