// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::{
    inetstack::test_helpers::HOST_IPV4,
    runtime::{
        fail::Fail,
        network::socket::{
            HostFd,
            HostSockets,
            SocketOption,
        },
    },
};
use ::libc::{
    EBADF,
    ECONNREFUSED,
    ECONNRESET,
    ENOTCONN,
};
use ::slab::Slab;
use ::std::{
    collections::{
        HashMap,
        VecDeque,
    },
    net::{
        Shutdown,
        SocketAddrV4,
    },
};

//==============================================================================
// Constants
//==============================================================================

const FIRST_EPHEMERAL_PORT: u16 = 40000;

//==============================================================================
// Structures
//==============================================================================

/// How a connect to a given address turns out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// `connect` fails right away.
    Refused,
    /// `connect` succeeds but the connection never completes.
    Pending,
    /// The connection completes, then fails when polled.
    FailLater,
}

/// One in-memory host socket.
#[derive(Debug, Default)]
pub struct FakeSocket {
    pub local: Option<SocketAddrV4>,
    pub remote: Option<SocketAddrV4>,
    pub options: Vec<SocketOption>,
    pub connected: bool,
    pub listening: bool,
    pub backlog: VecDeque<(HostFd, SocketAddrV4)>,
    pub inbound: VecDeque<u8>,
    pub eof: bool,
    pub read_error: bool,
    pub write_error: bool,
    pub written: Vec<u8>,
    /// Most bytes a single write takes. `None` takes everything.
    pub write_limit: Option<usize>,
    pub shut_read: bool,
    pub shut_write: bool,
}

/// Host sockets living in memory, scripted by the test.
#[derive(Default)]
pub struct FakeSockets {
    sockets: Slab<FakeSocket>,
    outcomes: HashMap<SocketAddrV4, ConnectOutcome>,
    next_port: u16,
    closed: Vec<HostFd>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl FakeSockets {
    pub fn set_outcome(&mut self, remote: SocketAddrV4, outcome: ConnectOutcome) {
        self.outcomes.insert(remote, outcome);
    }

    pub fn get(&self, fd: HostFd) -> Option<&FakeSocket> {
        self.sockets.get(fd.into())
    }

    pub fn get_mut(&mut self, fd: HostFd) -> Option<&mut FakeSocket> {
        self.sockets.get_mut(fd.into())
    }

    /// Socket connected (or connecting) to `remote`.
    pub fn find_connected_to(&self, remote: SocketAddrV4) -> Option<HostFd> {
        self.sockets
            .iter()
            .find(|(_, socket)| socket.remote == Some(remote) && !socket.listening)
            .map(|(fd, _)| HostFd::from(fd))
    }

    /// Listening socket bound to `port`.
    pub fn find_listener(&self, port: u16) -> Option<HostFd> {
        self.sockets
            .iter()
            .find(|(_, socket)| socket.listening && socket.local.map(|a| a.port()) == Some(port))
            .map(|(fd, _)| HostFd::from(fd))
    }

    /// Creates a connected socket, as a proxy would hand out.
    pub fn connected_socket(&mut self, remote: SocketAddrV4) -> HostFd {
        let local: SocketAddrV4 = self.ephemeral();
        HostFd::from(self.sockets.insert(FakeSocket {
            local: Some(local),
            remote: Some(remote),
            connected: true,
            ..Default::default()
        }))
    }

    /// Queues an incoming connection from `peer` on the listener `fd`.
    pub fn queue_connection(&mut self, fd: HostFd, peer: SocketAddrV4) -> Option<HostFd> {
        let local: SocketAddrV4 = self.get(fd)?.local?;
        let accepted: HostFd = HostFd::from(self.sockets.insert(FakeSocket {
            local: Some(SocketAddrV4::new(HOST_IPV4, local.port())),
            remote: Some(peer),
            connected: true,
            ..Default::default()
        }));
        self.get_mut(fd)?.backlog.push_back((accepted, peer));
        Some(accepted)
    }

    pub fn push_inbound(&mut self, fd: HostFd, data: &[u8]) {
        if let Some(socket) = self.get_mut(fd) {
            socket.inbound.extend(data);
        }
    }

    pub fn take_written(&mut self, fd: HostFd) -> Vec<u8> {
        self.get_mut(fd).map(|s| std::mem::take(&mut s.written)).unwrap_or_default()
    }

    pub fn is_closed(&self, fd: HostFd) -> bool {
        self.closed.contains(&fd)
    }

    fn ephemeral(&mut self) -> SocketAddrV4 {
        let port: u16 = FIRST_EPHEMERAL_PORT + self.next_port;
        self.next_port += 1;
        SocketAddrV4::new(HOST_IPV4, port)
    }

    fn lookup(&mut self, fd: HostFd) -> Result<&mut FakeSocket, Fail> {
        self.sockets
            .get_mut(fd.into())
            .ok_or_else(|| Fail::new(EBADF, "unknown host socket"))
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl HostSockets for FakeSockets {
    fn socket(&mut self) -> Result<HostFd, Fail> {
        Ok(HostFd::from(self.sockets.insert(FakeSocket::default())))
    }

    fn set_option(&mut self, fd: HostFd, option: SocketOption) -> Result<(), Fail> {
        self.lookup(fd)?.options.push(option);
        Ok(())
    }

    fn connect(&mut self, fd: HostFd, remote: SocketAddrV4) -> Result<(), Fail> {
        if self.outcomes.get(&remote) == Some(&ConnectOutcome::Refused) {
            return Err(Fail::new(ECONNREFUSED, "connection refused"));
        }
        let local: SocketAddrV4 = self.ephemeral();
        let socket: &mut FakeSocket = self.lookup(fd)?;
        socket.local = Some(local);
        socket.remote = Some(remote);
        Ok(())
    }

    fn poll_connect(&mut self, fd: HostFd) -> Result<bool, Fail> {
        let remote: Option<SocketAddrV4> = self.lookup(fd)?.remote;
        let Some(remote) = remote else {
            return Err(Fail::new(ENOTCONN, "not connecting"));
        };
        let outcome: Option<ConnectOutcome> = self.outcomes.get(&remote).copied();
        match outcome {
            Some(ConnectOutcome::Pending) => Ok(false),
            Some(ConnectOutcome::FailLater) | Some(ConnectOutcome::Refused) => {
                Err(Fail::new(ECONNREFUSED, "connection refused"))
            },
            None => {
                self.lookup(fd)?.connected = true;
                Ok(true)
            },
        }
    }

    fn listen(&mut self, local: SocketAddrV4) -> Result<HostFd, Fail> {
        let port: u16 = match local.port() {
            0 => self.ephemeral().port(),
            port => port,
        };
        Ok(HostFd::from(self.sockets.insert(FakeSocket {
            local: Some(SocketAddrV4::new(*local.ip(), port)),
            listening: true,
            ..Default::default()
        })))
    }

    fn accept(&mut self, fd: HostFd) -> Result<Option<(HostFd, SocketAddrV4)>, Fail> {
        Ok(self.lookup(fd)?.backlog.pop_front())
    }

    fn read(&mut self, fd: HostFd, buf: &mut [u8]) -> Result<Option<usize>, Fail> {
        let socket: &mut FakeSocket = self.lookup(fd)?;
        if socket.read_error {
            return Err(Fail::new(ECONNRESET, "connection reset by peer"));
        }
        if socket.inbound.is_empty() {
            return Ok(if socket.eof { Some(0) } else { None });
        }
        let n: usize = buf.len().min(socket.inbound.len());
        for (dst, src) in buf.iter_mut().zip(socket.inbound.drain(..n)) {
            *dst = src;
        }
        Ok(Some(n))
    }

    fn write(&mut self, fd: HostFd, buf: &[u8]) -> Result<Option<usize>, Fail> {
        let socket: &mut FakeSocket = self.lookup(fd)?;
        if socket.write_error {
            return Err(Fail::new(ECONNRESET, "connection reset by peer"));
        }
        let n: usize = socket.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        socket.written.extend_from_slice(&buf[..n]);
        Ok(Some(n))
    }

    fn shutdown(&mut self, fd: HostFd, how: Shutdown) -> Result<(), Fail> {
        let socket: &mut FakeSocket = self.lookup(fd)?;
        match how {
            Shutdown::Read => socket.shut_read = true,
            Shutdown::Write => socket.shut_write = true,
            Shutdown::Both => {
                socket.shut_read = true;
                socket.shut_write = true;
            },
        }
        Ok(())
    }

    fn close(&mut self, fd: HostFd) -> Result<(), Fail> {
        self.sockets
            .try_remove(fd.into())
            .ok_or_else(|| Fail::new(EBADF, "unknown host socket"))?;
        self.closed.push(fd);
        Ok(())
    }

    fn local_addr(&self, fd: HostFd) -> Result<SocketAddrV4, Fail> {
        self.get(fd)
            .and_then(|socket| socket.local)
            .ok_or_else(|| Fail::new(ENOTCONN, "socket is not bound"))
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::FakeSockets;
    use crate::runtime::network::socket::{
        HostFd,
        HostSockets,
    };
    use ::anyhow::Result;
    use ::std::net::{
        Ipv4Addr,
        SocketAddrV4,
    };

    #[test]
    fn unspecified_listener_keeps_its_address() -> Result<()> {
        let mut sockets: FakeSockets = FakeSockets::default();
        let fd: HostFd = sockets.listen(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
        let local: SocketAddrV4 = sockets.local_addr(fd)?;
        crate::ensure_eq!(*local.ip(), Ipv4Addr::UNSPECIFIED);
        crate::ensure_eq!(local.port(), 40000);
        Ok(())
    }
}
