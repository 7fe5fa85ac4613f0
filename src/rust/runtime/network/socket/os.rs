// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    network::socket::{
        HostFd,
        HostSockets,
        SocketOption,
    },
    should_retry,
};
use ::libc::{
    EAFNOSUPPORT,
    EBADF,
    ENOTCONN,
};
use ::slab::Slab;
use ::socket2::{
    Domain,
    Protocol,
    SockAddr,
    Socket,
    Type,
};
use ::std::{
    io::{
        self,
        Read,
        Write,
    },
    net::{
        Shutdown,
        SocketAddrV4,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Backlog of listening sockets. Forwarded ports accept one connection at a time.
const LISTEN_BACKLOG: i32 = 1;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Host sockets backed by the operating system.
#[derive(Default)]
pub struct OsSockets {
    sockets: Slab<Socket>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl OsSockets {
    fn get(&self, fd: HostFd) -> Result<&Socket, Fail> {
        self.sockets
            .get(fd.into())
            .ok_or_else(|| Fail::new(EBADF, "unknown host socket"))
    }

    fn get_mut(&mut self, fd: HostFd) -> Result<&mut Socket, Fail> {
        self.sockets
            .get_mut(fd.into())
            .ok_or_else(|| Fail::new(EBADF, "unknown host socket"))
    }

    fn is_would_block(e: &io::Error) -> bool {
        e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error().map_or(false, should_retry)
    }

    fn ipv4_of(addr: SockAddr) -> Result<SocketAddrV4, Fail> {
        addr.as_socket_ipv4()
            .ok_or_else(|| Fail::new(EAFNOSUPPORT, "not an IPv4 address"))
    }

    fn bind_and_listen(socket: &Socket, local: SocketAddrV4) -> Result<(), Fail> {
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::from(local))?;
        socket.listen(LISTEN_BACKLOG)?;
        Ok(())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl HostSockets for OsSockets {
    fn socket(&mut self) -> Result<HostFd, Fail> {
        match Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)) {
            Ok(socket) => Ok(HostFd::from(self.sockets.insert(socket))),
            Err(e) => {
                error!("socket(): failed to create socket ({:?})", e);
                Err(Fail::from(e))
            },
        }
    }

    fn set_option(&mut self, fd: HostFd, option: SocketOption) -> Result<(), Fail> {
        let socket: &Socket = self.get(fd)?;
        let result: io::Result<()> = match option {
            SocketOption::NonBlocking => socket.set_nonblocking(true),
            SocketOption::ReuseAddress => socket.set_reuse_address(true),
            SocketOption::OobInline => socket.set_out_of_band_inline(true),
            SocketOption::NoDelay => socket.set_nodelay(true),
        };
        if let Err(e) = result {
            warn!("set_option(): cannot set {:?} ({:?})", option, e);
            return Err(Fail::from(e));
        }
        Ok(())
    }

    fn connect(&mut self, fd: HostFd, remote: SocketAddrV4) -> Result<(), Fail> {
        trace!("connect(): fd={:?} remote={:?}", fd, remote);
        match self.get(fd)?.connect(&SockAddr::from(remote)) {
            Ok(()) => Ok(()),
            Err(e) if Self::is_would_block(&e) => Ok(()),
            Err(e) => {
                warn!("connect(): failed to connect to {:?} ({:?})", remote, e);
                Err(Fail::from(e))
            },
        }
    }

    fn poll_connect(&mut self, fd: HostFd) -> Result<bool, Fail> {
        let socket: &Socket = self.get(fd)?;
        if let Some(e) = socket.take_error()? {
            return Err(Fail::from(e));
        }
        match socket.peer_addr() {
            Ok(_) => Ok(true),
            Err(e) if e.raw_os_error() == Some(ENOTCONN) => Ok(false),
            Err(e) => Err(Fail::from(e)),
        }
    }

    fn listen(&mut self, local: SocketAddrV4) -> Result<HostFd, Fail> {
        let fd: HostFd = self.socket()?;
        let result: Result<(), Fail> = self.get(fd).and_then(|socket| Self::bind_and_listen(socket, local));
        if let Err(e) = result {
            error!("listen(): failed to listen on {:?} ({:?})", local, e);
            self.sockets.remove(fd.into());
            return Err(e);
        }
        Ok(fd)
    }

    fn accept(&mut self, fd: HostFd) -> Result<Option<(HostFd, SocketAddrV4)>, Fail> {
        match self.get(fd)?.accept() {
            Ok((socket, addr)) => {
                let addr: SocketAddrV4 = Self::ipv4_of(addr)?;
                trace!("accept(): connection accepted from {:?}", addr);
                Ok(Some((HostFd::from(self.sockets.insert(socket)), addr)))
            },
            Err(e) if Self::is_would_block(&e) => Ok(None),
            Err(e) => Err(Fail::from(e)),
        }
    }

    fn read(&mut self, fd: HostFd, buf: &mut [u8]) -> Result<Option<usize>, Fail> {
        match self.get_mut(fd)?.read(buf) {
            Ok(nbytes) => Ok(Some(nbytes)),
            Err(e) if Self::is_would_block(&e) || e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(Fail::from(e)),
        }
    }

    fn write(&mut self, fd: HostFd, buf: &[u8]) -> Result<Option<usize>, Fail> {
        match self.get_mut(fd)?.write(buf) {
            Ok(nbytes) => Ok(Some(nbytes)),
            Err(e) if Self::is_would_block(&e) || e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(Fail::from(e)),
        }
    }

    fn shutdown(&mut self, fd: HostFd, how: Shutdown) -> Result<(), Fail> {
        match self.get(fd)?.shutdown(how) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(ENOTCONN) => Ok(()),
            Err(e) => Err(Fail::from(e)),
        }
    }

    fn close(&mut self, fd: HostFd) -> Result<(), Fail> {
        match self.sockets.try_remove(fd.into()) {
            Some(_) => Ok(()),
            None => Err(Fail::new(EBADF, "unknown host socket")),
        }
    }

    fn local_addr(&self, fd: HostFd) -> Result<SocketAddrV4, Fail> {
        Self::ipv4_of(self.get(fd)?.local_addr()?)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
