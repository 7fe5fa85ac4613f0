// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Host side of established connections and the background work that drives the core: timer ticks, proxied and
//! direct connect completions, accepts, and the byte relay between host sockets and socket buffers.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        ctrlblk::ControlBlock,
        peer::{
            socket_in,
            TcpPeer,
        },
        socket::{
            Socket,
            SocketId,
            SocketState,
        },
        TcpState,
    },
    runtime::{
        fail::Fail,
        network::{
            proxy::ProxyManager,
            socket::{
                HostFd,
                HostSockets,
            },
            NetworkRuntime,
        },
        timer::ElapsedTicks,
    },
};
use ::std::{
    net::Shutdown,
    time::Instant,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Largest single read from a host socket.
const READ_CHUNK: usize = 8192;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<N: NetworkRuntime, H: HostSockets, P: ProxyManager> TcpPeer<N, H, P> {
    /// Runs all background work that is due at `now`.
    pub fn poll(&mut self, now: Instant) {
        let ticks: ElapsedTicks = self.clock.advance_clock(now);
        for _ in 0..ticks.fast {
            self.fast_timer();
        }
        for _ in 0..ticks.slow {
            self.slow_timer();
        }

        for (sid, result) in self.scheduler.poll() {
            if let Err(e) = self.complete_proxy_connect(sid, result) {
                warn!("poll(): {} proxied connect could not complete ({:?})", sid, e);
            }
        }

        for sid in self.connections.clone() {
            if let Err(e) = self.poll_socket(sid) {
                warn!("poll(): {} ({:?})", sid, e);
            }
        }
    }

    fn poll_socket(&mut self, sid: SocketId) -> Result<(), Fail> {
        let Some(socket) = self.get_socket(sid) else {
            return Ok(());
        };
        let state: SocketState = socket.state;
        let host_fd: Option<HostFd> = socket.host_fd;

        if state.contains(SocketState::FACCEPTCONN) {
            // An accept-once listener stops listening after its first connection.
            while self.get_socket(sid).is_some_and(Socket::is_listening) {
                if self.finish_accept(sid)?.is_none() {
                    break;
                }
            }
            return Ok(());
        }

        let Some(fd) = host_fd else {
            return Ok(());
        };
        if state.contains(SocketState::PROXIFIED) {
            return Ok(());
        }
        if state.contains(SocketState::ISFCONNECTING) {
            return match self.host.poll_connect(fd) {
                Ok(false) => Ok(()),
                Ok(true) => self.complete_host_connect(sid, Ok(())),
                Err(e) => self.complete_host_connect(sid, Err(e)),
            };
        }
        if !state.contains(SocketState::ISFCONNECTED) {
            return Ok(());
        }

        match self.flush_to_host(sid) {
            // Window update for the space just freed.
            Ok(true) => self.tcp_output(sid)?,
            Ok(false) => (),
            Err(e) => return self.drop_connection(sid, e),
        }
        if self.get_socket(sid).is_some_and(|s| !s.state.contains(SocketState::FCANTRCVMORE)) {
            self.read_from_host(sid, fd)?;
        }
        Ok(())
    }

    /// Writes buffered guest data to the host socket. Returns whether anything was written.
    pub(super) fn flush_to_host(&mut self, sid: SocketId) -> Result<bool, Fail> {
        let mut written: bool = false;
        loop {
            let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
            let Some(fd) = socket.host_fd else {
                break;
            };
            if socket.rcv.is_empty()
                || !socket.state.contains(SocketState::ISFCONNECTED)
                || socket.state.contains(SocketState::FCANTSENDMORE)
            {
                break;
            }
            match self.host.write(fd, socket.rcv.front_chunk())? {
                None | Some(0) => break,
                Some(n) => {
                    socket.rcv.drop_front(n);
                    written = true;
                },
            }
        }

        let socket: &Socket = self.socket(sid)?;
        if socket.state.contains(SocketState::FWDRAIN) && socket.rcv.is_empty() {
            self.sofcantsendmore(sid)?;
        }
        Ok(written)
    }

    /// Reads from the host socket into the send buffer and pushes the new data to the guest.
    fn read_from_host(&mut self, sid: SocketId, fd: HostFd) -> Result<(), Fail> {
        let space: usize = self.socket(sid)?.snd.space();
        if space == 0 {
            return Ok(());
        }
        let mut buf: Vec<u8> = vec![0; space.min(READ_CHUNK)];
        match self.host.read(fd, &mut buf) {
            Ok(None) => Ok(()),
            Ok(Some(0)) => {
                debug!("read_from_host(): {} host side closed", sid);
                self.sofcantrcvmore(sid)?;
                self.sockclosed(sid)
            },
            Ok(Some(n)) => {
                self.socket_mut(sid)?.snd.append(&buf[..n]);
                self.tcp_output(sid)
            },
            Err(e) => self.drop_connection(sid, e),
        }
    }

    /// The host side will send no more data.
    pub(super) fn sofcantrcvmore(&mut self, sid: SocketId) -> Result<(), Fail> {
        let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
        if !socket.state.contains(SocketState::NOFDREF) {
            if let Some(fd) = socket.host_fd {
                if let Err(e) = self.host.shutdown(fd, Shutdown::Read) {
                    trace!("sofcantrcvmore(): {} shutdown failed ({:?})", sid, e);
                }
            }
        }
        socket.state.remove(SocketState::ISFCONNECTING);
        if socket.state.contains(SocketState::FCANTSENDMORE) {
            socket.state = SocketState::NOFDREF;
        } else {
            socket.state.insert(SocketState::FCANTRCVMORE);
        }
        Ok(())
    }

    /// The host side will be sent no more data.
    pub(super) fn sofcantsendmore(&mut self, sid: SocketId) -> Result<(), Fail> {
        let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
        if !socket.state.contains(SocketState::NOFDREF) {
            if let Some(fd) = socket.host_fd {
                if let Err(e) = self.host.shutdown(fd, Shutdown::Write) {
                    trace!("sofcantsendmore(): {} shutdown failed ({:?})", sid, e);
                }
            }
        }
        socket.state.remove(SocketState::ISFCONNECTING);
        if socket.state.contains(SocketState::FCANTRCVMORE) {
            socket.state = SocketState::NOFDREF;
        } else {
            socket.state.insert(SocketState::FCANTSENDMORE);
        }
        Ok(())
    }

    /// The guest sent FIN: shut the host side down for writing once the buffered data is out.
    pub(super) fn sofwdrain(&mut self, sid: SocketId) -> Result<(), Fail> {
        let socket: &mut Socket = self.socket_mut(sid)?;
        if socket.rcv.is_empty() {
            self.sofcantsendmore(sid)
        } else {
            socket.state.insert(SocketState::FWDRAIN);
            Ok(())
        }
    }

    /// The host side closed: start closing the guest side.
    pub fn sockclosed(&mut self, sid: SocketId) -> Result<(), Fail> {
        let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
        match tcb.state {
            TcpState::Closed | TcpState::Listen | TcpState::SynSent => {
                tcb.state = TcpState::Closed;
                return self.close(sid);
            },
            TcpState::SynReceived | TcpState::Established => tcb.state = TcpState::FinWait1,
            TcpState::CloseWait => tcb.state = TcpState::LastAck,
            _ => (),
        }
        debug!("sockclosed(): {} now {:?}", sid, tcb.state);
        self.tcp_output(sid)
    }
}
