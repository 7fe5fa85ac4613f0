// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Host side of connection setup: outbound connects on behalf of the guest, and host connections accepted on
//! forwarded or helper ports.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        constants::TCPTV_KEEP_INIT,
        ctrlblk::ControlBlock,
        peer::TcpPeer,
        socket::{
            Socket,
            SocketId,
            SocketState,
        },
        timers::TimerKind,
        SeqNumber,
        TcpState,
    },
    runtime::{
        fail::Fail,
        network::{
            proxy::{
                ProxyFuture,
                ProxyManager,
            },
            socket::{
                HostFd,
                HostSockets,
                SocketOption,
            },
            NetworkRuntime,
        },
        scheduler::TaskId,
    },
};
use ::std::net::SocketAddrV4;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Length of the IPv4 header of segments re-entering the input path.
const REENTRY_HEADER_OFFSET: usize = 20;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<N: NetworkRuntime, H: HostSockets, P: ProxyManager> TcpPeer<N, H, P> {
    /// Starts the host connect of a guest connection.
    ///
    /// Destinations inside the alias network are redirected to a DNS server or the loopback address and never go
    /// through the proxy. Other destinations are offered to the proxy manager first; if it takes them, the socket is
    /// left connecting without a descriptor until the proxy reports back. Otherwise a non-blocking host connect is
    /// started.
    pub fn fast_connect(&mut self, sid: SocketId) -> Result<(), Fail> {
        let faddr: SocketAddrV4 = self.socket(sid)?.faddr;
        let (target, try_proxy): (SocketAddrV4, bool) = match self.alias.resolve_alias(*faddr.ip()) {
            Some(addr) => (SocketAddrV4::new(addr, faddr.port()), false),
            None => (faddr, true),
        };

        if try_proxy {
            if let Some(future) = self.proxy.add(target) {
                debug!("fast_connect(): {} connect to {:?} handed to the proxy", sid, target);
                self.enqueue_proxy_connect(sid, future)?;
                let socket: &mut Socket = self.socket_mut(sid)?;
                socket.soisfconnecting();
                socket.host_fd = None;
                socket.state.insert(SocketState::PROXIFIED);
                return Ok(());
            }
        }

        let fd: HostFd = self.host.socket()?;
        self.socket_mut(sid)?.host_fd = Some(fd);
        for option in SocketOption::RELAY {
            self.host.set_option(fd, option)?;
        }
        debug!("fast_connect(): {} connecting to {:?}", sid, target);
        self.host.connect(fd, target)?;
        self.socket_mut(sid)?.soisfconnecting();

        Ok(())
    }

    fn enqueue_proxy_connect(&mut self, sid: SocketId, future: ProxyFuture) -> Result<(), Fail> {
        let name: String = format!("tcp::proxy_connect for {}", sid);
        let task_id: TaskId = self.scheduler.insert(&name, sid, future);
        self.socket_mut(sid)?.proxy_task = Some(task_id);
        Ok(())
    }

    /// Finishes a proxied connect and resumes the guest handshake.
    pub(super) fn complete_proxy_connect(&mut self, sid: SocketId, result: Result<HostFd, Fail>) -> Result<(), Fail> {
        let socket: &mut Socket = self.socket_mut(sid)?;
        socket.proxy_task = None;
        socket.state.remove(SocketState::PROXIFIED);
        match result {
            Ok(fd) => {
                debug!("complete_proxy_connect(): {} connected through the proxy", sid);
                socket.host_fd = Some(fd);
                socket.state.remove(SocketState::ISFCONNECTING);
            },
            Err(e) => {
                debug!("complete_proxy_connect(): {} proxy connect failed ({:?})", sid, e);
                socket.state = SocketState::NOFDREF;
            },
        }
        self.tcp_input(None, REENTRY_HEADER_OFFSET, Some(sid))
    }

    /// Finishes a direct connect once the host reports success or failure.
    pub(super) fn complete_host_connect(&mut self, sid: SocketId, result: Result<(), Fail>) -> Result<(), Fail> {
        let socket: &mut Socket = self.socket_mut(sid)?;
        socket.state.remove(SocketState::ISFCONNECTING);
        if let Err(e) = result {
            debug!("complete_host_connect(): {} host connect failed ({:?})", sid, e);
            socket.state = SocketState::NOFDREF;
        }
        self.tcp_input(None, REENTRY_HEADER_OFFSET, Some(sid))
    }

    /// Opens a listening host socket on `host_addr` whose connections are forwarded to `guest`. An accept-once
    /// listener turns into the single connection it accepts.
    ///
    /// The listener's externally visible address (its foreign address) is the bound address, or the alias address
    /// when bound to the unspecified or loopback address.
    pub fn listen(&mut self, host_addr: SocketAddrV4, guest: SocketAddrV4, accept_once: bool) -> Result<SocketId, Fail> {
        let sid: SocketId = self.socreate();
        if let Err(e) = self.attach(sid) {
            self.sofree(sid);
            return Err(e);
        }
        let fd: HostFd = match self.host.listen(host_addr) {
            Ok(fd) => fd,
            Err(e) => {
                self.close(sid)?;
                return Err(e);
            },
        };
        let bound: SocketAddrV4 = match self.host.local_addr(fd) {
            Ok(addr) => addr,
            Err(e) => {
                self.socket_mut(sid)?.host_fd = Some(fd);
                self.close(sid)?;
                return Err(e);
            },
        };

        let visible: SocketAddrV4 = SocketAddrV4::new(self.alias.guest_visible(*bound.ip()), bound.port());
        let socket: &mut Socket = self.socket_mut(sid)?;
        socket.host_fd = Some(fd);
        socket.laddr = guest;
        socket.faddr = visible;
        socket.state = SocketState::FACCEPTCONN;
        if accept_once {
            socket.state.insert(SocketState::FACCEPTONCE);
        }
        if let Some(tcb) = socket.tcb.as_mut() {
            tcb.state = TcpState::Listen;
        }
        debug!(
            "listen(): {} forwards {:?} to {:?} (accept_once={})",
            sid, visible, guest, accept_once
        );

        Ok(sid)
    }

    /// Accepts a pending host connection on `listener` and opens the matching connection to the guest. Returns the
    /// connection's socket, or `None` if nothing was pending.
    pub fn finish_accept(&mut self, listener: SocketId) -> Result<Option<SocketId>, Fail> {
        let (listen_fd, guest, accept_once): (HostFd, SocketAddrV4, bool) = {
            let socket: &Socket = self.socket(listener)?;
            let Some(fd) = socket.host_fd else {
                return Ok(None);
            };
            (fd, socket.laddr, socket.state.contains(SocketState::FACCEPTONCE))
        };

        let Some((fd, peer)) = self.host.accept(listen_fd)? else {
            return Ok(None);
        };

        let sid: SocketId = if accept_once {
            listener
        } else {
            let sid: SocketId = self.socreate();
            if let Err(e) = self.attach(sid) {
                warn!("finish_accept(): dropping host connection from {:?} ({:?})", peer, e);
                self.sofree(sid);
                if let Err(e) = self.host.close(fd) {
                    warn!("finish_accept(): failed to release host socket ({:?})", e);
                }
                return Err(e);
            }
            self.socket_mut(sid)?.laddr = guest;
            sid
        };

        self.tcp_mss(sid, 0)?;
        for option in SocketOption::RELAY.into_iter().chain([SocketOption::NoDelay]) {
            if let Err(e) = self.host.set_option(fd, option) {
                warn!("finish_accept(): cannot set {:?} ({:?})", option, e);
            }
        }

        let foreign: SocketAddrV4 = SocketAddrV4::new(self.alias.guest_visible(*peer.ip()), peer.port());
        if accept_once {
            // The listening descriptor is done with.
            let socket: &mut Socket = self.socket_mut(sid)?;
            socket.state = SocketState::NOFDREF;
            if let Some(listen_fd) = socket.host_fd.take() {
                if let Err(e) = self.host.close(listen_fd) {
                    warn!("finish_accept(): failed to release listener ({:?})", e);
                }
            }
        }
        let socket: &mut Socket = self.socket_mut(sid)?;
        socket.faddr = foreign;
        socket.host_fd = Some(fd);

        self.tos_classify(sid)?;
        self.build_header_template(sid)?;
        self.stats.connattempt += 1;

        let iss: SeqNumber = self.isn_generator.generate();
        let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
        tcb.state = TcpState::SynSent;
        tcb.timers.arm(TimerKind::Keepalive, TCPTV_KEEP_INIT);
        tcb.send_seq_init(iss);
        debug!("finish_accept(): {} connects {:?} to guest {:?}", sid, foreign, guest);

        self.tcp_output(sid)?;
        Ok(Some(sid))
    }
}
