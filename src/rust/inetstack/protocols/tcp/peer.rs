// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::{
        ipv4::{
            IPDEFTTL,
            MAXTTL,
        },
        tcp::{
            constants::TCP_MAXWIN,
            ctrlblk::ControlBlock,
            emu::{
                EmuClass,
                EmuHost,
                Emulation,
            },
            isn_generator::IsnGenerator,
            segment::{
                TcpFlags,
                TcpSegment,
            },
            socket::{
                Socket,
                SocketId,
            },
            stats::TcpStats,
            template::HeaderTemplate,
            tos::{
                Classification,
                TosEntry,
                TosTable,
            },
            SeqNumber,
            TcpState,
        },
    },
    runtime::{
        fail::Fail,
        network::{
            config::{
                AliasConfig,
                TcpConfig,
            },
            consts::MIN_MSS,
            proxy::ProxyManager,
            socket::{
                HostFd,
                HostSockets,
            },
            NetworkRuntime,
        },
        scheduler::Scheduler,
        timer::Timer,
    },
};
use ::libc::{
    EBADF,
    EINVAL,
    ENOBUFS,
    ENOTCONN,
};
use ::slab::Slab;
use ::std::{
    mem,
    net::{
        Ipv4Addr,
        SocketAddrV4,
    },
    time::Instant,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Connection manager of the TCP core.
///
/// Owns every connection record and its control block, the traversal index over them, and the collaborators the core
/// talks to: the IP delivery layer below, the host socket shim, and the connection-proxy manager.
pub struct TcpPeer<N: NetworkRuntime, H: HostSockets, P: ProxyManager> {
    pub(super) rt: N,
    pub(super) host: H,
    pub(super) proxy: P,
    pub(super) alias: AliasConfig,
    pub(super) tcp_config: TcpConfig,
    pub(super) sockets: Slab<Socket>,
    /// Live connections, newest first.
    pub(super) connections: Vec<SocketId>,
    /// Connection that received the last segment.
    pub(super) last_used: Option<SocketId>,
    pub(super) tos_table: TosTable,
    pub(super) isn_generator: IsnGenerator,
    /// Pending proxied connects, owned by their socket.
    pub(super) scheduler: Scheduler<SocketId, Result<HostFd, Fail>>,
    pub(super) clock: Timer,
    pub(super) stats: TcpStats,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<N: NetworkRuntime, H: HostSockets, P: ProxyManager> TcpPeer<N, H, P> {
    pub fn new(
        rt: N,
        host: H,
        proxy: P,
        alias: AliasConfig,
        tcp_config: TcpConfig,
        rng_seed: [u8; 32],
        now: Instant,
    ) -> Self {
        Self {
            rt,
            host,
            proxy,
            alias,
            tcp_config,
            sockets: Slab::new(),
            connections: Vec::new(),
            last_used: None,
            tos_table: TosTable::default(),
            isn_generator: IsnGenerator::new(rng_seed),
            scheduler: Scheduler::default(),
            clock: Timer::new(now),
            stats: TcpStats::default(),
        }
    }

    pub fn get_network(&self) -> &N {
        &self.rt
    }

    pub fn get_network_mut(&mut self) -> &mut N {
        &mut self.rt
    }

    pub fn get_host_sockets(&self) -> &H {
        &self.host
    }

    pub fn get_host_sockets_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn get_proxy_mut(&mut self) -> &mut P {
        &mut self.proxy
    }

    pub fn get_alias_config(&self) -> &AliasConfig {
        &self.alias
    }

    pub fn get_tcp_config(&self) -> &TcpConfig {
        &self.tcp_config
    }

    pub fn get_stats(&self) -> &TcpStats {
        &self.stats
    }

    pub fn get_socket(&self, sid: SocketId) -> Option<&Socket> {
        self.sockets.get(sid.into())
    }

    pub fn get_tcb(&self, sid: SocketId) -> Option<&ControlBlock> {
        self.get_socket(sid).and_then(Socket::get_tcb)
    }

    /// Live connections, newest first.
    pub fn get_connections(&self) -> &[SocketId] {
        &self.connections
    }

    pub fn get_last_used(&self) -> Option<SocketId> {
        self.last_used
    }

    /// Number of proxied connects still pending.
    pub fn pending_proxy_connects(&self) -> usize {
        self.scheduler.len()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Adds a user classification rule, consulted after the well-known services.
    pub fn add_emulation(&mut self, entry: TosEntry) {
        self.tos_table.add(entry);
    }

    pub(super) fn socket(&self, sid: SocketId) -> Result<&Socket, Fail> {
        self.sockets
            .get(sid.into())
            .ok_or_else(|| Fail::new(EBADF, "unknown socket"))
    }

    pub(super) fn socket_mut(&mut self, sid: SocketId) -> Result<&mut Socket, Fail> {
        socket_in(&mut self.sockets, sid)
    }

    pub(super) fn tcb_mut(&mut self, sid: SocketId) -> Result<&mut ControlBlock, Fail> {
        self.socket_mut(sid)?.tcb.as_mut().ok_or_else(no_tcb)
    }

    /// Creates a connection record that is not linked to the connection list yet.
    pub fn socreate(&mut self) -> SocketId {
        let socket: Socket = Socket::new(
            self.tcp_config.get_receive_buffer_size(),
            self.tcp_config.get_send_buffer_size(),
        );
        SocketId::from(self.sockets.insert(socket))
    }

    /// Frees a record that never got attached.
    pub(super) fn sofree(&mut self, sid: SocketId) {
        self.sockets.try_remove(sid.into());
    }

    /// Allocates a control block for `sid`. Fails with `ENOBUFS` once the connection table is full.
    pub fn new_tcb(&self, sid: SocketId) -> Result<ControlBlock, Fail> {
        if self.connections.len() >= self.tcp_config.get_max_connections() {
            warn!("new_tcb(): connection table full ({} connections)", self.connections.len());
            return Err(Fail::new(ENOBUFS, "connection table full"));
        }
        Ok(ControlBlock::new(sid, &self.tcp_config))
    }

    /// Links a new control block to `sid` and inserts the socket at the head of the connection list.
    pub fn attach(&mut self, sid: SocketId) -> Result<(), Fail> {
        let tcb: ControlBlock = self.new_tcb(sid)?;
        self.socket_mut(sid)?.tcb = Some(tcb);
        self.connections.insert(0, sid);
        trace!("attach(): {} linked ({} connections)", sid, self.connections.len());
        Ok(())
    }

    /// Caches the fixed header fields of the connection's segments.
    pub fn build_header_template(&mut self, sid: SocketId) -> Result<(), Fail> {
        let socket: &mut Socket = self.socket_mut(sid)?;
        let template: HeaderTemplate = HeaderTemplate::new(socket.faddr, socket.laddr, socket.tos);
        match socket.tcb.as_mut() {
            Some(tcb) => {
                tcb.template = Some(template);
                Ok(())
            },
            None => Err(no_tcb()),
        }
    }

    /// Picks the segment size of a connection from our limits and the guest's `offer` (0 if none), restarts slow
    /// start, and sizes the socket buffers to a multiple of it.
    pub fn tcp_mss(&mut self, sid: SocketId, offer: u16) -> Result<usize, Fail> {
        let mut mss: usize = self
            .tcp_config
            .get_advertised_mss()
            .min(self.tcp_config.get_interface_mss());
        if offer != 0 {
            mss = mss.min(offer as usize);
        }
        let mss: usize = mss.max(MIN_MSS);

        let rcv_size: usize = round_up(self.tcp_config.get_receive_buffer_size(), mss);
        let snd_size: usize = round_up(self.tcp_config.get_send_buffer_size(), mss);
        let socket: &mut Socket = self.socket_mut(sid)?;
        socket.rcv.set_capacity(rcv_size);
        socket.snd.set_capacity(snd_size);
        let tcb: &mut ControlBlock = socket.tcb.as_mut().ok_or_else(no_tcb)?;
        if mss < tcb.maxseg || offer != 0 {
            tcb.maxseg = mss;
        }
        tcb.snd_cwnd = tcb.maxseg as u32;
        trace!("tcp_mss(): {} mss={} offer={}", sid, tcb.maxseg, offer);

        Ok(tcb.maxseg)
    }

    /// Classifies the connection by its ports and attaches the resulting type of service and helper.
    pub fn tos_classify(&mut self, sid: SocketId) -> Result<Classification, Fail> {
        let socket: &Socket = self.socket(sid)?;
        let classification: Classification = self.tos_table.classify(socket.laddr.port(), socket.faddr.port());
        let socket: &mut Socket = self.socket_mut(sid)?;
        socket.tos = classification.tos;
        socket.emu = Emulation::new(classification.emu);
        if classification.emu != EmuClass::None {
            debug!("tos_classify(): {} uses the {:?} helper", sid, classification.emu);
        }
        Ok(classification)
    }

    /// Sends one bare control segment.
    ///
    /// Without an `incoming` segment the headers come from the connection's template. With one, its headers are
    /// reused with the endpoints swapped and its payload dropped. The advertised window is the free space of the
    /// receive buffer, scaled down; resets go out with the maximum TTL.
    pub fn respond(
        &mut self,
        tcb: Option<SocketId>,
        incoming: Option<TcpSegment>,
        ack: SeqNumber,
        seq: SeqNumber,
        flags: TcpFlags,
    ) -> Result<(), Fail> {
        let (window, template): (u32, Option<HeaderTemplate>) = match tcb {
            Some(sid) => {
                let socket: &Socket = self.socket(sid)?;
                let tcb: &ControlBlock = socket.tcb.as_ref().ok_or_else(no_tcb)?;
                let space: u32 = socket.rcv.space().min(tcb.max_rcv_window() as usize) as u32;
                (space >> tcb.rcv_scale, tcb.template.clone())
            },
            None => (0, None),
        };

        let mut segment: TcpSegment = match (incoming, template) {
            (Some(mut segment), _) => {
                segment.ipv4_hdr.swap_addrs();
                mem::swap(&mut segment.tcp_hdr.src_port, &mut segment.tcp_hdr.dst_port);
                segment.tcp_hdr.options.clear();
                segment.tcp_hdr.urgent_pointer = 0;
                segment.data.clear();
                segment
            },
            (None, Some(template)) => template.segment(seq, ack, flags, 0, Vec::new()),
            (None, None) => return Err(Fail::new(EINVAL, "nothing to respond to")),
        };
        segment.tcp_hdr.seq_num = seq;
        segment.tcp_hdr.ack_num = ack;
        segment.tcp_hdr.flags = flags;
        segment.tcp_hdr.window_size = window.min(TCP_MAXWIN) as u16;
        segment.ipv4_hdr.set_ttl(if flags.contains(TcpFlags::RST) { MAXTTL } else { IPDEFTTL });

        trace!("respond(): seq={} ack={} flags={:?}", seq, ack, flags);
        self.transmit(tcb, segment);
        Ok(())
    }

    /// Hands a segment to the IP delivery layer.
    pub(super) fn transmit(&mut self, sid: Option<SocketId>, segment: TcpSegment) {
        self.stats.sndtotal += 1;
        self.rt.ip_output(sid, segment.encode());
    }

    /// Tears a connection down: frees its control block and buffers, cancels a pending proxied connect, releases the
    /// host socket and unlinks the record.
    pub fn close(&mut self, sid: SocketId) -> Result<(), Fail> {
        let Some(mut socket) = self.sockets.try_remove(sid.into()) else {
            return Err(Fail::new(EBADF, "unknown socket"));
        };
        if let Some(task_id) = socket.proxy_task.take() {
            self.scheduler.cancel(task_id);
        }
        if let Some(fd) = socket.host_fd.take() {
            if let Err(e) = self.host.close(fd) {
                warn!("close(): failed to release host socket of {} ({:?})", sid, e);
            }
        }
        if let Some(mut tcb) = socket.tcb.take() {
            tcb.reassembly.clear();
            tcb.timers.disarm_all();
        }
        socket.rcv.clear();
        socket.snd.clear();

        self.connections.retain(|id| *id != sid);
        if self.last_used == Some(sid) {
            self.last_used = None;
        }
        self.stats.closed += 1;
        debug!("close(): {} closed ({} connections left)", sid, self.connections.len());

        Ok(())
    }

    /// Aborts a connection. A connection that has seen the guest's SYN is reset first.
    pub fn drop_connection(&mut self, sid: SocketId, cause: Fail) -> Result<(), Fail> {
        let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
        debug!("drop_connection(): {} in {:?} ({:?})", sid, tcb.state, cause);
        if tcb.state.have_received_syn() {
            tcb.state = TcpState::Closed;
            self.tcp_output(sid)?;
            self.stats.drops += 1;
        } else {
            self.stats.conndrops += 1;
        }
        self.close(sid)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<N: NetworkRuntime, H: HostSockets, P: ProxyManager> EmuHost for TcpPeer<N, H, P> {
    fn listen_once(&mut self, guest: SocketAddrV4) -> Option<SocketAddrV4> {
        match self.listen(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0), guest, true) {
            Ok(sid) => self.get_socket(sid).map(Socket::get_foreign),
            Err(e) => {
                warn!("listen_once(): cannot listen for {:?} ({:?})", guest, e);
                None
            },
        }
    }

    fn udp_listen_once(&mut self, host_port: u16, guest: SocketAddrV4) -> bool {
        self.rt.udp_listen(host_port, guest).is_ok()
    }

    fn host_port_of(&self, guest: SocketAddrV4, remote: SocketAddrV4) -> Option<u16> {
        self.connections
            .iter()
            .filter_map(|sid| self.sockets.get((*sid).into()))
            .find(|socket| !socket.is_listening() && socket.laddr == guest && socket.faddr == remote)
            .and_then(|socket| socket.host_fd)
            .and_then(|fd| self.host.local_addr(fd).ok())
            .map(|addr| addr.port())
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn round_up(size: usize, multiple: usize) -> usize {
    match size % multiple {
        0 => size,
        rem => size + multiple - rem,
    }
}

/// Looks a record up through the slab alone, leaving the other fields of the peer free to borrow.
pub(super) fn socket_in(sockets: &mut Slab<Socket>, sid: SocketId) -> Result<&mut Socket, Fail> {
    sockets
        .get_mut(sid.into())
        .ok_or_else(|| Fail::new(EBADF, "unknown socket"))
}

pub(super) fn no_tcb() -> Fail {
    Fail::new(ENOTCONN, "socket has no control block")
}
