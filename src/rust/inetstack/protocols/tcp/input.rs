// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Segments from the guest.
//!
//! A guest SYN does not complete the handshake on its own: it starts the host-side connect and is parked on the
//! socket. Once the host connect finishes, the saved SYN re-enters [TcpPeer::tcp_input] and is answered with a
//! SYN+ACK, or with a reset if the connect failed.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        constants::{
            TCPTV_KEEP_IDLE,
            TCPTV_KEEP_INIT,
            TCPTV_MSL,
            TCP_MAXIDLE,
            TCP_MAXWIN,
            TCP_MAX_WINSHIFT,
            TCP_REXMTTHRESH,
        },
        ctrlblk::{
            ControlBlock,
            TcbFlags,
        },
        emu::{
            self,
            EmuContext,
            Emulation,
        },
        peer::{
            no_tcb,
            socket_in,
            TcpPeer,
        },
        segment::{
            TcpFlags,
            TcpSegment,
            BAD_CHECKSUM,
        },
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
            proxy::ProxyManager,
            socket::HostSockets,
            NetworkRuntime,
        },
    },
};
use ::libc::{
    ECONNREFUSED,
    ECONNRESET,
    EINVAL,
};
use ::std::{
    mem,
    net::SocketAddrV4,
    time::Instant,
};

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<N: NetworkRuntime, H: HostSockets, P: ProxyManager> TcpPeer<N, H, P> {
    /// Processes one segment from the guest.
    ///
    /// `datagram` is a complete IPv4 datagram whose TCP header starts `header_offset` bytes in. Passing no datagram
    /// and a socket instead resumes that socket's saved SYN after its host connect has finished.
    pub fn tcp_input(&mut self, datagram: Option<&[u8]>, header_offset: usize, inso: Option<SocketId>) -> Result<(), Fail> {
        match (datagram, inso) {
            (None, Some(sid)) => self.resume_connect(sid),
            (Some(datagram), None) => {
                self.stats.rcvtotal += 1;
                let segment: TcpSegment = match TcpSegment::decode(datagram, header_offset) {
                    Ok(segment) => segment,
                    Err(e) => {
                        if e.cause == BAD_CHECKSUM {
                            self.stats.rcvbadsum += 1;
                        } else {
                            self.stats.rcvbadoff += 1;
                        }
                        debug!("tcp_input(): dropping malformed segment ({:?})", e);
                        return Err(e);
                    },
                };
                self.input_segment(segment)
            },
            _ => Err(Fail::new(EINVAL, "expected either a datagram or a socket to resume")),
        }
    }

    /// Finds the connection of a decoded segment, creating one for a fresh SYN, and runs the state machine.
    fn input_segment(&mut self, segment: TcpSegment) -> Result<(), Fail> {
        let flags: TcpFlags = segment.tcp_hdr.flags;
        let guest: SocketAddrV4 = SocketAddrV4::new(segment.ipv4_hdr.get_src_addr(), segment.tcp_hdr.src_port);
        let remote: SocketAddrV4 = SocketAddrV4::new(segment.ipv4_hdr.get_dest_addr(), segment.tcp_hdr.dst_port);
        trace!(
            "input_segment(): {:?} -> {:?} seq={} ack={} flags={:?} len={}",
            guest,
            remote,
            segment.tcp_hdr.seq_num,
            segment.tcp_hdr.ack_num,
            flags,
            segment.data.len()
        );

        let sid: SocketId = match self.lookup(guest, remote) {
            Some(sid) => sid,
            None => {
                // Only a bare SYN opens a connection.
                if (flags & (TcpFlags::SYN | TcpFlags::FIN | TcpFlags::RST | TcpFlags::URG | TcpFlags::ACK))
                    != TcpFlags::SYN
                {
                    return self.drop_with_reset(None, segment);
                }
                let sid: SocketId = self.socreate();
                if let Err(e) = self.attach(sid) {
                    self.sofree(sid);
                    self.drop_with_reset(None, segment)?;
                    return Err(e);
                }
                let socket: &mut Socket = self.socket_mut(sid)?;
                socket.laddr = guest;
                socket.faddr = remote;
                if self.tos_classify(sid)?.tos == 0 {
                    self.socket_mut(sid)?.tos = segment.ipv4_hdr.get_tos();
                }
                self.tcb_mut(sid)?.state = TcpState::Listen;
                debug!("input_segment(): {} new connection {:?} -> {:?}", sid, guest, remote);
                sid
            },
        };
        self.last_used = Some(sid);

        let socket: &mut Socket = self.socket_mut(sid)?;
        if socket.state.contains(SocketState::ISFCONNECTING) {
            trace!("input_segment(): {} host connect in progress, dropping", sid);
            return Ok(());
        }
        let tcb: &mut ControlBlock = socket.tcb.as_mut().ok_or_else(no_tcb)?;
        let state: TcpState = tcb.state;
        match state {
            TcpState::Closed => Ok(()),
            TcpState::Listen => self.input_listen(sid, segment),
            _ => {
                tcb.idle = 0;
                if state >= TcpState::Established {
                    tcb.timers.arm(TimerKind::Keepalive, TCPTV_KEEP_IDLE);
                }
                let space: u32 = socket.rcv.space() as u32;
                tcb.rcv_wnd = space.max((tcb.rcv_adv - tcb.rcv_nxt).max(0) as u32);

                if state == TcpState::SynSent {
                    self.input_syn_sent(sid, segment)
                } else {
                    self.input_synchronized(sid, segment)
                }
            },
        }
    }

    /// Matches a segment against the last used connection, then the connection list.
    fn lookup(&self, guest: SocketAddrV4, remote: SocketAddrV4) -> Option<SocketId> {
        let matches = |sid: &SocketId| -> bool {
            self.sockets
                .get((*sid).into())
                .map(|socket| !socket.is_listening() && socket.laddr == guest && socket.faddr == remote)
                .unwrap_or(false)
        };
        if let Some(sid) = self.last_used.filter(matches) {
            return Some(sid);
        }
        self.connections.iter().copied().find(matches)
    }

    /// SYN from the guest on a fresh socket: start the host connect and wait for it.
    fn input_listen(&mut self, sid: SocketId, segment: TcpSegment) -> Result<(), Fail> {
        let flags: TcpFlags = segment.tcp_hdr.flags;
        if flags.contains(TcpFlags::RST) {
            return Ok(());
        }
        if flags.contains(TcpFlags::ACK) {
            return self.drop_with_reset(Some(sid), segment);
        }
        if !flags.contains(TcpFlags::SYN) {
            return Ok(());
        }

        self.build_header_template(sid)?;
        self.tcb_mut(sid)?.recv_seq_init(segment.tcp_hdr.seq_num);

        if let Err(e) = self.fast_connect(sid) {
            debug!("input_listen(): {} host connect failed ({:?})", sid, e);
            let ack: SeqNumber = segment.tcp_hdr.seq_num + 1;
            self.respond(Some(sid), Some(segment), ack, SeqNumber::from(0), TcpFlags::RST | TcpFlags::ACK)?;
            return self.close(sid);
        }

        let socket: &mut Socket = self.socket_mut(sid)?;
        socket.saved_syn = Some(segment);
        let tcb: &mut ControlBlock = socket.tcb.as_mut().ok_or_else(no_tcb)?;
        tcb.state = TcpState::SynReceived;
        tcb.timers.arm(TimerKind::Keepalive, TCPTV_KEEP_INIT);
        Ok(())
    }

    /// Answers the saved SYN of `sid` now that its host connect has finished.
    fn resume_connect(&mut self, sid: SocketId) -> Result<(), Fail> {
        let socket: &mut Socket = self.socket_mut(sid)?;
        let Some(segment) = socket.saved_syn.take() else {
            return Err(Fail::new(EINVAL, "no connection attempt to resume"));
        };

        if socket.state.contains(SocketState::NOFDREF) {
            debug!("resume_connect(): {} host connect failed, resetting the guest", sid);
            self.close(sid)?;
            return self.drop_with_reset(None, segment);
        }

        self.build_header_template(sid)?;
        self.apply_syn_options(sid, &segment)?;
        let iss: SeqNumber = self.isn_generator.generate();
        let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
        tcb.send_seq_init(iss);
        tcb.recv_seq_init(segment.tcp_hdr.seq_num);
        tcb.flags.insert(TcbFlags::ACKNOW);
        tcb.state = TcpState::SynReceived;
        tcb.timers.arm(TimerKind::Keepalive, TCPTV_KEEP_INIT);
        self.stats.accepts += 1;
        debug!("resume_connect(): {} answering the guest SYN", sid);

        self.trim_syn_then_step6(sid, segment)
    }

    /// SYN_SENT: we sent a SYN to the guest for an accepted host connection and wait for its SYN+ACK.
    fn input_syn_sent(&mut self, sid: SocketId, segment: TcpSegment) -> Result<(), Fail> {
        let flags: TcpFlags = segment.tcp_hdr.flags;
        let ack: SeqNumber = segment.tcp_hdr.ack_num;
        {
            let tcb: &ControlBlock = self.socket(sid)?.tcb.as_ref().ok_or_else(no_tcb)?;
            if flags.contains(TcpFlags::ACK) && (ack <= tcb.iss || ack > tcb.snd_max) {
                return self.drop_with_reset(Some(sid), segment);
            }
        }
        if flags.contains(TcpFlags::RST) {
            if flags.contains(TcpFlags::ACK) {
                return self.drop_connection(sid, Fail::new(ECONNREFUSED, "connection refused by the guest"));
            }
            return Ok(());
        }
        if !flags.contains(TcpFlags::SYN) {
            return Ok(());
        }

        self.apply_syn_options(sid, &segment)?;
        let now: Instant = self.clock.now();
        let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
        let tcb: &mut ControlBlock = socket.tcb.as_mut().ok_or_else(no_tcb)?;
        if flags.contains(TcpFlags::ACK) {
            tcb.snd_una = ack;
            if tcb.snd_nxt < tcb.snd_una {
                tcb.snd_nxt = tcb.snd_una;
            }
        }
        tcb.timers.disarm(TimerKind::Retransmit);
        tcb.recv_seq_init(segment.tcp_hdr.seq_num);
        tcb.flags.insert(TcbFlags::ACKNOW);
        if flags.contains(TcpFlags::ACK) && tcb.snd_una > tcb.iss {
            self.stats.connects += 1;
            socket.state.set_connected();
            tcb.state = TcpState::Established;
            tcb.negotiate_scaling();
            if tcb.rtt.is_some() {
                tcb.xmit_timer(now);
                self.stats.rttupdated += 1;
            }
            debug!("input_syn_sent(): {} established", sid);
        } else {
            tcb.state = TcpState::SynReceived;
        }

        self.trim_syn_then_step6(sid, segment)
    }

    /// Consumes the SYN of a segment that opened the receive sequence space and goes on with window and FIN
    /// processing. Data carried on a SYN is not delivered.
    fn trim_syn_then_step6(&mut self, sid: SocketId, mut segment: TcpSegment) -> Result<(), Fail> {
        segment.tcp_hdr.seq_num = segment.tcp_hdr.seq_num + 1;
        segment.tcp_hdr.flags.remove(TcpFlags::SYN | TcpFlags::FIN);
        segment.data.clear();
        let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
        tcb.snd_wl1 = segment.tcp_hdr.seq_num.rewind(1);
        self.step6(sid, segment, false)
    }

    /// Every state past the handshake, and SYN_RECEIVED.
    fn input_synchronized(&mut self, sid: SocketId, mut segment: TcpSegment) -> Result<(), Fail> {
        let now: Instant = self.clock.now();
        let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
        let tcb: &mut ControlBlock = socket.tcb.as_mut().ok_or_else(no_tcb)?;

        // Trim what was already received.
        let mut todrop: i32 = tcb.rcv_nxt - segment.tcp_hdr.seq_num;
        if todrop > 0 {
            if segment.tcp_hdr.flags.contains(TcpFlags::SYN) {
                segment.tcp_hdr.flags.remove(TcpFlags::SYN);
                segment.tcp_hdr.seq_num = segment.tcp_hdr.seq_num + 1;
                todrop -= 1;
            }
            let len: i32 = segment.data.len() as i32;
            if todrop > len || (todrop == len && !segment.tcp_hdr.flags.contains(TcpFlags::FIN)) {
                // Complete duplicate: resynchronize the guest with an ACK.
                segment.tcp_hdr.flags.remove(TcpFlags::FIN);
                tcb.flags.insert(TcbFlags::ACKNOW);
                todrop = len;
                self.stats.rcvduppack += 1;
            } else {
                self.stats.rcvpartduppack += 1;
            }
            segment.data.drain(..todrop as usize);
            segment.tcp_hdr.seq_num = segment.tcp_hdr.seq_num + todrop as u32;
        }

        // Data for a connection whose host side is gone.
        if socket.state.contains(SocketState::NOFDREF) && tcb.state > TcpState::CloseWait && !segment.data.is_empty() {
            self.stats.rcvafterclose += 1;
            debug!("input_synchronized(): {} data after close", sid);
            self.close(sid)?;
            return self.drop_with_reset(None, segment);
        }

        // Trim what lies beyond the window.
        let end: SeqNumber = segment.tcp_hdr.seq_num + segment.data.len() as u32;
        let excess: i32 = end - (tcb.rcv_nxt + tcb.rcv_wnd);
        if excess > 0 {
            self.stats.rcvpackafterwin += 1;
            if excess as usize >= segment.data.len() {
                if segment.tcp_hdr.flags.contains(TcpFlags::SYN)
                    && tcb.state == TcpState::TimeWait
                    && segment.tcp_hdr.seq_num > tcb.rcv_nxt
                {
                    debug!("input_synchronized(): {} reused from TIME_WAIT", sid);
                    self.close(sid)?;
                    return self.input_segment(segment);
                }
                if tcb.rcv_wnd == 0 && segment.tcp_hdr.seq_num == tcb.rcv_nxt {
                    // Window probe.
                    tcb.flags.insert(TcbFlags::ACKNOW);
                } else {
                    return self.drop_after_ack(sid, segment);
                }
            }
            let keep: usize = segment.data.len().saturating_sub(excess as usize);
            segment.data.truncate(keep);
            segment.tcp_hdr.flags.remove(TcpFlags::PSH | TcpFlags::FIN);
        }

        let flags: TcpFlags = segment.tcp_hdr.flags;
        if flags.contains(TcpFlags::RST) {
            match tcb.state {
                TcpState::SynReceived
                | TcpState::Established
                | TcpState::FinWait1
                | TcpState::FinWait2
                | TcpState::CloseWait => {
                    debug!("input_synchronized(): {} reset by the guest", sid);
                    tcb.state = TcpState::Closed;
                    self.stats.drops += 1;
                    return self.close(sid);
                },
                TcpState::Closing | TcpState::LastAck | TcpState::TimeWait => return self.close(sid),
                _ => return Ok(()),
            }
        }

        if flags.contains(TcpFlags::SYN) {
            self.drop_connection(sid, Fail::new(ECONNRESET, "SYN inside the window"))?;
            return self.drop_with_reset(None, segment);
        }

        if !flags.contains(TcpFlags::ACK) {
            return Ok(());
        }

        let ack: SeqNumber = segment.tcp_hdr.ack_num;
        let tiwin: u32 = (segment.tcp_hdr.window_size as u32) << tcb.snd_scale;
        if tcb.state == TcpState::SynReceived {
            if tcb.snd_una > ack || ack > tcb.snd_max {
                return self.drop_with_reset(Some(sid), segment);
            }
            self.stats.connects += 1;
            socket.state.set_connected();
            tcb.state = TcpState::Established;
            tcb.negotiate_scaling();
            tcb.snd_wl1 = segment.tcp_hdr.seq_num.rewind(1);
            debug!("input_synchronized(): {} established", sid);
        } else if ack <= tcb.snd_una {
            if segment.data.is_empty() && tiwin == tcb.snd_wnd {
                self.stats.rcvdupack += 1;
                if !tcb.timers.is_armed(TimerKind::Retransmit) || ack != tcb.snd_una {
                    tcb.dupacks = 0;
                } else {
                    tcb.dupacks += 1;
                    if tcb.dupacks == TCP_REXMTTHRESH {
                        // Fast retransmit of the segment the guest is missing.
                        let onxt: SeqNumber = tcb.snd_nxt;
                        let maxseg: u32 = tcb.maxseg as u32;
                        let win: u32 = (tcb.snd_wnd.min(tcb.snd_cwnd) / 2 / maxseg).max(2);
                        tcb.snd_ssthresh = win * maxseg;
                        tcb.timers.disarm(TimerKind::Retransmit);
                        tcb.rtt = None;
                        tcb.snd_nxt = ack;
                        tcb.snd_cwnd = maxseg;
                        self.tcp_output(sid)?;
                        let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
                        tcb.snd_cwnd = tcb.snd_ssthresh + maxseg * tcb.dupacks;
                        if onxt > tcb.snd_nxt {
                            tcb.snd_nxt = onxt;
                        }
                        return Ok(());
                    } else if tcb.dupacks > TCP_REXMTTHRESH {
                        tcb.snd_cwnd += tcb.maxseg as u32;
                        return self.tcp_output(sid);
                    }
                }
            } else {
                tcb.dupacks = 0;
            }
            return self.step6(sid, segment, false);
        }

        // New data acknowledged.
        if tcb.dupacks > TCP_REXMTTHRESH && tcb.snd_cwnd > tcb.snd_ssthresh {
            tcb.snd_cwnd = tcb.snd_ssthresh;
        }
        tcb.dupacks = 0;
        if ack > tcb.snd_max {
            self.stats.rcvacktoomuch += 1;
            return self.drop_after_ack(sid, segment);
        }
        let mut acked: u32 = (ack - tcb.snd_una) as u32;
        self.stats.rcvackpack += 1;
        self.stats.rcvackbyte += acked as u64;

        if let Some((rtseq, _)) = tcb.rtt {
            if ack > rtseq {
                tcb.xmit_timer(now);
                self.stats.rttupdated += 1;
            }
        }

        let mut needs_output: bool = false;
        if ack == tcb.snd_max {
            tcb.timers.disarm(TimerKind::Retransmit);
            needs_output = true;
        } else if !tcb.timers.is_armed(TimerKind::Persist) {
            tcb.timers.arm(TimerKind::Retransmit, tcb.rxtcur);
        }

        // Open the congestion window: exponentially below the threshold, linearly above it.
        let cw: u32 = tcb.snd_cwnd;
        let mut incr: u32 = tcb.maxseg as u32;
        if cw > tcb.snd_ssthresh {
            incr = incr * incr / cw;
        }
        tcb.snd_cwnd = cw.saturating_add(incr).min(TCP_MAXWIN << tcb.snd_scale);

        // Our SYN occupies the first sequence number but no buffer space.
        if tcb.snd_una == tcb.iss && acked > 0 {
            acked -= 1;
        }
        let ourfinisacked: bool = if acked as usize > socket.snd.len() {
            tcb.snd_wnd = tcb.snd_wnd.saturating_sub(socket.snd.len() as u32);
            socket.snd.clear();
            true
        } else {
            socket.snd.drop_front(acked as usize);
            tcb.snd_wnd = tcb.snd_wnd.saturating_sub(acked);
            false
        };
        tcb.snd_una = ack;
        if tcb.snd_nxt < tcb.snd_una {
            tcb.snd_nxt = tcb.snd_una;
        }

        match tcb.state {
            TcpState::FinWait1 if ourfinisacked => {
                if socket.state.contains(SocketState::FCANTRCVMORE) {
                    tcb.timers.arm(TimerKind::TwoMsl, TCP_MAXIDLE);
                }
                tcb.state = TcpState::FinWait2;
            },
            TcpState::Closing if ourfinisacked => {
                tcb.state = TcpState::TimeWait;
                tcb.timers.disarm_all();
                tcb.timers.arm(TimerKind::TwoMsl, 2 * TCPTV_MSL);
            },
            TcpState::LastAck if ourfinisacked => {
                debug!("input_synchronized(): {} last ACK received", sid);
                return self.close(sid);
            },
            TcpState::TimeWait => {
                tcb.timers.arm(TimerKind::TwoMsl, 2 * TCPTV_MSL);
                return self.drop_after_ack(sid, segment);
            },
            _ => (),
        }

        self.step6(sid, segment, needs_output)
    }

    /// Window update, data delivery and FIN processing, then output if anything is owed to the guest.
    fn step6(&mut self, sid: SocketId, mut segment: TcpSegment, mut needs_output: bool) -> Result<(), Fail> {
        let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
        let tcb: &mut ControlBlock = socket.tcb.as_mut().ok_or_else(no_tcb)?;
        let seq: SeqNumber = segment.tcp_hdr.seq_num;
        let ack: SeqNumber = segment.tcp_hdr.ack_num;
        let mut flags: TcpFlags = segment.tcp_hdr.flags;

        if flags.contains(TcpFlags::ACK) {
            let tiwin: u32 = if flags.contains(TcpFlags::SYN) {
                segment.tcp_hdr.window_size as u32
            } else {
                (segment.tcp_hdr.window_size as u32) << tcb.snd_scale
            };
            if tcb.snd_wl1 < seq
                || (tcb.snd_wl1 == seq && (tcb.snd_wl2 < ack || (tcb.snd_wl2 == ack && tiwin > tcb.snd_wnd)))
            {
                if segment.data.is_empty() && tcb.snd_wl2 == ack && tiwin > tcb.snd_wnd {
                    self.stats.rcvwinupd += 1;
                }
                tcb.snd_wnd = tiwin;
                tcb.snd_wl1 = seq;
                tcb.snd_wl2 = ack;
                tcb.max_sndwnd = tcb.max_sndwnd.max(tiwin);
                needs_output = true;
            }
        }

        let mut deliver: Vec<u8> = Vec::new();
        if (!segment.data.is_empty() || flags.contains(TcpFlags::FIN)) && !tcb.state.have_received_fin() {
            if seq == tcb.rcv_nxt && tcb.reassembly.is_empty() && tcb.state == TcpState::Established {
                tcb.flags.insert(TcbFlags::DELACK);
                tcb.rcv_nxt = tcb.rcv_nxt + segment.data.len() as u32;
                self.stats.rcvpack += 1;
                self.stats.rcvbyte += segment.data.len() as u64;
                deliver = mem::take(&mut segment.data);
            } else {
                if seq != tcb.rcv_nxt {
                    self.stats.rcvoopack += 1;
                }
                let data: Vec<u8> = mem::take(&mut segment.data);
                tcb.reassembly.insert(seq, data, flags.contains(TcpFlags::FIN));
                flags.remove(TcpFlags::FIN);
                if tcb.state >= TcpState::Established {
                    let (bytes, fin): (Vec<u8>, bool) = tcb.reassembly.take_in_order(tcb.rcv_nxt);
                    tcb.rcv_nxt = tcb.rcv_nxt + bytes.len() as u32;
                    if !bytes.is_empty() {
                        self.stats.rcvpack += 1;
                        self.stats.rcvbyte += bytes.len() as u64;
                    }
                    if fin {
                        flags.insert(TcpFlags::FIN);
                    }
                    deliver = bytes;
                }
                tcb.flags.insert(TcbFlags::ACKNOW);
            }
        } else {
            flags.remove(TcpFlags::FIN);
        }

        if !deliver.is_empty() {
            self.deliver_to_host(sid, deliver)?;
        }

        if flags.contains(TcpFlags::FIN) {
            let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
            let state: TcpState = socket.tcb.as_ref().ok_or_else(no_tcb)?.state;
            if !state.have_received_fin() {
                self.sofwdrain(sid)?;
                let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
                tcb.flags.insert(TcbFlags::ACKNOW);
                tcb.rcv_nxt = tcb.rcv_nxt + 1;
            }
            let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
            match tcb.state {
                TcpState::SynReceived | TcpState::Established => tcb.state = TcpState::CloseWait,
                TcpState::FinWait1 => tcb.state = TcpState::Closing,
                TcpState::FinWait2 => {
                    tcb.state = TcpState::TimeWait;
                    tcb.timers.disarm_all();
                    tcb.timers.arm(TimerKind::TwoMsl, 2 * TCPTV_MSL);
                },
                TcpState::TimeWait => tcb.timers.arm(TimerKind::TwoMsl, 2 * TCPTV_MSL),
                _ => (),
            }
            debug!("step6(): {} FIN from the guest, now {:?}", sid, tcb.state);
        }

        if needs_output || self.tcb_mut(sid)?.flags.contains(TcbFlags::ACKNOW) {
            self.tcp_output(sid)?;
        }
        Ok(())
    }

    /// Hands in-order guest payload to the host side, through the connection's protocol helper if it has one.
    fn deliver_to_host(&mut self, sid: SocketId, data: Vec<u8>) -> Result<(), Fail> {
        let socket: &mut Socket = self.socket_mut(sid)?;
        let data: Vec<u8> = if socket.emu.is_active() {
            let ctx: EmuContext = socket.emu_context();
            let mut helper: Emulation = mem::take(&mut socket.emu);
            let rewritten: Vec<u8> = emu::emulate(&mut helper, &ctx, data, self);
            self.socket_mut(sid)?.emu = helper;
            rewritten
        } else {
            data
        };
        self.socket_mut(sid)?.rcv.extend(&data);
        if let Err(e) = self.flush_to_host(sid) {
            // Left buffered for the next poll of the host socket.
            warn!("deliver_to_host(): {} write to host failed ({:?})", sid, e);
        }
        Ok(())
    }

    /// Applies the MSS and window scale options of a SYN.
    fn apply_syn_options(&mut self, sid: SocketId, segment: &TcpSegment) -> Result<(), Fail> {
        if !segment.tcp_hdr.flags.contains(TcpFlags::SYN) {
            return Ok(());
        }
        if let Some(scale) = segment.tcp_hdr.get_window_scale() {
            let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
            tcb.flags.insert(TcbFlags::RCVD_SCALE);
            tcb.requested_s_scale = scale.min(TCP_MAX_WINSHIFT);
        }
        self.tcp_mss(sid, segment.tcp_hdr.get_mss().unwrap_or(0))?;
        Ok(())
    }

    /// Acknowledges a segment that is otherwise dropped.
    fn drop_after_ack(&mut self, sid: SocketId, segment: TcpSegment) -> Result<(), Fail> {
        if segment.tcp_hdr.flags.contains(TcpFlags::RST) {
            return Ok(());
        }
        self.tcb_mut(sid)?.flags.insert(TcbFlags::ACKNOW);
        self.tcp_output(sid)
    }

    /// Answers a segment with a reset, unless it is one.
    pub(super) fn drop_with_reset(&mut self, tcb: Option<SocketId>, segment: TcpSegment) -> Result<(), Fail> {
        let flags: TcpFlags = segment.tcp_hdr.flags;
        if flags.contains(TcpFlags::RST) {
            return Ok(());
        }
        let tcb: Option<SocketId> = tcb.filter(|sid| self.get_tcb(*sid).is_some());
        if flags.contains(TcpFlags::ACK) {
            let seq: SeqNumber = segment.tcp_hdr.ack_num;
            self.respond(tcb, Some(segment), SeqNumber::from(0), seq, TcpFlags::RST)
        } else {
            let mut len: u32 = segment.data.len() as u32;
            if flags.contains(TcpFlags::SYN) {
                len += 1;
            }
            let ack: SeqNumber = segment.tcp_hdr.seq_num + len;
            self.respond(tcb, Some(segment), ack, SeqNumber::from(0), TcpFlags::RST | TcpFlags::ACK)
        }
    }
}
