// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        constants::{
            TCPTV_KEEPINTVL,
            TCPTV_KEEP_IDLE,
            TCPTV_MIN,
            TCPTV_REXMTMAX,
            TCP_BACKOFF,
            TCP_MAXIDLE,
            TCP_MAXRXTSHIFT,
        },
        ctrlblk::{
            ControlBlock,
            TcbFlags,
        },
        peer::{
            no_tcb,
            socket_in,
            TcpPeer,
        },
        segment::TcpFlags,
        socket::SocketId,
        timers::{
            TimerKind,
            NUM_TIMERS,
        },
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
use ::arrayvec::ArrayVec;
use ::libc::ETIMEDOUT;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<N: NetworkRuntime, H: HostSockets, P: ProxyManager> TcpPeer<N, H, P> {
    /// Fast tick: sends the ACKs that were delayed.
    pub fn fast_timer(&mut self) {
        for sid in self.connections.clone() {
            let Ok(tcb) = self.tcb_mut(sid) else {
                continue;
            };
            if tcb.flags.contains(TcbFlags::DELACK) {
                tcb.flags.remove(TcbFlags::DELACK);
                tcb.flags.insert(TcbFlags::ACKNOW);
                self.stats.delack += 1;
                if let Err(e) = self.tcp_output(sid) {
                    warn!("fast_timer(): {} delayed ACK failed ({:?})", sid, e);
                }
            }
        }
    }

    /// Slow tick: counts down the protocol timers of every connection and runs the ones that expire.
    pub fn slow_timer(&mut self) {
        for sid in self.connections.clone() {
            let expired: ArrayVec<TimerKind, NUM_TIMERS> = {
                let Ok(tcb) = self.tcb_mut(sid) else {
                    continue;
                };
                let expired: ArrayVec<TimerKind, NUM_TIMERS> = tcb.timers.tick();
                tcb.idle = tcb.idle.saturating_add(1);
                expired
            };
            for kind in expired {
                // An earlier timer may have closed the connection.
                if self.get_tcb(sid).is_none() {
                    break;
                }
                if let Err(e) = self.timer_expired(sid, kind) {
                    warn!("slow_timer(): {} {:?} timer failed ({:?})", sid, kind, e);
                }
            }
        }
        self.isn_generator.tick();
    }

    fn timer_expired(&mut self, sid: SocketId, kind: TimerKind) -> Result<(), Fail> {
        trace!("timer_expired(): {} {:?}", sid, kind);
        match kind {
            TimerKind::Retransmit => self.retransmit_timeout(sid),
            TimerKind::Persist => {
                self.stats.persisttimeo += 1;
                let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
                tcb.set_persist();
                tcb.flags.insert(TcbFlags::FORCE);
                let result: Result<(), Fail> = self.tcp_output(sid);
                if let Ok(tcb) = self.tcb_mut(sid) {
                    tcb.flags.remove(TcbFlags::FORCE);
                }
                result
            },
            TimerKind::Keepalive => self.keepalive_timeout(sid),
            TimerKind::TwoMsl => {
                let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
                if tcb.state != TcpState::TimeWait && tcb.idle <= TCP_MAXIDLE {
                    tcb.timers.arm(TimerKind::TwoMsl, TCPTV_KEEPINTVL);
                    Ok(())
                } else {
                    debug!("timer_expired(): {} 2MSL expired in {:?}", sid, tcb.state);
                    self.close(sid)
                }
            },
        }
    }

    /// Backs off and retransmits from the oldest unacknowledged byte, or gives up after too many attempts.
    fn retransmit_timeout(&mut self, sid: SocketId) -> Result<(), Fail> {
        let tcb: &mut ControlBlock = socket_in(&mut self.sockets, sid)?.tcb.as_mut().ok_or_else(no_tcb)?;
        tcb.rxtshift += 1;
        if tcb.rxtshift > TCP_MAXRXTSHIFT {
            tcb.rxtshift = TCP_MAXRXTSHIFT;
            self.stats.timeoutdrop += 1;
            return self.drop_connection(sid, Fail::new(ETIMEDOUT, "retransmission limit reached"));
        }
        self.stats.rexmttimeo += 1;

        let rexmt: u32 = tcb.rto.rto_ticks() * TCP_BACKOFF[tcb.rxtshift];
        tcb.rxtcur = rexmt.clamp(TCPTV_MIN, TCPTV_REXMTMAX);
        tcb.timers.arm(TimerKind::Retransmit, tcb.rxtcur);
        if tcb.rxtshift > TCP_MAXRXTSHIFT / 4 {
            // The estimate is probably wrong; fall back on the variance alone.
            tcb.rto.reset_after_backoff();
        }
        tcb.snd_nxt = tcb.snd_una;
        tcb.rtt = None;

        // Congestion: halve the usable window into the threshold and slow start from one segment.
        let maxseg: u32 = tcb.maxseg as u32;
        let win: u32 = (tcb.snd_wnd.min(tcb.snd_cwnd) / 2 / maxseg).max(2);
        tcb.snd_cwnd = maxseg;
        tcb.snd_ssthresh = win * maxseg;
        tcb.dupacks = 0;
        debug!("retransmit_timeout(): {} attempt {} rxtcur={}", sid, tcb.rxtshift, tcb.rxtcur);

        self.tcp_output(sid)
    }

    /// Drops connections that never got established, and probes idle ones if keepalive is on.
    fn keepalive_timeout(&mut self, sid: SocketId) -> Result<(), Fail> {
        let keepalive: bool = self.tcp_config.get_keepalive();
        let tcb: &mut ControlBlock = socket_in(&mut self.sockets, sid)?.tcb.as_mut().ok_or_else(no_tcb)?;
        if tcb.state < TcpState::Established {
            self.stats.keepdrops += 1;
            return self.drop_connection(sid, Fail::new(ETIMEDOUT, "connection establishment timed out"));
        }
        if !keepalive || tcb.state > TcpState::CloseWait {
            tcb.timers.arm(TimerKind::Keepalive, TCPTV_KEEP_IDLE);
            return Ok(());
        }
        if tcb.idle >= TCPTV_KEEP_IDLE + TCP_MAXIDLE {
            self.stats.keepdrops += 1;
            return self.drop_connection(sid, Fail::new(ETIMEDOUT, "keepalive probes unanswered"));
        }

        // Probe with an old sequence number so the guest has to answer with an ACK.
        let ack: SeqNumber = tcb.rcv_nxt;
        let seq: SeqNumber = tcb.snd_una.rewind(1);
        tcb.timers.arm(TimerKind::Keepalive, TCPTV_KEEPINTVL);
        trace!("keepalive_timeout(): {} probing", sid);
        self.respond(Some(sid), None, ack, seq, TcpFlags::ACK)
    }
}
