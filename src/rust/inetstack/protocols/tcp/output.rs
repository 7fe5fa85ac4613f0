// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        ctrlblk::{
            ControlBlock,
            TcbFlags,
        },
        peer::{
            no_tcb,
            socket_in,
            TcpPeer,
        },
        segment::{
            TcpFlags,
            TcpOption,
            TcpSegment,
        },
        socket::{
            Socket,
            SocketId,
        },
        stats::TcpStats,
        template::HeaderTemplate,
        timers::TimerKind,
        SeqNumber,
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
use ::libc::ENOTCONN;
use ::std::time::Instant;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<N: NetworkRuntime, H: HostSockets, P: ProxyManager> TcpPeer<N, H, P> {
    /// Sends whatever the connection owes the guest: data from the send buffer within the usable window, control
    /// bits of the current state, window updates and acknowledgements. Sends nothing if nothing is due, arming the
    /// persist timer when data waits behind a closed window.
    pub fn tcp_output(&mut self, sid: SocketId) -> Result<(), Fail> {
        let now: Instant = self.clock.now();
        {
            let tcb: &mut ControlBlock = self.tcb_mut(sid)?;
            // Restart slow start after an idle period.
            if tcb.snd_max == tcb.snd_una && tcb.idle >= tcb.rxtcur {
                tcb.snd_cwnd = tcb.maxseg as u32;
            }
        }

        loop {
            let socket: &mut Socket = socket_in(&mut self.sockets, sid)?;
            let Some((segment, sendalot)) = next_segment(socket, &mut self.stats, now)? else {
                return Ok(());
            };
            trace!(
                "tcp_output(): {} seq={} ack={} flags={:?} win={} len={}",
                sid,
                segment.tcp_hdr.seq_num,
                segment.tcp_hdr.ack_num,
                segment.tcp_hdr.flags,
                segment.tcp_hdr.window_size,
                segment.data.len()
            );
            self.transmit(Some(sid), segment);
            if !sendalot {
                return Ok(());
            }
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Builds the next segment of a connection, if one is due, and advances the send state past it. The flag is set when
/// more data is ready to go right after it.
fn next_segment(socket: &mut Socket, stats: &mut TcpStats, now: Instant) -> Result<Option<(TcpSegment, bool)>, Fail> {
    let tcb: &mut ControlBlock = socket.tcb.as_mut().ok_or_else(no_tcb)?;
    let maxseg: i64 = tcb.maxseg as i64;
    let buffered: i64 = socket.snd.len() as i64;
    let off: i64 = (tcb.snd_nxt - tcb.snd_una) as i64;
    let mut win: i64 = tcb.snd_wnd.min(tcb.snd_cwnd) as i64;
    let mut flags: TcpFlags = tcb.state.outflags();

    if tcb.flags.contains(TcbFlags::FORCE) {
        if win == 0 {
            // Probe a closed window with one byte; the FIN waits if data remains.
            if off < buffered {
                flags.remove(TcpFlags::FIN);
            }
            win = 1;
        } else {
            tcb.timers.disarm(TimerKind::Persist);
            tcb.rxtshift = 0;
        }
    }

    let mut len: i64 = buffered.min(win) - off;
    if len < 0 {
        len = 0;
        if win == 0 {
            tcb.timers.disarm(TimerKind::Retransmit);
            tcb.snd_nxt = tcb.snd_una;
        }
    }
    let mut sendalot: bool = false;
    if len > maxseg {
        len = maxseg;
        sendalot = true;
    }
    if off + len < buffered {
        flags.remove(TcpFlags::FIN);
    }

    let space: i64 = socket.rcv.space() as i64;
    let max_rcv_window: i64 = tcb.max_rcv_window() as i64;
    let advertised: i64 = (tcb.rcv_adv - tcb.rcv_nxt) as i64;

    let due: bool = (len > 0
        && (len == maxseg
            || off + len >= buffered
            || tcb.flags.contains(TcbFlags::FORCE)
            || (tcb.max_sndwnd > 0 && len >= tcb.max_sndwnd as i64 / 2)
            || tcb.snd_nxt < tcb.snd_max))
        || (space > 0 && {
            let adv: i64 = space.min(max_rcv_window) - advertised;
            adv >= 2 * maxseg || 2 * adv >= socket.rcv.capacity() as i64
        })
        || tcb.flags.contains(TcbFlags::ACKNOW)
        || flags.intersects(TcpFlags::SYN | TcpFlags::RST)
        || (flags.contains(TcpFlags::FIN) && (!tcb.flags.contains(TcbFlags::SENTFIN) || tcb.snd_nxt == tcb.snd_una));

    if !due {
        if buffered > 0 && !tcb.timers.is_armed(TimerKind::Retransmit) && !tcb.timers.is_armed(TimerKind::Persist) {
            tcb.rxtshift = 0;
            tcb.set_persist();
        }
        return Ok(None);
    }

    let mut options: Vec<TcpOption> = Vec::new();
    if flags.contains(TcpFlags::SYN) {
        tcb.snd_nxt = tcb.iss;
        options.push(TcpOption::MaximumSegmentSize(tcb.maxseg.min(u16::MAX as usize) as u16));
        if tcb.flags.contains(TcbFlags::REQ_SCALE)
            && (!flags.contains(TcpFlags::ACK) || tcb.flags.contains(TcbFlags::RCVD_SCALE))
        {
            options.push(TcpOption::WindowScale(tcb.request_r_scale));
        }
    }

    let data: Vec<u8> = if len > 0 {
        if tcb.flags.contains(TcbFlags::FORCE) && len == 1 {
            stats.sndprobe += 1;
        } else if tcb.snd_nxt < tcb.snd_max {
            stats.sndrexmitpack += 1;
            stats.sndrexmitbyte += len as u64;
        } else {
            stats.sndpack += 1;
            stats.sndbyte += len as u64;
        }
        if off + len == buffered {
            flags.insert(TcpFlags::PSH);
        }
        socket.snd.peek(off as usize, len as usize)
    } else {
        if tcb.flags.contains(TcbFlags::ACKNOW) {
            stats.sndacks += 1;
        } else if flags.intersects(TcpFlags::SYN | TcpFlags::FIN | TcpFlags::RST) {
            stats.sndctrl += 1;
        }
        Vec::new()
    };

    // A retransmitted FIN reuses its sequence number.
    if flags.contains(TcpFlags::FIN) && tcb.flags.contains(TcbFlags::SENTFIN) && tcb.snd_nxt == tcb.snd_max {
        tcb.snd_nxt = tcb.snd_nxt.rewind(1);
    }
    let seq: SeqNumber = if len > 0
        || flags.intersects(TcpFlags::SYN | TcpFlags::FIN)
        || tcb.timers.is_armed(TimerKind::Persist)
    {
        tcb.snd_nxt
    } else {
        tcb.snd_max
    };

    // Receive window: no silly windows, no more than the scale allows, never shrinking what was advertised.
    let mut rwin: i64 = space;
    if rwin < socket.rcv.capacity() as i64 / 4 && rwin < maxseg {
        rwin = 0;
    }
    rwin = rwin.min(max_rcv_window).max(advertised);

    let template: &HeaderTemplate = tcb
        .template
        .as_ref()
        .ok_or_else(|| Fail::new(ENOTCONN, "connection has no header template"))?;
    let mut segment: TcpSegment = template.segment(seq, tcb.rcv_nxt, flags, (rwin >> tcb.rcv_scale) as u16, data);
    for option in options {
        segment.tcp_hdr.push_option(option);
    }

    if !tcb.flags.contains(TcbFlags::FORCE) || !tcb.timers.is_armed(TimerKind::Persist) {
        let startseq: SeqNumber = tcb.snd_nxt;
        if flags.contains(TcpFlags::SYN) {
            tcb.snd_nxt = tcb.snd_nxt + 1;
        }
        if flags.contains(TcpFlags::FIN) {
            tcb.snd_nxt = tcb.snd_nxt + 1;
            tcb.flags.insert(TcbFlags::SENTFIN);
        }
        tcb.snd_nxt = tcb.snd_nxt + len as u32;
        if tcb.snd_nxt > tcb.snd_max {
            tcb.snd_max = tcb.snd_nxt;
            if tcb.rtt.is_none() {
                tcb.rtt = Some((startseq, now));
                stats.segstimed += 1;
            }
        }
        if !tcb.timers.is_armed(TimerKind::Retransmit) && tcb.snd_nxt != tcb.snd_una {
            tcb.timers.arm(TimerKind::Retransmit, tcb.rxtcur);
            if tcb.timers.is_armed(TimerKind::Persist) {
                tcb.timers.disarm(TimerKind::Persist);
                tcb.rxtshift = 0;
            }
        }
    } else if tcb.snd_nxt + len as u32 > tcb.snd_max {
        tcb.snd_max = tcb.snd_nxt + len as u32;
    }

    if rwin > 0 && tcb.rcv_nxt + rwin as u32 > tcb.rcv_adv {
        tcb.rcv_adv = tcb.rcv_nxt + rwin as u32;
    }
    tcb.flags.remove(TcbFlags::ACKNOW | TcbFlags::DELACK);

    Ok(Some((segment, sendalot)))
}
