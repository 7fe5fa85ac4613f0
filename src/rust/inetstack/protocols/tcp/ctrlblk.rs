// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        constants::{
            TCPTV_PERSMAX,
            TCPTV_PERSMIN,
            TCP_BACKOFF,
            TCP_MAXRXTSHIFT,
            TCP_MAXWIN,
            TCP_MAX_WINSHIFT,
        },
        reassembly::ReassemblyQueue,
        rto::RtoCalculator,
        socket::SocketId,
        template::HeaderTemplate,
        timers::{
            TimerKind,
            Timers,
        },
        SeqNumber,
        TcpState,
    },
    runtime::network::config::TcpConfig,
};
use ::std::{
    ops::BitOr,
    time::Instant,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Control bits of a TCB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TcbFlags(u8);

/// TCP Control Block.
///
/// Everything the state machine knows about one connection. The block belongs to exactly one socket record and
/// names it through `socket`, a handle that is never used to reach the record without going through the peer.
#[derive(Debug)]
pub struct ControlBlock {
    pub(super) socket: SocketId,
    pub(super) state: TcpState,
    pub(super) flags: TcbFlags,

    // Send sequence space.
    pub(super) iss: SeqNumber,
    pub(super) snd_una: SeqNumber,
    pub(super) snd_nxt: SeqNumber,
    pub(super) snd_max: SeqNumber,
    pub(super) snd_wnd: u32,
    pub(super) snd_wl1: SeqNumber,
    pub(super) snd_wl2: SeqNumber,
    pub(super) max_sndwnd: u32,

    // Receive sequence space.
    pub(super) irs: SeqNumber,
    pub(super) rcv_nxt: SeqNumber,
    pub(super) rcv_wnd: u32,
    pub(super) rcv_adv: SeqNumber,

    // Congestion control.
    pub(super) snd_cwnd: u32,
    pub(super) snd_ssthresh: u32,
    pub(super) dupacks: u32,

    pub(super) maxseg: usize,
    pub(super) snd_scale: u8,
    pub(super) rcv_scale: u8,
    pub(super) request_r_scale: u8,
    pub(super) requested_s_scale: u8,

    // Retransmission.
    pub(super) rxtshift: usize,
    pub(super) rxtcur: u32,
    pub(super) rtt: Option<(SeqNumber, Instant)>,
    pub(super) rto: RtoCalculator,

    /// Slow ticks since the last segment from the guest.
    pub(super) idle: u32,
    pub(super) timers: Timers,
    pub(super) reassembly: ReassemblyQueue,
    pub(super) template: Option<HeaderTemplate>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TcbFlags {
    /// Send an ACK right away.
    pub const ACKNOW: TcbFlags = TcbFlags(0x01);
    /// ACK owed on the next fast tick.
    pub const DELACK: TcbFlags = TcbFlags(0x02);
    /// FIN has been sent.
    pub const SENTFIN: TcbFlags = TcbFlags(0x04);
    /// Window scaling requested in our SYN.
    pub const REQ_SCALE: TcbFlags = TcbFlags(0x08);
    /// Window scaling offered by the guest.
    pub const RCVD_SCALE: TcbFlags = TcbFlags(0x10);
    /// Send even into a closed window (persist probes).
    pub const FORCE: TcbFlags = TcbFlags(0x20);

    pub const fn contains(self, other: TcbFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: TcbFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TcbFlags) {
        self.0 &= !other.0;
    }
}

impl ControlBlock {
    /// Creates a closed control block for `socket`.
    pub fn new(socket: SocketId, config: &TcpConfig) -> Self {
        let mut flags: TcbFlags = TcbFlags::default();
        let request_r_scale: u8 = config.get_window_scale();
        if request_r_scale > 0 {
            flags.insert(TcbFlags::REQ_SCALE);
        }
        let rto: RtoCalculator = RtoCalculator::new();
        let rxtcur: u32 = rto.rto_ticks();
        Self {
            socket,
            state: TcpState::Closed,
            flags,
            iss: SeqNumber::default(),
            snd_una: SeqNumber::default(),
            snd_nxt: SeqNumber::default(),
            snd_max: SeqNumber::default(),
            snd_wnd: 0,
            snd_wl1: SeqNumber::default(),
            snd_wl2: SeqNumber::default(),
            max_sndwnd: 0,
            irs: SeqNumber::default(),
            rcv_nxt: SeqNumber::default(),
            rcv_wnd: 0,
            rcv_adv: SeqNumber::default(),
            snd_cwnd: TCP_MAXWIN << TCP_MAX_WINSHIFT,
            snd_ssthresh: TCP_MAXWIN << TCP_MAX_WINSHIFT,
            dupacks: 0,
            maxseg: config.get_advertised_mss(),
            snd_scale: 0,
            rcv_scale: 0,
            request_r_scale,
            requested_s_scale: 0,
            rxtshift: 0,
            rxtcur,
            rtt: None,
            rto,
            idle: 0,
            timers: Timers::default(),
            reassembly: ReassemblyQueue::default(),
            template: None,
        }
    }

    pub fn get_socket(&self) -> SocketId {
        self.socket
    }

    pub fn get_state(&self) -> TcpState {
        self.state
    }

    pub fn get_iss(&self) -> SeqNumber {
        self.iss
    }

    pub fn get_snd_una(&self) -> SeqNumber {
        self.snd_una
    }

    pub fn get_snd_nxt(&self) -> SeqNumber {
        self.snd_nxt
    }

    pub fn get_snd_max(&self) -> SeqNumber {
        self.snd_max
    }

    pub fn get_snd_wnd(&self) -> u32 {
        self.snd_wnd
    }

    pub fn get_rcv_nxt(&self) -> SeqNumber {
        self.rcv_nxt
    }

    pub fn get_cwnd(&self) -> u32 {
        self.snd_cwnd
    }

    pub fn get_ssthresh(&self) -> u32 {
        self.snd_ssthresh
    }

    pub fn get_mss(&self) -> usize {
        self.maxseg
    }

    pub fn get_rto(&self) -> &RtoCalculator {
        &self.rto
    }

    pub fn get_timers(&self) -> &Timers {
        &self.timers
    }

    pub fn get_reassembly(&self) -> &ReassemblyQueue {
        &self.reassembly
    }

    pub fn get_template(&self) -> Option<&HeaderTemplate> {
        self.template.as_ref()
    }

    /// Initializes the send sequence space from our initial sequence number.
    pub(super) fn send_seq_init(&mut self, iss: SeqNumber) {
        self.iss = iss;
        self.snd_una = iss;
        self.snd_nxt = iss;
        self.snd_max = iss;
    }

    /// Initializes the receive sequence space from the guest's initial sequence number.
    pub(super) fn recv_seq_init(&mut self, irs: SeqNumber) {
        self.irs = irs;
        self.rcv_nxt = irs + 1;
        self.rcv_adv = self.rcv_nxt;
    }

    /// Applies window scaling once both SYNs carried the option.
    pub(super) fn negotiate_scaling(&mut self) {
        if self.flags.contains(TcbFlags::REQ_SCALE | TcbFlags::RCVD_SCALE) {
            self.snd_scale = self.requested_s_scale;
            self.rcv_scale = self.request_r_scale;
        }
    }

    /// Feeds the round trip of the timed segment to the estimator.
    pub(super) fn xmit_timer(&mut self, now: Instant) {
        if let Some((_, start)) = self.rtt.take() {
            self.rto.add_sample(now.saturating_duration_since(start));
            trace!(
                "xmit_timer(): srtt={:?} rttvar={:?} rto={:?}",
                self.rto.srtt(),
                self.rto.rttvar(),
                self.rto.rto()
            );
        }
        self.rxtshift = 0;
        self.rxtcur = self.rto.rto_ticks();
    }

    /// Arms the persist timer with the backed-off retransmission timeout.
    pub(super) fn set_persist(&mut self) {
        debug_assert!(!self.timers.is_armed(TimerKind::Retransmit));
        let ticks: u32 = (self.rto.rto_ticks() * TCP_BACKOFF[self.rxtshift]).clamp(TCPTV_PERSMIN, TCPTV_PERSMAX);
        self.timers.arm(TimerKind::Persist, ticks);
        if self.rxtshift < TCP_MAXRXTSHIFT {
            self.rxtshift += 1;
        }
    }

    /// Largest window we can advertise.
    pub(super) fn max_rcv_window(&self) -> u32 {
        TCP_MAXWIN << self.rcv_scale
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl BitOr for TcbFlags {
    type Output = TcbFlags;

    fn bitor(self, rhs: TcbFlags) -> TcbFlags {
        TcbFlags(self.0 | rhs.0)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
