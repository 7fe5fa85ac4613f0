// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::arrayvec::ArrayVec;

//======================================================================================================================
// Constants
//======================================================================================================================

pub const NUM_TIMERS: usize = 4;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Per-connection protocol timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Retransmission of unacknowledged data.
    Retransmit,
    /// Probes of a zero window.
    Persist,
    /// Connection establishment and idle probing.
    Keepalive,
    /// TIME_WAIT and FIN_WAIT_2 reaping.
    TwoMsl,
}

/// Countdown values, in slow ticks, of each timer kind. Zero means disarmed, so each kind has at most one pending
/// instance.
#[derive(Debug, Clone, Default)]
pub struct Timers {
    remaining: [u32; NUM_TIMERS],
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TimerKind {
    const ALL: [TimerKind; NUM_TIMERS] = [
        TimerKind::Retransmit,
        TimerKind::Persist,
        TimerKind::Keepalive,
        TimerKind::TwoMsl,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl Timers {
    /// Arms a timer to fire after `ticks` slow ticks, replacing any pending instance.
    pub fn arm(&mut self, kind: TimerKind, ticks: u32) {
        self.remaining[kind.index()] = ticks;
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        self.remaining[kind.index()] = 0;
    }

    pub fn disarm_all(&mut self) {
        self.remaining = [0; NUM_TIMERS];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.remaining[kind.index()] != 0
    }

    pub fn remaining(&self, kind: TimerKind) -> u32 {
        self.remaining[kind.index()]
    }

    /// Counts down every armed timer by one slow tick and returns the kinds that expired.
    pub fn tick(&mut self) -> ArrayVec<TimerKind, NUM_TIMERS> {
        let mut expired: ArrayVec<TimerKind, NUM_TIMERS> = ArrayVec::new();
        for kind in TimerKind::ALL {
            let remaining: &mut u32 = &mut self.remaining[kind.index()];
            if *remaining != 0 {
                *remaining -= 1;
                if *remaining == 0 {
                    expired.push(kind);
                }
            }
        }
        expired
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
