// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::time::{
    Duration,
    Instant,
};

//==============================================================================
// Constants
//==============================================================================

/// Period of the fast timer (delayed acknowledgements).
pub const FAST_TICK: Duration = Duration::from_millis(200);

/// Period of the slow timer (retransmission, persist, keepalive and 2MSL timers).
pub const SLOW_TICK: Duration = Duration::from_millis(500);

//==============================================================================
// Structures
//==============================================================================

/// Number of timer ticks that elapsed in a single clock advance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ElapsedTicks {
    pub fast: usize,
    pub slow: usize,
}

/// Clock that converts wall time into the periodic fast and slow ticks that drive protocol timers.
#[derive(Debug)]
pub struct Timer {
    now: Instant,
    next_fast: Instant,
    next_slow: Instant,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl Timer {
    pub fn new(now: Instant) -> Self {
        Self {
            now,
            next_fast: now + FAST_TICK,
            next_slow: now + SLOW_TICK,
        }
    }

    /// Moves the clock forward and reports how many ticks of each kind are due.
    pub fn advance_clock(&mut self, now: Instant) -> ElapsedTicks {
        assert!(self.now <= now);

        let mut ticks: ElapsedTicks = ElapsedTicks::default();
        while self.next_fast <= now {
            ticks.fast += 1;
            self.next_fast += FAST_TICK;
        }
        while self.next_slow <= now {
            ticks.slow += 1;
            self.next_slow += SLOW_TICK;
        }
        self.now = now;

        ticks
    }

    pub fn now(&self) -> Instant {
        self.now
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
