// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::constants::{
    TCPTV_MIN,
    TCPTV_REXMTMAX,
    TCPTV_SRTTDFLT,
};
use ::std::time::Duration;

// TCP Retransmission Timeout (RTO) Calculator.
// See RFC 6298 for details. Times are kept in microseconds.

const MICROS_PER_TICK: u64 = 500_000;

/// RTO before the first sample.
const INITIAL_RTO_MICROS: u64 = TCPTV_SRTTDFLT as u64 * MICROS_PER_TICK;

/// RTO bounds.
const LOWER_BOUND_MICROS: u64 = TCPTV_MIN as u64 * MICROS_PER_TICK;
const UPPER_BOUND_MICROS: u64 = TCPTV_REXMTMAX as u64 * MICROS_PER_TICK;

/// Clock granularity.
const GRANULARITY_MICROS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct RtoCalculator {
    // Smoothed round-trip time.
    srtt: u64,

    // Round-trip time variation.
    rttvar: u64,

    // Retransmission timeout.
    rto: u64,

    // Whether a RTT (round-trip-time) sample has been received yet.
    received_sample: bool,
}

impl RtoCalculator {
    pub fn new() -> Self {
        Self {
            srtt: 0,
            rttvar: 0,
            rto: INITIAL_RTO_MICROS,
            received_sample: false,
        }
    }

    /// Adds an RTT sample to the calculator.
    pub fn add_sample(&mut self, rtt: Duration) {
        let rtt: u64 = rtt.as_micros().min(u64::MAX as u128) as u64;

        if !self.received_sample {
            // RFC 6298 Section 2.2.
            self.srtt = rtt;
            self.rttvar = rtt / 2;
            self.received_sample = true;
        } else {
            // RFC 6298 Section 2.3 with alpha = 1/8 and beta = 1/4.
            let delta: u64 = self.srtt.abs_diff(rtt);
            self.rttvar = (3 * self.rttvar + delta) / 4;
            self.srtt = (7 * self.srtt + rtt) / 8;
        }

        self.rto = (self.srtt + GRANULARITY_MICROS.max(4 * self.rttvar)).clamp(LOWER_BOUND_MICROS, UPPER_BOUND_MICROS);
    }

    /// Forgets the smoothed estimate after repeated timeouts so that the next sample re-seeds it, keeping the
    /// variance as a safety margin (RFC 6298 Section 5).
    pub fn reset_after_backoff(&mut self) {
        if self.received_sample {
            self.rttvar += self.srtt / 4;
            self.srtt = 0;
            self.received_sample = false;
        }
    }

    pub fn has_sample(&self) -> bool {
        self.received_sample
    }

    pub fn srtt(&self) -> Duration {
        Duration::from_micros(self.srtt)
    }

    pub fn rttvar(&self) -> Duration {
        Duration::from_micros(self.rttvar)
    }

    pub fn rto(&self) -> Duration {
        Duration::from_micros(self.rto)
    }

    /// Current RTO in slow ticks, rounded up.
    pub fn rto_ticks(&self) -> u32 {
        ((self.rto + MICROS_PER_TICK - 1) / MICROS_PER_TICK) as u32
    }
}

impl Default for RtoCalculator {
    fn default() -> Self {
        Self::new()
    }
}
