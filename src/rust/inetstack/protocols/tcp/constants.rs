// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Constants
//======================================================================================================================

// Timer values are counted in slow ticks.

/// Slow ticks per second.
pub const PR_SLOWHZ: u32 = 2;

/// Maximum segment lifetime.
pub const TCPTV_MSL: u32 = 5 * PR_SLOWHZ;

/// Minimum retransmission timeout.
pub const TCPTV_MIN: u32 = PR_SLOWHZ;

/// Maximum retransmission timeout.
pub const TCPTV_REXMTMAX: u32 = 12 * PR_SLOWHZ;

/// Retransmission timeout used before the first round-trip sample.
pub const TCPTV_SRTTDFLT: u32 = 3 * PR_SLOWHZ;

/// Bounds of the persist timer.
pub const TCPTV_PERSMIN: u32 = 5 * PR_SLOWHZ;
pub const TCPTV_PERSMAX: u32 = 60 * PR_SLOWHZ;

/// Time allowed to establish a connection.
pub const TCPTV_KEEP_INIT: u32 = 75 * PR_SLOWHZ;

/// Idle time before the first keepalive probe.
pub const TCPTV_KEEP_IDLE: u32 = 120 * 60 * PR_SLOWHZ;

/// Interval between keepalive probes.
pub const TCPTV_KEEPINTVL: u32 = 75 * PR_SLOWHZ;

/// Unanswered keepalive probes before a connection is dropped.
pub const TCPTV_KEEPCNT: u32 = 8;

/// Idle time after which a connection that stopped answering probes is dropped.
pub const TCP_MAXIDLE: u32 = TCPTV_KEEPCNT * TCPTV_KEEPINTVL;

/// Retransmissions before a connection is dropped.
pub const TCP_MAXRXTSHIFT: usize = 12;

/// Duplicate acknowledgements that trigger a fast retransmit.
pub const TCP_REXMTTHRESH: u32 = 3;

/// Retransmission back-off multipliers, indexed by retransmission count.
pub const TCP_BACKOFF: [u32; TCP_MAXRXTSHIFT + 1] = [1, 2, 4, 8, 16, 32, 64, 64, 64, 64, 64, 64, 64];

/// Largest unscaled window.
pub const TCP_MAXWIN: u32 = 65535;

/// Largest window shift (RFC 7323).
pub const TCP_MAX_WINSHIFT: u8 = 14;

/// Initial send sequence increment per second.
pub const TCP_ISSINCR: u32 = 125 * 1024;

/// Largest number of out-of-order segments held per connection.
pub const MAX_OUT_OF_ORDER: usize = 16;

/// Time to live of reset segments.
pub const RST_TTL: u8 = 255;
