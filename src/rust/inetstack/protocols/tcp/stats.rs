// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Structures
//======================================================================================================================

/// TCP counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TcpStats {
    /// Connections we initiated towards the guest.
    pub connattempt: u64,
    /// Guest connections accepted.
    pub accepts: u64,
    /// Connections that reached ESTABLISHED.
    pub connects: u64,
    /// Established connections dropped.
    pub drops: u64,
    /// Embryonic connections dropped.
    pub conndrops: u64,
    /// Connections closed, including drops.
    pub closed: u64,
    /// Connections dropped by the retransmission timer.
    pub timeoutdrop: u64,
    /// Connections dropped by the keepalive timer.
    pub keepdrops: u64,
    /// Retransmission timeouts.
    pub rexmttimeo: u64,
    /// Persist timeouts.
    pub persisttimeo: u64,
    /// Segments timed for a round-trip sample.
    pub segstimed: u64,
    /// Round-trip samples taken.
    pub rttupdated: u64,

    /// Segments sent.
    pub sndtotal: u64,
    /// Data segments sent.
    pub sndpack: u64,
    /// Data bytes sent.
    pub sndbyte: u64,
    /// Data segments retransmitted.
    pub sndrexmitpack: u64,
    /// Data bytes retransmitted.
    pub sndrexmitbyte: u64,
    /// Pure ACKs sent.
    pub sndacks: u64,
    /// Window probes sent.
    pub sndprobe: u64,
    /// Control segments (SYN, FIN, RST) sent.
    pub sndctrl: u64,

    /// Segments received.
    pub rcvtotal: u64,
    /// Segments with a bad checksum.
    pub rcvbadsum: u64,
    /// Segments that failed to parse.
    pub rcvbadoff: u64,
    /// In-order data segments received.
    pub rcvpack: u64,
    /// In-order data bytes received.
    pub rcvbyte: u64,
    /// Completely duplicate segments.
    pub rcvduppack: u64,
    /// Partially duplicate segments.
    pub rcvpartduppack: u64,
    /// Out-of-order segments.
    pub rcvoopack: u64,
    /// Segments carrying data past the window.
    pub rcvpackafterwin: u64,
    /// Data received after the host side closed.
    pub rcvafterclose: u64,
    /// Duplicate ACKs.
    pub rcvdupack: u64,
    /// ACKs for data never sent.
    pub rcvacktoomuch: u64,
    /// ACK segments received.
    pub rcvackpack: u64,
    /// Bytes acknowledged.
    pub rcvackbyte: u64,
    /// Window updates.
    pub rcvwinupd: u64,
    /// Delayed ACKs sent.
    pub delack: u64,
}
