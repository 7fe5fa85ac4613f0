// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod connect;
pub mod constants;
pub mod ctrlblk;
pub mod emu;
mod input;
mod isn_generator;
mod output;
pub mod peer;
mod poll;
mod reassembly;
mod rto;
pub mod segment;
mod sequence_number;
mod sockbuf;
pub mod socket;
mod state;
pub mod stats;
mod template;
mod timeout;
pub mod timers;
pub mod tos;

#[cfg(test)]
mod tests;

pub use self::{
    peer::TcpPeer,
    reassembly::ReassemblyQueue,
    rto::RtoCalculator,
    segment::{
        MAX_TCP_HEADER_SIZE,
        MIN_TCP_HEADER_SIZE,
    },
    sequence_number::SeqNumber,
    sockbuf::SockBuf,
    state::TcpState,
    template::HeaderTemplate,
};
