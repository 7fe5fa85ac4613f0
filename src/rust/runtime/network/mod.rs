// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod consts;
pub mod proxy;
pub mod socket;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    network::socket::SocketId,
};
use ::std::net::SocketAddrV4;

//======================================================================================================================
// Traits
//======================================================================================================================

/// IP delivery layer that sits below the TCP core.
pub trait NetworkRuntime {
    /// Takes ownership of one complete IPv4 datagram destined to the guest. `socket` names the connection that
    /// produced it, if any.
    fn ip_output(&mut self, socket: Option<SocketId>, datagram: Vec<u8>);

    /// Opens a one-shot UDP redirection from `host_port` on the host to `guest`. Fails if the host port is taken.
    fn udp_listen(&mut self, host_port: u16, guest: SocketAddrV4) -> Result<(), Fail>;
}
