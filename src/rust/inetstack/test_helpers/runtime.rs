// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::runtime::{
    fail::Fail,
    network::{
        socket::SocketId,
        NetworkRuntime,
    },
};
use ::libc::EADDRINUSE;
use ::std::{
    collections::{
        HashSet,
        VecDeque,
    },
    net::SocketAddrV4,
};

//==============================================================================
// Structures
//==============================================================================

/// IP delivery layer that keeps every datagram for inspection.
#[derive(Default)]
pub struct TestNetwork {
    outgoing: VecDeque<(Option<SocketId>, Vec<u8>)>,
    udp_redirects: Vec<(u16, SocketAddrV4)>,
    busy_udp_ports: HashSet<u16>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl TestNetwork {
    pub fn pop_datagram(&mut self) -> Option<(Option<SocketId>, Vec<u8>)> {
        self.outgoing.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.outgoing.len()
    }

    pub fn clear(&mut self) {
        self.outgoing.clear();
    }

    pub fn get_udp_redirects(&self) -> &[(u16, SocketAddrV4)] {
        &self.udp_redirects
    }

    /// Makes UDP redirections on `port` fail.
    pub fn occupy_udp_port(&mut self, port: u16) {
        self.busy_udp_ports.insert(port);
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl NetworkRuntime for TestNetwork {
    fn ip_output(&mut self, socket: Option<SocketId>, datagram: Vec<u8>) {
        self.outgoing.push_back((socket, datagram));
    }

    fn udp_listen(&mut self, host_port: u16, guest: SocketAddrV4) -> Result<(), Fail> {
        if !self.busy_udp_ports.insert(host_port) {
            return Err(Fail::new(EADDRINUSE, "port in use"));
        }
        self.udp_redirects.push((host_port, guest));
        Ok(())
    }
}
