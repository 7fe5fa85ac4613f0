// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::runtime::{
    fail::Fail,
    network::{
        proxy::{
            ProxyFuture,
            ProxyManager,
        },
        socket::HostFd,
    },
};
use ::futures::channel::oneshot;
use ::libc::ECANCELED;
use ::std::net::SocketAddrV4;

//==============================================================================
// Structures
//==============================================================================

/// Proxy manager whose connects complete when the test says so.
#[derive(Default)]
pub struct FakeProxy {
    enabled: bool,
    requests: Vec<(SocketAddrV4, Option<oneshot::Sender<Result<HostFd, Fail>>>)>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl FakeProxy {
    /// Takes every connect offered from now on.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn get_requests(&self) -> Vec<SocketAddrV4> {
        self.requests.iter().map(|(remote, _)| *remote).collect()
    }

    /// Completes the `index`-th proxied connect. Returns false if the core already gave up on it.
    pub fn complete(&mut self, index: usize, result: Result<HostFd, Fail>) -> bool {
        match self.requests.get_mut(index).and_then(|(_, tx)| tx.take()) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Checks whether the core dropped the `index`-th proxied connect.
    pub fn is_cancelled(&self, index: usize) -> bool {
        self.requests
            .get(index)
            .and_then(|(_, tx)| tx.as_ref())
            .map_or(false, |tx| tx.is_canceled())
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl ProxyManager for FakeProxy {
    fn add(&mut self, remote: SocketAddrV4) -> Option<ProxyFuture> {
        if !self.enabled {
            return None;
        }
        let (tx, rx) = oneshot::channel::<Result<HostFd, Fail>>();
        self.requests.push((remote, Some(tx)));
        Some(Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Fail::new(ECANCELED, "proxy went away")),
            }
        }))
    }
}
