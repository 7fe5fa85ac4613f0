// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    network::socket::HostFd,
};
use ::std::{
    future::Future,
    net::SocketAddrV4,
    pin::Pin,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Completion of a connect handed to the proxy manager: the connected host socket or the reason it failed.
pub type ProxyFuture = Pin<Box<dyn Future<Output = Result<HostFd, Fail>>>>;

/// Proxy manager that never takes responsibility for a connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProxy;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Connection-proxy manager.
pub trait ProxyManager {
    /// Offers an outbound connect to `remote`. Returns `None` if the proxy declines; otherwise the returned future
    /// resolves once the proxied connect completes. The host socket it yields must belong to the [HostSockets] the
    /// TCP core was built with.
    ///
    /// [HostSockets]: crate::runtime::network::socket::HostSockets
    fn add(&mut self, remote: SocketAddrV4) -> Option<ProxyFuture>;
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl ProxyManager for NoProxy {
    fn add(&mut self, _remote: SocketAddrV4) -> Option<ProxyFuture> {
        None
    }
}
