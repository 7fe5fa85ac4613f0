// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Options set on host sockets. We do not support all options, but the ones that we do support are listed here.

//======================================================================================================================
// Structures
//======================================================================================================================

/// A listing of the host socket options the TCP core sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketOption {
    /// O_NONBLOCK.
    NonBlocking,
    /// SO_REUSEADDR.
    ReuseAddress,
    /// SO_OOBINLINE.
    OobInline,
    /// TCP_NODELAY.
    NoDelay,
}

impl SocketOption {
    /// Options set on every host socket that relays a guest connection.
    pub const RELAY: [SocketOption; 3] = [
        SocketOption::NonBlocking,
        SocketOption::ReuseAddress,
        SocketOption::OobInline,
    ];
}
