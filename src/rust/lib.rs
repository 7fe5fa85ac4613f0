// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod inetstack;
pub mod runtime;
pub mod slirp;

pub use self::{
    inetstack::protocols::tcp::{
        peer::TcpPeer,
        socket::SocketId,
        stats::TcpStats,
        TcpState,
    },
    runtime::{
        fail::Fail,
        network::{
            proxy::{
                NoProxy,
                ProxyFuture,
                ProxyManager,
            },
            socket::{
                HostFd,
                HostSockets,
                OsSockets,
                SocketOption,
            },
            NetworkRuntime,
        },
    },
    slirp::config::Config,
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the enclosing [anyhow::Result] function otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    ::anyhow::bail!(
                        "ensure failed: `(left == right)`\n  left: `{:?}`,\n right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            }
        }
    });
}

/// Ensures that two expressions are not equal, bailing out of the enclosing [anyhow::Result] function otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    ::anyhow::bail!(
                        "ensure failed: `(left != right)`\n  left: `{:?}`,\n right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            }
        }
    });
}
