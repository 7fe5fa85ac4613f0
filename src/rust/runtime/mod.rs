// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod fail;
pub mod logging;
pub mod network;
pub mod scheduler;
pub mod timer;

pub use self::fail::Fail;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Checks if a host socket operation should be retried based on the error code `errno`.
pub fn should_retry(errno: i32) -> bool {
    errno == libc::EINPROGRESS || errno == libc::EWOULDBLOCK || errno == libc::EAGAIN || errno == libc::EALREADY
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
