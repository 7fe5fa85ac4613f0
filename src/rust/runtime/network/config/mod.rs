// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod alias;
mod tcp;

//==============================================================================
// Exports
//==============================================================================

pub use self::{
    alias::AliasConfig,
    tcp::TcpConfig,
};
