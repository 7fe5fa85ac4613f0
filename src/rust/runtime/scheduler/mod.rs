// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Exports
//==============================================================================

pub mod scheduler;
pub mod task;

pub use self::{
    scheduler::Scheduler,
    task::{
        Task,
        TaskId,
    },
};
