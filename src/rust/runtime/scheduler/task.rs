// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

//==============================================================================
// Structures
//==============================================================================

/// Externally visible task identifier.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct TaskId(pub usize);

/// A coroutine tied to the resource that owns it. The owner gets the output once the coroutine completes.
pub struct Task<K, T> {
    /// Task name, used for logging.
    name: String,
    /// Resource that is notified when the coroutine completes.
    owner: K,
    /// Underlying coroutine to run.
    coroutine: Pin<Box<dyn Future<Output = T>>>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl<K: Copy, T> Task<K, T> {
    /// Instantiates a new Task.
    pub fn new(name: String, owner: K, coroutine: Pin<Box<dyn Future<Output = T>>>) -> Self {
        Self { name, owner, coroutine }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_owner(&self) -> K {
        self.owner
    }

    /// Polls the underlying coroutine once.
    pub fn poll(&mut self, ctx: &mut Context<'_>) -> Poll<T> {
        self.coroutine.as_mut().poll(ctx)
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl From<usize> for TaskId {
    fn from(val: usize) -> Self {
        TaskId(val)
    }
}

impl From<TaskId> for usize {
    fn from(val: TaskId) -> Self {
        val.0
    }
}

impl<K: fmt::Debug, T> fmt::Debug for Task<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish()
    }
}
