// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Single-threaded task table.
//!
//! Tasks live in a slab and are polled in a batch from the owner's event loop with a no-op waker, so completion is
//! discovered on the next poll rather than through wake-ups. Every task records the resource that owns it, and a task
//! can be cancelled by dropping it before it completes.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::scheduler::task::{
    Task,
    TaskId,
};
use ::futures::task::noop_waker_ref;
use ::slab::Slab;
use ::std::{
    future::Future,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Task Scheduler
pub struct Scheduler<K, T> {
    tasks: Slab<Task<K, T>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<K: Copy, T> Scheduler<K, T> {
    /// Inserts a coroutine owned by `owner`. Returns the identifier used to cancel it.
    pub fn insert(&mut self, name: &str, owner: K, coroutine: Pin<Box<dyn Future<Output = T>>>) -> TaskId {
        let task: Task<K, T> = Task::new(name.to_string(), owner, coroutine);
        TaskId::from(self.tasks.insert(task))
    }

    /// Drops a pending task. Returns true if the task was still pending.
    pub fn cancel(&mut self, task_id: TaskId) -> bool {
        match self.tasks.try_remove(task_id.into()) {
            Some(task) => {
                trace!("cancel(): task={:?}", task.get_name());
                true
            },
            None => false,
        }
    }

    /// Polls every pending task once and returns the owners and outputs of the tasks that completed.
    pub fn poll(&mut self) -> Vec<(K, T)> {
        let mut ctx: Context = Context::from_waker(noop_waker_ref());
        let mut completed: Vec<usize> = Vec::new();
        let mut results: Vec<(K, T)> = Vec::new();

        for (index, task) in self.tasks.iter_mut() {
            if let Poll::Ready(output) = task.poll(&mut ctx) {
                trace!("poll(): task completed (name={:?})", task.get_name());
                completed.push(index);
                results.push((task.get_owner(), output));
            }
        }
        for index in completed {
            self.tasks.remove(index);
        }

        results
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<K, T> Default for Scheduler<K, T> {
    fn default() -> Self {
        Self { tasks: Slab::new() }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
