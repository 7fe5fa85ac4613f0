// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use ::std::collections::VecDeque;

/// Bounded byte queue between a host socket and a TCP connection.
#[derive(Debug, Clone, Default)]
pub struct SockBuf {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl SockBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free space.
    pub fn space(&self) -> usize {
        self.capacity.saturating_sub(self.bytes.len())
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Appends as much of `data` as fits. Returns the number of bytes taken.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let n: usize = data.len().min(self.space());
        self.bytes.extend(&data[..n]);
        n
    }

    /// Appends all of `data`, even past the capacity. Rewritten helper output may be longer than the window that
    /// admitted it.
    pub fn extend(&mut self, data: &[u8]) {
        self.bytes.extend(data);
    }

    /// Copies up to `len` bytes starting `offset` bytes into the queue.
    pub fn peek(&self, offset: usize, len: usize) -> Vec<u8> {
        self.bytes.iter().skip(offset).take(len).copied().collect()
    }

    /// Discards up to `len` bytes from the front.
    pub fn drop_front(&mut self, len: usize) {
        let n: usize = len.min(self.bytes.len());
        self.bytes.drain(..n);
    }

    /// Contiguous bytes at the front of the queue.
    pub fn front_chunk(&self) -> &[u8] {
        self.bytes.as_slices().0
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}
