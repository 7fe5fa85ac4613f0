// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cursor for the line-oriented text protocols the helpers rewrite. Matching follows `scanf` conventions: whitespace
//! in a pattern matches any run of whitespace (including none), and numeric fields skip leading whitespace.

/// Finds the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, |b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Matches a literal pattern.
    pub fn literal(&mut self, pattern: &str) -> bool {
        for &expected in pattern.as_bytes() {
            if expected.is_ascii_whitespace() {
                self.skip_whitespace();
                continue;
            }
            if self.peek() != Some(expected) {
                return false;
            }
            self.pos += 1;
        }
        true
    }

    /// Reads an unsigned decimal number. Overflow wraps, as `%u` does.
    pub fn unsigned(&mut self) -> Option<u32> {
        self.skip_whitespace();
        let start: usize = self.pos;
        let mut value: u32 = 0;
        while let Some(digit) = self.peek().filter(u8::is_ascii_digit) {
            value = value.wrapping_mul(10).wrapping_add((digit - b'0') as u32);
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(value)
        }
    }

    /// Reads a whitespace-delimited word of at most `max` bytes.
    pub fn word(&mut self, max: usize) -> Option<&'a [u8]> {
        self.skip_whitespace();
        let start: usize = self.pos;
        while self.pos - start < max && self.peek().map_or(false, |b| !b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(&self.input[start..self.pos])
        }
    }

    /// Consumes a non-empty run of bytes drawn from `set`.
    pub fn one_or_more_of(&mut self, set: &[u8]) -> bool {
        let start: usize = self.pos;
        while self.peek().map_or(false, |b| set.contains(&b)) {
            self.pos += 1;
        }
        self.pos > start
    }

    /// Unconsumed input.
    pub fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }
}
