// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// TCP sequence numbers (RFC 793, Section 3.3) live in a 32-bit space that wraps around, so arithmetic is modulo 2^32
// and comparisons only make sense between numbers less than 2^31 apart. Ordering is therefore not transitive: one can
// have a < b < c < a. Lengths are added to sequence numbers as plain u32 values and the difference of two sequence
// numbers is a signed distance.

use ::std::{
    cmp::Ordering,
    convert::From,
    fmt,
    ops::{
        Add,
        AddAssign,
        Sub,
    },
};

/// A TCP sequence number.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SeqNumber {
    value: u32,
}

impl SeqNumber {
    /// Moves a sequence number back by `len` bytes.
    #[inline]
    pub fn rewind(self, len: u32) -> SeqNumber {
        SeqNumber::from(self.value.wrapping_sub(len))
    }

    /// Returns the later of two sequence numbers.
    #[inline]
    pub fn max(self, other: SeqNumber) -> SeqNumber {
        if self < other {
            other
        } else {
            self
        }
    }

    /// Returns the earlier of two sequence numbers.
    #[inline]
    pub fn min(self, other: SeqNumber) -> SeqNumber {
        if self > other {
            other
        } else {
            self
        }
    }
}

impl From<SeqNumber> for u32 {
    #[inline]
    fn from(item: SeqNumber) -> u32 {
        item.value
    }
}

impl From<u32> for SeqNumber {
    #[inline]
    fn from(item: u32) -> Self {
        SeqNumber { value: item }
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// Advances a sequence number by a length.
impl Add<u32> for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn add(self, len: u32) -> SeqNumber {
        SeqNumber::from(self.value.wrapping_add(len))
    }
}

impl AddAssign<u32> for SeqNumber {
    #[inline]
    fn add_assign(&mut self, len: u32) {
        self.value = self.value.wrapping_add(len);
    }
}

/// Signed distance from `other` to `self`.
impl Sub for SeqNumber {
    type Output = i32;

    #[inline]
    fn sub(self, other: SeqNumber) -> i32 {
        self.value.wrapping_sub(other.value) as i32
    }
}

// No Ord: with more than two sequence numbers there is no unique order.
impl PartialOrd for SeqNumber {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some((*self - *other).cmp(&0))
    }
}
