// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::protocols::tcp::{
    constants::MAX_OUT_OF_ORDER,
    SeqNumber,
};
use ::std::collections::VecDeque;

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fragment {
    seq: SeqNumber,
    data: Vec<u8>,
    fin: bool,
}

/// Out-of-order segments waiting for the gap before them to fill. Entries are kept sorted by sequence number and
/// never overlap: overlapping bytes are trimmed from the newly arrived segment, and older entries it fully covers are
/// discarded.
#[derive(Debug, Clone, Default)]
pub struct ReassemblyQueue {
    fragments: VecDeque<Fragment>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Fragment {
    fn end(&self) -> SeqNumber {
        self.seq + self.data.len() as u32
    }
}

impl ReassemblyQueue {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    /// Queues an out-of-order segment. Returns false if the segment was dropped, either because it carried nothing
    /// new or because the queue is full.
    pub fn insert(&mut self, mut seq: SeqNumber, mut data: Vec<u8>, fin: bool) -> bool {
        // First entry that starts after the new segment.
        let index: usize = self
            .fragments
            .iter()
            .position(|f| f.seq > seq)
            .unwrap_or(self.fragments.len());

        // Trim what the predecessor already holds.
        if index > 0 {
            let prev_end: SeqNumber = self.fragments[index - 1].end();
            let overlap: i32 = prev_end - seq;
            if overlap > 0 {
                if overlap as usize >= data.len() {
                    if fin && !self.fragments[index - 1].fin && overlap as usize == data.len() {
                        // Nothing new but the FIN.
                        self.fragments[index - 1].fin = true;
                        return true;
                    }
                    return false;
                }
                data.drain(..overlap as usize);
                seq = prev_end;
            }
        }

        // Drop successors the new segment covers completely and truncate the new segment where it meets the next one.
        let end: SeqNumber = seq + data.len() as u32;
        let mut fin: bool = fin;
        while index < self.fragments.len() {
            let next: &Fragment = &self.fragments[index];
            if next.seq >= end {
                break;
            }
            if next.end() <= end {
                trace!("insert(): discarding covered fragment seq={}", next.seq);
                fin |= next.fin && next.end() == end;
                self.fragments.remove(index);
                continue;
            }
            let keep: usize = (next.seq - seq) as usize;
            data.truncate(keep);
            // The FIN sits after bytes the successor holds.
            fin = false;
            break;
        }

        if data.is_empty() && !fin {
            return false;
        }
        if self.fragments.len() >= MAX_OUT_OF_ORDER {
            warn!("insert(): reassembly queue full, dropping seq={}", seq);
            return false;
        }
        self.fragments.insert(index, Fragment { seq, data, fin });
        true
    }

    /// Removes the entries that continue the in-order stream at `rcv_nxt`. Returns the bytes and whether they end
    /// with a FIN.
    pub fn take_in_order(&mut self, rcv_nxt: SeqNumber) -> (Vec<u8>, bool) {
        let mut next: SeqNumber = rcv_nxt;
        let mut out: Vec<u8> = Vec::new();
        let mut fin: bool = false;

        while let Some(front) = self.fragments.front() {
            if front.seq > next {
                break;
            }
            let Some(fragment) = self.fragments.pop_front() else {
                break;
            };
            let skip: usize = (next - fragment.seq) as usize;
            if skip < fragment.data.len() {
                out.extend_from_slice(&fragment.data[skip..]);
                next = fragment.end();
            }
            if fragment.fin && fragment.end() == next {
                fin = true;
                break;
            }
        }

        (out, fin)
    }

    /// Checks the sorted and non-overlapping invariants.
    #[cfg(test)]
    pub fn is_well_formed(&self) -> bool {
        self.fragments
            .iter()
            .zip(self.fragments.iter().skip(1))
            .all(|(a, b)| a.end() <= b.seq)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
