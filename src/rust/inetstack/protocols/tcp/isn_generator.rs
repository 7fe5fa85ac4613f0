// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::{
    constants::{
        PR_SLOWHZ,
        TCP_ISSINCR,
    },
    SeqNumber,
};
use ::rand::{
    rngs::SmallRng,
    RngCore,
    SeedableRng,
};

/// Initial send sequence numbers. The counter starts at a random point and advances with every connection and with
/// the passing of time, so consecutive incarnations of a connection do not reuse sequence space.
pub struct IsnGenerator {
    next: SeqNumber,
}

impl IsnGenerator {
    pub fn new(seed: [u8; 32]) -> Self {
        let mut rng: SmallRng = SmallRng::from_seed(seed);
        Self {
            next: SeqNumber::from(rng.next_u32()),
        }
    }

    pub fn generate(&mut self) -> SeqNumber {
        let isn: SeqNumber = self.next;
        self.next += TCP_ISSINCR / 2;
        isn
    }

    /// Advances the counter by one slow tick worth of sequence space.
    pub fn tick(&mut self) {
        self.next += TCP_ISSINCR / PR_SLOWHZ;
    }
}
