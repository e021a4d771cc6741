// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Deterministic pseudorandom generator used for pairwise mask derivation.
//!
//! Each pair of parties shares a 32-byte seed assembled during key
//! generation from two directed halves. Signing advances a SHA-256 hash
//! chain over that seed; both ends of a pair draw the same stream and apply
//! opposite signs, so the masks cancel in aggregate.

use crate::utils::scalar_reduce;
use k256::{
    elliptic_curve::bigint::{Encoding, U256},
    Scalar,
};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use zeroize::ZeroizeOnDrop;

/// Hash-chain PRG: every draw replaces the state with its SHA-256 digest and
/// returns the new state. Advancement is not idempotent, so an instance is
/// owned by exactly one session and never rewound.
#[derive(Clone, ZeroizeOnDrop)]
pub(crate) struct Prg {
    state: [u8; 32],
}

impl Prg {
    pub(crate) fn new(seed: [u8; 32]) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next_bytes(&mut self) -> [u8; 32] {
        self.state = Sha256::digest(self.state).into();
        self.state
    }

    /// Draws 32 bytes and reduces them into a scalar mod the group order.
    pub(crate) fn next_scalar(&mut self) -> Scalar {
        let bytes = self.next_bytes();
        scalar_reduce(&bytes)
    }
}

impl Debug for Prg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prg").field("state", &"[redacted]").finish()
    }
}

/// Samples one directed seed half: 32 random bytes with the top bit cleared,
/// so two halves always sum without wrapping past 256 bits.
pub(crate) fn sample_seed_half<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; 32] {
    let mut half = [0u8; 32];
    rng.fill_bytes(&mut half);
    half[0] &= 0x7f;
    half
}

/// Combines the two directed halves of a pair into the shared seed. Both
/// parties compute this; addition makes the result order-independent.
pub(crate) fn combine_seed_halves(mine: &[u8; 32], theirs: &[u8; 32]) -> [u8; 32] {
    let sum = U256::from_be_bytes(*mine).wrapping_add(&U256::from_be_bytes(*theirs));
    sum.to_be_bytes()
}
