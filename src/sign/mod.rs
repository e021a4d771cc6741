// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Threshold signing.
//!
//! A quorum of exactly `threshold` key holders produces a standard ECDSA
//! signature over a 32-byte digest. Multiplicative relations between the
//! secret shares are computed with pairwise PRG masks instead of
//! multiplicative-to-additive conversions, which keeps every round cheap:
//!
//! 1. Mask: sample the nonce and blinding shares, fold in the pairwise
//!    masks, send the masked triple along the sender's arc (zeroes
//!    elsewhere) and broadcast the nonce commitment.
//! 2. Aggregate: sum the nonce commitments into the nonce point, derive
//!    `r`, and broadcast the blinded equation shares `delta` and `v`.
//! 3. Combine: compute `s = sum(delta) / sum(v)`, normalize to low-s,
//!    attach the recovery identifier and verify the result against the
//!    joint public key before releasing it.
//!
//! Sessions are seeded from a [`SignKey`](crate::keygen::SignKey) produced
//! by key generation; the key itself is never modified, so one key can
//! serve any number of sequential signing sessions.

mod participant;
mod round_one;
mod round_three;
mod round_two;
mod signature;

pub use participant::{new_session, SignContext, SignRound, SignSession};
pub use round_one::RoundOne;
pub use round_three::RoundThree;
pub use round_two::RoundTwo;
pub use signature::RecoverableSignature;
