// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Distributed key generation.
//!
//! Every participant deals a Feldman verifiable secret sharing of a fresh
//! random value; the joint secret is the sum of all dealt values and never
//! exists in one place. Key generation runs in two rounds:
//!
//! 1. Deal: sample a secret and a degree `threshold - 1` polynomial over
//!    it, send each participant its share plus half of a pairwise PRG seed
//!    (peer-to-peer), and broadcast commitments to every coefficient.
//! 2. Verify and assemble: check each received share against the sender's
//!    commitments, sum the shares into the local signing share, sum the
//!    constant-term commitments into the joint public key, and combine the
//!    seed halves into one seed per remote participant.
//!
//! The output is a [`SignKey`] holding the local share and per-remote
//! public material. It can be serialized for storage and later restricted
//! to a signing quorum with [`SignKey::restrict_to`].

mod keyshare;
mod participant;
mod round_one;
mod round_two;

pub use keyshare::{LocalKeyShare, RemoteKeyShare, SignKey};
pub use participant::{new_session, KeygenConfig, KeygenContext, KeygenRound, KeygenSession};
pub use round_one::RoundOne;
pub use round_two::RoundTwo;
