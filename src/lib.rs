// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implementation of a PRG-masked threshold ECDSA signature protocol
//!
//! A t-of-n threshold signature scheme splits a signing key across n
//! participants so that any quorum of t can cooperate to sign a message,
//! while no coalition of t-1 learns anything that would let it forge one.
//!
//! The signatures produced here are ordinary ECDSA signatures. A verifier
//! needs no knowledge of the threshold setup and cannot distinguish a
//! signature assembled by a quorum from one produced by a single holder of
//! the private key.
//!
//! This implementation uses
//! [secp256k1](https://en.bitcoin.it/wiki/Secp256k1) as the elliptic
//! curve. Key generation is a two-round Feldman verifiable secret sharing
//! that also pins down one pseudorandom generator seed per pair of
//! participants. Signing runs in three rounds and replaces the
//! multiplicative-to-additive conversions of older threshold ECDSA
//! protocols with additive masks drawn from the pairwise PRGs, so no
//! homomorphic encryption or zero-knowledge machinery is needed.
//!
//! This library stops at the protocol layer: it steps the rounds but does
//! not move bytes between machines or schedule sessions concurrently. The
//! main interfaces allow a
//! [`Session`] to ingest the messages of other participants with
//! [`Session::push_message`] and to step its current round with
//! [`Session::pop_messages`], producing messages that in turn must be
//! delivered to the other participants. Sessions are single-threaded and
//! fail fast: every error ends the instance, and the full error trail
//! stays available through [`Session::error_stack`].

#![warn(missing_docs)]

#[macro_use]
pub mod errors;

pub mod keygen;
mod math;
mod participant;
mod prg;
mod protocol;
pub mod sign;
mod utils;

pub use participant::{MessageExpectation, Round, RoundOutput};
pub use protocol::{ParticipantIdentifier, Session};
pub use utils::CurvePoint;
