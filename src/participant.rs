// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! This module contains [`Round`], the lifecycle contract every protocol
//! round implements, and the types describing what a round consumes and
//! produces.

use crate::errors::Result;
use crate::protocol::ParticipantIdentifier;
use rand::{CryptoRng, RngCore};

/// The shape of inbound traffic a round requires from every peer before it
/// can run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageExpectation {
    /// The round consumes nothing and is complete as soon as it is current.
    Nothing,
    /// One broadcast payload per peer.
    Broadcast,
    /// One broadcast payload and one peer-to-peer payload per peer.
    BroadcastAndP2p,
}

/// Outbound traffic produced by completing a round.
///
/// `p2p_messages` is aligned with `recipients`; both are empty for rounds
/// that send nothing. A driver delivers `broadcast_message` to every
/// recipient alongside its private payload.
#[derive(Clone, Debug, Default)]
pub struct RoundOutput {
    p2p_messages: Vec<Vec<u8>>,
    broadcast_message: Option<Vec<u8>>,
    recipients: Vec<ParticipantIdentifier>,
}

impl RoundOutput {
    pub(crate) fn new(
        p2p_messages: Vec<Vec<u8>>,
        broadcast_message: Option<Vec<u8>>,
        recipients: Vec<ParticipantIdentifier>,
    ) -> Self {
        Self {
            p2p_messages,
            broadcast_message,
            recipients,
        }
    }

    /// Output of a terminal round: nothing to deliver.
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    /// Private payloads, one per entry of [`recipients`](Self::recipients).
    pub fn p2p_messages(&self) -> &[Vec<u8>] {
        &self.p2p_messages
    }

    /// Payload to deliver to every recipient, if the round broadcasts.
    pub fn broadcast_message(&self) -> Option<&[u8]> {
        self.broadcast_message.as_deref()
    }

    /// The peers this round's traffic is addressed to.
    pub fn recipients(&self) -> &[ParticipantIdentifier] {
        &self.recipients
    }

    /// True when the round produced no traffic at all.
    pub fn is_empty(&self) -> bool {
        self.p2p_messages.is_empty() && self.broadcast_message.is_none()
    }
}

/// One round of a protocol, driven by [`Session`](crate::protocol::Session).
///
/// A session parses each peer's payloads as they arrive (in any order), and
/// once every peer has delivered, runs the verify/compute/send steps in
/// sequence, exactly once. All state shared between rounds lives in the
/// concrete `Context` type; per-peer buffered payloads live in the round
/// itself.
///
/// Each protocol implements this on one closed enum over its rounds. The
/// trait is public because it bounds [`Session`](crate::protocol::Session),
/// but sessions can only be built inside this crate.
pub trait Round {
    /// Protocol-wide state threaded through every round.
    type Context;

    /// The traffic this round requires from each peer.
    fn expects(&self) -> MessageExpectation;

    /// Decode and buffer one peer's payloads. Called at push time.
    fn parse_message(
        &mut self,
        ctx: &Self::Context,
        from: &ParticipantIdentifier,
        p2p: Option<&[u8]>,
        broadcast: Option<&[u8]>,
    ) -> Result<()>;

    /// Check one peer's buffered payloads against the protocol rules.
    /// Called once per peer when the round runs.
    fn receive_verify(&mut self, ctx: &mut Self::Context, from: &ParticipantIdentifier)
        -> Result<()>;

    /// The round's computation. Called exactly once, after every peer
    /// passed [`receive_verify`](Self::receive_verify).
    fn compute_verify<R: RngCore + CryptoRng>(
        &mut self,
        ctx: &mut Self::Context,
        rng: &mut R,
    ) -> Result<()>;

    /// Encode this round's outbound traffic. Called exactly once, after
    /// [`compute_verify`](Self::compute_verify).
    fn make_message(&self, ctx: &Self::Context) -> Result<RoundOutput>;
}
