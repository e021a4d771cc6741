// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The driver-facing protocol engine.
//!
//! A [`Session`] owns one protocol instance for one participant: a typed
//! context, the full vector of rounds (built up front), and an ordered error
//! stack. The driver owns transport and scheduling; it feeds inbound
//! payloads with [`Session::push_message`], polls
//! [`Session::is_round_complete`], and collects outbound traffic with
//! [`Session::pop_messages`]. A round that expects no messages is complete
//! as soon as it becomes current, so the first pop kicks a protocol off
//! without any synthetic message.
//!
//! Messages are tagged with the index of the round that *produced* them;
//! the consuming round is always the next one. Payloads for rounds further
//! ahead are parsed and buffered on arrival. Any failure is recorded on the
//! error stack and is fatal to the instance: there is no retry and no
//! mid-round resume, because PRG advancement is not idempotent.

use crate::errors::{ProtocolError, Result};
use crate::participant::{MessageExpectation, Round, RoundOutput};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tracing::{error, info, instrument};

/// An opaque string naming a protocol participant. Identities are assigned
/// by the calling application; they only need to be non-empty and unique
/// within a session.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ParticipantIdentifier(String);

impl ParticipantIdentifier {
    /// Wraps an application-assigned identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Samples a fresh random identity (32 bytes, hex-encoded).
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let random_bytes = rng.gen::<[u8; 32]>();
        Self(hex::encode(random_bytes))
    }

    /// The underlying identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ParticipantIdentifier {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantIdentifier {
    type Err = Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// A single protocol instance for a single participant.
///
/// The type parameter is the protocol's round enum; the concrete context
/// type rides along as `R::Context`, so no state is recovered by runtime
/// type inspection anywhere.
pub struct Session<R: Round> {
    ctx: R::Context,
    rounds: Vec<R>,
    local: ParticipantIdentifier,
    peers: Vec<ParticipantIdentifier>,
    current: usize,
    received: Vec<BTreeSet<ParticipantIdentifier>>,
    errors: Vec<ProtocolError>,
}

impl<R: Round> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local", &self.local)
            .field("peers", &self.peers)
            .field("current", &self.current)
            .field("errors", &self.errors)
            .finish()
    }
}

impl<R: Round> Session<R> {
    pub(crate) fn new(
        ctx: R::Context,
        local: ParticipantIdentifier,
        peers: Vec<ParticipantIdentifier>,
        rounds: Vec<R>,
    ) -> Self {
        let received = rounds.iter().map(|_| BTreeSet::new()).collect();
        Self {
            ctx,
            rounds,
            local,
            peers,
            current: 0,
            received,
            errors: Vec::new(),
        }
    }

    pub(crate) fn context(&self) -> &R::Context {
        &self.ctx
    }

    pub(crate) fn into_context(self) -> R::Context {
        self.ctx
    }

    /// The participant this session belongs to.
    pub fn local_participant(&self) -> &ParticipantIdentifier {
        &self.local
    }

    /// The other participants of this instance, in delivery order. The
    /// `recipients` of every [`RoundOutput`] use this same order.
    pub fn other_participants(&self) -> &[ParticipantIdentifier] {
        &self.peers
    }

    /// Index of the round currently awaiting messages or execution. A
    /// driver tags traffic obtained from [`Session::pop_messages`] with
    /// `current_round() - 1`, the index of the round that produced it.
    pub fn current_round(&self) -> usize {
        self.current
    }

    /// True once any error has been recorded. Failed instances refuse all
    /// further operations.
    pub fn has_failed(&self) -> bool {
        !self.errors.is_empty()
    }

    /// All recorded errors, oldest first. The first entry is the failure
    /// that killed the instance.
    pub fn error_stack(&self) -> &[ProtocolError] {
        &self.errors
    }

    /// True when every round has run and no error was recorded.
    pub fn is_finished(&self) -> bool {
        self.errors.is_empty() && self.current >= self.rounds.len()
    }

    /// True when the current round has traffic from every peer. Rounds that
    /// expect nothing are complete as soon as they are current. Stalling
    /// here is not an error; the driver keeps pushing messages.
    pub fn is_round_complete(&self) -> bool {
        if self.has_failed() {
            return false;
        }
        if self.is_finished() {
            return true;
        }
        match self.rounds[self.current].expects() {
            MessageExpectation::Nothing => true,
            _ => self.received[self.current].len() == self.peers.len(),
        }
    }

    /// Feeds one peer's payloads into the instance. `round_index` is the
    /// index of the round that produced the message on the sender's side.
    /// Payloads are decoded immediately; traffic for rounds beyond the
    /// current one is buffered. Every rejection here is recorded and fatal.
    #[instrument(skip(self, p2p, broadcast), fields(local = %self.local))]
    pub fn push_message(
        &mut self,
        p2p: Option<&[u8]>,
        broadcast: Option<&[u8]>,
        from: &ParticipantIdentifier,
        round_index: usize,
    ) -> Result<()> {
        self.guard()?;

        if from == &self.local {
            let err = ProtocolError::message("message claims to come from this participant");
            return Err(self.record(err));
        }
        if !self.peers.contains(from) {
            let err = ProtocolError::message(format!("unknown sender {from}"));
            return Err(self.record(err));
        }

        let receiving = round_index + 1;
        if receiving < self.current {
            let err = ProtocolError::protocol_state(format!(
                "messages tagged for round {round_index} were already consumed"
            ));
            return Err(self.record(err));
        }
        if receiving >= self.rounds.len() {
            let err = ProtocolError::protocol_state(format!(
                "no round consumes messages tagged {round_index}"
            ));
            return Err(self.record(err));
        }

        match self.rounds[receiving].expects() {
            MessageExpectation::Nothing => {
                let err = ProtocolError::protocol_state(format!(
                    "round {receiving} does not consume messages"
                ));
                return Err(self.record(err));
            }
            MessageExpectation::Broadcast => {
                if broadcast.is_none() {
                    let err = ProtocolError::message("missing broadcast payload");
                    return Err(self.record(err));
                }
                if p2p.is_some() {
                    let err = ProtocolError::message("unexpected peer-to-peer payload");
                    return Err(self.record(err));
                }
            }
            MessageExpectation::BroadcastAndP2p => {
                if broadcast.is_none() {
                    let err = ProtocolError::message("missing broadcast payload");
                    return Err(self.record(err));
                }
                if p2p.is_none() {
                    let err = ProtocolError::message("missing peer-to-peer payload");
                    return Err(self.record(err));
                }
            }
        }

        if !self.received[receiving].insert(from.clone()) {
            let err = ProtocolError::protocol_state(format!(
                "duplicate message from {from} tagged for round {round_index}"
            ));
            return Err(self.record(err));
        }

        if let Err(err) = self.rounds[receiving].parse_message(&self.ctx, from, p2p, broadcast) {
            return Err(self.record(err));
        }
        Ok(())
    }

    /// Runs the current round and returns its outbound traffic: per-peer
    /// verification of everything buffered, the round computation, then
    /// message building, each exactly once. Advances to the next round on
    /// success. Terminal rounds return an empty output, after which
    /// [`Session::is_finished`] is true.
    #[instrument(skip(self, rng), fields(local = %self.local, round = self.current))]
    pub fn pop_messages<G: RngCore + CryptoRng>(&mut self, rng: &mut G) -> Result<RoundOutput> {
        self.guard()?;

        if self.is_finished() {
            let err = ProtocolError::protocol_state("protocol instance is already finished");
            return Err(self.record(err));
        }
        if !self.is_round_complete() {
            let missing = self.peers.len() - self.received[self.current].len();
            let err = ProtocolError::protocol_state(format!(
                "round {} is still waiting for {missing} message(s)",
                self.current
            ));
            return Err(self.record(err));
        }

        let index = self.current;
        if self.rounds[index].expects() != MessageExpectation::Nothing {
            let peers = self.peers.clone();
            for peer in &peers {
                if let Err(err) = self.rounds[index].receive_verify(&mut self.ctx, peer) {
                    return Err(self.record(err));
                }
            }
        }
        if let Err(err) = self.rounds[index].compute_verify(&mut self.ctx, rng) {
            return Err(self.record(err));
        }
        let output = match self.rounds[index].make_message(&self.ctx) {
            Ok(output) => output,
            Err(err) => return Err(self.record(err)),
        };

        self.current += 1;
        if self.is_finished() {
            info!("protocol instance finished");
        }
        Ok(output)
    }

    /// Refuses any operation on an instance that already died, recording
    /// the refusal as well. The original cause stays first on the stack.
    fn guard(&mut self) -> Result<()> {
        if let Some(first) = self.errors.first() {
            let err = ProtocolError::protocol_state(format!(
                "instance already failed: {}",
                first.kind()
            ));
            return Err(self.record(err));
        }
        Ok(())
    }

    fn record(&mut self, err: ProtocolError) -> ProtocolError {
        error!("recording session failure: {err}");
        self.errors.push(err.clone());
        err
    }
}
