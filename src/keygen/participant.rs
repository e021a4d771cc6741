// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Session setup for distributed key generation.

use crate::errors::{ProtocolError, Result};
use crate::keygen::keyshare::SignKey;
use crate::keygen::round_one::{self, RoundOne};
use crate::keygen::round_two::RoundTwo;
use crate::math::check_share_indices;
use crate::participant::{MessageExpectation, Round, RoundOutput};
use crate::protocol::{ParticipantIdentifier, Session};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeSet;
use tracing::info;

/// Everything a participant must agree on before key generation starts.
///
/// The remote list fixes the delivery order used by
/// [`RoundOutput::recipients`] for the whole session. Share indices are
/// arbitrary nonzero scalars, but every participant must use the same
/// index assignment or verification will fail.
#[derive(Clone, Debug)]
pub struct KeygenConfig {
    workspace_id: String,
    threshold: usize,
    local_id: ParticipantIdentifier,
    local_index: Scalar,
    remotes: Vec<(ParticipantIdentifier, Scalar)>,
}

impl KeygenConfig {
    /// Bundles the agreed parameters. Validation happens when the session
    /// is created.
    pub fn new(
        workspace_id: impl Into<String>,
        threshold: usize,
        local_id: ParticipantIdentifier,
        local_index: Scalar,
        remotes: Vec<(ParticipantIdentifier, Scalar)>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            threshold,
            local_id,
            local_index,
            remotes,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.threshold < 3 {
            return Err(ProtocolError::configuration(
                "threshold must be at least three",
            ));
        }
        let num_participants = self.remotes.len() + 1;
        if self.threshold > num_participants {
            return Err(ProtocolError::configuration(format!(
                "threshold {} exceeds the {num_participants} participants",
                self.threshold,
            )));
        }
        let mut unique = BTreeSet::new();
        for id in std::iter::once(&self.local_id).chain(self.remotes.iter().map(|(id, _)| id)) {
            if id.is_empty() {
                return Err(ProtocolError::configuration(
                    "participant identifier is empty",
                ));
            }
            if !unique.insert(id) {
                return Err(ProtocolError::configuration(
                    "participant identifiers are not distinct",
                ));
            }
        }
        let mut indices: Vec<Scalar> = self.remotes.iter().map(|(_, index)| *index).collect();
        indices.push(self.local_index);
        check_share_indices(&indices)
    }
}

/// Per-session state shared by the key generation rounds.
#[derive(Debug)]
pub struct KeygenContext {
    pub(crate) workspace_id: String,
    pub(crate) threshold: usize,
    pub(crate) local_id: ParticipantIdentifier,
    pub(crate) local_index: Scalar,
    pub(crate) remotes: Vec<(ParticipantIdentifier, Scalar)>,
    pub(crate) round_one_private: Option<round_one::Private>,
    pub(crate) sign_key: Option<SignKey>,
}

/// The two rounds of key generation, in execution order.
pub enum KeygenRound {
    /// Deal shares, seed halves, and commitments.
    One(RoundOne),
    /// Verify the dealt shares and assemble the signing key.
    Two(RoundTwo),
}

impl Round for KeygenRound {
    type Context = KeygenContext;

    fn expects(&self) -> MessageExpectation {
        match self {
            Self::One(round) => round.expects(),
            Self::Two(round) => round.expects(),
        }
    }

    fn parse_message(
        &mut self,
        ctx: &Self::Context,
        from: &ParticipantIdentifier,
        p2p: Option<&[u8]>,
        broadcast: Option<&[u8]>,
    ) -> Result<()> {
        match self {
            Self::One(round) => round.parse_message(ctx, from, p2p, broadcast),
            Self::Two(round) => round.parse_message(ctx, from, p2p, broadcast),
        }
    }

    fn receive_verify(
        &mut self,
        ctx: &mut Self::Context,
        from: &ParticipantIdentifier,
    ) -> Result<()> {
        match self {
            Self::One(round) => round.receive_verify(ctx, from),
            Self::Two(round) => round.receive_verify(ctx, from),
        }
    }

    fn compute_verify<R: RngCore + CryptoRng>(
        &mut self,
        ctx: &mut Self::Context,
        rng: &mut R,
    ) -> Result<()> {
        match self {
            Self::One(round) => round.compute_verify(ctx, rng),
            Self::Two(round) => round.compute_verify(ctx, rng),
        }
    }

    fn make_message(&self, ctx: &Self::Context) -> Result<RoundOutput> {
        match self {
            Self::One(round) => round.make_message(ctx),
            Self::Two(round) => round.make_message(ctx),
        }
    }
}

/// A running key generation instance.
pub type KeygenSession = Session<KeygenRound>;

/// Starts a key generation session for the given configuration.
///
/// The session drives the rounds described in the module documentation;
/// feed it with [`Session::push_message`] and [`Session::pop_messages`]
/// and collect the key with [`Session::into_sign_key`] once
/// [`Session::is_finished`] reports true.
pub fn new_session(config: KeygenConfig) -> Result<KeygenSession> {
    config.validate()?;
    info!(
        "starting key generation for workspace {} with {} participants",
        config.workspace_id,
        config.remotes.len() + 1
    );
    let peers = config.remotes.iter().map(|(id, _)| id.clone()).collect();
    let local = config.local_id.clone();
    let ctx = KeygenContext {
        workspace_id: config.workspace_id,
        threshold: config.threshold,
        local_id: config.local_id,
        local_index: config.local_index,
        remotes: config.remotes,
        round_one_private: None,
        sign_key: None,
    };
    let rounds = vec![
        KeygenRound::One(RoundOne),
        KeygenRound::Two(RoundTwo::new()),
    ];
    Ok(Session::new(ctx, local, peers, rounds))
}

impl Session<KeygenRound> {
    /// The generated key. Fails until [`Session::is_finished`] reports true.
    pub fn sign_key(&self) -> Result<&SignKey> {
        if !self.is_finished() {
            return Err(ProtocolError::protocol_state(
                "key generation has not finished",
            ));
        }
        self.context()
            .sign_key
            .as_ref()
            .ok_or_else(|| ProtocolError::protocol_state("key generation has not finished"))
    }

    /// Consumes the session and returns the generated key.
    pub fn into_sign_key(self) -> Result<SignKey> {
        if !self.is_finished() {
            return Err(ProtocolError::protocol_state(
                "key generation has not finished",
            ));
        }
        self.into_context()
            .sign_key
            .ok_or_else(|| ProtocolError::protocol_state("key generation has not finished"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::math::lagrange_at_zero;
    use crate::utils::testing::{init_testing, run_sessions};
    use crate::utils::CurvePoint;
    use rand::rngs::StdRng;

    fn quorum_configs<R: RngCore + CryptoRng>(
        num_participants: usize,
        threshold: usize,
        rng: &mut R,
    ) -> Vec<KeygenConfig> {
        let parties: Vec<(ParticipantIdentifier, Scalar)> = (0..num_participants)
            .map(|i| {
                (
                    ParticipantIdentifier::random(rng),
                    Scalar::from((i + 1) as u64),
                )
            })
            .collect();
        parties
            .iter()
            .map(|(id, index)| {
                let remotes = parties
                    .iter()
                    .filter(|(other, _)| other != id)
                    .cloned()
                    .collect();
                KeygenConfig::new("vault", threshold, id.clone(), *index, remotes)
            })
            .collect()
    }

    fn keygen_produces_agreeing_keys(rng: &mut StdRng) -> Result<()> {
        let threshold = 3;
        let num_participants = 4;
        let mut sessions = quorum_configs(num_participants, threshold, rng)
            .into_iter()
            .map(new_session)
            .collect::<Result<Vec<_>>>()?;
        run_sessions(&mut sessions, rng)?;

        let keys = sessions
            .into_iter()
            .map(|session| session.into_sign_key())
            .collect::<Result<Vec<_>>>()?;

        // Everyone agrees on the joint public key and records the quorum shape.
        let public_key = *keys[0].public_key();
        for key in &keys {
            assert_eq!(*key.public_key(), public_key);
            assert_eq!(key.threshold(), threshold);
            assert_eq!(key.num_participants(), num_participants);
            assert_eq!(
                CurvePoint(CurvePoint::GENERATOR.0 * key.local.x),
                key.local.public_share
            );
            key.validate()?;
        }

        // Pairwise seeds match in both directions.
        for key in &keys {
            for remote in &key.remotes {
                let other = keys
                    .iter()
                    .find(|candidate| candidate.local.id == remote.id)
                    .unwrap();
                let reverse = other
                    .remotes
                    .iter()
                    .find(|candidate| candidate.id == key.local.id)
                    .unwrap();
                assert_eq!(remote.seed, reverse.seed);
            }
        }

        // Any `threshold` shares reconstruct a secret matching the public key.
        for skip in 0..num_participants {
            let subset: Vec<&SignKey> = keys
                .iter()
                .enumerate()
                .filter(|(at, _)| *at != skip)
                .map(|(_, key)| key)
                .take(threshold)
                .collect();
            let indices: Vec<Scalar> = subset.iter().map(|key| key.local.index).collect();
            let coefficients = lagrange_at_zero(&indices)?;
            let secret = subset
                .iter()
                .zip(coefficients.iter())
                .fold(Scalar::ZERO, |sum, (key, coefficient)| {
                    sum + key.local.x * coefficient
                });
            assert_eq!(CurvePoint(CurvePoint::GENERATOR.0 * secret), public_key);
        }
        Ok(())
    }

    #[test]
    fn keygen_produces_valid_outputs() -> Result<()> {
        let mut rng = init_testing();
        keygen_produces_agreeing_keys(&mut rng)
    }

    #[test]
    #[ignore = "slow"]
    fn keygen_produces_valid_outputs_many_times() -> Result<()> {
        for _ in 0..20 {
            let mut rng = init_testing();
            keygen_produces_agreeing_keys(&mut rng)?;
        }
        Ok(())
    }

    #[test]
    fn keygen_rejects_tampered_share() -> Result<()> {
        let mut rng = init_testing();
        let mut sessions = quorum_configs(3, 3, &mut rng)
            .into_iter()
            .map(new_session)
            .collect::<Result<Vec<_>>>()?;

        let mut outputs = Vec::new();
        for session in sessions.iter_mut() {
            outputs.push((
                session.local_participant().clone(),
                session.pop_messages(&mut rng)?,
            ));
        }

        // Deliver round-zero messages to the first participant, corrupting a
        // byte inside the share dealt by the last sender.
        let victim_id = sessions[0].local_participant().clone();
        for (at, (sender_id, output)) in outputs.iter().enumerate().skip(1) {
            let position = output
                .recipients()
                .iter()
                .position(|id| id == &victim_id)
                .unwrap();
            let mut p2p = output.p2p_messages()[position].clone();
            if at == outputs.len() - 1 {
                p2p[20] ^= 1;
            }
            let result =
                sessions[0].push_message(Some(&p2p), output.broadcast_message(), sender_id, 0);
            result?;
        }

        assert!(sessions[0].is_round_complete());
        let result = sessions[0].pop_messages(&mut rng);
        assert!(matches!(
            result.unwrap_err().kind(),
            ErrorKind::Verification(_)
        ));
        assert!(sessions[0].has_failed());
        assert!(matches!(
            sessions[0].error_stack()[0].kind(),
            ErrorKind::Verification(_)
        ));

        // The instance refuses further input and keeps the original cause first.
        let (sender_id, output) = &outputs[1];
        let error = sessions[0]
            .push_message(None, output.broadcast_message(), sender_id, 0)
            .unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::ProtocolState(_)));
        assert!(matches!(
            sessions[0].error_stack()[0].kind(),
            ErrorKind::Verification(_)
        ));
        Ok(())
    }

    #[test]
    fn keygen_rejects_bad_configurations() {
        let mut rng = init_testing();
        let configs = quorum_configs(4, 3, &mut rng);

        let too_low = KeygenConfig {
            threshold: 2,
            ..configs[0].clone()
        };
        assert!(matches!(
            new_session(too_low).unwrap_err().kind(),
            ErrorKind::Configuration(_)
        ));

        let too_large = KeygenConfig {
            threshold: 5,
            ..configs[0].clone()
        };
        assert!(matches!(
            new_session(too_large).unwrap_err().kind(),
            ErrorKind::Configuration(_)
        ));

        let mut duplicate_index = configs[0].clone();
        duplicate_index.remotes[1].1 = duplicate_index.remotes[0].1;
        assert!(matches!(
            new_session(duplicate_index).unwrap_err().kind(),
            ErrorKind::Configuration(_)
        ));

        let mut zero_index = configs[0].clone();
        zero_index.local_index = Scalar::ZERO;
        assert!(matches!(
            new_session(zero_index).unwrap_err().kind(),
            ErrorKind::Configuration(_)
        ));

        let mut empty_id = configs[0].clone();
        empty_id.remotes[0].0 = ParticipantIdentifier::new("");
        assert!(matches!(
            new_session(empty_id).unwrap_err().kind(),
            ErrorKind::Configuration(_)
        ));
    }
}
