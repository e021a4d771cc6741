// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Session setup for threshold signing.

use crate::errors::{ProtocolError, Result};
use crate::keygen::SignKey;
use crate::math::lagrange_at_zero;
use crate::participant::{MessageExpectation, Round, RoundOutput};
use crate::prg::Prg;
use crate::protocol::{ParticipantIdentifier, Session};
use crate::sign::round_one::{self, RoundOne};
use crate::sign::round_three::RoundThree;
use crate::sign::round_two::{self, RoundTwo};
use crate::sign::signature::RecoverableSignature;
use crate::utils::{scalar_bytes, scalar_reduce};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use std::fmt::Debug;
use tracing::info;

/// One remote member of the signing quorum: its rank on the rank circle
/// and the PRG derived from the pairwise seed.
pub(crate) struct RemoteSigner {
    pub(crate) id: ParticipantIdentifier,
    pub(crate) rank: usize,
    pub(crate) prg: Prg,
}

impl Debug for RemoteSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSigner")
            .field("id", &self.id)
            .field("rank", &self.rank)
            .field("prg", &self.prg)
            .finish()
    }
}

/// Per-session state shared by the signing rounds. The key is already
/// restricted to the quorum, so `key.remotes`, `remotes` and the session
/// peer list all use the same order.
pub struct SignContext {
    pub(crate) key: SignKey,
    pub(crate) digest: [u8; 32],
    pub(crate) m: Scalar,
    pub(crate) w: Scalar,
    pub(crate) local_rank: usize,
    pub(crate) remotes: Vec<RemoteSigner>,
    pub(crate) round_one_private: Option<round_one::Private>,
    pub(crate) round_two_private: Option<round_two::Private>,
    pub(crate) signature: Option<RecoverableSignature>,
}

impl Debug for SignContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignContext")
            .field("key", &self.key)
            .field("digest", &hex::encode(self.digest))
            .field("m", &"[redacted]")
            .field("w", &"[redacted]")
            .field("local_rank", &self.local_rank)
            .field("remotes", &self.remotes)
            .field("signature", &self.signature)
            .finish()
    }
}

/// The three rounds of signing, in execution order.
pub enum SignRound {
    /// Mask the local secrets and commit to the nonce.
    One(RoundOne),
    /// Aggregate the nonce and blind the signature equation.
    Two(RoundTwo),
    /// Combine the equation shares into a verified signature.
    Three(RoundThree),
}

impl Round for SignRound {
    type Context = SignContext;

    fn expects(&self) -> MessageExpectation {
        match self {
            Self::One(round) => round.expects(),
            Self::Two(round) => round.expects(),
            Self::Three(round) => round.expects(),
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
            Self::Three(round) => round.parse_message(ctx, from, p2p, broadcast),
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
            Self::Three(round) => round.receive_verify(ctx, from),
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
            Self::Three(round) => round.compute_verify(ctx, rng),
        }
    }

    fn make_message(&self, ctx: &Self::Context) -> Result<RoundOutput> {
        match self {
            Self::One(round) => round.make_message(ctx),
            Self::Two(round) => round.make_message(ctx),
            Self::Three(round) => round.make_message(ctx),
        }
    }
}

/// A running signing instance.
pub type SignSession = Session<SignRound>;

fn rank_of(sorted: &[[u8; 32]], index: &Scalar) -> Result<usize> {
    sorted
        .binary_search(&scalar_bytes(index))
        .map_err(|_| ProtocolError::protocol_state("share index missing from the rank table"))
}

/// Starts a signing session over a 32-byte message digest.
///
/// `signers` picks the quorum: it must hold exactly `threshold` distinct
/// participants of the key, including the local one. The key material is
/// copied into the session, so the same [`SignKey`] can seed any number of
/// sequential sessions.
pub fn new_session(
    key: SignKey,
    signers: &[ParticipantIdentifier],
    digest: &[u8; 32],
) -> Result<SignSession> {
    key.validate()?;
    let key = key.restrict_to(signers)?;
    info!(
        "starting a signing session for workspace {} with a quorum of {}",
        key.workspace_id(),
        signers.len()
    );
    let m = scalar_reduce(digest);

    // Lagrange coefficients at zero, local index last.
    let mut indices: Vec<Scalar> = key.remotes.iter().map(|remote| remote.index).collect();
    indices.push(key.local.index);
    let coefficients = lagrange_at_zero(&indices)?;
    let lambda = coefficients[coefficients.len() - 1];
    let w = key.local.x * lambda;

    // Dense ranks follow the numeric order of the share indices.
    let mut sorted: Vec<[u8; 32]> = indices.iter().map(scalar_bytes).collect();
    sorted.sort_unstable();
    let local_rank = rank_of(&sorted, &key.local.index)?;
    let mut remotes = Vec::with_capacity(key.remotes.len());
    for remote in &key.remotes {
        remotes.push(RemoteSigner {
            id: remote.id.clone(),
            rank: rank_of(&sorted, &remote.index)?,
            prg: Prg::new(remote.seed),
        });
    }

    let peers: Vec<ParticipantIdentifier> =
        key.remotes.iter().map(|remote| remote.id.clone()).collect();
    let local = key.local.id.clone();
    let ctx = SignContext {
        key,
        digest: *digest,
        m,
        w,
        local_rank,
        remotes,
        round_one_private: None,
        round_two_private: None,
        signature: None,
    };
    let rounds = vec![
        SignRound::One(RoundOne),
        SignRound::Two(RoundTwo::new()),
        SignRound::Three(RoundThree::new()),
    ];
    Ok(Session::new(ctx, local, peers, rounds))
}

impl Session<SignRound> {
    /// The signature. Fails until [`Session::is_finished`] reports true.
    pub fn signature(&self) -> Result<&RecoverableSignature> {
        if !self.is_finished() {
            return Err(ProtocolError::protocol_state("signing has not finished"));
        }
        self.context()
            .signature
            .as_ref()
            .ok_or_else(|| ProtocolError::protocol_state("signing has not finished"))
    }

    /// Consumes the session and returns the signature.
    pub fn into_signature(self) -> Result<RecoverableSignature> {
        if !self.is_finished() {
            return Err(ProtocolError::protocol_state("signing has not finished"));
        }
        self.into_context()
            .signature
            .ok_or_else(|| ProtocolError::protocol_state("signing has not finished"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::keygen::{self, KeygenConfig};
    use crate::utils::testing::{init_testing, run_sessions};
    use k256::ecdsa::VerifyingKey;
    use rand::rngs::StdRng;
    use sha2::{Digest, Sha256};

    fn generated_keys(
        num_participants: usize,
        threshold: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<SignKey>> {
        let parties: Vec<(ParticipantIdentifier, Scalar)> = (0..num_participants)
            .map(|i| {
                (
                    ParticipantIdentifier::random(rng),
                    Scalar::from((i + 1) as u64),
                )
            })
            .collect();
        let mut sessions = parties
            .iter()
            .map(|(id, index)| {
                let remotes = parties
                    .iter()
                    .filter(|(other, _)| other != id)
                    .cloned()
                    .collect();
                keygen::new_session(KeygenConfig::new(
                    "vault",
                    threshold,
                    id.clone(),
                    *index,
                    remotes,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        run_sessions(&mut sessions, rng)?;
        sessions
            .into_iter()
            .map(|session| session.into_sign_key())
            .collect()
    }

    fn assert_signature_recovers(
        signature: &RecoverableSignature,
        digest: &[u8; 32],
        key: &SignKey,
    ) {
        let recovered =
            VerifyingKey::recover_from_prehash(digest, signature.signature(), signature.recovery_id())
                .unwrap();
        let expected = VerifyingKey::from_affine(key.public_key().0.to_affine()).unwrap();
        assert_eq!(recovered, expected);
        // The signature is already in low-s form.
        assert!(signature.signature().normalize_s().is_none());
    }

    #[test]
    fn quorum_signs_and_every_signer_agrees() -> Result<()> {
        let mut rng = init_testing();
        let keys = generated_keys(4, 3, &mut rng)?;
        let digest: [u8; 32] = Sha256::digest(b"transfer 10 to account 442").into();

        // Sign with the first three of the four participants.
        let signers: Vec<ParticipantIdentifier> = keys[..3]
            .iter()
            .map(|key| key.local_participant().clone())
            .collect();
        let mut sessions = keys[..3]
            .iter()
            .map(|key| new_session(key.clone(), &signers, &digest))
            .collect::<Result<Vec<_>>>()?;
        run_sessions(&mut sessions, &mut rng)?;

        let signatures = sessions
            .into_iter()
            .map(|session| session.into_signature())
            .collect::<Result<Vec<_>>>()?;
        for signature in &signatures {
            assert_eq!(signature, &signatures[0]);
            assert_signature_recovers(signature, &digest, &keys[0]);
        }
        Ok(())
    }

    #[test]
    fn one_key_signs_many_digests() -> Result<()> {
        let mut rng = init_testing();
        let keys = generated_keys(3, 3, &mut rng)?;
        let signers: Vec<ParticipantIdentifier> = keys
            .iter()
            .map(|key| key.local_participant().clone())
            .collect();

        let mut first: Option<RecoverableSignature> = None;
        for message in [b"first message".as_slice(), b"second message".as_slice()] {
            let digest: [u8; 32] = Sha256::digest(message).into();
            let mut sessions = keys
                .iter()
                .map(|key| new_session(key.clone(), &signers, &digest))
                .collect::<Result<Vec<_>>>()?;
            run_sessions(&mut sessions, &mut rng)?;
            let signature = sessions.remove(0).into_signature()?;
            assert_signature_recovers(&signature, &digest, &keys[0]);
            match &first {
                None => first = Some(signature),
                Some(previous) => assert_ne!(previous, &signature),
            }
        }
        Ok(())
    }

    #[test]
    fn signing_rejects_tampered_equation_share() -> Result<()> {
        let mut rng = init_testing();
        let keys = generated_keys(3, 3, &mut rng)?;
        let digest: [u8; 32] = Sha256::digest(b"tampered run").into();
        let signers: Vec<ParticipantIdentifier> = keys
            .iter()
            .map(|key| key.local_participant().clone())
            .collect();
        let mut sessions = keys
            .iter()
            .map(|key| new_session(key.clone(), &signers, &digest))
            .collect::<Result<Vec<_>>>()?;

        // Masking round: deliver everything honestly.
        let mut outputs = Vec::new();
        for session in sessions.iter_mut() {
            outputs.push((
                session.local_participant().clone(),
                session.pop_messages(&mut rng)?,
            ));
        }
        for sender in 0..sessions.len() {
            for recipient in 0..sessions.len() {
                if sender == recipient {
                    continue;
                }
                let (sender_id, output) = &outputs[sender];
                let recipient_id = sessions[recipient].local_participant().clone();
                let at = output
                    .recipients()
                    .iter()
                    .position(|id| id == &recipient_id)
                    .unwrap();
                sessions[recipient].push_message(
                    Some(&output.p2p_messages()[at]),
                    output.broadcast_message(),
                    sender_id,
                    0,
                )?;
            }
        }

        // Aggregation round: corrupt one equation share on its way to the
        // first participant.
        let mut outputs = Vec::new();
        for session in sessions.iter_mut() {
            outputs.push((
                session.local_participant().clone(),
                session.pop_messages(&mut rng)?,
            ));
        }
        for sender in 0..sessions.len() {
            for recipient in 0..sessions.len() {
                if sender == recipient {
                    continue;
                }
                let (sender_id, output) = &outputs[sender];
                let mut broadcast = output.broadcast_message().unwrap().to_vec();
                if recipient == 0 && sender == 1 {
                    broadcast[20] ^= 1;
                }
                sessions[recipient].push_message(None, Some(&broadcast), sender_id, 1)?;
            }
        }

        let error = sessions[0].pop_messages(&mut rng).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::Verification(_)));
        assert!(sessions[0].has_failed());

        // The honest participants still finish with a valid signature.
        for session in sessions[1..].iter_mut() {
            session.pop_messages(&mut rng)?;
            assert!(session.is_finished());
            assert_signature_recovers(session.signature()?, &digest, &keys[0]);
        }
        Ok(())
    }

    #[test]
    fn signing_rejects_bad_quorums() -> Result<()> {
        let mut rng = init_testing();
        let keys = generated_keys(4, 3, &mut rng)?;
        let digest: [u8; 32] = Sha256::digest(b"quorum checks").into();
        let ids: Vec<ParticipantIdentifier> = keys
            .iter()
            .map(|key| key.local_participant().clone())
            .collect();

        // Too small, too large, missing the local participant, a stranger,
        // and a duplicate entry.
        let cases: Vec<Vec<ParticipantIdentifier>> = vec![
            ids[..2].to_vec(),
            ids.clone(),
            vec![ids[1].clone(), ids[2].clone(), ids[3].clone()],
            vec![
                ids[0].clone(),
                ids[1].clone(),
                ParticipantIdentifier::new("stranger"),
            ],
            vec![ids[0].clone(), ids[1].clone(), ids[1].clone()],
        ];
        for signers in cases {
            let error = new_session(keys[0].clone(), &signers, &digest).unwrap_err();
            assert!(matches!(error.kind(), ErrorKind::Configuration(_)));
        }
        Ok(())
    }
}
