// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! First round of key generation: deal a secret contribution.
//!
//! Each participant samples a secret constant and a random polynomial over
//! it, commits to every coefficient, and evaluates one share per
//! participant. It also samples one directed seed half per remote for the
//! pairwise PRG seeds. Shares and seed halves travel peer-to-peer; the
//! commitment vector is broadcast.

use crate::errors::{ProtocolError, Result};
use crate::keygen::participant::KeygenContext;
use crate::math::{check_share_indices, Polynomial};
use crate::participant::{MessageExpectation, Round, RoundOutput};
use crate::prg::sample_seed_half;
use crate::protocol::ParticipantIdentifier;
use crate::utils::CurvePoint;
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use zeroize::ZeroizeOnDrop;

/// Everything round one deals, kept for round two. The share and seed-half
/// vectors are aligned with the context's remote order.
#[derive(ZeroizeOnDrop)]
pub(crate) struct Private {
    pub(crate) own_share: Scalar,
    pub(crate) shares: Vec<Scalar>,
    pub(crate) seed_halves: Vec<[u8; 32]>,
    #[zeroize(skip)]
    pub(crate) commitments: Vec<CurvePoint>,
}

impl Debug for Private {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("keygen::round_one::Private")
            .field("own_share", &"[redacted]")
            .field("shares", &"[redacted]")
            .field("seed_halves", &"[redacted]")
            .field("commitments", &self.commitments)
            .finish()
    }
}

/// Peer-to-peer payload: the recipient's share and this sender's directed
/// half of the pairwise seed.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Public {
    pub(crate) share: Scalar,
    pub(crate) seed_half: [u8; 32],
}

/// Broadcast payload: Feldman commitments to every polynomial coefficient.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PublicBroadcast {
    pub(crate) commitments: Vec<CurvePoint>,
}

/// The dealing round. Consumes nothing; runs as soon as the session starts.
pub struct RoundOne;

impl Round for RoundOne {
    type Context = KeygenContext;

    fn expects(&self) -> MessageExpectation {
        MessageExpectation::Nothing
    }

    fn parse_message(
        &mut self,
        _ctx: &Self::Context,
        _from: &ParticipantIdentifier,
        _p2p: Option<&[u8]>,
        _broadcast: Option<&[u8]>,
    ) -> Result<()> {
        Err(ProtocolError::protocol_state(
            "the dealing round consumes no messages",
        ))
    }

    fn receive_verify(
        &mut self,
        _ctx: &mut Self::Context,
        _from: &ParticipantIdentifier,
    ) -> Result<()> {
        Ok(())
    }

    fn compute_verify<R: RngCore + CryptoRng>(
        &mut self,
        ctx: &mut Self::Context,
        rng: &mut R,
    ) -> Result<()> {
        let mut indices: Vec<Scalar> = ctx.remotes.iter().map(|(_, index)| *index).collect();
        indices.push(ctx.local_index);
        check_share_indices(&indices)?;

        let secret = Scalar::generate_biased(&mut *rng);
        let polynomial = Polynomial::random(rng, secret, ctx.threshold);
        let commitments = polynomial.commitments();

        let shares = ctx
            .remotes
            .iter()
            .map(|(_, index)| polynomial.evaluate(index))
            .collect();
        let own_share = polynomial.evaluate(&ctx.local_index);
        let seed_halves = ctx.remotes.iter().map(|_| sample_seed_half(rng)).collect();

        ctx.round_one_private = Some(Private {
            own_share,
            shares,
            seed_halves,
            commitments,
        });
        Ok(())
    }

    fn make_message(&self, ctx: &Self::Context) -> Result<RoundOutput> {
        let private = ctx
            .round_one_private
            .as_ref()
            .ok_or_else(|| ProtocolError::protocol_state("the dealing round has not run"))?;

        let broadcast = serialize!(&PublicBroadcast {
            commitments: private.commitments.clone(),
        })?;
        let mut p2p_messages = Vec::with_capacity(ctx.remotes.len());
        for i in 0..ctx.remotes.len() {
            p2p_messages.push(serialize!(&Public {
                share: private.shares[i],
                seed_half: private.seed_halves[i],
            })?);
        }
        let recipients = ctx.remotes.iter().map(|(id, _)| id.clone()).collect();
        Ok(RoundOutput::new(p2p_messages, Some(broadcast), recipients))
    }
}
