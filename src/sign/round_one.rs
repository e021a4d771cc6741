// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! First round of signing: mask the local secrets and commit to the nonce.
//!
//! The participant samples a nonce share `k` and a blinding share `phi`,
//! then adds the pairwise PRG masks to `k`, `phi` and the Lagrange-scaled
//! signing share `w`. Each mask is drawn by both endpoints of a pair and
//! applied with opposite signs, so the masks cancel from any sum over the
//! whole quorum while individually hiding the shares.
//!
//! The masked triple travels peer-to-peer, but only to the peers on this
//! participant's arc; everyone else receives zeroes. The arc assigns each
//! unordered pair exactly one direction that carries real values, which is
//! what makes each product term appear exactly once in the aggregated
//! signature equation. The nonce commitment `g * k` is broadcast.

use crate::errors::{ProtocolError, Result};
use crate::participant::{MessageExpectation, Round, RoundOutput};
use crate::protocol::ParticipantIdentifier;
use crate::sign::participant::{RemoteSigner, SignContext};
use crate::utils::CurvePoint;
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use zeroize::ZeroizeOnDrop;

/// The masked secrets of this participant, kept until the second round
/// aggregates them.
#[derive(ZeroizeOnDrop)]
pub(crate) struct Private {
    pub(crate) k: Scalar,
    pub(crate) phi: Scalar,
    pub(crate) w: Scalar,
    #[zeroize(skip)]
    pub(crate) gk: CurvePoint,
}

impl Debug for Private {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("sign::round_one::Private")
            .field("k", &"[redacted]")
            .field("phi", &"[redacted]")
            .field("w", &"[redacted]")
            .field("gk", &self.gk)
            .finish()
    }
}

/// Peer-to-peer payload: the masked triple, or all zeroes for peers outside
/// the sender's arc.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Public {
    pub(crate) k: Scalar,
    pub(crate) w: Scalar,
    pub(crate) phi: Scalar,
}

/// Broadcast payload: the nonce commitment `g * k`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PublicBroadcast {
    pub(crate) gk: CurvePoint,
}

/// Draws one mask per remote from the shared PRGs and folds them into
/// `value`. The endpoint with the higher rank adds, the other subtracts.
fn apply_masks(value: Scalar, local_rank: usize, remotes: &mut [RemoteSigner]) -> Scalar {
    let mut masked = value;
    for remote in remotes.iter_mut() {
        let draw = remote.prg.next_scalar();
        if local_rank > remote.rank {
            masked += draw;
        } else {
            masked -= draw;
        }
    }
    masked
}

/// The arc of ranks that receive this participant's real masked triple,
/// as an inclusive range `(start, end)` on the rank circle.
pub(crate) fn arc_bounds(local_rank: usize, threshold: usize) -> (usize, usize) {
    let start = (local_rank + 1) % threshold;
    let end = if threshold % 2 == 1 {
        (local_rank + (threshold - 1) / 2) % threshold
    } else if local_rank < threshold / 2 {
        (local_rank + threshold / 2) % threshold
    } else {
        (local_rank + threshold / 2 - 1) % threshold
    };
    (start, end)
}

/// Whether `rank` lies on the inclusive circular range `[start, end]`.
pub(crate) fn rank_in_arc(rank: usize, start: usize, end: usize) -> bool {
    if start <= end {
        rank >= start && rank <= end
    } else {
        rank >= start || rank <= end
    }
}

/// The masking round. Consumes nothing; runs as soon as the session starts.
pub struct RoundOne;

impl Round for RoundOne {
    type Context = SignContext;

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
            "the masking round consumes no messages",
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
        let k = Scalar::generate_biased(&mut *rng);
        let phi = Scalar::generate_biased(&mut *rng);

        // One PRG sweep per value; the draw order is fixed by the protocol.
        let k = apply_masks(k, ctx.local_rank, &mut ctx.remotes);
        let phi = apply_masks(phi, ctx.local_rank, &mut ctx.remotes);
        let w = apply_masks(ctx.w, ctx.local_rank, &mut ctx.remotes);

        let gk = CurvePoint(CurvePoint::GENERATOR.0 * k);
        ctx.round_one_private = Some(Private { k, phi, w, gk });
        Ok(())
    }

    fn make_message(&self, ctx: &Self::Context) -> Result<RoundOutput> {
        let private = ctx
            .round_one_private
            .as_ref()
            .ok_or_else(|| ProtocolError::protocol_state("the masking round has not run"))?;

        let (start, end) = arc_bounds(ctx.local_rank, ctx.key.threshold());
        let mut p2p_messages = Vec::with_capacity(ctx.remotes.len());
        for remote in &ctx.remotes {
            let payload = if rank_in_arc(remote.rank, start, end) {
                Public {
                    k: private.k,
                    w: private.w,
                    phi: private.phi,
                }
            } else {
                Public {
                    k: Scalar::ZERO,
                    w: Scalar::ZERO,
                    phi: Scalar::ZERO,
                }
            };
            p2p_messages.push(serialize!(&payload)?);
        }
        let broadcast = serialize!(&PublicBroadcast { gk: private.gk })?;
        let recipients = ctx.remotes.iter().map(|remote| remote.id.clone()).collect();
        Ok(RoundOutput::new(p2p_messages, Some(broadcast), recipients))
    }
}
