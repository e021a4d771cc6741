// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Second round of signing: aggregate the nonce and blind the equation.
//!
//! The nonce point is the sum of every nonce commitment; its x coordinate
//! reduces to the signature component `r`. The local contributions to the
//! blinded signature equation are
//!
//! ```text
//! u = w * phi + sum_j (w * phi_j + phi * w_j)
//! v = k * phi + sum_j (k * phi_j + phi * k_j)
//! delta = m * phi + r * u
//! ```
//!
//! over the received triples (zero triples contribute nothing). Because
//! each unordered pair's cross terms appear exactly once across the quorum
//! and the PRG masks cancel, the quorum sums satisfy
//! `sum(v) = K * Phi` and `sum(delta) = (m + r * x) * Phi` for the joint
//! nonce `K`, joint blinding `Phi` and joint secret `x`. Only `delta` and
//! `v` are broadcast.

use crate::errors::{ProtocolError, Result};
use crate::participant::{MessageExpectation, Round, RoundOutput};
use crate::protocol::ParticipantIdentifier;
use crate::sign::participant::SignContext;
use crate::sign::round_one;
use crate::utils::{exceeds_group_order, scalar_reduce};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

/// Everything round three needs: the local equation shares plus the
/// signature components fixed by the nonce point.
#[derive(Debug)]
pub(crate) struct Private {
    pub(crate) delta: Scalar,
    pub(crate) v: Scalar,
    pub(crate) r: Scalar,
    pub(crate) nonce_y_is_odd: bool,
    pub(crate) nonce_x_reduced: bool,
}

/// Broadcast payload: the blinded equation shares.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PublicBroadcast {
    pub(crate) delta: Scalar,
    pub(crate) v: Scalar,
}

/// The aggregation round. Consumes the masked triples and nonce
/// commitments of the first round.
pub struct RoundTwo {
    payloads: BTreeMap<ParticipantIdentifier, (round_one::Public, round_one::PublicBroadcast)>,
}

impl RoundTwo {
    pub(crate) fn new() -> Self {
        Self {
            payloads: BTreeMap::new(),
        }
    }
}

impl Round for RoundTwo {
    type Context = SignContext;

    fn expects(&self) -> MessageExpectation {
        MessageExpectation::BroadcastAndP2p
    }

    fn parse_message(
        &mut self,
        _ctx: &Self::Context,
        from: &ParticipantIdentifier,
        p2p: Option<&[u8]>,
        broadcast: Option<&[u8]>,
    ) -> Result<()> {
        let p2p = p2p.ok_or_else(|| ProtocolError::message("missing peer-to-peer payload"))?;
        let broadcast =
            broadcast.ok_or_else(|| ProtocolError::message("missing broadcast payload"))?;
        let triple: round_one::Public = deserialize!(p2p)?;
        let commitment: round_one::PublicBroadcast = deserialize!(broadcast)?;
        self.payloads.insert(from.clone(), (triple, commitment));
        Ok(())
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
        _rng: &mut R,
    ) -> Result<()> {
        let private = ctx
            .round_one_private
            .take()
            .ok_or_else(|| ProtocolError::protocol_state("the masking round has not run"))?;

        let mut nonce_point = private.gk.0;
        for remote in &ctx.remotes {
            let (_, commitment) = self
                .payloads
                .get(&remote.id)
                .ok_or_else(|| ProtocolError::protocol_state(format!("no payload from {}", remote.id)))?;
            nonce_point += commitment.gk.0;
        }

        let (nonce_x, nonce_y_is_odd) = crate::utils::CurvePoint(nonce_point)
            .affine_coordinates()
            .ok_or_else(|| {
                error!("aggregated nonce point is the identity");
                ProtocolError::verification("aggregated nonce point is the identity")
            })?;
        let nonce_x_reduced = exceeds_group_order(&nonce_x);
        let r = scalar_reduce(&nonce_x);
        if r == Scalar::ZERO {
            error!("nonce x coordinate reduces to zero");
            return Err(ProtocolError::verification(
                "nonce x coordinate reduces to zero",
            ));
        }

        let mut u = private.w * private.phi;
        let mut v = private.k * private.phi;
        for remote in &ctx.remotes {
            let (triple, _) = self
                .payloads
                .get(&remote.id)
                .ok_or_else(|| ProtocolError::protocol_state(format!("no payload from {}", remote.id)))?;
            u += private.w * triple.phi + private.phi * triple.w;
            v += private.k * triple.phi + private.phi * triple.k;
        }
        let delta = ctx.m * private.phi + r * u;

        ctx.round_two_private = Some(Private {
            delta,
            v,
            r,
            nonce_y_is_odd,
            nonce_x_reduced,
        });
        Ok(())
    }

    fn make_message(&self, ctx: &Self::Context) -> Result<RoundOutput> {
        let private = ctx
            .round_two_private
            .as_ref()
            .ok_or_else(|| ProtocolError::protocol_state("the aggregation round has not run"))?;
        let broadcast = serialize!(&PublicBroadcast {
            delta: private.delta,
            v: private.v,
        })?;
        let recipients = ctx.remotes.iter().map(|remote| remote.id.clone()).collect();
        Ok(RoundOutput::new(Vec::new(), Some(broadcast), recipients))
    }
}
