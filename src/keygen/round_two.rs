// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Second round of key generation: verify the dealt shares and assemble the
//! long-lived signing key.
//!
//! Every received share is checked against the sender's Feldman commitments
//! before anything is aggregated. The local signing share is the sum of all
//! shares dealt to this participant, the public key is the sum of all
//! constant-term commitments, and each pairwise PRG seed is the sum of the
//! two directed seed halves.

use crate::errors::{ProtocolError, Result};
use crate::keygen::keyshare::{LocalKeyShare, RemoteKeyShare, SignKey};
use crate::keygen::participant::KeygenContext;
use crate::keygen::round_one::{Public, PublicBroadcast};
use crate::math::feldman_verify;
use crate::participant::{MessageExpectation, Round, RoundOutput};
use crate::prg::combine_seed_halves;
use crate::protocol::ParticipantIdentifier;
use crate::utils::CurvePoint;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{error, info};

/// The verification round. Consumes one share and one commitment vector per
/// remote and produces no messages of its own.
pub struct RoundTwo {
    payloads: BTreeMap<ParticipantIdentifier, (Public, PublicBroadcast)>,
}

impl RoundTwo {
    pub(crate) fn new() -> Self {
        Self {
            payloads: BTreeMap::new(),
        }
    }
}

impl Round for RoundTwo {
    type Context = KeygenContext;

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
        let share: Public = deserialize!(p2p)?;
        let commitments: PublicBroadcast = deserialize!(broadcast)?;
        self.payloads.insert(from.clone(), (share, commitments));
        Ok(())
    }

    fn receive_verify(
        &mut self,
        ctx: &mut Self::Context,
        from: &ParticipantIdentifier,
    ) -> Result<()> {
        let (public, broadcast) = self
            .payloads
            .get(from)
            .ok_or_else(|| ProtocolError::protocol_state(format!("no payload from {from}")))?;
        if broadcast.commitments.len() != ctx.threshold {
            error!("commitment vector from {from} has the wrong length");
            return Err(ProtocolError::verification(format!(
                "expected {} commitments from {from}, got {}",
                ctx.threshold,
                broadcast.commitments.len(),
            )));
        }
        if !feldman_verify(&broadcast.commitments, &ctx.local_index, &public.share) {
            error!("share dealt by {from} does not match its commitments");
            return Err(ProtocolError::verification(format!(
                "share dealt by {from} does not match its commitments",
            )));
        }
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
            .ok_or_else(|| ProtocolError::protocol_state("the dealing round has not run"))?;

        let mut x = private.own_share;
        let mut public_key = private.commitments[0].0;
        let mut remotes = Vec::with_capacity(ctx.remotes.len());
        for (i, (id, index)) in ctx.remotes.iter().enumerate() {
            let (public, broadcast) = self
                .payloads
                .get(id)
                .ok_or_else(|| ProtocolError::protocol_state(format!("no payload from {id}")))?;
            x += public.share;
            public_key += broadcast.commitments[0].0;
            remotes.push(RemoteKeyShare {
                id: id.clone(),
                index: *index,
                seed: combine_seed_halves(&private.seed_halves[i], &public.seed_half),
                commitment: broadcast.commitments[0],
            });
        }

        let public_key = CurvePoint(public_key);
        if public_key.is_identity() {
            error!("aggregated public key is the identity point");
            return Err(ProtocolError::verification(
                "aggregated public key is the identity point",
            ));
        }

        ctx.sign_key = Some(SignKey {
            workspace_id: ctx.workspace_id.clone(),
            threshold: ctx.threshold,
            num_participants: ctx.remotes.len() + 1,
            local: LocalKeyShare {
                id: ctx.local_id.clone(),
                index: ctx.local_index,
                x,
                public_share: CurvePoint(CurvePoint::GENERATOR.0 * x),
            },
            remotes,
            public_key,
        });
        info!(
            "distributed key generation finished for workspace {}",
            ctx.workspace_id
        );
        Ok(())
    }

    fn make_message(&self, _ctx: &Self::Context) -> Result<RoundOutput> {
        Ok(RoundOutput::empty())
    }
}
