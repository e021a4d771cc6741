// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Third round of signing: combine the shares into a signature.
//!
//! With `V` the sum of all `v` shares and `D` the sum of all `delta`
//! shares, the signature component is `s = D * V^-1`. The result is
//! normalized to the low-s form, paired with the recovery identifier fixed
//! by the nonce point, and verified against the joint public key before it
//! is released.

use crate::errors::{ProtocolError, Result};
use crate::participant::{MessageExpectation, Round, RoundOutput};
use crate::protocol::ParticipantIdentifier;
use crate::sign::participant::SignContext;
use crate::sign::round_two;
use crate::sign::signature::RecoverableSignature;
use k256::ecdsa::RecoveryId;
use k256::elliptic_curve::scalar::IsHigh;
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{error, info};

/// The combining round. Consumes the broadcast equation shares of the
/// second round and produces no messages of its own.
pub struct RoundThree {
    payloads: BTreeMap<ParticipantIdentifier, round_two::PublicBroadcast>,
}

impl RoundThree {
    pub(crate) fn new() -> Self {
        Self {
            payloads: BTreeMap::new(),
        }
    }
}

impl Round for RoundThree {
    type Context = SignContext;

    fn expects(&self) -> MessageExpectation {
        MessageExpectation::Broadcast
    }

    fn parse_message(
        &mut self,
        _ctx: &Self::Context,
        from: &ParticipantIdentifier,
        _p2p: Option<&[u8]>,
        broadcast: Option<&[u8]>,
    ) -> Result<()> {
        let broadcast =
            broadcast.ok_or_else(|| ProtocolError::message("missing broadcast payload"))?;
        let shares: round_two::PublicBroadcast = deserialize!(broadcast)?;
        self.payloads.insert(from.clone(), shares);
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
            .round_two_private
            .take()
            .ok_or_else(|| ProtocolError::protocol_state("the aggregation round has not run"))?;

        let mut big_v = private.v;
        let mut big_d = private.delta;
        for remote in &ctx.remotes {
            let shares = self.payloads.get(&remote.id).ok_or_else(|| {
                ProtocolError::protocol_state(format!("no payload from {}", remote.id))
            })?;
            big_v += shares.v;
            big_d += shares.delta;
        }

        let v_inverse = Option::<Scalar>::from(big_v.invert()).ok_or_else(|| {
            error!("aggregated blinding value is not invertible");
            ProtocolError::verification("aggregated blinding value is not invertible")
        })?;
        let mut s = big_d * v_inverse;
        let mut nonce_y_is_odd = private.nonce_y_is_odd;
        if bool::from(s.is_high()) {
            s = -s;
            nonce_y_is_odd = !nonce_y_is_odd;
        }
        if s == Scalar::ZERO {
            error!("signature s component is zero");
            return Err(ProtocolError::verification(
                "signature s component is zero",
            ));
        }

        let recovery_id = RecoveryId::new(nonce_y_is_odd, private.nonce_x_reduced);
        let signature = RecoverableSignature::from_scalars(&private.r, &s, recovery_id)?;
        signature.check_recovery(&ctx.digest, ctx.key.public_key())?;

        ctx.signature = Some(signature);
        info!(
            "produced a verified signature for workspace {}",
            ctx.key.workspace_id()
        );
        Ok(())
    }

    fn make_message(&self, _ctx: &Self::Context) -> Result<RoundOutput> {
        Ok(RoundOutput::empty())
    }
}
