// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The signing output: a standard ECDSA signature plus its recovery bits.

use crate::errors::{ProtocolError, Result};
use crate::utils::{scalar_bytes, CurvePoint};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::Scalar;
use tracing::error;

/// A low-s secp256k1 ECDSA signature with the recovery identifier needed to
/// recover the joint public key from the signed digest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecoverableSignature {
    signature: Signature,
    recovery_id: RecoveryId,
}

impl RecoverableSignature {
    pub(crate) fn from_scalars(r: &Scalar, s: &Scalar, recovery_id: RecoveryId) -> Result<Self> {
        let signature = Signature::from_scalars(scalar_bytes(r), scalar_bytes(s))
            .map_err(|_| ProtocolError::verification("signature components are out of range"))?;
        Ok(Self {
            signature,
            recovery_id,
        })
    }

    /// Recovers the signer from the digest and compares it to the expected
    /// public key. Every participant runs this before releasing a signature.
    pub(crate) fn check_recovery(&self, digest: &[u8; 32], public_key: &CurvePoint) -> Result<()> {
        let recovered = VerifyingKey::recover_from_prehash(digest, &self.signature, self.recovery_id)
            .map_err(|_| {
                error!("no public key is recoverable from the signature");
                ProtocolError::verification("no public key is recoverable from the signature")
            })?;
        let expected = VerifyingKey::from_affine(public_key.0.to_affine()).map_err(|_| {
            ProtocolError::verification("joint public key is not a valid verifying key")
        })?;
        if recovered != expected {
            error!("signature does not verify against the joint public key");
            return Err(ProtocolError::verification(
                "signature does not verify against the joint public key",
            ));
        }
        Ok(())
    }

    /// The plain ECDSA signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The recovery identifier matching [`RecoverableSignature::signature`].
    pub fn recovery_id(&self) -> RecoveryId {
        self.recovery_id
    }
}
