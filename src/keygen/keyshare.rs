// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Long-lived key material produced by distributed key generation.

use crate::errors::{ProtocolError, Result};
use crate::math::check_share_indices;
use crate::protocol::ParticipantIdentifier;
use crate::utils::CurvePoint;
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// This participant's own share of the signing key.
#[derive(Clone, Serialize, Deserialize)]
pub struct LocalKeyShare {
    pub(crate) id: ParticipantIdentifier,
    pub(crate) index: Scalar,
    /// Shamir share of the aggregated secret. Secret material.
    pub(crate) x: Scalar,
    /// `g * x`, checked against `x` whenever a key is loaded.
    pub(crate) public_share: CurvePoint,
}

impl Debug for LocalKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyShare")
            .field("id", &self.id)
            .field("x", &"[redacted]")
            .field("public_share", &self.public_share)
            .finish()
    }
}

/// What this participant holds about one remote co-signer: its identity and
/// share index, the commitment to its secret contribution, and the pairwise
/// PRG seed assembled during key generation. The seed is derived exactly
/// once; signing sessions key fresh PRG instances from it.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteKeyShare {
    pub(crate) id: ParticipantIdentifier,
    pub(crate) index: Scalar,
    /// Shared pairwise PRG seed. Secret material.
    pub(crate) seed: [u8; 32],
    /// The remote's constant-term commitment `g * u_j`.
    pub(crate) commitment: CurvePoint,
}

impl Debug for RemoteKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKeyShare")
            .field("id", &self.id)
            .field("seed", &"[redacted]")
            .field("commitment", &self.commitment)
            .finish()
    }
}

/// A participant's complete signing key for one workspace: its own share,
/// one record per remote co-signer, and the aggregated public key.
///
/// # 🔒 Storage requirements
/// This type contains the Shamir share and the pairwise PRG seeds and must
/// be stored securely by the calling application.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignKey {
    pub(crate) workspace_id: String,
    pub(crate) threshold: usize,
    pub(crate) num_participants: usize,
    pub(crate) local: LocalKeyShare,
    pub(crate) remotes: Vec<RemoteKeyShare>,
    pub(crate) public_key: CurvePoint,
}

impl Debug for SignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignKey")
            .field("workspace_id", &self.workspace_id)
            .field("threshold", &self.threshold)
            .field("num_participants", &self.num_participants)
            .field("local", &self.local)
            .field("remotes", &self.remotes)
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl SignKey {
    /// The workspace this key was generated for.
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Number of signers required to produce a signature.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Total number of participants holding shares of this key.
    pub fn num_participants(&self) -> usize {
        self.num_participants
    }

    /// This participant's identity.
    pub fn local_participant(&self) -> &ParticipantIdentifier {
        &self.local.id
    }

    /// The remote co-signers' identities, in key order.
    pub fn remote_participants(&self) -> impl Iterator<Item = &ParticipantIdentifier> {
        self.remotes.iter().map(|remote| &remote.id)
    }

    /// The aggregated public key all shares reconstruct to.
    pub fn public_key(&self) -> &CurvePoint {
        &self.public_key
    }

    /// `g * x` for this participant's share.
    pub fn public_share(&self) -> &CurvePoint {
        &self.local.public_share
    }

    /// Serializes the key for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|_| ProtocolError::configuration("could not encode signing key"))
    }

    /// Loads a key previously produced by [`SignKey::to_bytes`],
    /// re-validating everything the encoding cannot guarantee.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: SignKey = bincode::deserialize(bytes)
            .map_err(|_| ProtocolError::configuration("could not decode signing key"))?;
        key.validate()?;
        Ok(key)
    }

    /// Restricts the key to a signing quorum. The quorum must contain the
    /// local participant, have exactly `threshold` members with no
    /// duplicates, and name only participants of this key. The restricted
    /// key keeps the surviving remotes in their original order.
    pub fn restrict_to(&self, signers: &[ParticipantIdentifier]) -> Result<SignKey> {
        if signers.len() != self.threshold {
            return Err(ProtocolError::configuration(format!(
                "expected a quorum of exactly {} signers, got {}",
                self.threshold,
                signers.len()
            )));
        }
        let mut unique = std::collections::BTreeSet::new();
        for signer in signers {
            if !unique.insert(signer) {
                return Err(ProtocolError::configuration(format!(
                    "duplicate signer {signer} in quorum"
                )));
            }
        }
        if !unique.contains(&self.local.id) {
            return Err(ProtocolError::configuration(
                "quorum does not include this participant",
            ));
        }
        for signer in signers {
            if signer != &self.local.id && !self.remotes.iter().any(|remote| &remote.id == signer) {
                return Err(ProtocolError::configuration(format!(
                    "signer {signer} does not hold a share of this key"
                )));
            }
        }

        let remotes = self
            .remotes
            .iter()
            .filter(|remote| unique.contains(&remote.id))
            .cloned()
            .collect::<Vec<_>>();
        Ok(SignKey {
            workspace_id: self.workspace_id.clone(),
            threshold: self.threshold,
            num_participants: self.threshold,
            local: self.local.clone(),
            remotes,
            public_key: self.public_key,
        })
    }

    /// The checks applied to untrusted key material on load.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.threshold < 3 {
            return Err(ProtocolError::configuration(
                "threshold must be at least three",
            ));
        }
        if self.num_participants != self.remotes.len() + 1 {
            return Err(ProtocolError::configuration(
                "participant count does not match the remote records",
            ));
        }
        if self.threshold > self.num_participants {
            return Err(ProtocolError::configuration(
                "threshold exceeds the participant count",
            ));
        }

        let mut ids = vec![self.local.id.clone()];
        ids.extend(self.remotes.iter().map(|remote| remote.id.clone()));
        let mut unique = std::collections::BTreeSet::new();
        for id in &ids {
            if id.is_empty() {
                return Err(ProtocolError::configuration("empty participant id"));
            }
            if !unique.insert(id) {
                return Err(ProtocolError::configuration(format!(
                    "duplicate participant id {id}"
                )));
            }
        }

        let mut indices = vec![self.local.index];
        indices.extend(self.remotes.iter().map(|remote| remote.index));
        check_share_indices(&indices)?;

        if self.local.x == Scalar::ZERO {
            return Err(ProtocolError::configuration("share is zero"));
        }
        if CurvePoint(ProjectivePoint::GENERATOR * self.local.x) != self.local.public_share {
            return Err(ProtocolError::configuration(
                "share does not match its public point",
            ));
        }
        if self.public_key.is_identity() {
            return Err(ProtocolError::configuration(
                "public key is the identity point",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use rand::rngs::OsRng;

    fn fixture_key(threshold: usize, num_participants: usize) -> SignKey {
        let mut rng = OsRng;
        let x = Scalar::generate_biased(&mut rng);
        let remotes = (0..num_participants - 1)
            .map(|i| RemoteKeyShare {
                id: ParticipantIdentifier::new(format!("co_signer{}", i + 1)),
                index: Scalar::from(i as u64 + 2),
                seed: [i as u8 + 1; 32],
                commitment: CurvePoint(ProjectivePoint::GENERATOR * Scalar::from(7u64 + i as u64)),
            })
            .collect();
        SignKey {
            workspace_id: "workspace 0".to_string(),
            threshold,
            num_participants,
            local: LocalKeyShare {
                id: ParticipantIdentifier::new("co_signer0"),
                index: Scalar::ONE,
                x,
                public_share: CurvePoint(ProjectivePoint::GENERATOR * x),
            },
            remotes,
            public_key: CurvePoint(ProjectivePoint::GENERATOR * Scalar::from(3u64)),
        }
    }

    #[test]
    fn persistence_round_trips_and_validates() {
        let key = fixture_key(3, 4);
        let bytes = key.to_bytes().unwrap();
        let loaded = SignKey::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.workspace_id(), "workspace 0");
        assert_eq!(loaded.threshold(), 3);
        assert_eq!(loaded.num_participants(), 4);
        assert_eq!(loaded.local.x, key.local.x);
        assert_eq!(loaded.public_key(), key.public_key());

        assert!(SignKey::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(SignKey::from_bytes(&[]).is_err());
    }

    #[test]
    fn tampered_keys_fail_validation_on_load() {
        let mut key = fixture_key(3, 4);
        key.local.x += Scalar::ONE;
        let bytes = key.to_bytes().unwrap();
        let err = SignKey::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Configuration(_)));

        let mut key = fixture_key(3, 4);
        key.remotes[0].index = key.local.index;
        assert!(SignKey::from_bytes(&key.to_bytes().unwrap()).is_err());

        let mut key = fixture_key(3, 4);
        key.threshold = 2;
        assert!(SignKey::from_bytes(&key.to_bytes().unwrap()).is_err());

        let mut key = fixture_key(3, 4);
        key.num_participants = 5;
        assert!(SignKey::from_bytes(&key.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn quorum_restriction_enforces_membership_and_size() {
        let key = fixture_key(3, 5);
        let me = key.local.id.clone();
        let others: Vec<_> = key.remote_participants().cloned().collect();

        let quorum = vec![me.clone(), others[1].clone(), others[3].clone()];
        let restricted = key.restrict_to(&quorum).unwrap();
        assert_eq!(restricted.num_participants(), 3);
        assert_eq!(restricted.remotes.len(), 2);
        assert_eq!(restricted.remotes[0].id, others[1]);
        assert_eq!(restricted.remotes[1].id, others[3]);
        assert_eq!(restricted.public_key(), key.public_key());

        // Too small, missing self, unknown member, duplicate member.
        assert!(key.restrict_to(&quorum[..2]).is_err());
        let no_self = vec![others[0].clone(), others[1].clone(), others[2].clone()];
        assert!(key.restrict_to(&no_self).is_err());
        let unknown = vec![
            me.clone(),
            others[0].clone(),
            ParticipantIdentifier::new("stranger"),
        ];
        assert!(key.restrict_to(&unknown).is_err());
        let doubled = vec![me, others[0].clone(), others[0].clone()];
        assert!(key.restrict_to(&doubled).is_err());
    }
}
