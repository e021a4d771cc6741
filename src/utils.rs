// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Curve and scalar helpers shared across the protocols.

use crate::errors::{ProtocolError, Result};
use k256::{
    elliptic_curve::{
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Curve,
    },
    EncodedPoint, ProjectivePoint, Scalar, Secp256k1, U256,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wrapper around k256's projective point, fixing the SEC1 compressed
/// encoding used on the wire and in persisted keys. The identity point is
/// never a legitimate value in this protocol, so decoding rejects it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CurvePoint(pub(crate) ProjectivePoint);

impl CurvePoint {
    pub(crate) const GENERATOR: Self = CurvePoint(ProjectivePoint::GENERATOR);
    pub(crate) const IDENTITY: Self = CurvePoint(ProjectivePoint::IDENTITY);

    pub(crate) fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }

    /// SEC1 compressed encoding (33 bytes).
    pub(crate) fn to_bytes(self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let encoded = EncodedPoint::from_bytes(bytes)
            .map_err(|_| ProtocolError::message("invalid SEC1 point encoding"))?;
        let point = Option::<ProjectivePoint>::from(ProjectivePoint::from_encoded_point(&encoded))
            .ok_or_else(|| ProtocolError::message("point is not on the curve"))?;
        if point == ProjectivePoint::IDENTITY {
            return Err(ProtocolError::message("point is the identity"));
        }
        Ok(CurvePoint(point))
    }

    /// Big-endian affine x-coordinate and the parity of y, or `None` for the
    /// identity point.
    pub(crate) fn affine_coordinates(&self) -> Option<([u8; 32], bool)> {
        let affine = self.0.to_affine();
        let uncompressed = affine.to_encoded_point(false);
        let x = uncompressed.x()?;
        let mut x_bytes = [0u8; 32];
        x_bytes.copy_from_slice(x);
        let y_is_odd = affine.to_encoded_point(true).as_bytes().first() == Some(&0x03);
        Some((x_bytes, y_is_odd))
    }
}

impl Serialize for CurvePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        CurvePoint::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Interprets 32 big-endian bytes as a scalar mod the group order.
pub(crate) fn scalar_reduce(bytes: &[u8; 32]) -> Scalar {
    <Scalar as k256::elliptic_curve::ops::Reduce<U256>>::reduce_bytes(&(*bytes).into())
}

/// Big-endian bytes of a scalar, used for ordering and duplicate checks.
pub(crate) fn scalar_bytes(scalar: &Scalar) -> [u8; 32] {
    scalar.to_bytes().into()
}

/// Whether the big-endian integer in `bytes` is not a canonical scalar, that
/// is, it wrapped when reduced mod the group order. Feeds the recovery bit.
pub(crate) fn exceeds_group_order(bytes: &[u8; 32]) -> bool {
    U256::from_be_slice(bytes) >= Secp256k1::ORDER
}
