// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Polynomial secret sharing and interpolation over the secp256k1 scalar
//! field: share dealing with Feldman commitments, the share check, and
//! Lagrange coefficients at zero.

use crate::errors::{ProtocolError, Result};
use crate::utils::{scalar_bytes, CurvePoint};
use k256::{ProjectivePoint, Scalar};
use rand::{CryptoRng, RngCore};
use std::collections::BTreeSet;
use tracing::error;

/// A polynomial over the scalar field, least-significant coefficient first.
/// The constant term is the dealt secret.
#[derive(Clone)]
pub(crate) struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// A random polynomial with the given constant term and `len`
    /// coefficients in total (degree `len - 1`).
    pub(crate) fn random<R: RngCore + CryptoRng>(
        rng: &mut R,
        constant: Scalar,
        len: usize,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(len);
        coefficients.push(constant);
        for _ in 1..len {
            coefficients.push(Scalar::generate_biased(&mut *rng));
        }
        Self { coefficients }
    }

    /// Horner evaluation at `x`.
    pub(crate) fn evaluate(&self, x: &Scalar) -> Scalar {
        let mut result = Scalar::ZERO;
        for coefficient in self.coefficients.iter().rev() {
            result = result * x + coefficient;
        }
        result
    }

    /// Feldman commitments, one generator multiple per coefficient.
    pub(crate) fn commitments(&self) -> Vec<CurvePoint> {
        self.coefficients
            .iter()
            .map(|coefficient| CurvePoint(ProjectivePoint::GENERATOR * coefficient))
            .collect()
    }
}

/// Checks a received share against the dealer's coefficient commitments:
/// `g * share` must equal the committed polynomial evaluated at `index`.
pub(crate) fn feldman_verify(commitments: &[CurvePoint], index: &Scalar, share: &Scalar) -> bool {
    let mut expected = ProjectivePoint::IDENTITY;
    let mut x_power = Scalar::ONE;
    for commitment in commitments {
        expected += commitment.0 * x_power;
        x_power *= index;
    }
    expected == ProjectivePoint::GENERATOR * share
}

/// Lagrange coefficients evaluated at zero, aligned with the input order.
/// The indices must be nonzero and pairwise distinct.
pub(crate) fn lagrange_at_zero(indices: &[Scalar]) -> Result<Vec<Scalar>> {
    let mut coefficients = Vec::with_capacity(indices.len());
    for (j, x_j) in indices.iter().enumerate() {
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (m, x_m) in indices.iter().enumerate() {
            if m == j {
                continue;
            }
            numerator *= x_m;
            denominator *= x_m - x_j;
        }
        let inverted = Option::<Scalar>::from(denominator.invert()).ok_or_else(|| {
            error!("Coincident share indices produced a zero Lagrange denominator");
            ProtocolError::verification("lagrange denominator is zero")
        })?;
        coefficients.push(numerator * inverted);
    }
    Ok(coefficients)
}

/// Rejects zero and duplicate share indices.
pub(crate) fn check_share_indices(indices: &[Scalar]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for index in indices {
        if index == &Scalar::ZERO {
            return Err(ProtocolError::configuration("share index is zero"));
        }
        if !seen.insert(scalar_bytes(index)) {
            return Err(ProtocolError::configuration(
                "share indices are not distinct",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn indices(range: std::ops::RangeInclusive<u64>) -> Vec<Scalar> {
        range.map(Scalar::from).collect()
    }

    #[test]
    fn shares_verify_and_reconstruct_the_secret() {
        let mut rng = OsRng;
        let secret = Scalar::generate_biased(&mut rng);
        let threshold = 3;
        let polynomial = Polynomial::random(&mut rng, secret, threshold);
        let commitments = polynomial.commitments();
        assert_eq!(commitments.len(), threshold);
        assert_eq!(
            commitments[0],
            CurvePoint(ProjectivePoint::GENERATOR * secret)
        );

        let all = indices(1..=5);
        let shares: Vec<Scalar> = all.iter().map(|x| polynomial.evaluate(x)).collect();
        for (index, share) in all.iter().zip(shares.iter()) {
            assert!(feldman_verify(&commitments, index, share));
        }

        // Any subset of threshold size interpolates back to the secret.
        for subset in [[0usize, 1, 2], [2, 3, 4], [0, 2, 4]] {
            let subset_indices: Vec<Scalar> = subset.iter().map(|&i| all[i]).collect();
            let lagrange = lagrange_at_zero(&subset_indices).unwrap();
            let mut recovered = Scalar::ZERO;
            for (coefficient, &i) in lagrange.iter().zip(subset.iter()) {
                recovered += coefficient * &shares[i];
            }
            assert_eq!(recovered, secret);
        }
    }

    #[test]
    fn tampered_shares_fail_the_feldman_check() {
        let mut rng = OsRng;
        let secret = Scalar::generate_biased(&mut rng);
        let polynomial = Polynomial::random(&mut rng, secret, 3);
        let commitments = polynomial.commitments();
        let index = Scalar::from(2u64);
        let share = polynomial.evaluate(&index);

        assert!(!feldman_verify(
            &commitments,
            &index,
            &(share + Scalar::ONE)
        ));
        assert!(!feldman_verify(&commitments, &Scalar::from(3u64), &share));

        let mut mutated = commitments;
        mutated[1] = CurvePoint(mutated[1].0 + ProjectivePoint::GENERATOR);
        assert!(!feldman_verify(&mutated, &index, &share));
    }

    #[test]
    fn degenerate_indices_are_rejected() {
        assert!(check_share_indices(&indices(1..=4)).is_ok());
        assert!(check_share_indices(&[Scalar::ZERO, Scalar::ONE]).is_err());
        assert!(check_share_indices(&[Scalar::ONE, Scalar::ONE]).is_err());
        assert!(lagrange_at_zero(&[Scalar::ONE, Scalar::ONE]).is_err());
    }
}
