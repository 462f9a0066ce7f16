// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Thin helpers over the ristretto255 group: encoding, decoding, hashing to
//! the group and to its scalar field, and sampling of secret scalars.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};

use crate::errors::utils::check_slice_size;
use crate::errors::{InternalError, ProtocolError};

pub(crate) const ELEMENT_LEN: usize = 32;
pub(crate) const SCALAR_LEN: usize = 32;

/// Samples a uniform nonzero scalar from the supplied CSPRNG
pub(crate) fn random_nonzero_scalar<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<Scalar, InternalError> {
    loop {
        let mut bytes = [0u8; 64];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|_| InternalError::RandomnessError)?;
        let scalar = Scalar::from_bytes_mod_order_wide(&bytes);
        if scalar != Scalar::ZERO {
            return Ok(scalar);
        }
    }
}

/// Maps an arbitrary byte string to a group element under the given domain
/// separation tag, rejecting the identity
pub(crate) fn hash_to_point(input: &[u8], dst: &[u8]) -> Result<RistrettoPoint, InternalError> {
    let mut hasher = Sha512::new();
    hasher.update(u16::try_from(dst.len()).map_err(|_| InternalError::PointError)?.to_be_bytes());
    hasher.update(dst);
    hasher.update(input);
    let mut uniform_bytes = [0u8; 64];
    uniform_bytes.copy_from_slice(&hasher.finalize());
    let point = RistrettoPoint::from_uniform_bytes(&uniform_bytes);
    if point.is_identity() {
        Err(InternalError::PointError)
    } else {
        Ok(point)
    }
}

/// Maps an arbitrary byte string to a nonzero scalar under the given domain
/// separation tag
pub(crate) fn hash_to_scalar(input: &[u8], dst: &[u8]) -> Result<Scalar, InternalError> {
    let mut hasher = Sha512::new();
    hasher.update(u16::try_from(dst.len()).map_err(|_| InternalError::HashToScalar)?.to_be_bytes());
    hasher.update(dst);
    hasher.update(input);
    let mut uniform_bytes = [0u8; 64];
    uniform_bytes.copy_from_slice(&hasher.finalize());
    let scalar = Scalar::from_bytes_mod_order_wide(&uniform_bytes);
    if scalar == Scalar::ZERO {
        Err(InternalError::HashToScalar)
    } else {
        Ok(scalar)
    }
}

pub(crate) fn serialize_point(point: &RistrettoPoint) -> [u8; ELEMENT_LEN] {
    point.compress().to_bytes()
}

/// Decodes a group element, rejecting non-canonical encodings and the
/// identity element
pub(crate) fn deserialize_point(
    input: &[u8],
    name: &'static str,
) -> Result<RistrettoPoint, ProtocolError> {
    let checked_bytes = check_slice_size(input, ELEMENT_LEN, name)?;
    let mut compressed = [0u8; ELEMENT_LEN];
    compressed.copy_from_slice(checked_bytes);
    let point = CompressedRistretto(compressed)
        .decompress()
        .ok_or(ProtocolError::SerializationError)?;
    if point.is_identity() {
        return Err(InternalError::PointError.into());
    }
    Ok(point)
}

pub(crate) fn serialize_scalar(scalar: &Scalar) -> [u8; SCALAR_LEN] {
    scalar.to_bytes()
}

/// Decodes a scalar, rejecting non-canonical encodings and zero
pub(crate) fn deserialize_scalar(
    input: &[u8],
    name: &'static str,
) -> Result<Scalar, ProtocolError> {
    let checked_bytes = check_slice_size(input, SCALAR_LEN, name)?;
    let mut bytes = [0u8; SCALAR_LEN];
    bytes.copy_from_slice(checked_bytes);
    let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
        .ok_or(ProtocolError::SerializationError)?;
    if scalar == Scalar::ZERO {
        return Err(ProtocolError::SerializationError);
    }
    Ok(scalar)
}
