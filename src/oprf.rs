// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The oblivious pseudorandom function evaluated between client and server,
//! along with derivation of per-credential OPRF keys from the deployment seed

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};

use crate::errors::{InternalError, ProtocolError};
use crate::group;

pub(crate) const OPRF_SEED_LEN: usize = 64;
pub(crate) const OPRF_OUTPUT_LEN: usize = 64;

static STR_HASH_TO_GROUP: &[u8] = b"HashToGroup-OPAQUE-ristretto255-SHA512";
static STR_HASH_TO_SCALAR: &[u8] = b"HashToScalar-OPAQUE-ristretto255-SHA512";
static STR_FINALIZE: &[u8] = b"Finalize-OPAQUE-ristretto255-SHA512";
static STR_OPRF_KEY: &[u8] = b"OprfKey";

/// Blinds the password with a fresh random scalar, producing the blinding
/// factor and the element sent to the server
pub(crate) fn blind<R: RngCore + CryptoRng>(
    rng: &mut R,
    input: &[u8],
) -> Result<(Scalar, RistrettoPoint), ProtocolError> {
    let blinding_factor = group::random_nonzero_scalar(rng)?;
    let hashed_point = group::hash_to_point(input, STR_HASH_TO_GROUP)?;
    Ok((blinding_factor, hashed_point * blinding_factor))
}

/// The server's evaluation of a blinded element under its per-credential key.
/// Deterministic for a fixed key.
pub(crate) fn evaluate(oprf_key: &Scalar, blinded_element: &RistrettoPoint) -> RistrettoPoint {
    blinded_element * oprf_key
}

/// Unblinds the server's evaluation and hashes it together with the input
/// into the fixed-length OPRF output
pub(crate) fn finalize(
    input: &[u8],
    blinding_factor: &Scalar,
    evaluated_element: &RistrettoPoint,
) -> Result<[u8; OPRF_OUTPUT_LEN], ProtocolError> {
    let unblinded_element = evaluated_element * blinding_factor.invert();
    let serialized_element = group::serialize_point(&unblinded_element);

    let mut hasher = Sha512::new();
    hasher.update(
        u16::try_from(input.len())
            .map_err(|_| ProtocolError::SerializationError)?
            .to_be_bytes(),
    );
    hasher.update(input);
    hasher.update(u16::try_from(serialized_element.len()).map_err(|_| ProtocolError::SerializationError)?.to_be_bytes());
    hasher.update(serialized_element);
    hasher.update(STR_FINALIZE);

    let mut output = [0u8; OPRF_OUTPUT_LEN];
    output.copy_from_slice(&hasher.finalize());
    Ok(output)
}

/// Derives the OPRF key for one credential identifier from the deployment
/// seed, so every password file is bound to the account it was created for
pub(crate) fn oprf_key_from_seed(
    oprf_seed: &[u8; OPRF_SEED_LEN],
    credential_identifier: &[u8],
) -> Result<Scalar, InternalError> {
    let hkdf = Hkdf::<Sha512>::from_prk(oprf_seed).map_err(|_| InternalError::HkdfError)?;
    let mut ikm = [0u8; 64];
    hkdf.expand_multi_info(&[credential_identifier, STR_OPRF_KEY], &mut ikm)
        .map_err(|_| InternalError::HkdfError)?;
    group::hash_to_scalar(&ikm, STR_HASH_TO_SCALAR)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn oprf_completes_without_server_learning_input() {
        let oprf_key = group::random_nonzero_scalar(&mut OsRng).unwrap();
        let (blinding_factor, blinded) = blind(&mut OsRng, b"password").unwrap();
        let evaluated = evaluate(&oprf_key, &blinded);
        let output = finalize(b"password", &blinding_factor, &evaluated).unwrap();

        // unblinded evaluation must match a direct evaluation of the hashed input
        let direct = evaluate(
            &oprf_key,
            &group::hash_to_point(b"password", STR_HASH_TO_GROUP).unwrap(),
        );
        let direct_output = finalize(b"password", &Scalar::ONE, &direct).unwrap();
        assert_eq!(output, direct_output);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let oprf_key = oprf_key_from_seed(&[3u8; OPRF_SEED_LEN], b"alice").unwrap();
        let (_, blinded) = blind(&mut OsRng, b"password").unwrap();
        assert_eq!(evaluate(&oprf_key, &blinded), evaluate(&oprf_key, &blinded));
    }

    #[test]
    fn blinding_randomizes_the_wire_element() {
        let (_, blinded1) = blind(&mut OsRng, b"password").unwrap();
        let (_, blinded2) = blind(&mut OsRng, b"password").unwrap();
        assert_ne!(blinded1, blinded2);
    }

    #[test]
    fn key_derivation_separates_credential_identifiers() {
        let seed = [3u8; OPRF_SEED_LEN];
        let key1 = oprf_key_from_seed(&seed, b"alice").unwrap();
        let key2 = oprf_key_from_seed(&seed, b"bob").unwrap();
        assert_ne!(key1, key2);
        assert_eq!(key1, oprf_key_from_seed(&seed, b"alice").unwrap());
    }
}
