// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Static and ephemeral Diffie-Hellman keys over ristretto255

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::errors::{InternalError, ProtocolError};
use crate::group;

/// Byte length of a serialized public key
pub const PUBLIC_KEY_LEN: usize = group::ELEMENT_LEN;
/// Byte length of a serialized private key
pub const PRIVATE_KEY_LEN: usize = group::SCALAR_LEN;

/// A public key for Diffie-Hellman
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey(pub(crate) RistrettoPoint);

impl PublicKey {
    /// The byte encoding of this public key
    pub fn serialize(&self) -> [u8; PUBLIC_KEY_LEN] {
        group::serialize_point(&self.0)
    }

    /// Decodes a public key, rejecting invalid and identity encodings
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        group::deserialize_point(input, "public_key").map(Self)
    }
}

/// A private key for Diffie-Hellman, zeroed on drop
#[derive(Clone, Debug)]
pub struct PrivateKey(pub(crate) Scalar);

impl PrivateKey {
    /// The byte encoding of this private key
    pub fn serialize(&self) -> [u8; PRIVATE_KEY_LEN] {
        group::serialize_scalar(&self.0)
    }

    /// Decodes a private key, rejecting non-canonical and zero encodings
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        group::deserialize_scalar(input, "private_key").map(Self)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// The raw shared secret between a private key and a public key
pub(crate) fn diffie_hellman(sk: &PrivateKey, pk: &PublicKey) -> [u8; PUBLIC_KEY_LEN] {
    group::serialize_point(&(pk.0 * sk.0))
}

/// A private and public key pair
#[derive(Clone, Debug)]
pub struct KeyPair {
    sk: PrivateKey,
    pk: PublicKey,
}

impl KeyPair {
    pub(crate) fn from_private_key(sk: PrivateKey) -> Self {
        let pk = PublicKey(RistrettoPoint::mul_base(&sk.0));
        Self { sk, pk }
    }

    /// Generates a fresh key pair from the supplied CSPRNG
    pub fn generate_random<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, InternalError> {
        let sk = group::random_nonzero_scalar(rng)?;
        Ok(Self::from_private_key(PrivateKey(sk)))
    }

    /// Derives a key pair deterministically from a uniform 64-byte seed
    pub(crate) fn derive_from_seed(seed: &[u8; 64]) -> Result<Self, InternalError> {
        let sk = Scalar::from_bytes_mod_order_wide(seed);
        if sk == Scalar::ZERO {
            return Err(InternalError::HashToScalar);
        }
        Ok(Self::from_private_key(PrivateKey(sk)))
    }

    /// The public key of this key pair
    pub fn public(&self) -> &PublicKey {
        &self.pk
    }

    /// The private key of this key pair
    pub fn private(&self) -> &PrivateKey {
        &self.sk
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn public_key_round_trip() {
        let keypair = KeyPair::generate_random(&mut OsRng).unwrap();
        let bytes = keypair.public().serialize();
        assert_eq!(*keypair.public(), PublicKey::deserialize(&bytes).unwrap());
    }

    #[test]
    fn private_key_determines_public_key() {
        let keypair = KeyPair::generate_random(&mut OsRng).unwrap();
        let sk = PrivateKey::deserialize(&keypair.private().serialize()).unwrap();
        let rebuilt = KeyPair::from_private_key(sk);
        assert_eq!(keypair.public(), rebuilt.public());
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let seed = [7u8; 64];
        let kp1 = KeyPair::derive_from_seed(&seed).unwrap();
        let kp2 = KeyPair::derive_from_seed(&seed).unwrap();
        assert_eq!(kp1.public(), kp2.public());
    }

    #[test]
    fn diffie_hellman_agrees() {
        let a = KeyPair::generate_random(&mut OsRng).unwrap();
        let b = KeyPair::generate_random(&mut OsRng).unwrap();
        assert_eq!(
            diffie_hellman(a.private(), b.public()),
            diffie_hellman(b.private(), a.public())
        );
    }
}
