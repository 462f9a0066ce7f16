// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The envelope held in the server's password file. It stores no ciphertext:
//! the client's static key pair is re-derived from the randomized password,
//! and the envelope only authenticates that derivation against the server's
//! static public key.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroize;

use crate::errors::utils::check_slice_size;
use crate::errors::{InternalError, ProtocolError};
use crate::keypair::{KeyPair, PublicKey};

pub(crate) const ENVELOPE_NONCE_LEN: usize = 32;
pub(crate) const MAC_LEN: usize = 64;
pub(crate) const ENVELOPE_LEN: usize = ENVELOPE_NONCE_LEN + MAC_LEN;
pub(crate) const MASKING_KEY_LEN: usize = 64;
/// Byte length of the export key returned to the client
pub const EXPORT_KEY_LEN: usize = 64;

static STR_MASKING_KEY: &[u8] = b"MaskingKey";
static STR_ENVELOPE_NONCE: &[u8] = b"EnvelopeNonce";
static STR_AUTH_KEY: &[u8] = b"AuthKey";
static STR_EXPORT_KEY: &[u8] = b"ExportKey";
static STR_PRIVATE_KEY: &[u8] = b"PrivateKey";

/// The envelope: a derivation nonce and an HMAC binding it to the server's
/// static public key. Both halves are reproducible from the randomized
/// password, so equal inputs yield byte-equal envelopes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Envelope {
    pub(crate) nonce: [u8; ENVELOPE_NONCE_LEN],
    pub(crate) hmac: [u8; MAC_LEN],
}

impl Envelope {
    /// Builds a fresh envelope from the randomized password, returning it
    /// together with the client's derived static key pair and the export key
    pub(crate) fn seal(
        randomized_pwd_hkdf: &Hkdf<Sha512>,
        server_s_pk: &PublicKey,
    ) -> Result<(Self, KeyPair, [u8; EXPORT_KEY_LEN]), ProtocolError> {
        let mut nonce = [0u8; ENVELOPE_NONCE_LEN];
        randomized_pwd_hkdf
            .expand(STR_ENVELOPE_NONCE, &mut nonce)
            .map_err(|_| InternalError::HkdfError)?;

        let (mut auth_key, export_key, client_keypair) =
            derive_keys(randomized_pwd_hkdf, &nonce)?;

        let mut hmac =
            Hmac::<Sha512>::new_from_slice(&auth_key).map_err(|_| InternalError::HmacError)?;
        hmac.update(&nonce);
        hmac.update(&server_s_pk.serialize());
        let mut hmac_bytes = [0u8; MAC_LEN];
        hmac_bytes.copy_from_slice(&hmac.finalize().into_bytes());
        auth_key.zeroize();

        Ok((
            Self {
                nonce,
                hmac: hmac_bytes,
            },
            client_keypair,
            export_key,
        ))
    }

    /// Re-derives the client's keys from the randomized password and checks
    /// the envelope's HMAC. A wrong password surfaces here, as a single
    /// opaque MAC failure.
    pub(crate) fn open(
        &self,
        randomized_pwd_hkdf: &Hkdf<Sha512>,
        server_s_pk: &PublicKey,
    ) -> Result<(KeyPair, [u8; EXPORT_KEY_LEN]), ProtocolError> {
        let (mut auth_key, export_key, client_keypair) =
            derive_keys(randomized_pwd_hkdf, &self.nonce)?;

        let mut hmac =
            Hmac::<Sha512>::new_from_slice(&auth_key).map_err(|_| InternalError::HmacError)?;
        hmac.update(&self.nonce);
        hmac.update(&server_s_pk.serialize());
        let result = hmac.verify_slice(&self.hmac);
        auth_key.zeroize();
        result.map_err(|_| InternalError::SealOpenHmacError)?;

        Ok((client_keypair, export_key))
    }

    pub(crate) fn serialize(&self) -> Vec<u8> {
        [self.nonce.as_slice(), self.hmac.as_slice()].concat()
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, ENVELOPE_LEN, "envelope")?;
        let mut nonce = [0u8; ENVELOPE_NONCE_LEN];
        nonce.copy_from_slice(&checked_bytes[..ENVELOPE_NONCE_LEN]);
        let mut hmac = [0u8; MAC_LEN];
        hmac.copy_from_slice(&checked_bytes[ENVELOPE_NONCE_LEN..]);
        Ok(Self { nonce, hmac })
    }
}

/// The masking key protecting the credential response, derived from the same
/// randomized password as the envelope
pub(crate) fn masking_key(
    randomized_pwd_hkdf: &Hkdf<Sha512>,
) -> Result<[u8; MASKING_KEY_LEN], InternalError> {
    let mut masking_key = [0u8; MASKING_KEY_LEN];
    randomized_pwd_hkdf
        .expand(STR_MASKING_KEY, &mut masking_key)
        .map_err(|_| InternalError::HkdfError)?;
    Ok(masking_key)
}

fn derive_keys(
    randomized_pwd_hkdf: &Hkdf<Sha512>,
    nonce: &[u8; ENVELOPE_NONCE_LEN],
) -> Result<([u8; 64], [u8; EXPORT_KEY_LEN], KeyPair), ProtocolError> {
    let mut auth_key = [0u8; 64];
    randomized_pwd_hkdf
        .expand_multi_info(&[nonce, STR_AUTH_KEY], &mut auth_key)
        .map_err(|_| InternalError::HkdfError)?;

    let mut export_key = [0u8; EXPORT_KEY_LEN];
    randomized_pwd_hkdf
        .expand_multi_info(&[nonce, STR_EXPORT_KEY], &mut export_key)
        .map_err(|_| InternalError::HkdfError)?;

    let mut keypair_seed = [0u8; 64];
    randomized_pwd_hkdf
        .expand_multi_info(&[nonce, STR_PRIVATE_KEY], &mut keypair_seed)
        .map_err(|_| InternalError::HkdfError)?;
    let client_keypair = KeyPair::derive_from_seed(&keypair_seed)?;
    keypair_seed.zeroize();

    Ok((auth_key, export_key, client_keypair))
}
