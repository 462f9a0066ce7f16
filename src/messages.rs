// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The six messages exchanged on the wire. Every field in this cipher suite
//! is fixed-length, so each message has a single canonical byte layout,
//! checked strictly on decode.

use curve25519_dalek::ristretto::RistrettoPoint;

use crate::envelope::{Envelope, ENVELOPE_LEN, MASKING_KEY_LEN};
use crate::errors::utils::check_slice_size;
use crate::errors::ProtocolError;
use crate::group;
use crate::key_exchange::tripledh::{
    Ke1Message, Ke2Message, Ke3Message, KE1_MESSAGE_LEN, KE2_MESSAGE_LEN, KE3_MESSAGE_LEN,
    NONCE_LEN,
};
use crate::keypair::{PublicKey, PUBLIC_KEY_LEN};

/// Byte length of a serialized [`RegistrationRequest`]
pub const REGISTRATION_REQUEST_LEN: usize = group::ELEMENT_LEN;
/// Byte length of a serialized [`RegistrationResponse`]
pub const REGISTRATION_RESPONSE_LEN: usize = group::ELEMENT_LEN + PUBLIC_KEY_LEN;
/// Byte length of a serialized [`RegistrationUpload`]
pub const REGISTRATION_UPLOAD_LEN: usize = PUBLIC_KEY_LEN + MASKING_KEY_LEN + ENVELOPE_LEN;
/// Byte length of a serialized [`CredentialRequest`]
pub const CREDENTIAL_REQUEST_LEN: usize = group::ELEMENT_LEN + KE1_MESSAGE_LEN;
/// Byte length of the masked (server public key, envelope) pair inside a
/// [`CredentialResponse`]
pub const MASKED_RESPONSE_LEN: usize = PUBLIC_KEY_LEN + ENVELOPE_LEN;
/// Byte length of a serialized [`CredentialResponse`]
pub const CREDENTIAL_RESPONSE_LEN: usize =
    group::ELEMENT_LEN + NONCE_LEN + MASKED_RESPONSE_LEN + KE2_MESSAGE_LEN;
/// Byte length of a serialized [`CredentialFinalization`]
pub const CREDENTIAL_FINALIZATION_LEN: usize = KE3_MESSAGE_LEN;

/// The first registration message, from client to server: the blinded
/// password
#[derive(Clone, Debug)]
pub struct RegistrationRequest {
    pub(crate) blinded_element: RistrettoPoint,
}

impl RegistrationRequest {
    /// Byte encoding of this message
    pub fn serialize(&self) -> Vec<u8> {
        group::serialize_point(&self.blinded_element).to_vec()
    }

    /// Decodes this message, validating the group element
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, REGISTRATION_REQUEST_LEN, "registration_request")?;
        Ok(Self {
            blinded_element: group::deserialize_point(checked_bytes, "blinded_element")?,
        })
    }
}

/// The second registration message, from server to client: the OPRF
/// evaluation and the server's static public key
#[derive(Clone, Debug)]
pub struct RegistrationResponse {
    pub(crate) evaluated_element: RistrettoPoint,
    pub(crate) server_s_pk: PublicKey,
}

impl RegistrationResponse {
    /// Byte encoding of this message
    pub fn serialize(&self) -> Vec<u8> {
        [
            &group::serialize_point(&self.evaluated_element)[..],
            &self.server_s_pk.serialize()[..],
        ]
        .concat()
    }

    /// Decodes this message, validating both group elements
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes =
            check_slice_size(input, REGISTRATION_RESPONSE_LEN, "registration_response")?;
        Ok(Self {
            evaluated_element: group::deserialize_point(
                &checked_bytes[..group::ELEMENT_LEN],
                "evaluated_element",
            )?,
            server_s_pk: PublicKey::deserialize(&checked_bytes[group::ELEMENT_LEN..])?,
        })
    }
}

/// The third registration message, from client to server: everything the
/// server stores as the password file
#[derive(Clone, Debug)]
pub struct RegistrationUpload {
    pub(crate) client_s_pk: PublicKey,
    pub(crate) masking_key: [u8; MASKING_KEY_LEN],
    pub(crate) envelope: Envelope,
}

impl RegistrationUpload {
    /// Byte encoding of this message
    pub fn serialize(&self) -> Vec<u8> {
        [
            &self.client_s_pk.serialize()[..],
            &self.masking_key[..],
            &self.envelope.serialize()[..],
        ]
        .concat()
    }

    /// Decodes this message, validating the client's public key
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, REGISTRATION_UPLOAD_LEN, "registration_upload")?;
        let mut masking_key = [0u8; MASKING_KEY_LEN];
        masking_key
            .copy_from_slice(&checked_bytes[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + MASKING_KEY_LEN]);
        Ok(Self {
            client_s_pk: PublicKey::deserialize(&checked_bytes[..PUBLIC_KEY_LEN])?,
            masking_key,
            envelope: Envelope::deserialize(&checked_bytes[PUBLIC_KEY_LEN + MASKING_KEY_LEN..])?,
        })
    }
}

/// The first login message, from client to server: the blinded password plus
/// the client's key exchange share
#[derive(Clone, Debug)]
pub struct CredentialRequest {
    pub(crate) blinded_element: RistrettoPoint,
    pub(crate) ke1_message: Ke1Message,
}

impl CredentialRequest {
    /// Byte encoding of this message
    pub fn serialize(&self) -> Vec<u8> {
        [
            &group::serialize_point(&self.blinded_element)[..],
            &self.ke1_message.serialize()[..],
        ]
        .concat()
    }

    /// Decodes this message, validating both group elements
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, CREDENTIAL_REQUEST_LEN, "credential_request")?;
        Ok(Self {
            blinded_element: group::deserialize_point(
                &checked_bytes[..group::ELEMENT_LEN],
                "blinded_element",
            )?,
            ke1_message: Ke1Message::deserialize(&checked_bytes[group::ELEMENT_LEN..])?,
        })
    }
}

/// The second login message, from server to client: the OPRF evaluation, the
/// masked credentials, and the server's key exchange share. Its layout and
/// length are identical whether or not the account exists.
#[derive(Clone, Debug)]
pub struct CredentialResponse {
    pub(crate) evaluated_element: RistrettoPoint,
    pub(crate) masking_nonce: [u8; NONCE_LEN],
    pub(crate) masked_response: [u8; MASKED_RESPONSE_LEN],
    pub(crate) ke2_message: Ke2Message,
}

impl CredentialResponse {
    /// Byte encoding of this message
    pub fn serialize(&self) -> Vec<u8> {
        [
            &group::serialize_point(&self.evaluated_element)[..],
            &self.masking_nonce[..],
            &self.masked_response[..],
            &self.ke2_message.serialize()[..],
        ]
        .concat()
    }

    /// Decodes this message, validating the group elements
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, CREDENTIAL_RESPONSE_LEN, "credential_response")?;
        let evaluated_element = group::deserialize_point(
            &checked_bytes[..group::ELEMENT_LEN],
            "evaluated_element",
        )?;
        let mut masking_nonce = [0u8; NONCE_LEN];
        masking_nonce
            .copy_from_slice(&checked_bytes[group::ELEMENT_LEN..group::ELEMENT_LEN + NONCE_LEN]);
        let mut masked_response = [0u8; MASKED_RESPONSE_LEN];
        let masked_start = group::ELEMENT_LEN + NONCE_LEN;
        masked_response
            .copy_from_slice(&checked_bytes[masked_start..masked_start + MASKED_RESPONSE_LEN]);
        Ok(Self {
            evaluated_element,
            masking_nonce,
            masked_response,
            ke2_message: Ke2Message::deserialize(
                &checked_bytes[masked_start + MASKED_RESPONSE_LEN..],
            )?,
        })
    }

    /// The credential part of this message, covered by the transcript before
    /// the key exchange fields
    pub(crate) fn serialize_without_ke2(&self) -> Vec<u8> {
        [
            &group::serialize_point(&self.evaluated_element)[..],
            &self.masking_nonce[..],
            &self.masked_response[..],
        ]
        .concat()
    }
}

/// The third login message, from client to server: the client's transcript
/// MAC
#[derive(Clone, Debug)]
pub struct CredentialFinalization {
    pub(crate) ke3_message: Ke3Message,
}

impl CredentialFinalization {
    /// Byte encoding of this message
    pub fn serialize(&self) -> Vec<u8> {
        self.ke3_message.serialize()
    }

    /// Decodes this message
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes =
            check_slice_size(input, CREDENTIAL_FINALIZATION_LEN, "credential_finalization")?;
        Ok(Self {
            ke3_message: Ke3Message::deserialize(checked_bytes)?,
        })
    }
}
