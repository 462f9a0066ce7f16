// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The triple Diffie-Hellman key exchange: three DH shares between the
//! ephemeral and static keys of both parties, fed through a TLS-1.3-style
//! key schedule over the running transcript hash

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::errors::utils::check_slice_size;
use crate::errors::{InternalError, ProtocolError};
use crate::keypair::{diffie_hellman, KeyPair, PrivateKey, PublicKey, PUBLIC_KEY_LEN};

pub(crate) const NONCE_LEN: usize = 32;
pub(crate) const MAC_LEN: usize = 64;
/// Byte length of the session key shared by both parties after a login
pub const SESSION_KEY_LEN: usize = 64;
pub(crate) const KE1_MESSAGE_LEN: usize = NONCE_LEN + PUBLIC_KEY_LEN;
pub(crate) const KE1_STATE_LEN: usize = 32 + NONCE_LEN;
pub(crate) const KE2_MESSAGE_LEN: usize = NONCE_LEN + PUBLIC_KEY_LEN + MAC_LEN;
pub(crate) const KE2_STATE_LEN: usize = MAC_LEN + SESSION_KEY_LEN;
pub(crate) const KE3_MESSAGE_LEN: usize = MAC_LEN;

static STR_CONTEXT: &[u8] = b"OPAQUEv1";
static STR_OPAQUE: &[u8] = b"OPAQUE-";
static STR_HANDSHAKE_SECRET: &[u8] = b"HandshakeSecret";
static STR_SESSION_KEY: &[u8] = b"SessionKey";
static STR_SERVER_MAC: &[u8] = b"ServerMAC";
static STR_CLIENT_MAC: &[u8] = b"ClientMAC";

/// The client's secret state between its two login calls
#[derive(Clone, Debug)]
pub(crate) struct Ke1State {
    pub(crate) client_e_sk: PrivateKey,
    pub(crate) client_nonce: [u8; NONCE_LEN],
}

/// The key exchange fields of the first login message
#[derive(Clone, Debug)]
pub(crate) struct Ke1Message {
    pub(crate) client_nonce: [u8; NONCE_LEN],
    pub(crate) client_e_pk: PublicKey,
}

/// The server's secret state between its two login calls: the keys are
/// derived eagerly, so only the session key and the MAC the client must
/// produce remain
#[derive(Clone, Debug)]
pub(crate) struct Ke2State {
    pub(crate) expected_client_mac: [u8; MAC_LEN],
    pub(crate) session_key: [u8; SESSION_KEY_LEN],
}

/// The key exchange fields of the second login message
#[derive(Clone, Debug)]
pub(crate) struct Ke2Message {
    pub(crate) server_nonce: [u8; NONCE_LEN],
    pub(crate) server_e_pk: PublicKey,
    pub(crate) mac: [u8; MAC_LEN],
}

/// The third login message: the client's MAC over the full transcript
#[derive(Clone, Debug)]
pub(crate) struct Ke3Message {
    pub(crate) mac: [u8; MAC_LEN],
}

impl Drop for Ke1State {
    fn drop(&mut self) {
        self.client_nonce.zeroize();
    }
}

impl Drop for Ke2State {
    fn drop(&mut self) {
        self.expected_client_mac.zeroize();
        self.session_key.zeroize();
    }
}

impl Ke1State {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        [&self.client_e_sk.serialize()[..], &self.client_nonce[..]].concat()
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, KE1_STATE_LEN, "ke1_state")?;
        let client_e_sk = PrivateKey::deserialize(&checked_bytes[..32])?;
        let mut client_nonce = [0u8; NONCE_LEN];
        client_nonce.copy_from_slice(&checked_bytes[32..]);
        Ok(Self {
            client_e_sk,
            client_nonce,
        })
    }
}

impl Ke1Message {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        [&self.client_nonce[..], &self.client_e_pk.serialize()[..]].concat()
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, KE1_MESSAGE_LEN, "ke1_message")?;
        let mut client_nonce = [0u8; NONCE_LEN];
        client_nonce.copy_from_slice(&checked_bytes[..NONCE_LEN]);
        Ok(Self {
            client_nonce,
            client_e_pk: PublicKey::deserialize(&checked_bytes[NONCE_LEN..])?,
        })
    }
}

impl Ke2State {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        [&self.expected_client_mac[..], &self.session_key[..]].concat()
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, KE2_STATE_LEN, "ke2_state")?;
        let mut expected_client_mac = [0u8; MAC_LEN];
        expected_client_mac.copy_from_slice(&checked_bytes[..MAC_LEN]);
        let mut session_key = [0u8; SESSION_KEY_LEN];
        session_key.copy_from_slice(&checked_bytes[MAC_LEN..]);
        Ok(Self {
            expected_client_mac,
            session_key,
        })
    }

    /// Verifies the client's MAC in constant time, completing the exchange
    pub(crate) fn finish(&self, ke3_message: &Ke3Message) -> Result<[u8; SESSION_KEY_LEN], ProtocolError> {
        if bool::from(self.expected_client_mac.ct_eq(&ke3_message.mac)) {
            Ok(self.session_key)
        } else {
            Err(ProtocolError::InvalidLoginError)
        }
    }
}

impl Ke2Message {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        [
            &self.server_nonce[..],
            &self.server_e_pk.serialize()[..],
            &self.mac[..],
        ]
        .concat()
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, KE2_MESSAGE_LEN, "ke2_message")?;
        let mut server_nonce = [0u8; NONCE_LEN];
        server_nonce.copy_from_slice(&checked_bytes[..NONCE_LEN]);
        let server_e_pk =
            PublicKey::deserialize(&checked_bytes[NONCE_LEN..NONCE_LEN + PUBLIC_KEY_LEN])?;
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&checked_bytes[NONCE_LEN + PUBLIC_KEY_LEN..]);
        Ok(Self {
            server_nonce,
            server_e_pk,
            mac,
        })
    }
}

impl Ke3Message {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        self.mac.to_vec()
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, KE3_MESSAGE_LEN, "ke3_message")?;
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(checked_bytes);
        Ok(Self { mac })
    }
}

/// Generates the client's nonce and ephemeral key pair
pub(crate) fn generate_ke1<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<(Ke1State, Ke1Message), ProtocolError> {
    let client_e = KeyPair::generate_random(rng)?;
    let mut client_nonce = [0u8; NONCE_LEN];
    rng.try_fill_bytes(&mut client_nonce)
        .map_err(|_| InternalError::RandomnessError)?;

    Ok((
        Ke1State {
            client_e_sk: client_e.private().clone(),
            client_nonce,
        },
        Ke1Message {
            client_nonce,
            client_e_pk: *client_e.public(),
        },
    ))
}

/// The server's half of the exchange: fresh nonce and ephemeral key, three DH
/// shares against the client's keys, server MAC over the transcript, and the
/// client MAC it expects back
#[allow(clippy::too_many_arguments)]
pub(crate) fn generate_ke2<R: RngCore + CryptoRng>(
    rng: &mut R,
    serialized_credential_request: &[u8],
    credential_response_prefix: &[u8],
    client_s_pk: &PublicKey,
    server_s_sk: &PrivateKey,
    client_e_pk: &PublicKey,
    id_u: &[u8],
    id_s: &[u8],
) -> Result<(Ke2State, Ke2Message), ProtocolError> {
    let server_e = KeyPair::generate_random(rng)?;
    let mut server_nonce = [0u8; NONCE_LEN];
    rng.try_fill_bytes(&mut server_nonce)
        .map_err(|_| InternalError::RandomnessError)?;

    let mut hasher = transcript_hasher(
        id_u,
        serialized_credential_request,
        id_s,
        credential_response_prefix,
        &server_nonce,
        server_e.public(),
    )?;
    let mut hashed_transcript = [0u8; 64];
    hashed_transcript.copy_from_slice(&hasher.clone().finalize());

    let shared_secrets = [
        diffie_hellman(server_e.private(), client_e_pk),
        diffie_hellman(server_s_sk, client_e_pk),
        diffie_hellman(server_e.private(), client_s_pk),
    ];
    let keys = derive_3dh_keys(&shared_secrets, &hashed_transcript)?;

    let mac = compute_mac(&keys.km2, &hashed_transcript)?;
    hasher.update(mac);
    let mut final_transcript = [0u8; 64];
    final_transcript.copy_from_slice(&hasher.finalize());
    let expected_client_mac = compute_mac(&keys.km3, &final_transcript)?;

    Ok((
        Ke2State {
            expected_client_mac,
            session_key: keys.session_key,
        },
        Ke2Message {
            server_nonce,
            server_e_pk: *server_e.public(),
            mac,
        },
    ))
}

/// The client's completion of the exchange: recompute the transcript and the
/// three DH shares, check the server's MAC, and produce the client's MAC
#[allow(clippy::too_many_arguments)]
pub(crate) fn finish_ke(
    ke1_state: &Ke1State,
    ke2_message: &Ke2Message,
    serialized_credential_request: &[u8],
    credential_response_prefix: &[u8],
    client_s_sk: &PrivateKey,
    server_s_pk: &PublicKey,
    id_u: &[u8],
    id_s: &[u8],
) -> Result<(Ke3Message, [u8; SESSION_KEY_LEN]), ProtocolError> {
    let mut hasher = transcript_hasher(
        id_u,
        serialized_credential_request,
        id_s,
        credential_response_prefix,
        &ke2_message.server_nonce,
        &ke2_message.server_e_pk,
    )?;
    let mut hashed_transcript = [0u8; 64];
    hashed_transcript.copy_from_slice(&hasher.clone().finalize());

    let shared_secrets = [
        diffie_hellman(&ke1_state.client_e_sk, &ke2_message.server_e_pk),
        diffie_hellman(&ke1_state.client_e_sk, server_s_pk),
        diffie_hellman(client_s_sk, &ke2_message.server_e_pk),
    ];
    let keys = derive_3dh_keys(&shared_secrets, &hashed_transcript)?;

    let mut server_mac =
        Hmac::<Sha512>::new_from_slice(&keys.km2).map_err(|_| InternalError::HmacError)?;
    server_mac.update(&hashed_transcript);
    server_mac
        .verify_slice(&ke2_message.mac)
        .map_err(|_| ProtocolError::InvalidLoginError)?;

    hasher.update(ke2_message.mac);
    let mut final_transcript = [0u8; 64];
    final_transcript.copy_from_slice(&hasher.finalize());
    let client_mac = compute_mac(&keys.km3, &final_transcript)?;

    Ok((Ke3Message { mac: client_mac }, keys.session_key))
}

/// The transcript hash covers the protocol tag, both identities, the full
/// first message, the credential part of the second message, and the server's
/// nonce and ephemeral key. Both MACs are chained in afterwards.
fn transcript_hasher(
    id_u: &[u8],
    serialized_credential_request: &[u8],
    id_s: &[u8],
    credential_response_prefix: &[u8],
    server_nonce: &[u8; NONCE_LEN],
    server_e_pk: &PublicKey,
) -> Result<Sha512, ProtocolError> {
    let mut hasher = Sha512::new();
    hasher.update(STR_CONTEXT);
    hasher.update(
        u16::try_from(id_u.len())
            .map_err(|_| ProtocolError::SerializationError)?
            .to_be_bytes(),
    );
    hasher.update(id_u);
    hasher.update(serialized_credential_request);
    hasher.update(
        u16::try_from(id_s.len())
            .map_err(|_| ProtocolError::SerializationError)?
            .to_be_bytes(),
    );
    hasher.update(id_s);
    hasher.update(credential_response_prefix);
    hasher.update(server_nonce);
    hasher.update(server_e_pk.serialize());
    Ok(hasher)
}

struct TripleDhKeys {
    session_key: [u8; SESSION_KEY_LEN],
    km2: [u8; MAC_LEN],
    km3: [u8; MAC_LEN],
}

impl Drop for TripleDhKeys {
    fn drop(&mut self) {
        self.km2.zeroize();
        self.km3.zeroize();
    }
}

/// The key schedule: HKDF-Extract over the concatenated DH shares, then
/// labeled expansions bound to the transcript hash
fn derive_3dh_keys(
    shared_secrets: &[[u8; PUBLIC_KEY_LEN]; 3],
    hashed_transcript: &[u8; 64],
) -> Result<TripleDhKeys, ProtocolError> {
    let mut ikm = [0u8; 3 * PUBLIC_KEY_LEN];
    for (chunk, secret) in ikm.chunks_exact_mut(PUBLIC_KEY_LEN).zip(shared_secrets) {
        chunk.copy_from_slice(secret);
    }
    let (_, hkdf) = Hkdf::<Sha512>::extract(None, &ikm);
    ikm.zeroize();

    let mut handshake_secret = [0u8; 64];
    hkdf_expand_label(
        &hkdf,
        STR_HANDSHAKE_SECRET,
        hashed_transcript,
        &mut handshake_secret,
    )?;
    let mut session_key = [0u8; SESSION_KEY_LEN];
    hkdf_expand_label(&hkdf, STR_SESSION_KEY, hashed_transcript, &mut session_key)?;

    let handshake_hkdf =
        Hkdf::<Sha512>::from_prk(&handshake_secret).map_err(|_| InternalError::HkdfError)?;
    let mut km2 = [0u8; MAC_LEN];
    hkdf_expand_label(&handshake_hkdf, STR_SERVER_MAC, b"", &mut km2)?;
    let mut km3 = [0u8; MAC_LEN];
    hkdf_expand_label(&handshake_hkdf, STR_CLIENT_MAC, b"", &mut km3)?;
    handshake_secret.zeroize();

    Ok(TripleDhKeys {
        session_key,
        km2,
        km3,
    })
}

fn hkdf_expand_label(
    hkdf: &Hkdf<Sha512>,
    label: &[u8],
    context: &[u8],
    okm: &mut [u8],
) -> Result<(), ProtocolError> {
    let length = u16::try_from(okm.len())
        .map_err(|_| ProtocolError::SerializationError)?
        .to_be_bytes();
    let label_length = u8::try_from(STR_OPAQUE.len() + label.len())
        .map_err(|_| ProtocolError::SerializationError)?;
    let context_length =
        u8::try_from(context.len()).map_err(|_| ProtocolError::SerializationError)?;

    hkdf.expand_multi_info(
        &[
            &length,
            &[label_length],
            STR_OPAQUE,
            label,
            &[context_length],
            context,
        ],
        okm,
    )
    .map_err(|_| InternalError::HkdfError.into())
}

fn compute_mac(key: &[u8; MAC_LEN], input: &[u8; 64]) -> Result<[u8; MAC_LEN], ProtocolError> {
    let mut hmac = Hmac::<Sha512>::new_from_slice(key).map_err(|_| InternalError::HmacError)?;
    hmac.update(input);
    let mut mac = [0u8; MAC_LEN];
    mac.copy_from_slice(&hmac.finalize().into_bytes());
    Ok(mac)
}
