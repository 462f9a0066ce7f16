// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The registration and login state machines. The server holds no state
//! between messages beyond what the caller carries in the returned tokens,
//! and every server operation takes the deployment's [`ServerSetup`]
//! explicitly.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::envelope::{self, Envelope, ENVELOPE_LEN, EXPORT_KEY_LEN, MASKING_KEY_LEN};
use crate::errors::utils::check_slice_size;
use crate::errors::{InternalError, ProtocolError};
use crate::group;
use crate::key_exchange::tripledh::{
    self, Ke1State, Ke2State, KE1_STATE_LEN, KE2_STATE_LEN, NONCE_LEN, SESSION_KEY_LEN,
};
use crate::keypair::{KeyPair, PrivateKey, PublicKey, PRIVATE_KEY_LEN};
use crate::ksf::Ksf;
use crate::messages::{
    CredentialFinalization, CredentialRequest, CredentialResponse, RegistrationRequest,
    RegistrationResponse, RegistrationUpload, CREDENTIAL_REQUEST_LEN, MASKED_RESPONSE_LEN,
    REGISTRATION_UPLOAD_LEN,
};
use crate::oprf::{self, OPRF_SEED_LEN};

/// Byte length of a serialized [`ServerSetup`]
pub const SERVER_SETUP_LEN: usize =
    OPRF_SEED_LEN + PRIVATE_KEY_LEN + OPRF_SEED_LEN + MASKING_KEY_LEN + PRIVATE_KEY_LEN;
/// Byte length of a serialized [`ServerRegistration`]
pub const SERVER_REGISTRATION_LEN: usize = REGISTRATION_UPLOAD_LEN;
/// Byte length of a serialized [`ClientRegistration`]
pub const CLIENT_REGISTRATION_LEN: usize = group::SCALAR_LEN + group::ELEMENT_LEN;
/// Byte length of a serialized [`ClientLogin`]
pub const CLIENT_LOGIN_LEN: usize = group::SCALAR_LEN + CREDENTIAL_REQUEST_LEN + KE1_STATE_LEN;
/// Byte length of a serialized [`ServerLogin`]
pub const SERVER_LOGIN_LEN: usize = KE2_STATE_LEN;

static STR_CREDENTIAL_RESPONSE_PAD: &[u8] = b"CredentialResponsePad";
static STR_DECOY_ENVELOPE: &[u8] = b"DecoyEnvelope";

/// The decoy credentials used to answer logins for accounts that do not
/// exist. Fixed at setup creation, so repeated probes of the same identifier
/// are answered consistently.
#[derive(Clone, Debug)]
struct DecoyRecord {
    oprf_seed: [u8; OPRF_SEED_LEN],
    masking_key: [u8; MASKING_KEY_LEN],
    keypair: KeyPair,
}

impl Drop for DecoyRecord {
    fn drop(&mut self) {
        self.oprf_seed.zeroize();
        self.masking_key.zeroize();
    }
}

/// The long-lived secrets of one deployment: the OPRF seed, the server's
/// static key pair, and the decoy record. Created once, serialized to an
/// opaque blob, and passed to every server-side operation.
#[derive(Clone, Debug)]
pub struct ServerSetup {
    oprf_seed: [u8; OPRF_SEED_LEN],
    keypair: KeyPair,
    decoy: DecoyRecord,
}

impl Drop for ServerSetup {
    fn drop(&mut self) {
        self.oprf_seed.zeroize();
    }
}

impl ServerSetup {
    /// Generates the secrets of a new deployment
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, ProtocolError> {
        let mut oprf_seed = [0u8; OPRF_SEED_LEN];
        rng.try_fill_bytes(&mut oprf_seed)
            .map_err(|_| InternalError::RandomnessError)?;
        let keypair = KeyPair::generate_random(rng)?;

        let mut decoy_oprf_seed = [0u8; OPRF_SEED_LEN];
        rng.try_fill_bytes(&mut decoy_oprf_seed)
            .map_err(|_| InternalError::RandomnessError)?;
        let mut decoy_masking_key = [0u8; MASKING_KEY_LEN];
        rng.try_fill_bytes(&mut decoy_masking_key)
            .map_err(|_| InternalError::RandomnessError)?;
        let decoy_keypair = KeyPair::generate_random(rng)?;

        Ok(Self {
            oprf_seed,
            keypair,
            decoy: DecoyRecord {
                oprf_seed: decoy_oprf_seed,
                masking_key: decoy_masking_key,
                keypair: decoy_keypair,
            },
        })
    }

    /// The server's static public key, to be published to clients
    pub fn public_key(&self) -> &PublicKey {
        self.keypair.public()
    }

    /// Byte encoding of this setup. The blob contains all deployment secrets
    /// and must be stored accordingly.
    pub fn serialize(&self) -> Vec<u8> {
        [
            &self.oprf_seed[..],
            &self.keypair.private().serialize()[..],
            &self.decoy.oprf_seed[..],
            &self.decoy.masking_key[..],
            &self.decoy.keypair.private().serialize()[..],
        ]
        .concat()
    }

    /// Decodes a setup blob
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, SERVER_SETUP_LEN, "server_setup")?;
        let mut oprf_seed = [0u8; OPRF_SEED_LEN];
        oprf_seed.copy_from_slice(&checked_bytes[..OPRF_SEED_LEN]);
        let sk = PrivateKey::deserialize(
            &checked_bytes[OPRF_SEED_LEN..OPRF_SEED_LEN + PRIVATE_KEY_LEN],
        )?;

        let decoy_bytes = &checked_bytes[OPRF_SEED_LEN + PRIVATE_KEY_LEN..];
        let mut decoy_oprf_seed = [0u8; OPRF_SEED_LEN];
        decoy_oprf_seed.copy_from_slice(&decoy_bytes[..OPRF_SEED_LEN]);
        let mut decoy_masking_key = [0u8; MASKING_KEY_LEN];
        decoy_masking_key
            .copy_from_slice(&decoy_bytes[OPRF_SEED_LEN..OPRF_SEED_LEN + MASKING_KEY_LEN]);
        let decoy_sk =
            PrivateKey::deserialize(&decoy_bytes[OPRF_SEED_LEN + MASKING_KEY_LEN..])?;

        Ok(Self {
            oprf_seed,
            keypair: KeyPair::from_private_key(sk),
            decoy: DecoyRecord {
                oprf_seed: decoy_oprf_seed,
                masking_key: decoy_masking_key,
                keypair: KeyPair::from_private_key(decoy_sk),
            },
        })
    }

    /// The password file stood in for an absent account. Its envelope bytes
    /// are expanded from the decoy masking key per credential identifier, so
    /// they are stable across probes.
    fn decoy_upload(&self, credential_identifier: &[u8]) -> Result<RegistrationUpload, ProtocolError> {
        let hkdf = Hkdf::<Sha512>::from_prk(&self.decoy.masking_key)
            .map_err(|_| InternalError::HkdfError)?;
        let mut envelope_bytes = [0u8; ENVELOPE_LEN];
        hkdf.expand_multi_info(
            &[credential_identifier, STR_DECOY_ENVELOPE],
            &mut envelope_bytes,
        )
        .map_err(|_| InternalError::HkdfError)?;
        Ok(RegistrationUpload {
            client_s_pk: *self.decoy.keypair.public(),
            masking_key: self.decoy.masking_key,
            envelope: Envelope::deserialize(&envelope_bytes)?,
        })
    }
}

/// The password file the server stores for one registered account
#[derive(Clone, Debug)]
pub struct ServerRegistration(pub(crate) RegistrationUpload);

/// The result of a server registration start
#[derive(Clone, Debug)]
pub struct ServerRegistrationStartResult {
    /// The response to send to the client
    pub message: RegistrationResponse,
}

impl ServerRegistration {
    /// Answers a registration request by evaluating the OPRF under the key
    /// derived for this credential identifier. Stateless on the server.
    pub fn start(
        server_setup: &ServerSetup,
        message: RegistrationRequest,
        credential_identifier: &[u8],
    ) -> Result<ServerRegistrationStartResult, ProtocolError> {
        let oprf_key = oprf::oprf_key_from_seed(&server_setup.oprf_seed, credential_identifier)?;
        let evaluated_element = oprf::evaluate(&oprf_key, &message.blinded_element);
        Ok(ServerRegistrationStartResult {
            message: RegistrationResponse {
                evaluated_element,
                server_s_pk: *server_setup.public_key(),
            },
        })
    }

    /// Accepts the client's upload as the password file. Performs no
    /// cryptography; the upload is already self-authenticating via the
    /// envelope.
    pub fn finish(message: RegistrationUpload) -> Self {
        Self(message)
    }

    /// Byte encoding of this password file
    pub fn serialize(&self) -> Vec<u8> {
        self.0.serialize()
    }

    /// Decodes a password file
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        RegistrationUpload::deserialize(input).map(Self)
    }
}

/// The client's secret state between its two registration calls
#[derive(Clone, Debug)]
pub struct ClientRegistration {
    blind: Scalar,
    blinded_element: RistrettoPoint,
}

impl Drop for ClientRegistration {
    fn drop(&mut self) {
        self.blind.zeroize();
    }
}

/// The result of a client registration start
#[derive(Clone, Debug)]
pub struct ClientRegistrationStartResult {
    /// The request to send to the server
    pub message: RegistrationRequest,
    /// The state the client must keep until [`ClientRegistration::finish`]
    pub state: ClientRegistration,
}

/// The result of a client registration finish
#[derive(Clone, Debug)]
pub struct ClientRegistrationFinishResult {
    /// The upload to send to the server
    pub message: RegistrationUpload,
    /// A key derived from the password, never seen by the server
    pub export_key: [u8; EXPORT_KEY_LEN],
    /// The server's static public key, for the client to pin
    pub server_s_pk: PublicKey,
}

impl ClientRegistration {
    /// Blinds the password and produces the registration request
    pub fn start<R: RngCore + CryptoRng>(
        rng: &mut R,
        password: &[u8],
    ) -> Result<ClientRegistrationStartResult, ProtocolError> {
        let (blind, blinded_element) = oprf::blind(rng, password)?;
        Ok(ClientRegistrationStartResult {
            message: RegistrationRequest { blinded_element },
            state: ClientRegistration {
                blind,
                blinded_element,
            },
        })
    }

    /// Unblinds the server's evaluation, derives the randomized password,
    /// and seals the envelope into the upload
    pub fn finish<K: Ksf>(
        self,
        password: &[u8],
        message: RegistrationResponse,
        ksf: &K,
    ) -> Result<ClientRegistrationFinishResult, ProtocolError> {
        check_for_reflected_value(&self.blinded_element, &message.evaluated_element)?;

        let randomized_pwd_hkdf =
            randomized_pwd_hkdf(password, &self.blind, &message.evaluated_element, ksf)?;
        let masking_key = envelope::masking_key(&randomized_pwd_hkdf)?;
        let (envelope, client_keypair, export_key) =
            Envelope::seal(&randomized_pwd_hkdf, &message.server_s_pk)?;

        Ok(ClientRegistrationFinishResult {
            message: RegistrationUpload {
                client_s_pk: *client_keypair.public(),
                masking_key,
                envelope,
            },
            export_key,
            server_s_pk: message.server_s_pk,
        })
    }

    /// Byte encoding of this state. Contains the blinding factor and must be
    /// kept secret.
    pub fn serialize(&self) -> Vec<u8> {
        [
            &group::serialize_scalar(&self.blind)[..],
            &group::serialize_point(&self.blinded_element)[..],
        ]
        .concat()
    }

    /// Decodes a client registration state
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes =
            check_slice_size(input, CLIENT_REGISTRATION_LEN, "client_registration")?;
        Ok(Self {
            blind: group::deserialize_scalar(&checked_bytes[..group::SCALAR_LEN], "blind")?,
            blinded_element: group::deserialize_point(
                &checked_bytes[group::SCALAR_LEN..],
                "blinded_element",
            )?,
        })
    }
}

/// The client's secret state between its two login calls
#[derive(Clone, Debug)]
pub struct ClientLogin {
    blind: Scalar,
    credential_request: [u8; CREDENTIAL_REQUEST_LEN],
    ke1_state: Ke1State,
}

impl Drop for ClientLogin {
    fn drop(&mut self) {
        self.blind.zeroize();
    }
}

/// The result of a client login start
#[derive(Clone, Debug)]
pub struct ClientLoginStartResult {
    /// The request to send to the server
    pub message: CredentialRequest,
    /// The state the client must keep until [`ClientLogin::finish`]
    pub state: ClientLogin,
}

/// The result of a client login finish
#[derive(Clone, Debug)]
pub struct ClientLoginFinishResult {
    /// The finalization to send to the server
    pub message: CredentialFinalization,
    /// The shared session key
    pub session_key: [u8; SESSION_KEY_LEN],
    /// A key derived from the password, never seen by the server
    pub export_key: [u8; EXPORT_KEY_LEN],
    /// The server's static public key recovered from the response
    pub server_s_pk: PublicKey,
}

impl ClientLogin {
    /// Blinds the password and opens the key exchange
    pub fn start<R: RngCore + CryptoRng>(
        rng: &mut R,
        password: &[u8],
    ) -> Result<ClientLoginStartResult, ProtocolError> {
        let (blind, blinded_element) = oprf::blind(rng, password)?;
        let (ke1_state, ke1_message) = tripledh::generate_ke1(rng)?;
        let message = CredentialRequest {
            blinded_element,
            ke1_message,
        };
        let mut credential_request = [0u8; CREDENTIAL_REQUEST_LEN];
        credential_request.copy_from_slice(&message.serialize());
        Ok(ClientLoginStartResult {
            message,
            state: ClientLogin {
                blind,
                credential_request,
                ke1_state,
            },
        })
    }

    /// Recovers the credentials from the response and completes the key
    /// exchange. A wrong password, a tampered response, and an absent
    /// account are indistinguishable here: all fail with
    /// [`ProtocolError::InvalidLoginError`].
    pub fn finish<K: Ksf>(
        self,
        password: &[u8],
        message: CredentialResponse,
        ksf: &K,
    ) -> Result<ClientLoginFinishResult, ProtocolError> {
        let blinded_element = group::deserialize_point(
            &self.credential_request[..group::ELEMENT_LEN],
            "blinded_element",
        )?;
        check_for_reflected_value(&blinded_element, &message.evaluated_element)?;

        let randomized_pwd_hkdf =
            randomized_pwd_hkdf(password, &self.blind, &message.evaluated_element, ksf)?;
        let masking_key = envelope::masking_key(&randomized_pwd_hkdf)?;

        let unmasked = apply_masking_pad(
            &masking_key,
            &message.masking_nonce,
            &message.masked_response,
        )?;
        let server_s_pk = PublicKey::deserialize(&unmasked[..group::ELEMENT_LEN])
            .map_err(|_| ProtocolError::InvalidLoginError)?;
        let envelope = Envelope::deserialize(&unmasked[group::ELEMENT_LEN..])?;
        let (client_keypair, export_key) = envelope
            .open(&randomized_pwd_hkdf, &server_s_pk)
            .map_err(|_| ProtocolError::InvalidLoginError)?;

        let id_u = client_keypair.public().serialize();
        let id_s = server_s_pk.serialize();
        let credential_response_prefix = message.serialize_without_ke2();
        let (ke3_message, session_key) = tripledh::finish_ke(
            &self.ke1_state,
            &message.ke2_message,
            &self.credential_request,
            &credential_response_prefix,
            client_keypair.private(),
            &server_s_pk,
            &id_u,
            &id_s,
        )?;

        Ok(ClientLoginFinishResult {
            message: CredentialFinalization { ke3_message },
            session_key,
            export_key,
            server_s_pk,
        })
    }

    /// Byte encoding of this state. Contains the blinding factor and the
    /// ephemeral private key and must be kept secret.
    pub fn serialize(&self) -> Vec<u8> {
        [
            &group::serialize_scalar(&self.blind)[..],
            &self.credential_request[..],
            &self.ke1_state.serialize()[..],
        ]
        .concat()
    }

    /// Decodes a client login state
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, CLIENT_LOGIN_LEN, "client_login")?;
        let blind = group::deserialize_scalar(&checked_bytes[..group::SCALAR_LEN], "blind")?;
        let mut credential_request = [0u8; CREDENTIAL_REQUEST_LEN];
        credential_request.copy_from_slice(
            &checked_bytes[group::SCALAR_LEN..group::SCALAR_LEN + CREDENTIAL_REQUEST_LEN],
        );
        let ke1_state =
            Ke1State::deserialize(&checked_bytes[group::SCALAR_LEN + CREDENTIAL_REQUEST_LEN..])?;
        Ok(Self {
            blind,
            credential_request,
            ke1_state,
        })
    }
}

/// The server's secret state between its two login calls
#[derive(Clone, Debug)]
pub struct ServerLogin {
    ke2_state: Ke2State,
}

/// The result of a server login start
#[derive(Clone, Debug)]
pub struct ServerLoginStartResult {
    /// The response to send to the client
    pub message: CredentialResponse,
    /// The state the server must keep until [`ServerLogin::finish`]
    pub state: ServerLogin,
}

/// The result of a server login finish
#[derive(Clone, Debug)]
pub struct ServerLoginFinishResult {
    /// The shared session key
    pub session_key: [u8; SESSION_KEY_LEN],
}

impl ServerLogin {
    /// Answers a credential request. When `password_file` is absent the decoy
    /// record stands in, and the response is indistinguishable in layout,
    /// length and timing from that of a registered account; the login then
    /// cannot complete.
    pub fn start<R: RngCore + CryptoRng>(
        rng: &mut R,
        server_setup: &ServerSetup,
        password_file: Option<&ServerRegistration>,
        message: CredentialRequest,
        credential_identifier: &[u8],
    ) -> Result<ServerLoginStartResult, ProtocolError> {
        let (oprf_seed, record) = match password_file {
            Some(file) => (&server_setup.oprf_seed, file.0.clone()),
            None => (
                &server_setup.decoy.oprf_seed,
                server_setup.decoy_upload(credential_identifier)?,
            ),
        };

        let oprf_key = oprf::oprf_key_from_seed(oprf_seed, credential_identifier)?;
        let evaluated_element = oprf::evaluate(&oprf_key, &message.blinded_element);

        let mut masking_nonce = [0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut masking_nonce)
            .map_err(|_| InternalError::RandomnessError)?;
        let mut plaintext = [0u8; MASKED_RESPONSE_LEN];
        plaintext[..group::ELEMENT_LEN].copy_from_slice(&server_setup.public_key().serialize());
        plaintext[group::ELEMENT_LEN..].copy_from_slice(&record.envelope.serialize());
        let masked_response =
            apply_masking_pad(&record.masking_key, &masking_nonce, &plaintext)?;

        let serialized_credential_request = message.serialize();
        let credential_response_prefix = [
            &group::serialize_point(&evaluated_element)[..],
            &masking_nonce[..],
            &masked_response[..],
        ]
        .concat();

        let id_u = record.client_s_pk.serialize();
        let id_s = server_setup.public_key().serialize();
        let (ke2_state, ke2_message) = tripledh::generate_ke2(
            rng,
            &serialized_credential_request,
            &credential_response_prefix,
            &record.client_s_pk,
            server_setup.keypair.private(),
            &message.ke1_message.client_e_pk,
            &id_u,
            &id_s,
        )?;

        Ok(ServerLoginStartResult {
            message: CredentialResponse {
                evaluated_element,
                masking_nonce,
                masked_response,
                ke2_message,
            },
            state: ServerLogin { ke2_state },
        })
    }

    /// Verifies the client's finalization and yields the session key. Fails
    /// with [`ProtocolError::InvalidLoginError`] for a wrong password, a
    /// tampered message, or an account that never existed.
    pub fn finish(
        self,
        message: CredentialFinalization,
    ) -> Result<ServerLoginFinishResult, ProtocolError> {
        let session_key = self.ke2_state.finish(&message.ke3_message)?;
        Ok(ServerLoginFinishResult { session_key })
    }

    /// Byte encoding of this state. Contains the session key and must be
    /// kept secret.
    pub fn serialize(&self) -> Vec<u8> {
        self.ke2_state.serialize()
    }

    /// Decodes a server login state
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            ke2_state: Ke2State::deserialize(input)?,
        })
    }
}

/// A server under attack could echo the client's own blinded element back as
/// the evaluation, turning the OPRF output into a function of the password
/// alone. Rejected on both registration and login.
fn check_for_reflected_value(
    blinded_element: &RistrettoPoint,
    evaluated_element: &RistrettoPoint,
) -> Result<(), ProtocolError> {
    let blinded_bytes = group::serialize_point(blinded_element);
    let evaluated_bytes = group::serialize_point(evaluated_element);
    if bool::from(blinded_bytes.ct_eq(&evaluated_bytes)) {
        return Err(ProtocolError::ReflectedValueError);
    }
    Ok(())
}

/// The randomized password: HKDF-Extract over the OPRF output concatenated
/// with its stretching. Every client-side key derives from the returned
/// expander.
fn randomized_pwd_hkdf<K: Ksf>(
    password: &[u8],
    blind: &Scalar,
    evaluated_element: &RistrettoPoint,
    ksf: &K,
) -> Result<Hkdf<Sha512>, ProtocolError> {
    let mut oprf_output = oprf::finalize(password, blind, evaluated_element)?;
    let mut stretched_output = ksf.hash(&oprf_output)?;
    let mut ikm = [0u8; 128];
    ikm[..64].copy_from_slice(&oprf_output);
    ikm[64..].copy_from_slice(&stretched_output);
    let (_, hkdf) = Hkdf::<Sha512>::extract(None, &ikm);
    oprf_output.zeroize();
    stretched_output.zeroize();
    ikm.zeroize();
    Ok(hkdf)
}

/// XOR with a pad expanded from the masking key and a per-response nonce.
/// Applying it twice restores the input.
fn apply_masking_pad(
    masking_key: &[u8; MASKING_KEY_LEN],
    masking_nonce: &[u8; NONCE_LEN],
    input: &[u8; MASKED_RESPONSE_LEN],
) -> Result<[u8; MASKED_RESPONSE_LEN], ProtocolError> {
    let hkdf =
        Hkdf::<Sha512>::from_prk(masking_key).map_err(|_| InternalError::HkdfError)?;
    let mut output = [0u8; MASKED_RESPONSE_LEN];
    hkdf.expand_multi_info(
        &[masking_nonce, STR_CREDENTIAL_RESPONSE_PAD],
        &mut output,
    )
    .map_err(|_| InternalError::HkdfError)?;
    for (output_byte, input_byte) in output.iter_mut().zip(input) {
        *output_byte ^= input_byte;
    }
    Ok(output)
}
