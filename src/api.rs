// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! A byte-oriented surface over the typed protocol, for callers that treat
//! every message, state and key as an opaque byte string. Uses the operating
//! system's CSPRNG and the Argon2id key stretching function throughout.

use argon2::Argon2;
use rand::rngs::OsRng;

use crate::errors::ProtocolError;
use crate::messages::{
    CredentialFinalization, CredentialRequest, CredentialResponse, RegistrationRequest,
    RegistrationResponse, RegistrationUpload,
};
use crate::opaque::{
    ClientLogin, ClientRegistration, ServerLogin, ServerRegistration, ServerSetup,
};

pub use crate::envelope::EXPORT_KEY_LEN;
pub use crate::key_exchange::tripledh::SESSION_KEY_LEN;
pub use crate::messages::{
    CREDENTIAL_FINALIZATION_LEN, CREDENTIAL_REQUEST_LEN, CREDENTIAL_RESPONSE_LEN,
    REGISTRATION_REQUEST_LEN, REGISTRATION_RESPONSE_LEN, REGISTRATION_UPLOAD_LEN,
};
pub use crate::opaque::{
    CLIENT_LOGIN_LEN, CLIENT_REGISTRATION_LEN, SERVER_LOGIN_LEN, SERVER_REGISTRATION_LEN,
    SERVER_SETUP_LEN,
};

/// Generates the secrets of a new deployment, returned as an opaque
/// [`SERVER_SETUP_LEN`]-byte blob
pub fn create_setup() -> Result<Vec<u8>, ProtocolError> {
    Ok(ServerSetup::new(&mut OsRng)?.serialize())
}

/// Server side of registration: answers a client's registration request for
/// the given credential identifier
pub fn register(
    setup: &[u8],
    registration_request: &[u8],
    credential_identifier: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let server_setup = ServerSetup::deserialize(setup)?;
    let message = RegistrationRequest::deserialize(registration_request)?;
    let result = ServerRegistration::start(&server_setup, message, credential_identifier)?;
    Ok(result.message.serialize())
}

/// Server side of registration, final step: turns the client's upload into
/// the password file to store
pub fn register_finish(registration_upload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let message = RegistrationUpload::deserialize(registration_upload)?;
    Ok(ServerRegistration::finish(message).serialize())
}

/// Client side of registration: blinds the password, returning the message
/// for the server and the state to keep for [`register_client_finish`]
pub fn register_client(password: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    let result = ClientRegistration::start(&mut OsRng, password)?;
    Ok((result.message.serialize(), result.state.serialize()))
}

/// Client side of registration, final step: produces the upload for the
/// server
pub fn register_client_finish(
    client_state: &[u8],
    password: &[u8],
    registration_response: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let state = ClientRegistration::deserialize(client_state)?;
    let message = RegistrationResponse::deserialize(registration_response)?;
    let result = state.finish(password, message, &Argon2::default())?;
    Ok(result.message.serialize())
}

/// Server side of login: answers a credential request, returning the
/// response for the client and the state to keep for [`login_finish`].
/// `password_file` is `None` when no account exists under the credential
/// identifier; the response is then built from the setup's decoy record and
/// reveals nothing about the account's absence.
pub fn login(
    setup: &[u8],
    password_file: Option<&[u8]>,
    credential_request: &[u8],
    credential_identifier: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    let server_setup = ServerSetup::deserialize(setup)?;
    let record = password_file
        .map(ServerRegistration::deserialize)
        .transpose()?;
    let message = CredentialRequest::deserialize(credential_request)?;
    let result = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        record.as_ref(),
        message,
        credential_identifier,
    )?;
    Ok((result.message.serialize(), result.state.serialize()))
}

/// Server side of login, final step: verifies the client's finalization and
/// returns the shared session key
pub fn login_finish(
    credential_finalization: &[u8],
    server_state: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let state = ServerLogin::deserialize(server_state)?;
    let message = CredentialFinalization::deserialize(credential_finalization)?;
    let result = state.finish(message)?;
    Ok(result.session_key.to_vec())
}

/// Client side of login: blinds the password and opens the key exchange,
/// returning the message for the server and the state to keep for
/// [`login_client_finish`]
pub fn login_client(password: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    let result = ClientLogin::start(&mut OsRng, password)?;
    Ok((result.message.serialize(), result.state.serialize()))
}

/// Client side of login, final step: recovers the credentials and completes
/// the key exchange, returning the finalization for the server and the
/// shared session key
pub fn login_client_finish(
    client_state: &[u8],
    password: &[u8],
    credential_response: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    let state = ClientLogin::deserialize(client_state)?;
    let message = CredentialResponse::deserialize(credential_response)?;
    let result = state.finish(password, message, &Argon2::default())?;
    Ok((result.message.serialize(), result.session_key.to_vec()))
}
