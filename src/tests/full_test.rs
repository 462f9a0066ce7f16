// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

use rand::rngs::OsRng;

use crate::api;
use crate::envelope::EXPORT_KEY_LEN;
use crate::errors::ProtocolError;
use crate::key_exchange::tripledh::{Ke2Message, SESSION_KEY_LEN};
use crate::keypair::KeyPair;
use crate::ksf::Identity;
use crate::messages::{
    CredentialFinalization, CredentialRequest, CredentialResponse, RegistrationResponse,
    CREDENTIAL_RESPONSE_LEN, MASKED_RESPONSE_LEN,
};
use crate::opaque::{
    ClientLogin, ClientRegistration, ServerLogin, ServerRegistration, ServerSetup,
};

fn register(
    server_setup: &ServerSetup,
    credential_identifier: &[u8],
    password: &[u8],
) -> (ServerRegistration, [u8; EXPORT_KEY_LEN]) {
    let client_start = ClientRegistration::start(&mut OsRng, password).unwrap();
    let server_start =
        ServerRegistration::start(server_setup, client_start.message, credential_identifier)
            .unwrap();
    let client_finish = client_start
        .state
        .finish(password, server_start.message, &Identity)
        .unwrap();
    (
        ServerRegistration::finish(client_finish.message),
        client_finish.export_key,
    )
}

#[allow(clippy::type_complexity)]
fn login(
    server_setup: &ServerSetup,
    password_file: Option<&ServerRegistration>,
    credential_identifier: &[u8],
    password: &[u8],
) -> Result<
    (
        [u8; SESSION_KEY_LEN],
        [u8; SESSION_KEY_LEN],
        [u8; EXPORT_KEY_LEN],
    ),
    ProtocolError,
> {
    let client_start = ClientLogin::start(&mut OsRng, password)?;
    let server_start = ServerLogin::start(
        &mut OsRng,
        server_setup,
        password_file,
        client_start.message,
        credential_identifier,
    )?;
    let client_finish = client_start
        .state
        .finish(password, server_start.message, &Identity)?;
    let server_finish = server_start.state.finish(client_finish.message)?;
    Ok((
        client_finish.session_key,
        server_finish.session_key,
        client_finish.export_key,
    ))
}

#[test]
fn test_complete_flow_success() {
    let passwords: [&[u8]; 4] = [
        b"hunter2",
        b"",
        &[b'a'; 1024],
        "p@ßwörð✓".as_bytes(),
    ];
    for password in passwords {
        let server_setup = ServerSetup::new(&mut OsRng).unwrap();
        let (password_file, registration_export_key) =
            register(&server_setup, b"alice", password);

        let (client_session_key, server_session_key, login_export_key) =
            login(&server_setup, Some(&password_file), b"alice", password).unwrap();

        assert_eq!(client_session_key, server_session_key);
        assert_eq!(registration_export_key, login_export_key);
    }
}

#[test]
fn test_complete_flow_fail_with_wrong_password() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let (password_file, _) = register(&server_setup, b"alice", b"right password");

    let result = login(&server_setup, Some(&password_file), b"alice", b"wrong password");
    assert!(matches!(result, Err(ProtocolError::InvalidLoginError)));
}

#[test]
fn test_login_to_absent_account_fails_like_wrong_password() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let result = login(&server_setup, None, b"nobody", b"hunter2");
    assert!(matches!(result, Err(ProtocolError::InvalidLoginError)));
}

#[test]
fn test_credential_response_hides_account_existence() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let (password_file, _) = register(&server_setup, b"alice", b"hunter2");

    let client_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let request_bytes = client_start.message.serialize();

    let genuine = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        Some(&password_file),
        CredentialRequest::deserialize(&request_bytes).unwrap(),
        b"alice",
    )
    .unwrap();
    let decoy = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        None,
        CredentialRequest::deserialize(&request_bytes).unwrap(),
        b"nobody",
    )
    .unwrap();

    assert_eq!(genuine.message.serialize().len(), CREDENTIAL_RESPONSE_LEN);
    assert_eq!(decoy.message.serialize().len(), CREDENTIAL_RESPONSE_LEN);
}

#[test]
fn test_decoy_oprf_evaluation_is_stable_across_probes() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let client_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let request_bytes = client_start.message.serialize();

    let probe = |identifier: &[u8]| {
        ServerLogin::start(
            &mut OsRng,
            &server_setup,
            None,
            CredentialRequest::deserialize(&request_bytes).unwrap(),
            identifier,
        )
        .unwrap()
        .message
        .serialize()
    };

    // same blinded element, same absent identifier: the evaluation must not
    // change between probes, or probing would reveal the decoy path
    assert_eq!(probe(b"nobody")[..32], probe(b"nobody")[..32]);
    assert_ne!(probe(b"nobody")[..32], probe(b"other")[..32]);
}

#[test]
fn test_server_rejects_forged_finalization() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let client_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let server_start = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        None,
        client_start.message,
        b"nobody",
    )
    .unwrap();

    let forged = CredentialFinalization::deserialize(&[5u8; 64]).unwrap();
    assert!(matches!(
        server_start.state.finish(forged),
        Err(ProtocolError::InvalidLoginError)
    ));
}

#[test]
fn test_registration_is_bound_to_its_setup() {
    let setup1 = ServerSetup::new(&mut OsRng).unwrap();
    let setup2 = ServerSetup::new(&mut OsRng).unwrap();
    let (password_file, _) = register(&setup1, b"alice", b"hunter2");

    let result = login(&setup2, Some(&password_file), b"alice", b"hunter2");
    assert!(result.is_err());
}

#[test]
fn test_registration_is_bound_to_its_credential_identifier() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let (password_file, _) = register(&server_setup, b"alice", b"hunter2");

    let result = login(&server_setup, Some(&password_file), b"bob", b"hunter2");
    assert!(matches!(result, Err(ProtocolError::InvalidLoginError)));
}

#[test]
fn test_reflected_value_error_registration() {
    let server_s = KeyPair::generate_random(&mut OsRng).unwrap();
    let client_start = ClientRegistration::start(&mut OsRng, b"hunter2").unwrap();
    let reflected = RegistrationResponse {
        evaluated_element: client_start.message.blinded_element,
        server_s_pk: *server_s.public(),
    };
    assert!(matches!(
        client_start.state.finish(b"hunter2", reflected, &Identity),
        Err(ProtocolError::ReflectedValueError)
    ));
}

#[test]
fn test_reflected_value_error_login() {
    let server_e = KeyPair::generate_random(&mut OsRng).unwrap();
    let client_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let reflected = CredentialResponse {
        evaluated_element: client_start.message.blinded_element,
        masking_nonce: [0u8; 32],
        masked_response: [0u8; MASKED_RESPONSE_LEN],
        ke2_message: Ke2Message {
            server_nonce: [0u8; 32],
            server_e_pk: *server_e.public(),
            mac: [0u8; 64],
        },
    };
    assert!(matches!(
        client_start.state.finish(b"hunter2", reflected, &Identity),
        Err(ProtocolError::ReflectedValueError)
    ));
}

#[test]
fn test_tampered_registration_response_is_rejected() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();

    let client_start = ClientRegistration::start(&mut OsRng, b"hunter2").unwrap();
    let server_start =
        ServerRegistration::start(&server_setup, client_start.message.clone(), b"alice").unwrap();
    let response_bytes = server_start.message.serialize();

    // a flip may already fail the registration finish; if it slips through,
    // the resulting password file must not authenticate
    for i in 0..response_bytes.len() {
        let mut tampered = response_bytes.clone();
        tampered[i] ^= 1;
        let result = RegistrationResponse::deserialize(&tampered)
            .and_then(|message| {
                client_start
                    .state
                    .clone()
                    .finish(b"hunter2", message, &Identity)
            })
            .and_then(|client_finish| {
                let password_file = ServerRegistration::finish(client_finish.message);
                login(&server_setup, Some(&password_file), b"alice", b"hunter2")
            });
        assert!(result.is_err(), "flipped byte {i} went undetected");
    }
}

#[test]
fn test_tampered_registration_upload_is_rejected() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();

    let client_start = ClientRegistration::start(&mut OsRng, b"hunter2").unwrap();
    let server_start =
        ServerRegistration::start(&server_setup, client_start.message, b"alice").unwrap();
    let client_finish = client_start
        .state
        .finish(b"hunter2", server_start.message, &Identity)
        .unwrap();
    let upload_bytes = client_finish.message.serialize();

    for i in 0..upload_bytes.len() {
        let mut tampered = upload_bytes.clone();
        tampered[i] ^= 1;
        let result = ServerRegistration::deserialize(&tampered).and_then(|password_file| {
            login(&server_setup, Some(&password_file), b"alice", b"hunter2")
        });
        assert!(result.is_err(), "flipped byte {i} went undetected");
    }
}

#[test]
fn test_tampered_credential_response_is_rejected() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let (password_file, _) = register(&server_setup, b"alice", b"hunter2");

    let client_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let server_start = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        Some(&password_file),
        client_start.message,
        b"alice",
    )
    .unwrap();
    let response_bytes = server_start.message.serialize();

    for i in 0..response_bytes.len() {
        let mut tampered = response_bytes.clone();
        tampered[i] ^= 1;
        let result = CredentialResponse::deserialize(&tampered).and_then(|message| {
            client_start
                .state
                .clone()
                .finish(b"hunter2", message, &Identity)
        });
        assert!(result.is_err(), "flipped byte {i} went undetected");
    }
}

#[test]
fn test_tampered_credential_request_is_rejected() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let (password_file, _) = register(&server_setup, b"alice", b"hunter2");

    let client_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let request_bytes = client_start.message.serialize();

    for i in 0..request_bytes.len() {
        let mut tampered = request_bytes.clone();
        tampered[i] ^= 1;
        let result = CredentialRequest::deserialize(&tampered).and_then(|message| {
            let server_start = ServerLogin::start(
                &mut OsRng,
                &server_setup,
                Some(&password_file),
                message,
                b"alice",
            )?;
            client_start
                .state
                .clone()
                .finish(b"hunter2", server_start.message, &Identity)
        });
        assert!(result.is_err(), "flipped byte {i} went undetected");
    }
}

#[test]
fn test_tampered_finalization_is_rejected() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();
    let (password_file, _) = register(&server_setup, b"alice", b"hunter2");

    let client_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let server_start = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        Some(&password_file),
        client_start.message,
        b"alice",
    )
    .unwrap();
    let client_finish = client_start
        .state
        .finish(b"hunter2", server_start.message, &Identity)
        .unwrap();
    let finalization_bytes = client_finish.message.serialize();

    for i in 0..finalization_bytes.len() {
        let mut tampered = finalization_bytes.clone();
        tampered[i] ^= 1;
        let result = CredentialFinalization::deserialize(&tampered)
            .and_then(|message| server_start.state.clone().finish(message));
        assert!(
            matches!(result, Err(ProtocolError::InvalidLoginError)),
            "flipped byte {i} went undetected"
        );
    }
}

#[test]
fn test_states_survive_serialization() {
    let server_setup =
        ServerSetup::deserialize(&ServerSetup::new(&mut OsRng).unwrap().serialize()).unwrap();

    let client_start = ClientRegistration::start(&mut OsRng, b"hunter2").unwrap();
    let client_state =
        ClientRegistration::deserialize(&client_start.state.serialize()).unwrap();
    let server_start =
        ServerRegistration::start(&server_setup, client_start.message, b"alice").unwrap();
    let client_finish = client_state
        .finish(b"hunter2", server_start.message, &Identity)
        .unwrap();
    let password_file =
        ServerRegistration::deserialize(&ServerRegistration::finish(client_finish.message).serialize())
            .unwrap();

    let login_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let login_state = ClientLogin::deserialize(&login_start.state.serialize()).unwrap();
    let server_login = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        Some(&password_file),
        login_start.message,
        b"alice",
    )
    .unwrap();
    let server_state = ServerLogin::deserialize(&server_login.state.serialize()).unwrap();
    let login_finish = login_state
        .finish(b"hunter2", server_login.message, &Identity)
        .unwrap();
    let server_finish = server_state.finish(login_finish.message).unwrap();

    assert_eq!(login_finish.session_key, server_finish.session_key);
}

#[test]
fn test_byte_api_complete_flow() {
    let setup = api::create_setup().unwrap();
    assert_eq!(setup.len(), api::SERVER_SETUP_LEN);

    let (request, client_state) = api::register_client(b"hunter2").unwrap();
    assert_eq!(request.len(), api::REGISTRATION_REQUEST_LEN);
    assert_eq!(client_state.len(), api::CLIENT_REGISTRATION_LEN);
    let response = api::register(&setup, &request, b"alice").unwrap();
    assert_eq!(response.len(), api::REGISTRATION_RESPONSE_LEN);
    let upload = api::register_client_finish(&client_state, b"hunter2", &response).unwrap();
    let password_file = api::register_finish(&upload).unwrap();
    assert_eq!(password_file.len(), api::SERVER_REGISTRATION_LEN);

    let (request, client_state) = api::login_client(b"hunter2").unwrap();
    assert_eq!(request.len(), api::CREDENTIAL_REQUEST_LEN);
    let (response, server_state) =
        api::login(&setup, Some(&password_file), &request, b"alice").unwrap();
    assert_eq!(response.len(), api::CREDENTIAL_RESPONSE_LEN);
    assert_eq!(server_state.len(), api::SERVER_LOGIN_LEN);
    let (finalization, client_session_key) =
        api::login_client_finish(&client_state, b"hunter2", &response).unwrap();
    assert_eq!(finalization.len(), api::CREDENTIAL_FINALIZATION_LEN);
    let server_session_key = api::login_finish(&finalization, &server_state).unwrap();

    assert_eq!(client_session_key, server_session_key);
    assert_eq!(client_session_key.len(), api::SESSION_KEY_LEN);
}

#[test]
fn test_byte_api_login_without_account() {
    let setup = api::create_setup().unwrap();
    let (request, client_state) = api::login_client(b"hunter2").unwrap();
    let (response, _) = api::login(&setup, None, &request, b"nobody").unwrap();
    assert_eq!(response.len(), api::CREDENTIAL_RESPONSE_LEN);

    let result = api::login_client_finish(&client_state, b"hunter2", &response);
    assert!(matches!(result, Err(ProtocolError::InvalidLoginError)));
}
