// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

use proptest::collection::vec;
use proptest::prelude::*;
use rand::rngs::OsRng;

use crate::errors::ProtocolError;
use crate::ksf::Identity;
use crate::messages::{
    CredentialFinalization, CredentialRequest, CredentialResponse, RegistrationRequest,
    RegistrationResponse, RegistrationUpload, REGISTRATION_REQUEST_LEN,
};
use crate::opaque::{
    ClientLogin, ClientRegistration, ServerLogin, ServerRegistration, ServerSetup,
};

#[test]
fn wrong_length_input_reports_a_size_error() {
    let result = RegistrationRequest::deserialize(&[0u8; REGISTRATION_REQUEST_LEN + 1]);
    assert!(matches!(
        result,
        Err(ProtocolError::SizeError {
            name: "registration_request",
            ..
        })
    ));
}

#[test]
fn messages_round_trip_through_their_byte_encodings() {
    let server_setup = ServerSetup::new(&mut OsRng).unwrap();

    let client_start = ClientRegistration::start(&mut OsRng, b"hunter2").unwrap();
    let request_bytes = client_start.message.serialize();
    assert_eq!(
        RegistrationRequest::deserialize(&request_bytes)
            .unwrap()
            .serialize(),
        request_bytes
    );

    let server_start =
        ServerRegistration::start(&server_setup, client_start.message, b"alice").unwrap();
    let response_bytes = server_start.message.serialize();
    assert_eq!(
        RegistrationResponse::deserialize(&response_bytes)
            .unwrap()
            .serialize(),
        response_bytes
    );

    let client_finish = client_start
        .state
        .finish(b"hunter2", server_start.message, &Identity)
        .unwrap();
    let upload_bytes = client_finish.message.serialize();
    assert_eq!(
        RegistrationUpload::deserialize(&upload_bytes)
            .unwrap()
            .serialize(),
        upload_bytes
    );
    let password_file = ServerRegistration::finish(client_finish.message);

    let login_start = ClientLogin::start(&mut OsRng, b"hunter2").unwrap();
    let login_request_bytes = login_start.message.serialize();
    assert_eq!(
        CredentialRequest::deserialize(&login_request_bytes)
            .unwrap()
            .serialize(),
        login_request_bytes
    );

    let server_login = ServerLogin::start(
        &mut OsRng,
        &server_setup,
        Some(&password_file),
        login_start.message,
        b"alice",
    )
    .unwrap();
    let login_response_bytes = server_login.message.serialize();
    assert_eq!(
        CredentialResponse::deserialize(&login_response_bytes)
            .unwrap()
            .serialize(),
        login_response_bytes
    );

    let login_finish = login_start
        .state
        .finish(b"hunter2", server_login.message, &Identity)
        .unwrap();
    let finalization_bytes = login_finish.message.serialize();
    assert_eq!(
        CredentialFinalization::deserialize(&finalization_bytes)
            .unwrap()
            .serialize(),
        finalization_bytes
    );
}

proptest! {
    #[test]
    fn registration_request_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = RegistrationRequest::deserialize(&bytes);
    }

    #[test]
    fn registration_response_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = RegistrationResponse::deserialize(&bytes);
    }

    #[test]
    fn registration_upload_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = RegistrationUpload::deserialize(&bytes);
    }

    #[test]
    fn credential_request_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = CredentialRequest::deserialize(&bytes);
    }

    #[test]
    fn credential_response_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = CredentialResponse::deserialize(&bytes);
    }

    #[test]
    fn credential_finalization_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = CredentialFinalization::deserialize(&bytes);
    }

    #[test]
    fn client_registration_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = ClientRegistration::deserialize(&bytes);
    }

    #[test]
    fn client_login_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = ClientLogin::deserialize(&bytes);
    }

    #[test]
    fn server_login_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = ServerLogin::deserialize(&bytes);
    }

    #[test]
    fn server_registration_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = ServerRegistration::deserialize(&bytes);
    }

    #[test]
    fn server_setup_deserialize_never_panics(bytes in vec(any::<u8>(), 0..600)) {
        let _ = ServerSetup::deserialize(&bytes);
    }
}
