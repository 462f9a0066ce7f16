// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! An implementation of the OPAQUE augmented password-authenticated key
//! exchange, fixed to the ristretto255 group with SHA-512, triple
//! Diffie-Hellman and the Argon2id key stretching function.
//!
//! OPAQUE lets a client register and later authenticate with a password
//! without the server ever seeing it: the password only ever enters an
//! oblivious pseudorandom function (OPRF) evaluated jointly by both parties.
//! A successful login yields a fresh mutually-authenticated session key on
//! both sides, plus a client-only export key the server cannot compute.
//!
//! # Server setup
//!
//! A deployment creates its long-lived secrets once and persists the blob:
//!
//! ```
//! use opaque_ristretto::opaque::ServerSetup;
//! use rand::rngs::OsRng;
//!
//! # fn main() -> Result<(), opaque_ristretto::errors::ProtocolError> {
//! let server_setup = ServerSetup::new(&mut OsRng)?;
//! let setup_blob = server_setup.serialize();
//! # Ok(())
//! # }
//! ```
//!
//! The same setup must be supplied to every subsequent server operation;
//! registrations made under one setup cannot be used to log in under
//! another.
//!
//! # Registration
//!
//! Registration is a three-message flow. The client blinds its password, the
//! server evaluates the OPRF under a key derived from the account's
//! credential identifier, and the client uploads the password file contents
//! for the server to store:
//!
//! ```
//! use opaque_ristretto::ksf::Identity;
//! use opaque_ristretto::opaque::{ClientRegistration, ServerRegistration, ServerSetup};
//! use rand::rngs::OsRng;
//!
//! # fn main() -> Result<(), opaque_ristretto::errors::ProtocolError> {
//! let server_setup = ServerSetup::new(&mut OsRng)?;
//!
//! let client_start = ClientRegistration::start(&mut OsRng, b"hunter2")?;
//! let server_start =
//!     ServerRegistration::start(&server_setup, client_start.message, b"alice")?;
//! let client_finish =
//!     client_start.state.finish(b"hunter2", server_start.message, &Identity)?;
//! let password_file = ServerRegistration::finish(client_finish.message);
//! # Ok(())
//! # }
//! ```
//!
//! # Login
//!
//! Login is also three messages, layering a triple Diffie-Hellman key
//! exchange over the credential retrieval:
//!
//! ```
//! # use opaque_ristretto::ksf::Identity;
//! # use opaque_ristretto::opaque::{ClientLogin, ClientRegistration, ServerLogin,
//! #     ServerRegistration, ServerSetup};
//! # use rand::rngs::OsRng;
//! # fn main() -> Result<(), opaque_ristretto::errors::ProtocolError> {
//! # let server_setup = ServerSetup::new(&mut OsRng)?;
//! # let client_start = ClientRegistration::start(&mut OsRng, b"hunter2")?;
//! # let server_start =
//! #     ServerRegistration::start(&server_setup, client_start.message, b"alice")?;
//! # let client_finish =
//! #     client_start.state.finish(b"hunter2", server_start.message, &Identity)?;
//! # let password_file = ServerRegistration::finish(client_finish.message);
//! let login_start = ClientLogin::start(&mut OsRng, b"hunter2")?;
//! let server_login = ServerLogin::start(
//!     &mut OsRng,
//!     &server_setup,
//!     Some(&password_file),
//!     login_start.message,
//!     b"alice",
//! )?;
//! let login_finish =
//!     login_start.state.finish(b"hunter2", server_login.message, &Identity)?;
//! let server_finish = server_login.state.finish(login_finish.message)?;
//!
//! assert_eq!(login_finish.session_key, server_finish.session_key);
//! # Ok(())
//! # }
//! ```
//!
//! When no password file exists for the requested credential identifier, the
//! server passes `None` to [`opaque::ServerLogin::start`] and the exchange
//! proceeds against the setup's decoy record: the client receives a
//! well-formed response of the usual shape and only learns of the failure
//! when its finalization is rejected. An attacker can therefore not probe
//! which accounts exist.
//!
//! # Byte-oriented API
//!
//! The [`api`] module exposes the same nine operations over plain byte
//! slices, with the OS random number generator and Argon2id baked in, for
//! callers that shuttle opaque blobs between processes or languages.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
mod envelope;
pub mod errors;
mod group;
pub mod keypair;
mod key_exchange;
pub mod ksf;
pub mod messages;
pub mod opaque;
mod oprf;

#[cfg(test)]
mod tests;
