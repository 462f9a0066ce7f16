// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Key stretching functions applied to the OPRF output before key derivation,
//! to slow down an attacker who has compromised the password file

use crate::errors::InternalError;
use crate::oprf::OPRF_OUTPUT_LEN;

/// A key stretching function (KSF), typically memory-hard
pub trait Ksf: Default {
    /// Stretches the OPRF output. Must be deterministic.
    fn hash(
        &self,
        input: &[u8; OPRF_OUTPUT_LEN],
    ) -> Result<[u8; OPRF_OUTPUT_LEN], InternalError>;
}

/// The memory-hard Argon2id function with its default parameters. This is the
/// KSF used by the byte-oriented API.
impl Ksf for argon2::Argon2<'_> {
    fn hash(
        &self,
        input: &[u8; OPRF_OUTPUT_LEN],
    ) -> Result<[u8; OPRF_OUTPUT_LEN], InternalError> {
        let mut output = [0u8; OPRF_OUTPUT_LEN];
        // the salt role is filled by the OPRF: its output is already
        // per-credential
        self.hash_password_into(input, &[0; 16], &mut output)
            .map_err(|_| InternalError::KsfError)?;
        Ok(output)
    }
}

/// A no-op KSF which returns the input unchanged, for tests and protocol
/// comparisons only
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Identity;

impl Ksf for Identity {
    fn hash(
        &self,
        input: &[u8; OPRF_OUTPUT_LEN],
    ) -> Result<[u8; OPRF_OUTPUT_LEN], InternalError> {
        Ok(*input)
    }
}
