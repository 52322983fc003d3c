// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Static credential store backed by the `security.users` config section.

use std::collections::HashMap;

use anyhow::Context;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::domain::connector_config::SecurityConfig;
use crate::domain::security::{AuthenticationRequest, Authenticator};

/// Hex-encoded SHA-256 of `password`, the format stored in `password_sha256`.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Default)]
pub struct StaticAuthenticator {
    digests: HashMap<String, Vec<u8>>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SecurityConfig) -> anyhow::Result<Self> {
        let mut authenticator = Self::new();
        for user in &config.users {
            let digest = hex::decode(&user.password_sha256)
                .with_context(|| format!("password_sha256 for user '{}' is not hex", user.name))?;
            authenticator.digests.insert(user.name.clone(), digest);
        }
        Ok(authenticator)
    }

    /// Add or replace a user from a clear-text password
    pub fn with_user(mut self, name: impl Into<String>, password: &str) -> Self {
        let digest = Sha256::digest(password.as_bytes()).to_vec();
        self.digests.insert(name.into(), digest);
        self
    }

    pub fn user_count(&self) -> usize {
        self.digests.len()
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, request: &AuthenticationRequest) -> anyhow::Result<bool> {
        let Some(expected) = self.digests.get(&request.principal) else {
            debug!(principal = %request.principal, "Unknown principal");
            return Ok(false);
        };

        let presented = Sha256::digest(request.credential.as_bytes());
        Ok(bool::from(presented.as_slice().ct_eq(expected.as_slice())))
    }
}
