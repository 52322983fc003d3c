// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console authentication contracts
//!
//! Session servers only see [`SecurityCheck`]. The connector implements it by
//! submitting an [`AuthenticationRequest`] to the work dispatcher, where a
//! pluggable [`Authenticator`] decides. [`SecurityContextRunner`] schedules
//! work that runs under an authenticated principal's [`WorkSecurityContext`].

use std::fmt;

/// Ephemeral principal/credential pair, discarded once the result is read.
#[derive(Clone)]
pub struct AuthenticationRequest {
    pub principal: String,
    pub credential: String,
}

impl AuthenticationRequest {
    pub fn new(principal: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            credential: credential.into(),
        }
    }
}

impl fmt::Debug for AuthenticationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationRequest")
            .field("principal", &self.principal)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// The authentication algorithm. Runs on a dispatcher worker thread.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &AuthenticationRequest) -> anyhow::Result<bool>;
}

/// Capability handed to session servers. Always resolves to allow or deny.
pub trait SecurityCheck: Send + Sync {
    fn check(&self, principal: &str, credential: &str) -> bool;
}

/// Identity a unit of work runs under once its principal is authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSecurityContext {
    principal: String,
}

impl WorkSecurityContext {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }
}

/// Work submitted on behalf of a principal.
pub type SecuredWork = Box<dyn FnOnce(&WorkSecurityContext) -> anyhow::Result<()> + Send + 'static>;

/// Fire-and-forget execution under a principal's identity.
///
/// The credential is verified on the worker before `work` runs; work whose
/// principal does not authenticate never runs. Nothing is reported back to
/// the submitter.
pub trait SecurityContextRunner: Send + Sync {
    fn run_with_security_context(&self, principal: &str, credential: &str, work: SecuredWork);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_debug_redacts_credential() {
        let request = AuthenticationRequest::new("admin", "hunter2");
        let rendered = format!("{:?}", request);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_work_context_carries_principal() {
        let context = WorkSecurityContext::new("admin");
        assert_eq!(context.principal(), "admin");
        assert_eq!(context.clone(), context);
    }
}
