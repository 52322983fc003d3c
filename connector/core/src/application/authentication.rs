// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console login check backed by the work dispatcher.
//!
//! The session thread builds an [`AuthenticationRequest`] and blocks in
//! `execute` while a worker runs the [`Authenticator`]. Every failure along
//! the way (saturation, shutdown, timeout, an authenticator error or panic)
//! folds to deny.
//!
//! [`SecurityContextRunner`] is the asynchronous sibling: the unit is only
//! scheduled, authenticates on the worker and runs the caller's work under a
//! [`WorkSecurityContext`] when the principal is accepted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::dispatcher::{WorkDispatcher, WorkDispatcherExt};
use crate::domain::events::ConnectorEvent;
use crate::domain::security::{
    AuthenticationRequest, Authenticator, SecuredWork, SecurityCheck, SecurityContextRunner,
    WorkSecurityContext,
};
use crate::infrastructure::event_bus::EventBus;

pub struct DispatchedSecurityCheck {
    dispatcher: Arc<dyn WorkDispatcher>,
    authenticator: Arc<dyn Authenticator>,
    event_bus: EventBus,
}

impl DispatchedSecurityCheck {
    pub fn new(
        dispatcher: Arc<dyn WorkDispatcher>,
        authenticator: Arc<dyn Authenticator>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            dispatcher,
            authenticator,
            event_bus,
        }
    }

    fn authenticate(&self, request: AuthenticationRequest) -> bool {
        let principal = request.principal.clone();
        let authenticator = Arc::clone(&self.authenticator);

        match self
            .dispatcher
            .execute_with(move || authenticator.authenticate(&request))
        {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(%principal, error = %e, "Authentication could not complete, denying");
                false
            }
        }
    }
}

impl SecurityCheck for DispatchedSecurityCheck {
    fn check(&self, principal: &str, credential: &str) -> bool {
        let allowed = self.authenticate(AuthenticationRequest::new(principal, credential));

        let result = if allowed { "allowed" } else { "denied" };
        info!(%principal, result, "Console authentication");
        metrics::counter!("crest_auth_attempts_total", "result" => result).increment(1);
        self.event_bus.publish(ConnectorEvent::AuthenticationCompleted {
            principal: principal.to_string(),
            allowed,
            completed_at: Utc::now(),
        });

        allowed
    }
}

impl SecurityContextRunner for DispatchedSecurityCheck {
    fn run_with_security_context(&self, principal: &str, credential: &str, work: SecuredWork) {
        let request = AuthenticationRequest::new(principal, credential);
        let authenticator = Arc::clone(&self.authenticator);

        let scheduled = self.dispatcher.schedule(Box::new(move || -> anyhow::Result<()> {
            if !authenticator.authenticate(&request)? {
                anyhow::bail!("principal '{}' is not authenticated", request.principal);
            }
            let context = WorkSecurityContext::new(request.principal);
            debug!(principal = %context.principal(), "Running work under security context");
            work(&context)
        }));

        if let Err(e) = scheduled {
            error!(%principal, error = %e, "Failed to schedule work under security context");
        }
    }
}
