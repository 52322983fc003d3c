// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Connector Lifecycle
//!
//! `Stopped → Starting → Running → Stopping → Stopped`
//!
//! `start` registers the built-in commands and starts one session server per
//! configured transport, all sharing the dispatcher-backed security check.
//! A listener that fails to start aborts the whole startup; servers already
//! running are stopped again. `stop` is best effort: every server gets a
//! stop attempt and failures are reported, never raised.
//!
//! `start` and `stop` serialize on the server list, so they may be called
//! from any task. Activations go straight to the activation service and
//! never wait on the lifecycle.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::application::activation::{
    ActivationService, ActivationTracker, StandardActivationService,
};
use crate::application::authentication::DispatchedSecurityCheck;
use crate::application::builtins::BuiltinCommands;
use crate::domain::activation::{ActivationError, ActivationHandle, EndpointDescriptor};
use crate::domain::connector_config::{ConnectorConfig, ConnectorConfigSpec};
use crate::domain::discovery::{discover, DiscoveryContext};
use crate::domain::dispatcher::WorkDispatcher;
use crate::domain::events::ConnectorEvent;
use crate::domain::security::{Authenticator, SecuredWork, SecurityContextRunner};
use crate::domain::session::{
    SessionError, SessionServer, SessionServerFactory, SessionSettings, Transport,
};
use crate::infrastructure::authenticator::StaticAuthenticator;
use crate::infrastructure::dispatcher::TokioWorkDispatcher;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::registry::CommandRegistry;
use crate::infrastructure::session::TcpSessionServerFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectorState::Stopped => "stopped",
            ConnectorState::Starting => "starting",
            ConnectorState::Running => "running",
            ConnectorState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector is {actual}, expected {expected}")]
    InvalidState {
        expected: ConnectorState,
        actual: ConnectorState,
    },

    #[error("failed to start {transport} listener: {source}")]
    Listener {
        transport: Transport,
        #[source]
        source: SessionError,
    },

    #[error(transparent)]
    Activation(#[from] ActivationError),
}

/// One server that failed to stop cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopFailure {
    pub transport: Transport,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: Vec<Transport>,
    pub failures: Vec<StopFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Connector {
    spec: ConnectorConfigSpec,
    registry: Arc<CommandRegistry>,
    tracker: Arc<ActivationTracker>,
    activations: StandardActivationService,
    security: Arc<DispatchedSecurityCheck>,
    dispatcher: Arc<dyn WorkDispatcher>,
    authenticator: Arc<dyn Authenticator>,
    factory: Arc<dyn SessionServerFactory>,
    event_bus: EventBus,
    state: Mutex<ConnectorState>,
    servers: tokio::sync::Mutex<Vec<Box<dyn SessionServer>>>,
}

impl Connector {
    pub fn new(
        spec: ConnectorConfigSpec,
        dispatcher: Arc<dyn WorkDispatcher>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self::assemble(
            spec,
            dispatcher,
            authenticator,
            Arc::new(TcpSessionServerFactory),
            EventBus::with_default_capacity(),
        )
    }

    /// Connector with a tokio work dispatcher and the static authenticator
    /// described by `config`.
    pub fn from_config(config: &ConnectorConfig) -> anyhow::Result<Self> {
        let dispatcher = TokioWorkDispatcher::from_config(&config.spec.workers)?;
        let authenticator = StaticAuthenticator::from_config(&config.spec.security)?;
        Ok(Self::new(
            config.spec.clone(),
            Arc::new(dispatcher),
            Arc::new(authenticator),
        ))
    }

    pub fn with_session_factory(self, factory: Arc<dyn SessionServerFactory>) -> Self {
        Self { factory, ..self }
    }

    /// Replace the event bus. Rebuilds the registry and tracker, so call it
    /// before starting or activating anything.
    pub fn with_event_bus(self, event_bus: EventBus) -> Self {
        Self::assemble(
            self.spec,
            self.dispatcher,
            self.authenticator,
            self.factory,
            event_bus,
        )
    }

    fn assemble(
        spec: ConnectorConfigSpec,
        dispatcher: Arc<dyn WorkDispatcher>,
        authenticator: Arc<dyn Authenticator>,
        factory: Arc<dyn SessionServerFactory>,
        event_bus: EventBus,
    ) -> Self {
        let registry = Arc::new(CommandRegistry::new());
        let tracker = Arc::new(ActivationTracker::new());
        let activations = StandardActivationService::new(
            Arc::clone(&tracker),
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            event_bus.clone(),
        );
        let security = Arc::new(DispatchedSecurityCheck::new(
            Arc::clone(&dispatcher),
            Arc::clone(&authenticator),
            event_bus.clone(),
        ));

        Self {
            spec,
            registry,
            tracker,
            activations,
            security,
            dispatcher,
            authenticator,
            factory,
            event_bus,
            state: Mutex::new(ConnectorState::Stopped),
            servers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.lock()
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<ActivationTracker> {
        &self.tracker
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Transports with a running server, in start order
    pub async fn running_transports(&self) -> Vec<Transport> {
        self.servers.lock().await.iter().map(|s| s.transport()).collect()
    }

    pub async fn start(&self) -> Result<(), ConnectorError> {
        let mut servers = self.servers.lock().await;
        self.transition(ConnectorState::Stopped, ConnectorState::Starting)?;

        info!(prompt = %self.spec.prompt, "Starting connector");
        self.register_builtins();

        for (transport, port) in self.spec.listeners.enabled_transports() {
            let settings = SessionSettings {
                transport,
                prompt: self.spec.prompt.clone(),
                bind_address: self.spec.listeners.bind_address.clone(),
                port,
                resolver: self.registry.clone(),
                security: self.security.clone(),
                require_login: !self.spec.security.anonymous,
            };

            if let Err(source) = self.start_server(settings, &mut servers).await {
                error!(%transport, port, error = %source, "Listener failed to start, aborting startup");
                self.stop_servers(&mut servers).await;
                *self.state.lock() = ConnectorState::Stopped;
                return Err(ConnectorError::Listener { transport, source });
            }
        }

        if servers.is_empty() {
            warn!("No listener ports configured; connector runs without console access");
        }

        *self.state.lock() = ConnectorState::Running;
        info!(listeners = servers.len(), "Connector running");
        Ok(())
    }

    /// Stop every started server. A no-op returning an empty report when
    /// already stopped.
    pub async fn stop(&self) -> Result<ShutdownReport, ConnectorError> {
        let mut servers = self.servers.lock().await;
        if self.state() == ConnectorState::Stopped {
            return Ok(ShutdownReport::default());
        }
        self.transition(ConnectorState::Running, ConnectorState::Stopping)?;

        info!("Stopping connector");
        let report = self.stop_servers(&mut servers).await;
        *self.state.lock() = ConnectorState::Stopped;

        if report.is_clean() {
            info!("Connector stopped");
        } else {
            warn!(failures = report.failures.len(), "Connector stopped with errors");
        }
        Ok(report)
    }

    /// `stop`, then shut the work dispatcher down.
    pub async fn shutdown(&self) -> Result<ShutdownReport, ConnectorError> {
        let report = self.stop().await?;
        self.dispatcher.shutdown();
        Ok(report)
    }

    pub fn activate(
        &self,
        handle: impl Into<ActivationHandle>,
        descriptor: EndpointDescriptor,
    ) -> Result<(), ConnectorError> {
        Ok(self.activations.activate(handle.into(), descriptor)?)
    }

    pub fn deactivate(&self, handle: &ActivationHandle) -> Result<(), ConnectorError> {
        Ok(self.activations.deactivate(handle)?)
    }

    /// Schedule `work` to run under `principal` once its credential checks
    /// out. Does not wait and does not depend on the lifecycle state.
    pub fn run_with_security_context(&self, principal: &str, credential: &str, work: SecuredWork) {
        self.security
            .run_with_security_context(principal, credential, work);
    }

    fn transition(
        &self,
        expected: ConnectorState,
        next: ConnectorState,
    ) -> Result<(), ConnectorError> {
        let mut state = self.state.lock();
        if *state != expected {
            return Err(ConnectorError::InvalidState {
                expected,
                actual: *state,
            });
        }
        *state = next;
        Ok(())
    }

    fn register_builtins(&self) {
        let provider = BuiltinCommands::new(&self.registry, &self.tracker);
        let builtins: Vec<_> = discover(&provider, &DiscoveryContext::BuiltIn)
            .into_iter()
            .map(Arc::new)
            .collect();
        self.registry.put_all(&builtins);
    }

    async fn start_server(
        &self,
        settings: SessionSettings,
        servers: &mut Vec<Box<dyn SessionServer>>,
    ) -> Result<(), SessionError> {
        let transport = settings.transport;
        let mut server = self.factory.create(settings)?;
        server.start().await?;

        let address = server
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        info!(%transport, %address, "Listener started");
        self.event_bus.publish(ConnectorEvent::ListenerStarted {
            transport,
            address,
            started_at: Utc::now(),
        });

        servers.push(server);
        Ok(())
    }

    async fn stop_servers(&self, servers: &mut Vec<Box<dyn SessionServer>>) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        // Reverse start order
        while let Some(mut server) = servers.pop() {
            let transport = server.transport();
            match server.stop().await {
                Ok(()) => {
                    self.event_bus.publish(ConnectorEvent::ListenerStopped {
                        transport,
                        stopped_at: Utc::now(),
                    });
                    report.stopped.push(transport);
                }
                Err(e) => {
                    error!(%transport, error = %e, "Failed to stop listener");
                    self.event_bus.publish(ConnectorEvent::ListenerStopFailed {
                        transport,
                        error: e.to_string(),
                        failed_at: Utc::now(),
                    });
                    report.failures.push(StopFailure {
                        transport,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dispatcher::{DispatchError, Work};
    use crate::domain::security::AuthenticationRequest;

    struct Inline;

    impl WorkDispatcher for Inline {
        fn schedule(&self, work: Work) -> Result<(), DispatchError> {
            let _ = work();
            Ok(())
        }

        fn execute(&self, work: Work) -> Result<(), DispatchError> {
            work().map_err(|e| DispatchError::WorkFailed(e.to_string()))
        }
    }

    struct DenyAll;

    impl Authenticator for DenyAll {
        fn authenticate(&self, _request: &AuthenticationRequest) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    fn connector(line_port: Option<u16>) -> Connector {
        let mut spec = ConnectorConfigSpec::default();
        spec.listeners.line_port = line_port;
        Connector::new(spec, Arc::new(Inline), Arc::new(DenyAll))
    }

    #[tokio::test]
    async fn test_start_without_listeners_registers_builtins() {
        let connector = connector(None);
        connector.start().await.unwrap();

        assert_eq!(connector.state(), ConnectorState::Running);
        assert!(connector.registry().contains("help"));
        assert!(connector.running_transports().await.is_empty());

        let report = connector.stop().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(connector.state(), ConnectorState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let connector = connector(None);
        connector.start().await.unwrap();

        let err = connector.start().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::InvalidState {
                expected: ConnectorState::Stopped,
                actual: ConnectorState::Running,
            }
        ));
    }

    #[tokio::test]
    async fn test_real_line_listener_on_ephemeral_port() {
        let connector = connector(Some(0));
        connector.start().await.unwrap();
        assert_eq!(connector.running_transports().await, vec![Transport::Line]);

        let report = connector.stop().await.unwrap();
        assert_eq!(report.stopped, vec![Transport::Line]);

        let again = connector.stop().await.unwrap();
        assert_eq!(again, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_unsupported_ssh_aborts_start() {
        let mut spec = ConnectorConfigSpec::default();
        spec.listeners.ssh_port = Some(0);
        spec.listeners.line_port = Some(0);
        let connector = Connector::new(spec, Arc::new(Inline), Arc::new(DenyAll));

        let err = connector.start().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Listener {
                transport: Transport::Ssh,
                source: SessionError::UnsupportedTransport(Transport::Ssh),
            }
        ));
        assert_eq!(connector.state(), ConnectorState::Stopped);
        assert!(connector.running_transports().await.is_empty());
    }
}
