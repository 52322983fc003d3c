// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console commands
//!
//! A [`Command`] is a named operation resolvable from any console session.
//! The invocation target is an [`Invocable`] capability, so the registry and
//! session servers never need to know whether a command is a built-in or was
//! contributed by an activated endpoint.

use std::fmt;
use std::sync::Arc;

use crate::domain::activation::ActivationHandle;

/// Something a console can invoke with a list of string arguments.
pub trait Invocable: Send + Sync {
    fn invoke(&self, args: &[String]) -> Result<String, InvocationError>;
}

impl<F> Invocable for F
where
    F: Fn(&[String]) -> Result<String, InvocationError> + Send + Sync,
{
    fn invoke(&self, args: &[String]) -> Result<String, InvocationError> {
        self(args)
    }
}

/// Where a command came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Registered at connector start, lives for the process lifetime
    BuiltIn,
    /// Contributed by an activation, removed when it is deactivated
    Activation(ActivationHandle),
}

impl CommandKind {
    pub fn is_builtin(&self) -> bool {
        matches!(self, CommandKind::BuiltIn)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::BuiltIn => write!(f, "built-in"),
            CommandKind::Activation(handle) => write!(f, "activation:{}", handle),
        }
    }
}

#[derive(Clone)]
pub struct Command {
    name: String,
    description: String,
    kind: CommandKind,
    target: Arc<dyn Invocable>,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: CommandKind,
        target: Arc<dyn Invocable>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Invoke the command target.
    ///
    /// Callers resolve once and invoke the returned `Arc<Command>`; removing
    /// the command from the registry does not interrupt an invocation that is
    /// already running.
    pub fn invoke(&self, args: &[String]) -> Result<String, InvocationError> {
        self.target.invoke(args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Errors surfaced to the console when a command invocation fails
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),

    #[error("endpoint rejected delivery of '{operation}': {reason}")]
    DeliveryRejected { operation: String, reason: String },
}

impl InvocationError {
    pub fn failed(message: impl Into<String>) -> Self {
        InvocationError::Failed(message.into())
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        InvocationError::InvalidArguments(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_invocable() {
        let cmd = Command::new(
            "echo",
            "Echo arguments",
            CommandKind::BuiltIn,
            Arc::new(|args: &[String]| -> Result<String, InvocationError> { Ok(args.join(" ")) }),
        );

        let out = cmd.invoke(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(out, "a b");
        assert_eq!(cmd.name(), "echo");
        assert!(cmd.kind().is_builtin());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(CommandKind::BuiltIn.to_string(), "built-in");
        let kind = CommandKind::Activation(ActivationHandle::from("ep1"));
        assert_eq!(kind.to_string(), "activation:ep1");
    }

    #[test]
    fn test_debug_omits_target() {
        let cmd = Command::new("status", "", CommandKind::BuiltIn, Arc::new(|_: &[String]| -> Result<String, InvocationError> { Ok(String::new()) }));
        let rendered = format!("{:?}", cmd);
        assert!(rendered.contains("status"));
        assert!(rendered.ends_with(".. }"));
    }
}
