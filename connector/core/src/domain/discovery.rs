// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command discovery
//!
//! Turns a [`CommandProvider`] into a set of [`Command`]s. Discovery is a pure
//! mapping: it never touches the registry. Commands discovered for an
//! activation are wrapped so that every invocation is bracketed by the
//! endpoint's delivery hooks.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::activation::{ActivationHandle, EndpointResource};
use crate::domain::command::{Command, CommandKind, Invocable, InvocationError};

/// A named operation exposed by a provider.
#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn Invocable>,
}

impl Operation {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[String]) -> Result<String, InvocationError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Anything that can enumerate the operations it wants to expose on the console.
pub trait CommandProvider: Send + Sync {
    fn operations(&self) -> Vec<Operation>;
}

/// Discovery context: built-ins at start, or an endpoint at activation time.
#[derive(Clone)]
pub enum DiscoveryContext {
    BuiltIn,
    Endpoint {
        handle: ActivationHandle,
        endpoint: Arc<dyn EndpointResource>,
    },
}

/// Discover commands from `provider`.
///
/// Blank names are skipped. When a provider exposes the same name twice the
/// later operation wins, matching the registry's own collision rule.
pub fn discover(provider: &dyn CommandProvider, context: &DiscoveryContext) -> Vec<Command> {
    let mut by_name: HashMap<String, Command> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for op in provider.operations() {
        let name = op.name.trim().to_string();
        if name.is_empty() {
            warn!("Skipping operation with an empty name");
            continue;
        }

        let command = match context {
            DiscoveryContext::BuiltIn => {
                Command::new(name.clone(), op.description, CommandKind::BuiltIn, op.handler)
            }
            DiscoveryContext::Endpoint { handle, endpoint } => {
                let target = EndpointTarget {
                    operation: name.clone(),
                    endpoint: Arc::clone(endpoint),
                    handler: op.handler,
                };
                Command::new(
                    name.clone(),
                    op.description,
                    CommandKind::Activation(handle.clone()),
                    Arc::new(target),
                )
            }
        };

        if by_name.insert(name.clone(), command).is_some() {
            debug!(command = %name, "Provider exposes the same name twice, keeping the later one");
        } else {
            order.push(name);
        }
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// Invocation target that delivers through an activated endpoint.
struct EndpointTarget {
    operation: String,
    endpoint: Arc<dyn EndpointResource>,
    handler: Arc<dyn Invocable>,
}

impl Invocable for EndpointTarget {
    fn invoke(&self, args: &[String]) -> Result<String, InvocationError> {
        self.endpoint.before_delivery(&self.operation)?;
        let _delivery = DeliveryGuard {
            endpoint: self.endpoint.as_ref(),
        };
        self.handler.invoke(args)
    }
}

/// Releases the delivery context on every exit path, unwinding included.
struct DeliveryGuard<'a> {
    endpoint: &'a dyn EndpointResource,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.endpoint.after_delivery();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StatusProvider;

    impl CommandProvider for StatusProvider {
        fn operations(&self) -> Vec<Operation> {
            vec![
                Operation::new("status", "Report status", |_: &[String]| Ok("up".to_string())),
                Operation::new("fail", "Always fails", |_: &[String]| {
                    Err(InvocationError::failed("boom"))
                }),
                Operation::new("  ", "Blank", |_: &[String]| Ok(String::new())),
            ]
        }
    }

    #[derive(Default)]
    struct CountingEndpoint {
        before: AtomicUsize,
        after: AtomicUsize,
        reject: bool,
    }

    impl EndpointResource for CountingEndpoint {
        fn before_delivery(&self, operation: &str) -> Result<(), InvocationError> {
            self.before.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(InvocationError::DeliveryRejected {
                    operation: operation.to_string(),
                    reason: "draining".to_string(),
                });
            }
            Ok(())
        }

        fn after_delivery(&self) {
            self.after.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&self) {}
    }

    #[test]
    fn test_discover_builtins_skips_blank_names() {
        let commands = discover(&StatusProvider, &DiscoveryContext::BuiltIn);
        let names: Vec<&str> = commands.iter().map(|c| c.name()).collect();

        assert_eq!(names, vec!["status", "fail"]);
        assert!(commands.iter().all(|c| c.kind().is_builtin()));
    }

    #[test]
    fn test_endpoint_commands_bracket_every_invocation() {
        let endpoint = Arc::new(CountingEndpoint::default());
        let context = DiscoveryContext::Endpoint {
            handle: "ep1".into(),
            endpoint: endpoint.clone(),
        };
        let commands = discover(&StatusProvider, &context);

        let status = commands.iter().find(|c| c.name() == "status").unwrap();
        assert_eq!(status.invoke(&[]).unwrap(), "up");
        assert_eq!(status.kind(), &CommandKind::Activation("ep1".into()));

        let fail = commands.iter().find(|c| c.name() == "fail").unwrap();
        assert!(fail.invoke(&[]).is_err());

        assert_eq!(endpoint.before.load(Ordering::SeqCst), 2);
        assert_eq!(endpoint.after.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rejected_delivery_skips_handler_and_after_hook() {
        let endpoint = Arc::new(CountingEndpoint {
            reject: true,
            ..Default::default()
        });
        let context = DiscoveryContext::Endpoint {
            handle: "ep1".into(),
            endpoint: endpoint.clone(),
        };
        let commands = discover(&StatusProvider, &context);
        let status = commands.iter().find(|c| c.name() == "status").unwrap();

        let err = status.invoke(&[]).unwrap_err();
        assert!(matches!(err, InvocationError::DeliveryRejected { .. }));
        assert_eq!(endpoint.after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_after_hook_runs_when_handler_panics() {
        struct Panicking;
        impl CommandProvider for Panicking {
            fn operations(&self) -> Vec<Operation> {
                vec![Operation::new("explode", "", |_: &[String]| -> Result<String, InvocationError> {
                    panic!("handler panicked")
                })]
            }
        }

        let endpoint = Arc::new(CountingEndpoint::default());
        let context = DiscoveryContext::Endpoint {
            handle: "ep1".into(),
            endpoint: endpoint.clone(),
        };
        let commands = discover(&Panicking, &context);
        let explode = commands[0].clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| explode.invoke(&[])));
        assert!(result.is_err());
        assert_eq!(endpoint.after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_names_keep_the_later_operation() {
        struct Twice;
        impl CommandProvider for Twice {
            fn operations(&self) -> Vec<Operation> {
                vec![
                    Operation::new("dup", "first", |_: &[String]| Ok("1".to_string())),
                    Operation::new("dup", "second", |_: &[String]| Ok("2".to_string())),
                ]
            }
        }

        let commands = discover(&Twice, &DiscoveryContext::BuiltIn);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].invoke(&[]).unwrap(), "2");
        assert_eq!(commands[0].description(), "second");
    }
}
