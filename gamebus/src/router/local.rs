//! What one node hosts, and how calls run against it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::broadcast::SubscriptionId;
use crate::context::MessageContext;
use crate::error::{CallError, FaultKind, RemoteFault, RouterError};
use crate::id::NodeId;
use crate::table::MethodTable;
use crate::wire::call::{RemoteMethodCall, ResolvedCall};
use crate::wire::results::RemoteMethodCallResults;

/// Type-erased invocation target, closing over an implementor.
pub(crate) type DispatchFn =
    Arc<dyn Fn(&ResolvedCall<'_>) -> Result<RemoteMethodCallResults, CallError> + Send + Sync>;

/// A registered implementor together with the table it dispatches by.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) table: &'static MethodTable,
    pub(crate) invoke: DispatchFn,
}

/// One channel subscription on this node.
#[derive(Clone)]
pub(crate) struct Subscriber {
    pub(crate) id: SubscriptionId,
    pub(crate) target: Registration,
}

/// This node's implementors and channel subscribers.
#[derive(Default)]
pub(crate) struct LocalRegistry {
    endpoints: HashMap<String, Registration>,
    channels: HashMap<String, Vec<Subscriber>>,
}

impl LocalRegistry {
    /// Installs the implementor of `name`. At most one per node.
    pub(crate) fn register_endpoint(
        &mut self,
        name: &str,
        registration: Registration,
    ) -> Result<(), RouterError> {
        if self.endpoints.contains_key(name) {
            return Err(RouterError::Contract(format!(
                "endpoint '{name}' already has a local implementor"
            )));
        }
        self.endpoints.insert(name.to_string(), registration);
        Ok(())
    }

    /// Removes the implementor of `name`. Idempotent; reports whether
    /// anything was removed.
    pub(crate) fn unregister_endpoint(&mut self, name: &str) -> bool {
        self.endpoints.remove(name).is_some()
    }

    pub(crate) fn endpoint(&self, name: &str) -> Option<Registration> {
        self.endpoints.get(name).cloned()
    }

    pub(crate) fn has_endpoint(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    /// Adds a channel subscription; reports whether it is the first local
    /// one, which is when the hub needs to hear about it.
    pub(crate) fn subscribe(&mut self, name: &str, subscriber: Subscriber) -> bool {
        let list = self.channels.entry(name.to_string()).or_default();
        list.push(subscriber);
        list.len() == 1
    }

    /// Removes one subscription by id. Unknown ids are ignored. Reports
    /// `(removed, channel now empty)`.
    pub(crate) fn unsubscribe(&mut self, name: &str, id: SubscriptionId) -> (bool, bool) {
        let Some(list) = self.channels.get_mut(name) else {
            return (false, false);
        };
        let before = list.len();
        list.retain(|subscriber| subscriber.id != id);
        let removed = list.len() != before;
        let emptied = list.is_empty();
        if emptied {
            self.channels.remove(name);
        }
        (removed, emptied)
    }

    pub(crate) fn subscribers(&self, name: &str) -> Vec<Subscriber> {
        self.channels.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn has_subscribers(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }
}

/// Runs one call against a local target, folding every failure mode into
/// a result envelope.
///
/// The invoker's identity is bound as the message context for exactly the
/// extent of the method body, and panics are caught, so a misbehaving
/// implementor faults its caller instead of taking the host down.
pub(crate) fn execute(
    registration: &Registration,
    caller_version: u64,
    invoker: &NodeId,
    call: &RemoteMethodCall,
) -> RemoteMethodCallResults {
    let table = registration.table;
    if caller_version != table.version() {
        return RemoteMethodCallResults::from_fault(RemoteFault::new(
            FaultKind::SchemaSkew,
            format!(
                "caller's table for '{}' has version {:#018x}, this node was built with {:#018x}",
                call.remote_name(),
                caller_version,
                table.version()
            ),
        ));
    }
    let resolved = match call.resolve(table) {
        Ok(resolved) => resolved,
        Err(error) => {
            return RemoteMethodCallResults::from_fault(RemoteFault::contract(error.to_string()))
        }
    };
    tracing::debug!(
        endpoint = call.remote_name(),
        method = resolved.method_name(),
        %invoker,
        "dispatching inbound call"
    );
    let outcome = MessageContext::scope(invoker.clone(), || {
        catch_unwind(AssertUnwindSafe(|| (registration.invoke)(&resolved)))
    });
    match outcome {
        Ok(Ok(results)) => results,
        Ok(Err(error)) => {
            RemoteMethodCallResults::from_fault(RemoteFault::contract(error.to_string()))
        }
        Err(panic) => RemoteMethodCallResults::from_fault(RemoteFault::execution(panic_message(
            panic.as_ref(),
        ))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "implementor panicked".to_string()
    }
}
