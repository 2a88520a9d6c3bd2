//! The two halves of call interception.
//!
//! Outbound, a generated stub packages each method call it intercepts and
//! hands it to a [`StubHandle`]. Inbound, the router resolves the call
//! against the endpoint's method table and feeds it to a
//! [`RemoteDispatch`] implementor. Neither half knows where the other
//! lives.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CallError;
use crate::name::RemoteName;
use crate::router::Router;
use crate::table::MethodTable;
use crate::wire::call::{CallArg, RemoteMethodCall, ResolvedCall};
use crate::wire::results::RemoteMethodCallResults;

/// How a stub submits the calls it intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    /// One implementor somewhere in the mesh; submit and park until its
    /// result arrives.
    Blocking,
    /// Any number of subscribers; fan out and return immediately.
    Broadcast,
}

/// Shared core of every generated stub: the endpoint identity plus the
/// router that carries its calls.
#[derive(Clone)]
pub struct StubHandle {
    name: RemoteName,
    mode: StubMode,
    router: Router,
}

impl StubHandle {
    pub(crate) fn new(name: RemoteName, mode: StubMode, router: Router) -> Self {
        Self { name, mode, router }
    }

    /// Endpoint this stub addresses.
    pub fn name(&self) -> &RemoteName {
        &self.name
    }

    /// Whether calls block for results or fan out.
    pub fn mode(&self) -> StubMode {
        self.mode
    }

    /// Packages one intercepted method call and submits it.
    ///
    /// Blocking mode parks the calling thread until the result arrives,
    /// the call times out, or the peer disconnects, and returns the
    /// envelope. Broadcast mode returns `None` as soon as the fan-out is
    /// submitted.
    pub fn call(
        &self,
        ordinal: u8,
        args: Option<Vec<CallArg>>,
    ) -> Result<Option<RemoteMethodCallResults>, CallError> {
        let method = self.name.schema().by_ordinal(ordinal).ok_or_else(|| {
            CallError::Contract(format!(
                "stub for '{}' has no method with ordinal {ordinal}",
                self.name
            ))
        })?;
        let call = RemoteMethodCall::new(self.name.name(), method, args)?;
        match self.mode {
            StubMode::Broadcast => {
                self.router.submit_broadcast(&self.name, call)?;
                Ok(None)
            }
            StubMode::Blocking => {
                // try_current is Ok on spawn_blocking threads too, so a
                // runtime context here does not imply a parked worker.
                if tokio::runtime::Handle::try_current().is_ok() {
                    tracing::debug!(
                        endpoint = %self.name,
                        method = method.name,
                        "blocking remote call inside a runtime context; \
                         the thread is parked until results arrive"
                    );
                }
                let reply = self.router.submit_blocking(&self.name, call);
                reply.recv().map(Some)
            }
        }
    }
}

// Stub identity is the endpoint name: two stubs for the same endpoint are
// the same stub, whichever router produced them.
impl PartialEq for StubHandle {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for StubHandle {}

impl Hash for StubHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for StubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for StubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubHandle")
            .field("name", &self.name.name())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Implemented by every stub type [`remote_interface!`](crate::remote_interface)
/// generates.
pub trait RemoteStub: Sized {
    /// Method table of the interface the stub speaks.
    fn table() -> &'static MethodTable;

    /// Wraps the handle a router hands out.
    fn from_handle(handle: StubHandle) -> Self;
}

/// Type-erased inbound dispatch.
///
/// [`remote_interface!`](crate::remote_interface) implements this for
/// `dyn Trait`, so any implementor of the trait can be registered without
/// writing dispatch glue by hand.
pub trait RemoteDispatch: Send + Sync {
    /// Method table of the interface the implementor serves.
    fn table(&self) -> &'static MethodTable;

    /// Runs one resolved call against the implementor.
    ///
    /// Errors are contract violations found while decoding arguments; the
    /// router folds them into a fault envelope for the caller.
    fn dispatch(&self, call: &ResolvedCall<'_>) -> Result<RemoteMethodCallResults, CallError>;
}

/// Encodes one stub-call argument. Generated stub code calls this.
pub fn encode_arg<T: Serialize>(value: &T) -> Result<CallArg, CallError> {
    CallArg::encode(value)
}

/// The "result" of a fan-out call, which has no reply leg. Decodes JSON
/// `null`, so it succeeds exactly for `()`. Generated stub code calls
/// this.
pub fn null_value<T: DeserializeOwned>() -> Result<T, CallError> {
    serde_json::from_value(serde_json::Value::Null)
        .map_err(|_| CallError::Contract("a fan-out call cannot produce a value".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_value_yields_unit() {
        null_value::<()>().expect("unit decodes from null");
    }

    #[test]
    fn null_value_refuses_real_types() {
        let err = null_value::<bool>().expect_err("bool cannot come from a fan-out");
        assert!(matches!(err, CallError::Contract(_)));
    }
}
