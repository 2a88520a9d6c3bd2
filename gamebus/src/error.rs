//! Error types for remote invocation and routing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{CallId, NodeId};

/// Classifies a fault raised on the executing side of a call.
///
/// The kind travels inside the result envelope and decides which
/// [`CallError`] variant the caller observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// The target method panicked while executing.
    Execution,
    /// The call itself was malformed: unknown ordinal, argument count or
    /// payload mismatch, or a result that could not be encoded.
    Contract,
    /// The executing node does not host the named endpoint.
    NoSuchEndpoint,
    /// Caller and executor hold different method tables for the endpoint.
    SchemaSkew,
    /// The owning node disconnected before the call could complete.
    Unreachable,
}

/// A failure that occurred on the executing side and was replayed to the
/// caller.
///
/// This is the only error type that crosses the wire. It rides in the fault
/// slot of a result envelope instead of a return value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?} fault: {message}")]
pub struct RemoteFault {
    /// What went wrong, broadly.
    pub kind: FaultKind,
    /// Human-readable detail from the executing node.
    pub message: String,
}

impl RemoteFault {
    /// Creates a fault of the given kind.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Fault for a method body that panicked.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Execution, message)
    }

    /// Fault for a call the executor could not make sense of.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Contract, message)
    }

    /// Fault for an endpoint the executing node does not host.
    pub fn no_such_endpoint(name: &str) -> Self {
        Self::new(
            FaultKind::NoSuchEndpoint,
            format!("no implementor registered for endpoint '{name}'"),
        )
    }
}

/// Errors surfaced to a caller through a stub or a result future.
#[derive(Debug, Error)]
pub enum CallError {
    /// Programming-contract violation on the calling or executing side,
    /// such as an unregistered endpoint or a non-transmissible argument.
    #[error("contract violation: {0}")]
    Contract(String),

    /// The remote method body failed; the original fault is the source.
    #[error("remote invocation failed: {0}")]
    Fault(#[source] RemoteFault),

    /// Caller and executor disagree on the endpoint's method table.
    #[error("method table skew: {0}")]
    SchemaSkew(String),

    /// The target node disconnected or could not be reached.
    #[error("target unreachable: {0}")]
    Unreachable(String),

    /// No result arrived within the configured window.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The pending call was dropped before a result could be delivered.
    #[error("call dropped before completion")]
    Dropped,

    /// Encoding or decoding a frame or payload failed locally.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Handing the frame to the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CallError {
    /// Maps a replayed fault onto the caller-facing taxonomy.
    ///
    /// Unreachable and schema-skew faults surface as their dedicated
    /// variants so callers can tell them apart from method failures.
    pub fn from_fault(fault: RemoteFault) -> Self {
        match fault.kind {
            FaultKind::Execution => CallError::Fault(fault),
            FaultKind::Contract | FaultKind::NoSuchEndpoint => CallError::Contract(fault.message),
            FaultKind::SchemaSkew => CallError::SchemaSkew(fault.message),
            FaultKind::Unreachable => CallError::Unreachable(fault.message),
        }
    }
}

/// Errors from encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The frame bytes do not form a valid message.
    #[error("frame decoding failed: {0}")]
    Decode(String),

    /// The encoded frame exceeds the transport cap.
    #[error("frame too large: {size} bytes (max: {max} bytes)")]
    FrameTooLarge {
        /// Actual encoded size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The leading frame-kind byte is not one we know.
    #[error("unknown frame kind: {0}")]
    UnknownKind(u8),

    /// Reading from the frame buffer failed.
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

// Manual From implementation for io::Error to avoid conflict with
// serde_json::Error.
impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Io(err)
    }
}

/// Errors raised while a router processes frames or registrations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A frame could not be decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The transport refused a frame.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A result frame arrived from a node other than the one the call was
    /// forwarded to. The pending call is left untouched.
    #[error("result for {call_id} arrived from {got}, expected {waiting_on}")]
    UnexpectedResultOrigin {
        /// The call the stray result claimed to answer.
        call_id: CallId,
        /// The node the hub forwarded the call to.
        waiting_on: NodeId,
        /// The node the result actually came from.
        got: NodeId,
    },

    /// A frame arrived that this node's role cannot process.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A local registration or lookup broke the API contract.
    #[error("contract violation: {0}")]
    Contract(String),
}

/// Errors from delivering frames between nodes.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The peer was connected once but is gone now.
    #[error("node disconnected: {0}")]
    Disconnected(NodeId),

    /// No link to the peer exists.
    #[error("no route to node: {0}")]
    NoRoute(NodeId),

    /// The link exists but the send failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}
