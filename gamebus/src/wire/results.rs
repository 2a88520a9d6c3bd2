//! Result envelopes: the value or fault a call produced.

use std::io::Cursor;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CallError, RemoteFault, WireError};
use crate::wire::{read_bytes, read_u8, write_bytes, write_u8};

/// What a completed call produced: a return value or a fault, never both
/// and never neither. The representation makes the other shapes
/// unconstructible.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Value(Vec<u8>),
    Fault(RemoteFault),
}

/// The outcome of one remote method call.
///
/// Void methods still produce an envelope; their value slot holds encoded
/// JSON `null`, which decodes as `()` on the calling side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMethodCallResults {
    outcome: Outcome,
}

impl RemoteMethodCallResults {
    /// Envelope carrying a successful return value.
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self, WireError> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self {
            outcome: Outcome::Value(payload),
        })
    }

    /// Envelope carrying a fault from the executing side.
    pub fn from_fault(fault: RemoteFault) -> Self {
        Self {
            outcome: Outcome::Fault(fault),
        }
    }

    /// True when the call succeeded and a value is present.
    pub fn has_value(&self) -> bool {
        matches!(self.outcome, Outcome::Value(_))
    }

    /// The encoded return value, absent when the call faulted.
    pub fn value_bytes(&self) -> Option<&[u8]> {
        match &self.outcome {
            Outcome::Value(payload) => Some(payload),
            Outcome::Fault(_) => None,
        }
    }

    /// The fault, absent when the call succeeded.
    pub fn fault(&self) -> Option<&RemoteFault> {
        match &self.outcome {
            Outcome::Value(_) => None,
            Outcome::Fault(fault) => Some(fault),
        }
    }

    /// Turns the envelope into what the caller sees: the decoded value, or
    /// the fault mapped onto the caller-facing error taxonomy.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, CallError> {
        match self.outcome {
            Outcome::Value(payload) => {
                serde_json::from_slice(&payload).map_err(|e| CallError::Wire(e.into()))
            }
            Outcome::Fault(fault) => Err(CallError::from_fault(fault)),
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        match &self.outcome {
            Outcome::Value(payload) => {
                write_u8(buf, 1);
                write_bytes(buf, payload);
            }
            Outcome::Fault(fault) => {
                write_u8(buf, 0);
                // Fault serialization cannot fail: RemoteFault is an enum
                // tag and a string.
                let payload = serde_json::to_vec(fault).unwrap_or_default();
                write_bytes(buf, &payload);
            }
        }
    }

    pub(crate) fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let has_value = read_u8(cur)?;
        let payload = read_bytes(cur)?;
        let outcome = match has_value {
            1 => Outcome::Value(payload),
            0 => {
                let fault = serde_json::from_slice(&payload)?;
                Outcome::Fault(fault)
            }
            other => {
                return Err(WireError::Decode(format!(
                    "invalid result marker: {other}"
                )))
            }
        };
        Ok(Self { outcome })
    }
}
