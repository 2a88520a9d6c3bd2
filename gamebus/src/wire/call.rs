//! Calls as they travel: endpoint name, method ordinal, encoded arguments.

use std::fmt;
use std::io::Cursor;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CallError, WireError};
use crate::table::{MethodDesc, MethodTable};
use crate::wire::{
    read_bytes, read_string, read_u8, write_bytes, write_string, write_u8,
};

/// Wire value of the argument-count byte meaning "no argument list".
///
/// A call with no list and a call with an empty list both invoke a
/// zero-argument method, but the two shapes survive the wire distinctly.
const ARGC_NONE: u8 = 0xFF;

/// One encoded argument.
///
/// The payload is self-describing JSON. The optional type hint names the
/// runtime type when it differs from the declared parameter type; calls
/// built by generated stubs always elide it because the two cannot differ
/// there.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    type_hint: Option<String>,
    payload: Vec<u8>,
}

impl CallArg {
    /// Argument whose runtime type matches the declared one.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            type_hint: None,
            payload,
        }
    }

    /// Argument carrying an explicit runtime-type override.
    pub fn with_hint(payload: Vec<u8>, hint: impl Into<String>) -> Self {
        Self {
            type_hint: Some(hint.into()),
            payload,
        }
    }

    /// Encodes `value` as an argument payload.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, CallError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| CallError::Contract(format!("argument is not transmissible: {e}")))?;
        Ok(Self::new(payload))
    }

    /// The runtime-type override, if one was recorded.
    pub fn type_hint(&self) -> Option<&str> {
        self.type_hint.as_deref()
    }

    /// The encoded argument value.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match &self.type_hint {
            Some(hint) => {
                write_u8(buf, 1);
                write_string(buf, hint);
            }
            None => write_u8(buf, 0),
        }
        write_bytes(buf, &self.payload);
    }

    fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let has_hint = read_u8(cur)?;
        let type_hint = match has_hint {
            0 => None,
            1 => Some(read_string(cur)?),
            other => {
                return Err(WireError::Decode(format!(
                    "invalid type-hint marker: {other}"
                )))
            }
        };
        let payload = read_bytes(cur)?;
        Ok(Self { type_hint, payload })
    }
}

/// A single method call, addressed by endpoint name and method ordinal.
///
/// The ordinal stands in for the method name on the wire; it only means
/// something relative to the endpoint's [`MethodTable`], which is why
/// dispatch goes through [`resolve`](Self::resolve) first.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMethodCall {
    remote_name: String,
    ordinal: u8,
    args: Option<Vec<CallArg>>,
}

impl RemoteMethodCall {
    /// Packages a call to `method` on the endpoint `remote_name`.
    ///
    /// Fails with a contract violation when the argument count does not
    /// match the method's declared arity.
    pub fn new(
        remote_name: impl Into<String>,
        method: &MethodDesc,
        args: Option<Vec<CallArg>>,
    ) -> Result<Self, CallError> {
        let count = args.as_ref().map_or(0, Vec::len);
        if count >= usize::from(ARGC_NONE) {
            return Err(CallError::Contract(format!(
                "method '{}' has too many arguments to encode",
                method.name
            )));
        }
        if count != usize::from(method.arity) {
            return Err(CallError::Contract(format!(
                "method '{}' takes {} arguments, got {}",
                method.name, method.arity, count
            )));
        }
        Ok(Self {
            remote_name: remote_name.into(),
            ordinal: method.ordinal,
            args,
        })
    }

    /// Endpoint the call is addressed to.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// Wire ordinal of the target method.
    pub fn ordinal(&self) -> u8 {
        self.ordinal
    }

    /// The encoded arguments, `None` when no list was attached.
    pub fn args(&self) -> Option<&[CallArg]> {
        self.args.as_deref()
    }

    /// Number of arguments, counting a missing list as zero.
    pub fn arg_count(&self) -> usize {
        self.args.as_ref().map_or(0, Vec::len)
    }

    /// Back-fills the method identity from `table`, producing a call that
    /// can be dispatched.
    ///
    /// Fails with a contract violation when the ordinal is not in the
    /// table or the argument count disagrees with the declared arity. The
    /// wire is not trusted to have enforced either.
    pub fn resolve<'a>(&'a self, table: &'static MethodTable) -> Result<ResolvedCall<'a>, CallError> {
        let method = table.by_ordinal(self.ordinal).ok_or_else(|| {
            CallError::Contract(format!(
                "no method with ordinal {} on interface '{}'",
                self.ordinal,
                table.interface()
            ))
        })?;
        if self.arg_count() != usize::from(method.arity) {
            return Err(CallError::Contract(format!(
                "method '{}' takes {} arguments, call carries {}",
                method.name,
                method.arity,
                self.arg_count()
            )));
        }
        Ok(ResolvedCall { call: self, method })
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        write_string(buf, &self.remote_name);
        write_u8(buf, self.ordinal);
        match &self.args {
            None => write_u8(buf, ARGC_NONE),
            Some(list) => {
                write_u8(buf, list.len() as u8);
                for arg in list {
                    arg.encode_into(buf);
                }
            }
        }
    }

    pub(crate) fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let remote_name = read_string(cur)?;
        let ordinal = read_u8(cur)?;
        let argc = read_u8(cur)?;
        let args = if argc == ARGC_NONE {
            None
        } else {
            let mut list = Vec::with_capacity(usize::from(argc));
            for _ in 0..argc {
                list.push(CallArg::decode(cur)?);
            }
            Some(list)
        };
        Ok(Self {
            remote_name,
            ordinal,
            args,
        })
    }
}

impl fmt::Display for RemoteMethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.remote_name, self.ordinal)
    }
}

/// A call whose ordinal has been resolved against a method table.
///
/// Produced on the executing side right before dispatch; gives the
/// generated dispatch code typed access to the arguments.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCall<'a> {
    call: &'a RemoteMethodCall,
    method: &'static MethodDesc,
}

impl ResolvedCall<'_> {
    /// The resolved method.
    pub fn method(&self) -> &'static MethodDesc {
        self.method
    }

    /// Wire ordinal of the method.
    pub fn ordinal(&self) -> u8 {
        self.method.ordinal
    }

    /// Declared name of the method, back-filled from the table.
    pub fn method_name(&self) -> &'static str {
        self.method.name
    }

    /// Number of arguments on the call.
    pub fn arg_count(&self) -> usize {
        self.call.arg_count()
    }

    /// Decodes argument `index` as `T`.
    pub fn decode_arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, CallError> {
        let arg = self
            .call
            .args()
            .and_then(|list| list.get(index))
            .ok_or_else(|| {
                CallError::Contract(format!(
                    "method '{}' has no argument {index}",
                    self.method.name
                ))
            })?;
        serde_json::from_slice(arg.payload()).map_err(|e| {
            CallError::Contract(format!(
                "argument {index} of '{}' failed to decode: {e}",
                self.method.name
            ))
        })
    }
}
