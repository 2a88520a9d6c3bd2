//! The frames routed between hub and spokes.
//!
//! Calls travel hub-ward as [`HubInvoke`] and spoke-ward as
//! [`SpokeInvoke`]; results retrace the path as [`SpokeInvokeResults`]
//! then [`HubInvokeResults`]. The distinction is directional, not
//! structural: a spoke-bound invoke additionally names the node the call
//! originated from, because the receiving spoke never talks to that node
//! directly.

use std::io::Cursor;

use bitflags::bitflags;

use crate::error::WireError;
use crate::id::{CallId, NodeId};
use crate::wire::call::RemoteMethodCall;
use crate::wire::results::RemoteMethodCallResults;
use crate::wire::{read_string, read_u64, read_u8, write_string, write_u64, write_u8};

bitflags! {
    /// Behavior bits carried on every invoke frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InvokeFlags: u8 {
        /// The caller is waiting for a result envelope.
        const NEEDS_RESULT = 0b0000_0001;
    }
}

fn write_call_id(buf: &mut Vec<u8>, id: &CallId) {
    write_string(buf, id.origin().as_str());
    write_u64(buf, id.seq());
}

fn read_call_id(cur: &mut Cursor<&[u8]>) -> Result<CallId, WireError> {
    let origin = read_string(cur)?;
    let seq = read_u64(cur)?;
    Ok(CallId::new(NodeId::new(origin), seq))
}

/// Spoke to hub: execute this call, or forward it to whoever can.
#[derive(Debug, Clone, PartialEq)]
pub struct HubInvoke {
    /// Correlates the eventual results with the caller's pending call.
    pub call_id: CallId,
    /// Behavior bits; fan-out calls clear [`InvokeFlags::NEEDS_RESULT`].
    pub flags: InvokeFlags,
    /// Version of the method table the caller compiled against.
    pub schema_version: u64,
    /// The call itself.
    pub call: RemoteMethodCall,
}

impl HubInvoke {
    /// Packages a call for submission to the hub.
    pub fn new(call_id: CallId, needs_result: bool, schema_version: u64, call: RemoteMethodCall) -> Self {
        let mut flags = InvokeFlags::empty();
        if needs_result {
            flags |= InvokeFlags::NEEDS_RESULT;
        }
        Self {
            call_id,
            flags,
            schema_version,
            call,
        }
    }

    /// Whether the caller is blocked waiting on results.
    pub fn needs_result(&self) -> bool {
        self.flags.contains(InvokeFlags::NEEDS_RESULT)
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        write_call_id(buf, &self.call_id);
        write_u8(buf, self.flags.bits());
        write_u64(buf, self.schema_version);
        self.call.encode_into(buf);
    }

    pub(crate) fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let call_id = read_call_id(cur)?;
        let flags = InvokeFlags::from_bits_truncate(read_u8(cur)?);
        let schema_version = read_u64(cur)?;
        let call = RemoteMethodCall::decode(cur)?;
        Ok(Self {
            call_id,
            flags,
            schema_version,
            call,
        })
    }
}

/// Hub to spoke: a forwarded call, tagged with the node it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SpokeInvoke {
    /// Correlation id minted by the originating node.
    pub call_id: CallId,
    /// Behavior bits, preserved from the originating invoke.
    pub flags: InvokeFlags,
    /// Version of the method table the caller compiled against.
    pub schema_version: u64,
    /// Node whose call this is; becomes the executing side's
    /// [`MessageContext`](crate::MessageContext).
    pub invoker: NodeId,
    /// The call itself.
    pub call: RemoteMethodCall,
}

impl SpokeInvoke {
    /// Builds the spoke-bound forward of `invoke`, preserving its
    /// correlation id and flags.
    pub fn forward(invoke: HubInvoke, invoker: NodeId) -> Self {
        Self {
            call_id: invoke.call_id,
            flags: invoke.flags,
            schema_version: invoke.schema_version,
            invoker,
            call: invoke.call,
        }
    }

    /// Whether the originating caller is blocked waiting on results.
    pub fn needs_result(&self) -> bool {
        self.flags.contains(InvokeFlags::NEEDS_RESULT)
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        write_call_id(buf, &self.call_id);
        write_u8(buf, self.flags.bits());
        write_u64(buf, self.schema_version);
        write_string(buf, self.invoker.as_str());
        self.call.encode_into(buf);
    }

    pub(crate) fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let call_id = read_call_id(cur)?;
        let flags = InvokeFlags::from_bits_truncate(read_u8(cur)?);
        let schema_version = read_u64(cur)?;
        let invoker = NodeId::new(read_string(cur)?);
        let call = RemoteMethodCall::decode(cur)?;
        Ok(Self {
            call_id,
            flags,
            schema_version,
            invoker,
            call,
        })
    }
}

/// Executing spoke to hub: the outcome of a forwarded call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpokeInvokeResults {
    /// Correlation id of the call being answered.
    pub call_id: CallId,
    /// The outcome.
    pub results: RemoteMethodCallResults,
}

impl SpokeInvokeResults {
    /// Answers `invoke` with `results`, preserving the correlation id.
    pub fn answering(invoke: &SpokeInvoke, results: RemoteMethodCallResults) -> Self {
        Self {
            call_id: invoke.call_id.clone(),
            results,
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        write_call_id(buf, &self.call_id);
        self.results.encode_into(buf);
    }

    pub(crate) fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let call_id = read_call_id(cur)?;
        let results = RemoteMethodCallResults::decode(cur)?;
        Ok(Self { call_id, results })
    }
}

/// Hub to the original caller: the outcome of its call.
#[derive(Debug, Clone, PartialEq)]
pub struct HubInvokeResults {
    /// Correlation id of the call being answered.
    pub call_id: CallId,
    /// The outcome.
    pub results: RemoteMethodCallResults,
}

impl HubInvokeResults {
    /// Packages results for relay to the node that issued `call_id`.
    pub fn new(call_id: CallId, results: RemoteMethodCallResults) -> Self {
        Self { call_id, results }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        write_call_id(buf, &self.call_id);
        self.results.encode_into(buf);
    }

    pub(crate) fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let call_id = read_call_id(cur)?;
        let results = RemoteMethodCallResults::decode(cur)?;
        Ok(Self { call_id, results })
    }
}

/// Registry gossip: spokes tell the hub what they host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// The sender now hosts the implementor of an endpoint.
    EndpointRegistered {
        /// Endpoint name.
        name: String,
        /// Method-table version the implementor was built against.
        version: u64,
    },
    /// The sender no longer hosts the implementor of an endpoint.
    EndpointUnregistered {
        /// Endpoint name.
        name: String,
    },
    /// The sender has at least one subscriber on a channel.
    ChannelSubscribed {
        /// Channel name.
        name: String,
        /// Method-table version the subscribers were built against.
        version: u64,
    },
    /// The sender's last subscriber on a channel is gone.
    ChannelUnsubscribed {
        /// Channel name.
        name: String,
    },
}

impl Announcement {
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Announcement::EndpointRegistered { name, version } => {
                write_u8(buf, super::KIND_ENDPOINT_REGISTERED);
                write_string(buf, name);
                write_u64(buf, *version);
            }
            Announcement::EndpointUnregistered { name } => {
                write_u8(buf, super::KIND_ENDPOINT_UNREGISTERED);
                write_string(buf, name);
            }
            Announcement::ChannelSubscribed { name, version } => {
                write_u8(buf, super::KIND_CHANNEL_SUBSCRIBED);
                write_string(buf, name);
                write_u64(buf, *version);
            }
            Announcement::ChannelUnsubscribed { name } => {
                write_u8(buf, super::KIND_CHANNEL_UNSUBSCRIBED);
                write_string(buf, name);
            }
        }
    }

    pub(crate) fn decode(kind: u8, cur: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let name = read_string(cur)?;
        let announcement = match kind {
            super::KIND_ENDPOINT_REGISTERED => Announcement::EndpointRegistered {
                name,
                version: read_u64(cur)?,
            },
            super::KIND_ENDPOINT_UNREGISTERED => Announcement::EndpointUnregistered { name },
            super::KIND_CHANNEL_SUBSCRIBED => Announcement::ChannelSubscribed {
                name,
                version: read_u64(cur)?,
            },
            super::KIND_CHANNEL_UNSUBSCRIBED => Announcement::ChannelUnsubscribed { name },
            other => return Err(WireError::UnknownKind(other)),
        };
        Ok(announcement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteFault;
    use crate::table::MethodDesc;
    use crate::wire::call::CallArg;
    use crate::wire::Frame;

    static CAN_MOVE: MethodDesc = MethodDesc {
        ordinal: 0,
        name: "can_move",
        arity: 1,
        returns_value: true,
    };

    fn sample_call() -> RemoteMethodCall {
        let args = vec![CallArg::encode(&7u32).expect("encode unit id")];
        RemoteMethodCall::new("Delegate_Move", &CAN_MOVE, Some(args)).expect("call")
    }

    fn frame_round_trip(frame: Frame) -> Frame {
        let bytes = frame.encode().expect("encode frame");
        let back = Frame::decode(&bytes).expect("decode frame");
        assert_eq!(back, frame);
        back
    }

    #[test]
    fn hub_invoke_round_trips_through_a_frame() {
        let invoke = HubInvoke::new(
            CallId::new(NodeId::new("spoke-a"), 3),
            true,
            0xDEAD_BEEF,
            sample_call(),
        );
        assert!(invoke.needs_result());
        frame_round_trip(Frame::HubInvoke(invoke));
    }

    #[test]
    fn forwarding_preserves_the_correlation_id_and_flags() {
        let invoke = HubInvoke::new(CallId::new(NodeId::new("spoke-a"), 9), false, 1, sample_call());
        let forwarded = SpokeInvoke::forward(invoke.clone(), NodeId::new("spoke-a"));

        assert_eq!(forwarded.call_id, invoke.call_id);
        assert_eq!(forwarded.flags, invoke.flags);
        assert!(!forwarded.needs_result());
        assert_eq!(forwarded.invoker, NodeId::new("spoke-a"));
        frame_round_trip(Frame::SpokeInvoke(forwarded));
    }

    #[test]
    fn results_answer_with_the_invoke_id() {
        let invoke = HubInvoke::new(CallId::new(NodeId::new("spoke-a"), 4), true, 1, sample_call());
        let forwarded = SpokeInvoke::forward(invoke, NodeId::new("spoke-a"));

        let results = RemoteMethodCallResults::from_value(&false).expect("encode");
        let reply = SpokeInvokeResults::answering(&forwarded, results.clone());
        assert_eq!(reply.call_id, forwarded.call_id);
        frame_round_trip(Frame::SpokeInvokeResults(reply));

        let relay = HubInvokeResults::new(forwarded.call_id.clone(), results);
        frame_round_trip(Frame::HubInvokeResults(relay));
    }

    #[test]
    fn fault_results_survive_the_frame_level() {
        let reply = HubInvokeResults::new(
            CallId::new(NodeId::new("spoke-b"), 1),
            RemoteMethodCallResults::from_fault(RemoteFault::no_such_endpoint("Delegate_Move")),
        );
        frame_round_trip(Frame::HubInvokeResults(reply));
    }

    #[test]
    fn announcements_round_trip() {
        for announcement in [
            Announcement::EndpointRegistered {
                name: "Delegate_Move".to_string(),
                version: 17,
            },
            Announcement::EndpointUnregistered {
                name: "Delegate_Move".to_string(),
            },
            Announcement::ChannelSubscribed {
                name: "game.broadcaster".to_string(),
                version: 17,
            },
            Announcement::ChannelUnsubscribed {
                name: "game.broadcaster".to_string(),
            },
        ] {
            frame_round_trip(Frame::Announce(announcement));
        }
    }

    #[test]
    fn unknown_flag_bits_are_dropped_on_decode() {
        let invoke = HubInvoke::new(CallId::new(NodeId::new("spoke-a"), 2), true, 1, sample_call());
        let mut bytes = Frame::HubInvoke(invoke).encode().expect("encode");

        // The flags byte follows the kind byte and the call id
        // (string origin + u64 seq).
        let flags_at = 1 + 4 + "spoke-a".len() + 8;
        bytes[flags_at] |= 0b1000_0000;

        match Frame::decode(&bytes).expect("decode") {
            Frame::HubInvoke(back) => assert_eq!(back.flags, InvokeFlags::NEEDS_RESULT),
            other => panic!("expected HubInvoke, got {other:?}"),
        }
    }
}
