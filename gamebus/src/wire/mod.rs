//! Binary wire protocol for hub/spoke traffic.
//!
//! The transport delivers whole frames; this module defines what is inside
//! them. All integers are little-endian. A `string` is a u32 length
//! followed by UTF-8 bytes; a byte blob is a u32 length followed by raw
//! bytes. Every frame starts with one kind byte:
//!
//! | kind | frame |
//! |------|-------|
//! | 1 | [`HubInvoke`](invoke::HubInvoke): spoke asks the hub to execute or forward a call |
//! | 2 | [`SpokeInvoke`](invoke::SpokeInvoke): hub forwards a call to the owning or listening spoke |
//! | 3 | [`SpokeInvokeResults`](invoke::SpokeInvokeResults): executor answers the hub |
//! | 4 | [`HubInvokeResults`](invoke::HubInvokeResults): hub relays the answer to the caller |
//! | 5..8 | [`Announcement`](invoke::Announcement): registry gossip |

pub mod call;
pub mod invoke;
pub mod results;

use std::io::{Cursor, Read};

use crate::error::WireError;

/// Maximum encoded frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const KIND_HUB_INVOKE: u8 = 1;
const KIND_SPOKE_INVOKE: u8 = 2;
const KIND_SPOKE_INVOKE_RESULTS: u8 = 3;
const KIND_HUB_INVOKE_RESULTS: u8 = 4;
const KIND_ENDPOINT_REGISTERED: u8 = 5;
const KIND_ENDPOINT_UNREGISTERED: u8 = 6;
const KIND_CHANNEL_SUBSCRIBED: u8 = 7;
const KIND_CHANNEL_UNSUBSCRIBED: u8 = 8;

/// Everything that travels between nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A spoke submits a call to the hub.
    HubInvoke(invoke::HubInvoke),
    /// The hub forwards a call to a spoke.
    SpokeInvoke(invoke::SpokeInvoke),
    /// The executing spoke answers the hub.
    SpokeInvokeResults(invoke::SpokeInvokeResults),
    /// The hub relays results to the original caller.
    HubInvokeResults(invoke::HubInvokeResults),
    /// A spoke tells the hub about a local registration change.
    Announce(invoke::Announcement),
}

impl Frame {
    /// Encodes the frame, refusing anything over [`MAX_FRAME_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        match self {
            Frame::HubInvoke(m) => {
                write_u8(&mut buf, KIND_HUB_INVOKE);
                m.encode_into(&mut buf);
            }
            Frame::SpokeInvoke(m) => {
                write_u8(&mut buf, KIND_SPOKE_INVOKE);
                m.encode_into(&mut buf);
            }
            Frame::SpokeInvokeResults(m) => {
                write_u8(&mut buf, KIND_SPOKE_INVOKE_RESULTS);
                m.encode_into(&mut buf);
            }
            Frame::HubInvokeResults(m) => {
                write_u8(&mut buf, KIND_HUB_INVOKE_RESULTS);
                m.encode_into(&mut buf);
            }
            Frame::Announce(m) => m.encode_into(&mut buf),
        }
        if buf.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                size: buf.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(buf)
    }

    /// Decodes one frame, rejecting unknown kinds and trailing bytes.
    pub fn decode(data: &[u8]) -> Result<Frame, WireError> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                size: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let mut cur = Cursor::new(data);
        let kind = read_u8(&mut cur)?;
        let frame = match kind {
            KIND_HUB_INVOKE => Frame::HubInvoke(invoke::HubInvoke::decode(&mut cur)?),
            KIND_SPOKE_INVOKE => Frame::SpokeInvoke(invoke::SpokeInvoke::decode(&mut cur)?),
            KIND_SPOKE_INVOKE_RESULTS => {
                Frame::SpokeInvokeResults(invoke::SpokeInvokeResults::decode(&mut cur)?)
            }
            KIND_HUB_INVOKE_RESULTS => {
                Frame::HubInvokeResults(invoke::HubInvokeResults::decode(&mut cur)?)
            }
            KIND_ENDPOINT_REGISTERED
            | KIND_ENDPOINT_UNREGISTERED
            | KIND_CHANNEL_SUBSCRIBED
            | KIND_CHANNEL_UNSUBSCRIBED => {
                Frame::Announce(invoke::Announcement::decode(kind, &mut cur)?)
            }
            other => return Err(WireError::UnknownKind(other)),
        };
        if cur.position() as usize != data.len() {
            return Err(WireError::Decode(format!(
                "{} trailing bytes after frame",
                data.len() - cur.position() as usize
            )));
        }
        Ok(frame)
    }
}

pub(crate) fn write_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub(crate) fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    write_u32(buf, value.len() as u32);
    buf.extend_from_slice(value);
}

pub(crate) fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_bytes(buf, value.as_bytes());
}

pub(crate) fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8, WireError> {
    let mut byte = [0u8; 1];
    cur.read_exact(&mut byte)?;
    Ok(byte[0])
}

pub(crate) fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, WireError> {
    let mut bytes = [0u8; 4];
    cur.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn read_u64(cur: &mut Cursor<&[u8]>) -> Result<u64, WireError> {
    let mut bytes = [0u8; 8];
    cur.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

pub(crate) fn read_bytes(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>, WireError> {
    let len = read_u32(cur)? as usize;
    let remaining = cur.get_ref().len() - cur.position() as usize;
    if len > remaining {
        return Err(WireError::Decode(format!(
            "length prefix {len} exceeds {remaining} remaining bytes"
        )));
    }
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)?;
    Ok(bytes)
}

pub(crate) fn read_string(cur: &mut Cursor<&[u8]>) -> Result<String, WireError> {
    let bytes = read_bytes(cur)?;
    String::from_utf8(bytes).map_err(|e| WireError::Decode(format!("invalid UTF-8: {e}")))
}
