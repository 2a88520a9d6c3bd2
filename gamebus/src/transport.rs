//! The seam between routing and frame delivery.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::id::NodeId;

/// Point-to-point, addressed delivery of whole frames between nodes.
///
/// The router hands frames down pre-encoded and expects the embedder to
/// feed inbound frames back through
/// [`Router::handle_frame`](crate::Router::handle_frame). Implementations
/// decide what a link is; [`MemoryMesh`](crate::MemoryMesh) wires nodes
/// together in process, a real deployment would put a socket here.
///
/// Per-peer frame order must be preserved: two frames sent to the same
/// node arrive in the order they were sent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one encoded frame to `to`.
    async fn send(&self, to: &NodeId, frame: Vec<u8>) -> Result<(), TransportError>;
}
