//! In-memory transport for tests, demos and single-process games.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::id::NodeId;
use crate::router::Router;
use crate::transport::Transport;

/// An in-process mesh: every joined node can send frames to every other.
///
/// Delivery goes through unbounded channels, so sends never block and
/// per-peer order is preserved.
#[derive(Clone, Default)]
pub struct MemoryMesh {
    links: Arc<Mutex<HashMap<NodeId, mpsc::UnboundedSender<(NodeId, Vec<u8>)>>>>,
}

impl MemoryMesh {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `node` to the mesh, returning its two halves: the transport
    /// for a router to send through, and the inbox of frames other nodes
    /// send it.
    pub fn join(&self, node: NodeId) -> MemoryNode {
        let (tx, rx) = mpsc::unbounded_channel();
        self.links.lock().insert(node.clone(), tx);
        MemoryNode {
            node: node.clone(),
            link: Arc::new(MemoryLink {
                from: node,
                mesh: self.clone(),
            }),
            inbox: rx,
        }
    }

    /// Severs `node` from the mesh. Its pump task winds down and frames
    /// addressed to it start failing.
    pub fn disconnect(&self, node: &NodeId) {
        self.links.lock().remove(node);
    }
}

/// One node's membership in a [`MemoryMesh`].
pub struct MemoryNode {
    node: NodeId,
    link: Arc<MemoryLink>,
    inbox: mpsc::UnboundedReceiver<(NodeId, Vec<u8>)>,
}

impl MemoryNode {
    /// Identity this node joined under.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The sending half, for constructing a router.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.link.clone()
    }

    /// Spawns a task feeding inbound frames to `router` until the node is
    /// disconnected from the mesh.
    pub fn pump(self, router: Router) -> tokio::task::JoinHandle<()> {
        let mut inbox = self.inbox;
        tokio::spawn(async move {
            while let Some((from, frame)) = inbox.recv().await {
                if let Err(error) = router.handle_frame(&from, &frame).await {
                    tracing::error!(%from, %error, "inbound frame rejected");
                }
            }
        })
    }
}

struct MemoryLink {
    from: NodeId,
    mesh: MemoryMesh,
}

#[async_trait]
impl Transport for MemoryLink {
    async fn send(&self, to: &NodeId, frame: Vec<u8>) -> Result<(), TransportError> {
        let tx = self.mesh.links.lock().get(to).cloned();
        let Some(tx) = tx else {
            return Err(TransportError::NoRoute(to.clone()));
        };
        tx.send((self.from.clone(), frame))
            .map_err(|_| TransportError::Disconnected(to.clone()))
    }
}
