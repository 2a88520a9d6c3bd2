//! Node identity and call correlation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque, comparable identity of one node in the mesh.
///
/// The router never interprets the contents; equality and hashing are all
/// it needs. Embedders typically use a player or connection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps a node name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The node name as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for NodeId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Correlates a call with its eventual result.
///
/// Ids are unique mesh-wide because the originating node is part of the
/// identity and each node numbers its own calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId {
    origin: NodeId,
    seq: u64,
}

impl CallId {
    /// Builds an id from its parts. Normally produced by [`CallIdFactory`];
    /// this constructor exists for the wire codec.
    pub fn new(origin: NodeId, seq: u64) -> Self {
        Self { origin, seq }
    }

    /// Node that issued the call.
    pub fn origin(&self) -> &NodeId {
        &self.origin
    }

    /// Position in the origin's call sequence.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.seq)
    }
}

/// Produces monotonically increasing [`CallId`]s for one node.
#[derive(Debug)]
pub struct CallIdFactory {
    origin: NodeId,
    next: AtomicU64,
}

impl CallIdFactory {
    /// Creates a factory whose ids all carry `origin`.
    pub fn new(origin: NodeId) -> Self {
        Self {
            origin,
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next id in the sequence.
    pub fn next_id(&self) -> CallId {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        CallId::new(self.origin.clone(), seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_ids_are_sequential_and_distinct() {
        let factory = CallIdFactory::new(NodeId::new("host"));
        let first = factory.next_id();
        let second = factory.next_id();
        let third = factory.next_id();

        assert_eq!(first.seq(), 1);
        assert_eq!(second.seq(), 2);
        assert_eq!(third.seq(), 3);
        assert_ne!(first, second);
        assert_eq!(first.origin(), &NodeId::new("host"));
    }

    #[test]
    fn same_sequence_on_different_nodes_does_not_collide() {
        let a = CallIdFactory::new(NodeId::new("alpha")).next_id();
        let b = CallIdFactory::new(NodeId::new("beta")).next_id();

        assert_eq!(a.seq(), b.seq());
        assert_ne!(a, b);
    }

    #[test]
    fn display_includes_origin_and_sequence() {
        let id = CallId::new(NodeId::new("host"), 42);
        assert_eq!(id.to_string(), "host#42");
    }
}
