//! # Gamebus
//!
//! Hub-and-spoke messaging for keeping game clients in lockstep.
//!
//! Every node runs a [`Router`]. One node is the hub; the rest are
//! spokes that talk only to the hub. On top of that mesh the crate
//! offers two calling styles:
//!
//! - **Remote invocation**: a [`RemoteName`] names the one implementor
//!   of an interface somewhere in the mesh. Callers hold a generated
//!   stub whose methods park until the implementor's answer comes back
//!   (or go through [`Router::invoke`] to await it instead).
//! - **Channel broadcast**: a name whose interface has only void
//!   methods becomes a channel. Broadcasts fan out to every subscriber
//!   on every node and return as soon as they are submitted.
//!
//! Interfaces are declared once with [`remote_interface!`], which
//! generates the caller stub, the inbound dispatch glue, and a versioned
//! method table that both sides check before a call crosses the wire.
//!
//! ## Quick start
//!
//! Two routers over an in-process mesh, with the hub hosting the
//! implementor:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gamebus::{remote_interface, MemoryMesh, RemoteName, Router, RouterConfig};
//!
//! remote_interface! {
//!     /// Move phase of a turn.
//!     pub trait MoveDelegate (stub MoveDelegateStub, table MOVE_DELEGATE_TABLE) {
//!         0 => fn can_move(from: u32, to: u32) -> bool;
//!         1 => fn end_turn();
//!     }
//! }
//!
//! struct Rules;
//!
//! impl MoveDelegate for Rules {
//!     fn can_move(&self, from: u32, to: u32) -> bool {
//!         from != to
//!     }
//!     fn end_turn(&self) {}
//! }
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mesh = MemoryMesh::new();
//!     let host = mesh.join("host".into());
//!     let player = mesh.join("player".into());
//!
//!     let hub = Router::hub("host".into(), host.transport(), RouterConfig::default());
//!     let spoke = Router::spoke(
//!         "player".into(),
//!         "host".into(),
//!         player.transport(),
//!         RouterConfig::default(),
//!     );
//!     host.pump(hub.clone());
//!     player.pump(spoke.clone());
//!
//!     let name = RemoteName::new("game.move", &MOVE_DELEGATE_TABLE);
//!     hub.register_remote(&name, Arc::new(Rules) as Arc<dyn MoveDelegate>)?;
//!
//!     // Stub methods park the calling thread, so keep them off the runtime.
//!     let stub: MoveDelegateStub = spoke.remote_stub(&name)?;
//!     let allowed = tokio::task::spawn_blocking(move || stub.can_move(3, 4)).await??;
//!     assert!(allowed);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// One-to-many channels and subscription handling.
pub mod broadcast;

/// Caller identity, visible to implementors during a dispatch.
pub mod context;

/// Error types for calls, routing, and the wire.
pub mod error;

/// Node and call identifiers.
pub mod id;

/// In-process transport for tests and single-machine games.
pub mod memory;

/// Endpoint names and the tables bound to them.
pub mod name;

/// Completion handles for outstanding calls.
pub mod pending;

/// The router core: registries, forwarding, and reply matching.
pub mod router;

/// Stub and dispatch seams the generated code plugs into.
pub mod stub;

/// Method tables and their versioning.
pub mod table;

/// The outbound byte-pushing seam.
pub mod transport;

/// Frame encoding for everything that crosses the mesh.
pub mod wire;

mod macros;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Channel exports
pub use broadcast::{ChannelBroadcaster, SubscriptionId};

// Context exports
pub use context::MessageContext;

// Error exports
pub use error::{CallError, FaultKind, RemoteFault, RouterError, TransportError, WireError};

// Identity exports
pub use id::{CallId, NodeId};

// In-process mesh exports
pub use memory::{MemoryMesh, MemoryNode};

// Naming exports
pub use name::RemoteName;

// Completion exports
pub use pending::ResultFuture;

// Router exports
pub use router::{Router, RouterConfig};

// Stub and dispatch exports
pub use stub::{RemoteDispatch, RemoteStub, StubHandle, StubMode};

// Method table exports
pub use table::{MethodDesc, MethodTable};

// Transport exports
pub use transport::Transport;

// Wire exports
pub use wire::call::{CallArg, RemoteMethodCall, ResolvedCall};
pub use wire::results::RemoteMethodCallResults;
