//! One-to-many channels over the same mesh the call machinery uses.
//!
//! A channel is a [`RemoteName`] whose interface has only void methods.
//! Any node broadcasts into it through a stub; every subscriber on every
//! node hears each broadcast. There is no reply leg, so a broadcast
//! returns as soon as it is submitted.

use std::sync::Arc;

use crate::error::RouterError;
use crate::id::NodeId;
use crate::name::RemoteName;
use crate::router::Router;
use crate::stub::{RemoteDispatch, RemoteStub};

/// Ticket for one channel subscription, used to withdraw it later.
///
/// Ids are unique per router, so the same implementor can subscribe to a
/// channel more than once and each subscription is withdrawn separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

/// The channel surface of a [`Router`], from [`Router::channels`].
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    router: Router,
}

impl ChannelBroadcaster {
    pub(crate) fn new(router: Router) -> Self {
        Self { router }
    }

    /// Identity of the node broadcasts from here are attributed to.
    pub fn local_node(&self) -> &NodeId {
        self.router.local_node()
    }

    /// Builds a broadcasting stub for channel `name`.
    ///
    /// Each method call on the stub fans out to every subscriber in the
    /// mesh. Refused when the interface has value-returning methods or
    /// the stub type does not match the channel's interface.
    pub fn broadcaster<S: RemoteStub>(&self, name: &RemoteName) -> Result<S, RouterError> {
        self.router.broadcast_stub(name)
    }

    /// Attaches `subscriber` to channel `name` on this node.
    ///
    /// Broadcasts submitted after this returns reach the subscriber;
    /// broadcasts from other nodes reach it once the hub has processed
    /// the subscription.
    pub fn subscribe<I>(
        &self,
        name: &RemoteName,
        subscriber: Arc<I>,
    ) -> Result<SubscriptionId, RouterError>
    where
        I: RemoteDispatch + ?Sized + 'static,
    {
        self.router.subscribe_channel(name, subscriber)
    }

    /// Withdraws one subscription. Idempotent; an id that was already
    /// withdrawn is ignored.
    pub fn unsubscribe(&self, name: &RemoteName, id: SubscriptionId) {
        self.router.unsubscribe_channel(name, id);
    }

    /// Whether any subscriber is attached to `name` on this node.
    pub fn has_subscribers(&self, name: &RemoteName) -> bool {
        self.router.has_local_subscribers(name)
    }
}
