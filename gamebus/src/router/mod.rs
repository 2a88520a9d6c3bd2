//! The router: registries, hub/spoke forwarding, and reply matching.

mod hub;
mod local;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::broadcast::{ChannelBroadcaster, SubscriptionId};
use crate::error::{CallError, FaultKind, RemoteFault, RouterError, TransportError, WireError};
use crate::id::{CallId, CallIdFactory, NodeId};
use crate::name::RemoteName;
use crate::pending::{BlockingReply, PendingCalls, ResultFuture};
use crate::stub::{RemoteDispatch, RemoteStub, StubHandle, StubMode};
use crate::transport::Transport;
use crate::wire::call::{RemoteMethodCall, ResolvedCall};
use crate::wire::invoke::{
    Announcement, HubInvoke, HubInvokeResults, SpokeInvoke, SpokeInvokeResults,
};
use crate::wire::results::RemoteMethodCallResults;
use crate::wire::Frame;

use self::hub::{HubState, InFlight};
use self::local::{LocalRegistry, Registration, Subscriber};

/// Tunables for a router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// How long a call may stay unanswered before it fails with
    /// [`CallError::Timeout`].
    pub call_timeout: Duration,
}

impl RouterConfig {
    /// Config differing from the default only in the call timeout.
    pub fn with_timeout(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }
}

impl Default for RouterConfig {
    /// Thirty seconds, generous enough for a human-paced game turn.
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
        }
    }
}

enum Role {
    Hub(HubState),
    Spoke { hub: NodeId },
}

struct Outbound {
    to: NodeId,
    bytes: Vec<u8>,
    on_fail: Option<Box<dyn FnOnce(TransportError) + Send>>,
}

struct BroadcastJob {
    subscribers: Vec<Subscriber>,
    invoker: NodeId,
    version: u64,
    call: RemoteMethodCall,
}

/// One node's message router.
///
/// A mesh has exactly one hub router; every other node runs a spoke
/// router that talks only to the hub. Cloning is cheap and every clone
/// drives the same node.
///
/// The router does not own a connection. The embedder wires it to a
/// [`Transport`] for outbound frames and feeds inbound frames to
/// [`handle_frame`](Self::handle_frame); [`MemoryMesh`](crate::MemoryMesh)
/// shows the shape of that loop.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    node: NodeId,
    role: Role,
    local: Mutex<LocalRegistry>,
    pending: PendingCalls,
    call_ids: CallIdFactory,
    subscription_ids: AtomicU64,
    config: RouterConfig,
    runtime: Handle,
    outbox: mpsc::UnboundedSender<Outbound>,
    broadcasts: mpsc::UnboundedSender<BroadcastJob>,
}

impl Router {
    /// Creates the hub router for a mesh.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the router drives its
    /// timers and delivery tasks through the runtime it is created on.
    pub fn hub(node: NodeId, transport: Arc<dyn Transport>, config: RouterConfig) -> Self {
        Self::new(node, Role::Hub(HubState::default()), transport, config)
    }

    /// Creates a spoke router attached to `hub`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, as [`Router::hub`]
    /// does.
    pub fn spoke(
        node: NodeId,
        hub: NodeId,
        transport: Arc<dyn Transport>,
        config: RouterConfig,
    ) -> Self {
        Self::new(node, Role::Spoke { hub }, transport, config)
    }

    fn new(
        node: NodeId,
        role: Role,
        transport: Arc<dyn Transport>,
        config: RouterConfig,
    ) -> Self {
        let runtime = Handle::current();

        // All sends funnel through one task so that frames to any given
        // peer leave in submission order.
        let (outbox, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        runtime.spawn(async move {
            while let Some(out) = outbound_rx.recv().await {
                if let Err(error) = transport.send(&out.to, out.bytes).await {
                    match out.on_fail {
                        Some(on_fail) => on_fail(error),
                        None => tracing::warn!(to = %out.to, %error, "failed to deliver frame"),
                    }
                }
            }
        });

        // Channel fan-outs are dispatched one job at a time so each local
        // subscriber observes broadcasts in arrival order.
        let (broadcasts, mut broadcast_rx) = mpsc::unbounded_channel::<BroadcastJob>();
        runtime.spawn(async move {
            while let Some(job) = broadcast_rx.recv().await {
                let mut handles = Vec::with_capacity(job.subscribers.len());
                for subscriber in job.subscribers {
                    let invoker = job.invoker.clone();
                    let call = job.call.clone();
                    let version = job.version;
                    handles.push(tokio::task::spawn_blocking(move || {
                        let results = local::execute(&subscriber.target, version, &invoker, &call);
                        if let Some(fault) = results.fault() {
                            tracing::warn!(
                                channel = call.remote_name(),
                                %fault,
                                "channel dispatch faulted"
                            );
                        }
                    }));
                }
                for handle in handles {
                    if handle.await.is_err() {
                        tracing::error!("channel dispatch task aborted");
                    }
                }
            }
        });

        Self {
            inner: Arc::new(RouterInner {
                node: node.clone(),
                role,
                local: Mutex::new(LocalRegistry::default()),
                pending: PendingCalls::new(),
                call_ids: CallIdFactory::new(node),
                subscription_ids: AtomicU64::new(1),
                config,
                runtime,
                outbox,
                broadcasts,
            }),
        }
    }

    /// Identity of the node this router drives.
    pub fn local_node(&self) -> &NodeId {
        &self.inner.node
    }

    /// Whether this router is the mesh's hub.
    pub fn is_hub(&self) -> bool {
        matches!(self.inner.role, Role::Hub(_))
    }

    /// The channel (one-to-many) surface of this router.
    pub fn channels(&self) -> ChannelBroadcaster {
        ChannelBroadcaster::new(self.clone())
    }

    /// Registers `implementor` as this node's implementor of `name`.
    ///
    /// At most one implementor per name exists on a node, and at most one
    /// node in the mesh owns a name at a time. Local dispatches issued
    /// after this returns reach the implementor; remote callers reach it
    /// once the hub has processed the registration.
    pub fn register_remote<I>(&self, name: &RemoteName, implementor: Arc<I>) -> Result<(), RouterError>
    where
        I: RemoteDispatch + ?Sized + 'static,
    {
        let table = name.schema();
        if implementor.table().version() != table.version() {
            return Err(RouterError::Contract(format!(
                "implementor's method table does not match endpoint '{name}'"
            )));
        }
        let registration = Registration {
            table,
            invoke: Arc::new(move |call: &ResolvedCall<'_>| implementor.dispatch(call)),
        };
        // Local registration gets first say; a refused duplicate must
        // leave the hub's owner record exactly as it was.
        self.inner
            .local
            .lock()
            .register_endpoint(name.name(), registration)?;
        if let Role::Hub(hub) = &self.inner.role {
            if let Err(existing) =
                hub.record_owner(name.name(), self.inner.node.clone(), table.version())
            {
                self.inner.local.lock().unregister_endpoint(name.name());
                return Err(RouterError::Contract(format!(
                    "endpoint '{name}' is already owned by '{existing}'"
                )));
            }
        }
        tracing::debug!(node = %self.inner.node, endpoint = %name, "registered implementor");
        if let Role::Spoke { hub } = &self.inner.role {
            self.announce(
                hub.clone(),
                Announcement::EndpointRegistered {
                    name: name.name().to_string(),
                    version: table.version(),
                },
            );
        }
        Ok(())
    }

    /// Withdraws this node's implementor of `name`. Idempotent.
    ///
    /// Dispatches already executing run to completion; no new ones start.
    pub fn unregister_remote(&self, name: &RemoteName) {
        let removed = self.inner.local.lock().unregister_endpoint(name.name());
        if !removed {
            return;
        }
        tracing::debug!(node = %self.inner.node, endpoint = %name, "unregistered implementor");
        match &self.inner.role {
            Role::Hub(hub) => hub.clear_owner(name.name(), &self.inner.node),
            Role::Spoke { hub } => self.announce(
                hub.clone(),
                Announcement::EndpointUnregistered {
                    name: name.name().to_string(),
                },
            ),
        }
    }

    /// Builds a caller stub for `name`.
    ///
    /// The stub type must have been generated from the same interface the
    /// name is bound to; anything else is refused.
    pub fn remote_stub<S: RemoteStub>(&self, name: &RemoteName) -> Result<S, RouterError> {
        if S::table().version() != name.schema().version() {
            return Err(RouterError::Contract(format!(
                "stub table '{}' does not match endpoint '{name}'",
                S::table().interface()
            )));
        }
        Ok(S::from_handle(StubHandle::new(
            name.clone(),
            StubMode::Blocking,
            self.clone(),
        )))
    }

    /// Whether this node hosts the implementor of `name`.
    pub fn has_local_implementor(&self, name: &RemoteName) -> bool {
        self.inner.local.lock().has_endpoint(name.name())
    }

    /// Whether any local subscriber is attached to channel `name`.
    pub fn has_local_subscribers(&self, name: &RemoteName) -> bool {
        self.inner.local.lock().has_subscribers(name.name())
    }

    /// Starts a call and returns its completion as a future.
    ///
    /// This is the async face of the machinery stubs use; every failure
    /// mode, including submission failures, arrives through the future.
    pub fn invoke(&self, name: &RemoteName, call: RemoteMethodCall) -> ResultFuture {
        let id = self.inner.call_ids.next_id();
        let future = self.inner.pending.register(id.clone());
        self.start_call(id, name, call);
        future
    }

    pub(crate) fn submit_blocking(&self, name: &RemoteName, call: RemoteMethodCall) -> BlockingReply {
        let id = self.inner.call_ids.next_id();
        let reply = self.inner.pending.register_blocking(id.clone());
        self.start_call(id, name, call);
        reply
    }

    pub(crate) fn submit_broadcast(
        &self,
        name: &RemoteName,
        call: RemoteMethodCall,
    ) -> Result<(), CallError> {
        let version = name.schema().version();
        let invoke = HubInvoke::new(self.inner.call_ids.next_id(), false, version, call);
        match &self.inner.role {
            Role::Spoke { hub } => {
                self.dispatch_subscribers(self.inner.node.clone(), version, &invoke.call);
                self.queue_frame(hub.clone(), &Frame::HubInvoke(invoke), None)
                    .map_err(CallError::from)?;
            }
            Role::Hub(hub_state) => {
                self.hub_fan_out(hub_state, self.inner.node.clone(), invoke);
            }
        }
        Ok(())
    }

    pub(crate) fn subscribe_channel<I>(
        &self,
        name: &RemoteName,
        subscriber: Arc<I>,
    ) -> Result<SubscriptionId, RouterError>
    where
        I: RemoteDispatch + ?Sized + 'static,
    {
        let table = name.schema();
        if !table.broadcast_eligible() {
            return Err(RouterError::Contract(format!(
                "channel '{name}' is backed by an interface with value-returning methods"
            )));
        }
        if subscriber.table().version() != table.version() {
            return Err(RouterError::Contract(format!(
                "subscriber's method table does not match channel '{name}'"
            )));
        }
        let id = SubscriptionId::new(self.inner.subscription_ids.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber {
            id,
            target: Registration {
                table,
                invoke: Arc::new(move |call: &ResolvedCall<'_>| subscriber.dispatch(call)),
            },
        };
        let first = self.inner.local.lock().subscribe(name.name(), subscriber);
        tracing::debug!(node = %self.inner.node, channel = %name, ?id, "subscribed");
        if first {
            if let Role::Spoke { hub } = &self.inner.role {
                self.announce(
                    hub.clone(),
                    Announcement::ChannelSubscribed {
                        name: name.name().to_string(),
                        version: table.version(),
                    },
                );
            }
        }
        Ok(id)
    }

    pub(crate) fn unsubscribe_channel(&self, name: &RemoteName, id: SubscriptionId) {
        let (removed, emptied) = self.inner.local.lock().unsubscribe(name.name(), id);
        if !removed {
            return;
        }
        tracing::debug!(node = %self.inner.node, channel = %name, ?id, "unsubscribed");
        if emptied {
            if let Role::Spoke { hub } = &self.inner.role {
                self.announce(
                    hub.clone(),
                    Announcement::ChannelUnsubscribed {
                        name: name.name().to_string(),
                    },
                );
            }
        }
    }

    pub(crate) fn broadcast_stub<S: RemoteStub>(&self, name: &RemoteName) -> Result<S, RouterError> {
        let table = name.schema();
        if !table.broadcast_eligible() {
            return Err(RouterError::Contract(format!(
                "channel '{name}' is backed by an interface with value-returning methods"
            )));
        }
        if S::table().version() != table.version() {
            return Err(RouterError::Contract(format!(
                "stub table '{}' does not match channel '{name}'",
                S::table().interface()
            )));
        }
        Ok(S::from_handle(StubHandle::new(
            name.clone(),
            StubMode::Broadcast,
            self.clone(),
        )))
    }

    /// Feeds one inbound frame to the router.
    ///
    /// `from` is the transport-level peer the frame arrived from; the
    /// router checks it against what the frame claims before acting.
    pub async fn handle_frame(&self, from: &NodeId, frame: &[u8]) -> Result<(), RouterError> {
        match Frame::decode(frame)? {
            Frame::HubInvoke(invoke) => self.on_hub_invoke(from, invoke),
            Frame::SpokeInvoke(invoke) => self.on_spoke_invoke(from, invoke),
            Frame::SpokeInvokeResults(results) => self.on_spoke_results(from, results),
            Frame::HubInvokeResults(results) => self.on_hub_results(from, results),
            Frame::Announce(announcement) => self.on_announce(from, announcement),
        }
    }

    /// Tells the router a node dropped off the mesh.
    ///
    /// On the hub this forgets everything the node hosted and fails the
    /// in-flight calls it was executing, toward their callers. On a
    /// spoke, losing the hub fails every call that was forwarded to it;
    /// calls dispatching against a local implementor run to completion.
    pub fn handle_disconnect(&self, node: &NodeId) {
        match &self.inner.role {
            Role::Hub(hub) => {
                let orphaned = hub.prune(node);
                if !orphaned.is_empty() {
                    tracing::info!(
                        %node,
                        calls = orphaned.len(),
                        "failing calls the disconnected node was executing"
                    );
                }
                for (call_id, record) in orphaned {
                    let fault = RemoteFault::new(
                        FaultKind::Unreachable,
                        format!(
                            "node '{node}' disconnected while executing a call on '{}'",
                            record.invoke.call.remote_name()
                        ),
                    );
                    self.deliver_results(
                        record.caller,
                        call_id,
                        RemoteMethodCallResults::from_fault(fault),
                    );
                }
            }
            Role::Spoke { hub } => {
                if node == hub {
                    tracing::warn!(node = %self.inner.node, "hub disconnected; failing forwarded calls");
                    self.inner
                        .pending
                        .fail_forwarded(|| CallError::Unreachable("hub disconnected".to_string()));
                }
            }
        }
    }

    fn start_call(&self, id: CallId, name: &RemoteName, call: RemoteMethodCall) {
        self.arm_timeout(id.clone());
        // A local implementor short-circuits the hub hop entirely.
        if let Some(registration) = self.inner.local.lock().endpoint(name.name()) {
            let version = name.schema().version();
            let invoker = self.inner.node.clone();
            let pending = self.inner.pending.clone();
            self.inner.runtime.spawn_blocking(move || {
                let results = local::execute(&registration, version, &invoker, &call);
                if !pending.complete(&id, Ok(results)) {
                    tracing::debug!(call_id = %id, "local call completed after its waiter left");
                }
            });
            return;
        }
        // Past the bypass the call leaves this node; a lost hub must fail
        // exactly these.
        self.inner.pending.mark_forwarded(&id);
        let invoke = HubInvoke::new(id.clone(), true, name.schema().version(), call);
        match &self.inner.role {
            Role::Spoke { hub } => {
                self.queue_call_frame(hub.clone(), &Frame::HubInvoke(invoke), id);
            }
            Role::Hub(hub_state) => {
                self.hub_route_call(hub_state, self.inner.node.clone(), invoke);
            }
        }
    }

    fn arm_timeout(&self, id: CallId) {
        let pending = self.inner.pending.clone();
        let timeout = self.inner.config.call_timeout;
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if pending.complete(&id, Err(CallError::Timeout(timeout))) {
                tracing::warn!(call_id = %id, ?timeout, "call timed out");
            }
        });
    }

    fn on_hub_invoke(&self, from: &NodeId, invoke: HubInvoke) -> Result<(), RouterError> {
        let Role::Hub(hub) = &self.inner.role else {
            return Err(RouterError::Protocol(format!(
                "hub-bound invoke received by spoke '{}'",
                self.inner.node
            )));
        };
        if invoke.needs_result() {
            self.hub_route_call(hub, from.clone(), invoke);
        } else {
            self.hub_fan_out(hub, from.clone(), invoke);
        }
        Ok(())
    }

    /// Routes a call on the hub: execute here, forward to the owner, or
    /// answer with a fault when no one can take it.
    fn hub_route_call(&self, hub: &HubState, origin: NodeId, invoke: HubInvoke) {
        let name = invoke.call.remote_name().to_string();
        if let Some(registration) = self.inner.local.lock().endpoint(&name) {
            let router = self.clone();
            let call_id = invoke.call_id.clone();
            let version = invoke.schema_version;
            self.inner.runtime.spawn_blocking(move || {
                let results = local::execute(&registration, version, &origin, &invoke.call);
                router.deliver_results(origin, call_id, results);
            });
            return;
        }
        match hub.owner(&name) {
            None => self.deliver_results(
                origin,
                invoke.call_id.clone(),
                RemoteMethodCallResults::from_fault(RemoteFault::no_such_endpoint(&name)),
            ),
            Some((_, owner_version)) if owner_version != invoke.schema_version => {
                self.deliver_results(
                    origin,
                    invoke.call_id.clone(),
                    RemoteMethodCallResults::from_fault(RemoteFault::new(
                        FaultKind::SchemaSkew,
                        format!(
                            "caller's table for '{name}' has version {:#018x}, \
                             the owner registered {:#018x}",
                            invoke.schema_version, owner_version
                        ),
                    )),
                );
            }
            Some((owner, _)) => {
                let call_id = invoke.call_id.clone();
                hub.begin(
                    call_id.clone(),
                    InFlight {
                        waiting_on: owner.clone(),
                        caller: origin.clone(),
                        invoke: invoke.clone(),
                    },
                );
                let forward = SpokeInvoke::forward(invoke, origin);
                let router = self.clone();
                let fail_id = call_id.clone();
                let fail_on = owner.clone();
                let queued = self.queue_frame(
                    owner.clone(),
                    &Frame::SpokeInvoke(forward),
                    Some(Box::new(move |error| {
                        router.abort_forward(&fail_id, &fail_on, error.to_string());
                    })),
                );
                if let Err(error) = queued {
                    self.abort_forward(&call_id, &owner, error.to_string());
                }
            }
        }
    }

    /// Fans a fire-and-forget call out: local subscribers plus every
    /// listening node except the one it came from, which already ran its
    /// own subscribers.
    fn hub_fan_out(&self, hub: &HubState, origin: NodeId, invoke: HubInvoke) {
        self.dispatch_subscribers(origin.clone(), invoke.schema_version, &invoke.call);
        for listener in hub.listeners(invoke.call.remote_name()) {
            if listener == origin {
                continue;
            }
            let forward = SpokeInvoke::forward(invoke.clone(), origin.clone());
            if let Err(error) = self.queue_frame(listener, &Frame::SpokeInvoke(forward), None) {
                tracing::error!(%error, "failed to encode fan-out frame");
                break;
            }
        }
    }

    fn on_spoke_invoke(&self, from: &NodeId, invoke: SpokeInvoke) -> Result<(), RouterError> {
        let hub = match &self.inner.role {
            Role::Hub(_) => {
                return Err(RouterError::Protocol(
                    "spoke-bound invoke received by the hub".to_string(),
                ))
            }
            Role::Spoke { hub } => {
                if from != hub {
                    return Err(RouterError::Protocol(format!(
                        "spoke-bound invoke from '{from}', which is not the hub"
                    )));
                }
                hub.clone()
            }
        };
        if !invoke.needs_result() {
            self.dispatch_subscribers(invoke.invoker.clone(), invoke.schema_version, &invoke.call);
            return Ok(());
        }
        let name = invoke.call.remote_name().to_string();
        let Some(registration) = self.inner.local.lock().endpoint(&name) else {
            // Answer with a fault rather than leaving the caller hanging
            // until its timeout.
            let reply = SpokeInvokeResults::answering(
                &invoke,
                RemoteMethodCallResults::from_fault(RemoteFault::no_such_endpoint(&name)),
            );
            return self
                .queue_frame(hub, &Frame::SpokeInvokeResults(reply), None)
                .map_err(RouterError::from);
        };
        let router = self.clone();
        self.inner.runtime.spawn_blocking(move || {
            let results =
                local::execute(&registration, invoke.schema_version, &invoke.invoker, &invoke.call);
            let reply = SpokeInvokeResults::answering(&invoke, results);
            if let Err(error) = router.queue_frame(hub, &Frame::SpokeInvokeResults(reply), None) {
                tracing::error!(%error, "failed to encode results for the hub");
            }
        });
        Ok(())
    }

    fn on_spoke_results(&self, from: &NodeId, results: SpokeInvokeResults) -> Result<(), RouterError> {
        let Role::Hub(hub) = &self.inner.role else {
            return Err(RouterError::Protocol(format!(
                "executor results received by spoke '{}'",
                self.inner.node
            )));
        };
        match hub.take_answered(&results.call_id, from) {
            Err(error) => {
                tracing::error!(%error, "discarding results from the wrong node");
                Err(error)
            }
            Ok(None) => {
                tracing::debug!(
                    call_id = %results.call_id,
                    "results for a call no longer in flight, likely answered late"
                );
                Ok(())
            }
            Ok(Some(record)) => {
                self.deliver_results(record.caller, results.call_id, results.results);
                Ok(())
            }
        }
    }

    fn on_hub_results(&self, from: &NodeId, results: HubInvokeResults) -> Result<(), RouterError> {
        match &self.inner.role {
            Role::Hub(_) => {
                return Err(RouterError::Protocol(
                    "relayed results received by the hub".to_string(),
                ))
            }
            Role::Spoke { hub } => {
                if from != hub {
                    return Err(RouterError::Protocol(format!(
                        "results relayed by '{from}', which is not the hub"
                    )));
                }
            }
        }
        if !self.inner.pending.complete(&results.call_id, Ok(results.results)) {
            tracing::debug!(
                call_id = %results.call_id,
                "results arrived after the call stopped waiting"
            );
        }
        Ok(())
    }

    fn on_announce(&self, from: &NodeId, announcement: Announcement) -> Result<(), RouterError> {
        let Role::Hub(hub) = &self.inner.role else {
            return Err(RouterError::Protocol(format!(
                "registry announcement received by spoke '{}'",
                self.inner.node
            )));
        };
        match announcement {
            Announcement::EndpointRegistered { name, version } => {
                if let Err(existing) = hub.record_owner(&name, from.clone(), version) {
                    tracing::warn!(
                        endpoint = %name,
                        claimed_by = %from,
                        owned_by = %existing,
                        "ignoring claim on an endpoint that already has an owner"
                    );
                }
            }
            Announcement::EndpointUnregistered { name } => hub.clear_owner(&name, from),
            Announcement::ChannelSubscribed { name, version: _ } => {
                hub.add_listener(&name, from.clone());
            }
            Announcement::ChannelUnsubscribed { name } => hub.remove_listener(&name, from),
        }
        Ok(())
    }

    /// Hands results to their caller: completes the local pending call
    /// when the caller is this node, relays them otherwise.
    fn deliver_results(&self, caller: NodeId, call_id: CallId, results: RemoteMethodCallResults) {
        if caller == self.inner.node {
            if !self.inner.pending.complete(&call_id, Ok(results)) {
                tracing::debug!(call_id = %call_id, "results arrived after the caller stopped waiting");
            }
            return;
        }
        let frame = Frame::HubInvokeResults(HubInvokeResults::new(call_id, results));
        if let Err(error) = self.queue_frame(caller, &frame, None) {
            tracing::error!(%error, "failed to encode results for relay");
        }
    }

    /// Fails a forwarded call toward its caller after the executor became
    /// unreachable.
    fn abort_forward(&self, call_id: &CallId, waiting_on: &NodeId, detail: String) {
        let Role::Hub(hub) = &self.inner.role else {
            return;
        };
        match hub.take_answered(call_id, waiting_on) {
            Ok(Some(record)) => {
                let fault = RemoteFault::new(
                    FaultKind::Unreachable,
                    format!("forward to '{waiting_on}' failed: {detail}"),
                );
                self.deliver_results(
                    record.caller,
                    call_id.clone(),
                    RemoteMethodCallResults::from_fault(fault),
                );
            }
            Ok(None) => {}
            Err(error) => {
                tracing::error!(%error, "in-flight record mismatch while failing a forward");
            }
        }
    }

    /// Hands a fire-and-forget call to every local subscriber, in arrival
    /// order relative to other fan-outs.
    fn dispatch_subscribers(&self, invoker: NodeId, version: u64, call: &RemoteMethodCall) {
        let subscribers = self.inner.local.lock().subscribers(call.remote_name());
        if subscribers.is_empty() {
            return;
        }
        let job = BroadcastJob {
            subscribers,
            invoker,
            version,
            call: call.clone(),
        };
        if self.inner.broadcasts.send(job).is_err() {
            tracing::warn!("channel dispatch dropped during shutdown");
        }
    }

    fn announce(&self, to: NodeId, announcement: Announcement) {
        if let Err(error) = self.queue_frame(to, &Frame::Announce(announcement), None) {
            tracing::error!(%error, "failed to encode registry announcement");
        }
    }

    fn queue_call_frame(&self, to: NodeId, frame: &Frame, call_id: CallId) {
        let pending = self.inner.pending.clone();
        let fail_id = call_id.clone();
        let queued = self.queue_frame(
            to,
            frame,
            Some(Box::new(move |error| {
                pending.complete(&fail_id, Err(CallError::Unreachable(error.to_string())));
            })),
        );
        if let Err(wire) = queued {
            self.inner
                .pending
                .complete(&call_id, Err(CallError::Wire(wire)));
        }
    }

    /// Encodes and queues a frame for ordered delivery. `on_fail` runs if
    /// the transport later refuses it; without one the failure is logged.
    fn queue_frame(
        &self,
        to: NodeId,
        frame: &Frame,
        on_fail: Option<Box<dyn FnOnce(TransportError) + Send>>,
    ) -> Result<(), WireError> {
        let bytes = frame.encode()?;
        let delivery = Outbound { to, bytes, on_fail };
        if self.inner.outbox.send(delivery).is_err() {
            tracing::warn!("outbound frame dropped during shutdown");
        }
        Ok(())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("node", &self.inner.node)
            .field("hub", &self.is_hub())
            .finish()
    }
}
