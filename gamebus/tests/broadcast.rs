//! End-to-end tests for channel broadcasts.
//!
//! These tests exercise the fan-out flow:
//! - a broadcaster stub submitting without blocking
//! - delivery to every subscriber on every node, the sender's included
//! - per-subscriber ordering of broadcasts
//! - subscription withdrawal and broadcast-eligibility checks

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use gamebus::{
    remote_interface, MemoryMesh, MessageContext, NodeId, RemoteName, Router, RouterConfig,
    RouterError,
};

remote_interface! {
    /// Events every player watches.
    pub trait GameWatcher (stub GameWatcherStub, table GAME_WATCHER) {
        /// A unit arrived somewhere.
        0 => fn unit_moved(unit_id: u32, territory: String);
        /// A player finished their turn.
        1 => fn turn_ended(player: String);
    }
}

remote_interface! {
    /// Dice with answers; unusable as a channel because of them.
    pub trait DiceOracle (stub DiceOracleStub, table DICE_ORACLE) {
        /// Roll a die.
        0 => fn roll(sides: u32) -> u32;
    }
}

/// Records everything it hears, plus who said it.
#[derive(Default)]
struct Recorder {
    moves: Mutex<Vec<(u32, String)>>,
    announcers: Mutex<Vec<String>>,
}

impl GameWatcher for Recorder {
    fn unit_moved(&self, unit_id: u32, territory: String) {
        self.moves.lock().push((unit_id, territory));
        self.announcers.lock().push(
            MessageContext::current()
                .map(|node| node.to_string())
                .unwrap_or_default(),
        );
    }

    fn turn_ended(&self, _player: String) {}
}

struct NoDice;

impl DiceOracle for NoDice {
    fn roll(&self, _sides: u32) -> u32 {
        1
    }
}

/// Holds dispatching threads until the test lets them through.
struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(false),
            changed: Condvar::new(),
        })
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.changed.wait(&mut open);
        }
    }
}

/// Subscriber that refuses to finish a dispatch until its gate opens.
struct GatedWatcher {
    gate: Arc<Gate>,
    seen: Mutex<Vec<u32>>,
}

impl GameWatcher for GatedWatcher {
    fn unit_moved(&self, unit_id: u32, _territory: String) {
        self.gate.wait();
        self.seen.lock().push(unit_id);
    }

    fn turn_ended(&self, _player: String) {}
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn watch_channel() -> RemoteName {
    RemoteName::new("game.watchers", &GAME_WATCHER)
}

struct ThreeNodeMesh {
    hub: Router,
    alice: Router,
    bob: Router,
}

/// A hub named "host" with spokes "alice" and "bob", pumped and ready.
fn mesh_of_three() -> ThreeNodeMesh {
    let mesh = MemoryMesh::new();
    let host = mesh.join(NodeId::new("host"));
    let alice_node = mesh.join(NodeId::new("alice"));
    let bob_node = mesh.join(NodeId::new("bob"));

    let hub = Router::hub(NodeId::new("host"), host.transport(), RouterConfig::default());
    let alice = Router::spoke(
        NodeId::new("alice"),
        NodeId::new("host"),
        alice_node.transport(),
        RouterConfig::default(),
    );
    let bob = Router::spoke(
        NodeId::new("bob"),
        NodeId::new("host"),
        bob_node.transport(),
        RouterConfig::default(),
    );
    host.pump(hub.clone());
    alice_node.pump(alice.clone());
    bob_node.pump(bob.clone());
    ThreeNodeMesh { hub, alice, bob }
}

/// Lets gossip and fan-out drain through the mesh.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcasts_reach_every_subscriber() {
    init_tracing();
    let nodes = mesh_of_three();
    let channel = watch_channel();

    let recorders: Vec<Arc<Recorder>> = [&nodes.hub, &nodes.alice, &nodes.bob]
        .iter()
        .map(|router| {
            let recorder = Arc::new(Recorder::default());
            router
                .channels()
                .subscribe(&channel, recorder.clone() as Arc<dyn GameWatcher>)
                .expect("subscribe");
            recorder
        })
        .collect();
    settle().await;

    let watchers: GameWatcherStub = nodes
        .alice
        .channels()
        .broadcaster(&channel)
        .expect("broadcaster");
    watchers
        .unit_moved(42, "Paris".to_string())
        .expect("broadcast");
    settle().await;

    for recorder in &recorders {
        let moves = recorder.moves.lock();
        assert_eq!(moves.as_slice(), &[(42, "Paris".to_string())]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_learn_who_broadcast() {
    init_tracing();
    let nodes = mesh_of_three();
    let channel = watch_channel();

    let local = Arc::new(Recorder::default());
    nodes
        .alice
        .channels()
        .subscribe(&channel, local.clone() as Arc<dyn GameWatcher>)
        .expect("subscribe on alice");
    let remote = Arc::new(Recorder::default());
    nodes
        .bob
        .channels()
        .subscribe(&channel, remote.clone() as Arc<dyn GameWatcher>)
        .expect("subscribe on bob");
    settle().await;

    let watchers: GameWatcherStub = nodes
        .alice
        .channels()
        .broadcaster(&channel)
        .expect("broadcaster");
    watchers
        .unit_moved(1, "Moscow".to_string())
        .expect("broadcast");
    settle().await;

    assert_eq!(local.announcers.lock().as_slice(), &["alice".to_string()]);
    assert_eq!(remote.announcers.lock().as_slice(), &["alice".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn each_subscriber_hears_broadcasts_in_order() {
    init_tracing();
    let nodes = mesh_of_three();
    let channel = watch_channel();

    let on_hub = Arc::new(Recorder::default());
    nodes
        .hub
        .channels()
        .subscribe(&channel, on_hub.clone() as Arc<dyn GameWatcher>)
        .expect("subscribe on hub");
    let on_bob = Arc::new(Recorder::default());
    nodes
        .bob
        .channels()
        .subscribe(&channel, on_bob.clone() as Arc<dyn GameWatcher>)
        .expect("subscribe on bob");
    settle().await;

    let watchers: GameWatcherStub = nodes
        .alice
        .channels()
        .broadcaster(&channel)
        .expect("broadcaster");
    for unit_id in 0..8 {
        watchers
            .unit_moved(unit_id, "Berlin".to_string())
            .expect("broadcast");
    }
    settle().await;

    let expected: Vec<u32> = (0..8).collect();
    let heard_by_hub: Vec<u32> = on_hub.moves.lock().iter().map(|(id, _)| *id).collect();
    let heard_by_bob: Vec<u32> = on_bob.moves.lock().iter().map(|(id, _)| *id).collect();
    assert_eq!(heard_by_hub, expected);
    assert_eq!(heard_by_bob, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_subscribers_do_not_stall_the_broadcaster() {
    init_tracing();
    let nodes = mesh_of_three();
    let channel = watch_channel();

    // Alice's own subscriber refuses to finish until released.
    let gate = Gate::new();
    let gated = Arc::new(GatedWatcher {
        gate: gate.clone(),
        seen: Mutex::new(Vec::new()),
    });
    nodes
        .alice
        .channels()
        .subscribe(&channel, gated.clone() as Arc<dyn GameWatcher>)
        .expect("subscribe on alice");
    let on_bob = Arc::new(Recorder::default());
    nodes
        .bob
        .channels()
        .subscribe(&channel, on_bob.clone() as Arc<dyn GameWatcher>)
        .expect("subscribe on bob");
    settle().await;

    let watchers: GameWatcherStub = nodes
        .alice
        .channels()
        .broadcaster(&channel)
        .expect("broadcaster");
    let submitted = Instant::now();
    watchers.unit_moved(9, "Kiev".to_string()).expect("broadcast");
    assert!(
        submitted.elapsed() < Duration::from_millis(250),
        "submission must not wait on subscribers"
    );

    // Delivery elsewhere proceeds while the gated subscriber sits.
    settle().await;
    assert!(gated.seen.lock().is_empty());
    assert_eq!(
        on_bob.moves.lock().as_slice(),
        &[(9, "Kiev".to_string())]
    );

    gate.release();
    settle().await;
    assert_eq!(gated.seen.lock().as_slice(), &[9]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unsubscribed_watchers_go_quiet() {
    init_tracing();
    let nodes = mesh_of_three();
    let channel = watch_channel();

    let recorder = Arc::new(Recorder::default());
    let ticket = nodes
        .bob
        .channels()
        .subscribe(&channel, recorder.clone() as Arc<dyn GameWatcher>)
        .expect("subscribe");
    assert!(nodes.bob.channels().has_subscribers(&channel));
    settle().await;

    let watchers: GameWatcherStub = nodes
        .alice
        .channels()
        .broadcaster(&channel)
        .expect("broadcaster");
    watchers.unit_moved(1, "Rome".to_string()).expect("broadcast");
    settle().await;

    nodes.bob.channels().unsubscribe(&channel, ticket);
    assert!(!nodes.bob.channels().has_subscribers(&channel));
    settle().await;
    watchers.unit_moved(2, "Rome".to_string()).expect("broadcast");
    settle().await;

    assert_eq!(recorder.moves.lock().len(), 1);

    // Withdrawing the same ticket again is a no-op.
    nodes.bob.channels().unsubscribe(&channel, ticket);
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcasts_without_subscribers_still_succeed() {
    init_tracing();
    let nodes = mesh_of_three();
    let channel = watch_channel();

    let watchers: GameWatcherStub = nodes
        .bob
        .channels()
        .broadcaster(&channel)
        .expect("broadcaster");
    watchers
        .turn_ended("bob".to_string())
        .expect("nobody listening is fine");
}

#[tokio::test(flavor = "multi_thread")]
async fn value_returning_interfaces_cannot_back_channels() {
    init_tracing();
    let nodes = mesh_of_three();
    let dice = RemoteName::new("game.dice", &DICE_ORACLE);

    let err = nodes
        .alice
        .channels()
        .broadcaster::<DiceOracleStub>(&dice)
        .expect_err("roll returns a value");
    assert!(matches!(err, RouterError::Contract(_)));

    let err = nodes
        .bob
        .channels()
        .subscribe(&dice, Arc::new(NoDice) as Arc<dyn DiceOracle>)
        .expect_err("subscribing is refused too");
    assert!(matches!(err, RouterError::Contract(_)));
}
