//! Log-level contract of the blocking-stub diagnostic.
//!
//! Blocking stub calls are meant to run on offload threads, which still
//! sit inside a runtime context; the notice they trigger there must stay
//! below warn. The capture below owns the process-global subscriber, so
//! this binary holds exactly one test.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

use gamebus::{remote_interface, MemoryMesh, NodeId, RemoteName, Router, RouterConfig};

remote_interface! {
    /// Turn bookkeeping served by the host.
    pub trait TurnCounter (stub TurnCounterStub, table TURN_COUNTER) {
        /// The turn after `turn`.
        0 => fn next_turn(turn: u32) -> u32;
    }
}

struct TurnKeeper;

impl TurnCounter for TurnKeeper {
    fn next_turn(&self, turn: u32) -> u32 {
        turn + 1
    }
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
struct LogSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogSink {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offload_thread_calls_stay_below_warn() {
    let sink = LogSink::default();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(sink.clone())
        .with_ansi(false)
        .init();

    let mesh = MemoryMesh::new();
    let host = mesh.join(NodeId::new("host"));
    let player = mesh.join(NodeId::new("player"));
    let hub = Router::hub(NodeId::new("host"), host.transport(), RouterConfig::default());
    let spoke = Router::spoke(
        NodeId::new("player"),
        NodeId::new("host"),
        player.transport(),
        RouterConfig::default(),
    );
    host.pump(hub.clone());
    player.pump(spoke.clone());

    let endpoint = RemoteName::new("game.turns", &TURN_COUNTER);
    hub.register_remote(&endpoint, Arc::new(TurnKeeper) as Arc<dyn TurnCounter>)
        .expect("register on hub");

    let stub: TurnCounterStub = spoke.remote_stub(&endpoint).expect("stub");
    let turn = tokio::task::spawn_blocking(move || stub.next_turn(3).expect("next_turn"))
        .await
        .expect("blocking task");
    assert_eq!(turn, 4);

    let captured = sink.text();
    let notices: Vec<&str> = captured
        .lines()
        .filter(|line| line.contains("blocking remote call"))
        .collect();
    assert!(
        !notices.is_empty(),
        "expected the runtime-context notice in:\n{captured}"
    );
    for line in notices {
        assert!(
            line.contains("DEBUG") && !line.contains("WARN"),
            "offload-thread calls must not warn: {line}"
        );
    }
}
