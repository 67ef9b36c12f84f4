//! End-to-end tests of the accept loop over real loopback sockets.
//!
//! Each test starts a [`ListenerLoop`] on an ephemeral port with a
//! [`RecordingHandler`] and drives it with the `portgate-send` client library.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use portgate_send::{connect_to, send_message};
use portgate_server::application::handler::mock::RecordingHandler;
use portgate_server::application::{AdmissionLimiter, ConnectionWorker, WorkerSettings};
use portgate_server::infrastructure::{
    listen_on, shutdown_channel, ListenerLoop, ListenerState, LoopExit, ServerError,
    ShutdownTrigger,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const PATIENCE: Duration = Duration::from_secs(5);

struct Harness {
    addr: SocketAddr,
    handler: Arc<RecordingHandler>,
    listener_loop: Arc<ListenerLoop>,
    trigger: ShutdownTrigger,
    task: JoinHandle<Result<LoopExit, ServerError>>,
}

impl Harness {
    async fn start(capacity: usize, handler: RecordingHandler) -> Self {
        Self::start_with(capacity, handler, WorkerSettings::default()).await
    }

    async fn start_with(
        capacity: usize,
        handler: RecordingHandler,
        settings: WorkerSettings,
    ) -> Self {
        let handler = Arc::new(handler);
        let worker = ConnectionWorker::new(handler.clone(), settings);
        let limiter = AdmissionLimiter::new(capacity).expect("valid capacity");
        let listener_loop = Arc::new(ListenerLoop::new(worker, limiter));

        let listener = listen_on("127.0.0.1:0".parse().unwrap(), 32).expect("listen");
        let addr = listener.local_addr().unwrap();
        let (trigger, signal) = shutdown_channel();

        let task = {
            let listener_loop = Arc::clone(&listener_loop);
            tokio::spawn(async move { listener_loop.run(&listener, signal).await })
        };

        Self {
            addr,
            handler,
            listener_loop,
            trigger,
            task,
        }
    }

    fn limiter(&self) -> &AdmissionLimiter {
        self.listener_loop.limiter()
    }

    async fn connect(&self) -> TcpStream {
        connect_to("127.0.0.1", self.addr.port())
            .await
            .expect("connect to listener")
    }

    /// Waits until no worker holds a slot.  The loop itself may still hold
    /// one, taken ahead of its next accept.
    async fn settle(&self) {
        self.wait_for_active(0).await;
    }

    /// Waits until exactly `active` workers hold a slot.
    async fn wait_for_active(&self, active: usize) {
        let listener_loop = Arc::clone(&self.listener_loop);
        eventually(move || {
            let listener_loop = Arc::clone(&listener_loop);
            async move { active_workers(&listener_loop) == Some(active) }
        })
        .await;
    }

    async fn wait_for_calls(&self, calls: usize) {
        let handler = Arc::clone(&self.handler);
        eventually(move || {
            let handler = Arc::clone(&handler);
            async move { handler.calls() == calls }
        })
        .await;
    }

    async fn stop(self) -> LoopExit {
        self.trigger.fire();
        tokio::time::timeout(PATIENCE, self.task)
            .await
            .expect("loop stops after shutdown")
            .expect("loop task did not panic")
            .expect("loop exits cleanly")
    }
}

/// Slots held by workers, or `None` while the loop is between states.
///
/// In `Accepting` the loop holds one permit for the client it is about to
/// accept; in `AwaitingSlot` it holds none.  Any other state is transient.
fn active_workers(listener_loop: &ListenerLoop) -> Option<usize> {
    let before = listener_loop.state();
    let held = listener_loop.limiter().held();
    if listener_loop.state() != before {
        return None;
    }
    match before {
        ListenerState::Accepting => held.checked_sub(1),
        ListenerState::AwaitingSlot => Some(held),
        _ => None,
    }
}

/// Polls `check` until it holds or [`PATIENCE`] runs out.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(PATIENCE, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached within {PATIENCE:?}");
}

/// Sends `text` and waits for the server to close the connection.
async fn send_and_wait_for_close(mut stream: TcpStream, text: &str) {
    send_message(&mut stream, text).await.expect("send");
    let mut rest = Vec::new();
    let read = tokio::time::timeout(PATIENCE, stream.read_to_end(&mut rest))
        .await
        .expect("server closes the connection");
    // A reset instead of a clean FIN is acceptable here.
    if let Ok(n) = read {
        assert_eq!(n, 0, "server never writes to the client");
    }
}

// ── Single connection ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hello_is_read_in_one_piece_then_closed() {
    // Arrange
    let harness = Harness::start(2, RecordingHandler::new()).await;
    let mut stream = harness.connect().await;

    // Act
    let sent = send_message(&mut stream, "hello").await.unwrap();
    let mut rest = Vec::new();
    let n = tokio::time::timeout(PATIENCE, stream.read_to_end(&mut rest))
        .await
        .expect("client observes close")
        .unwrap();

    // Assert
    assert_eq!(sent, 6);
    assert_eq!(n, 0, "client sees EOF without any reply");
    harness.wait_for_calls(1).await;
    let payloads = harness.handler.payloads();
    assert_eq!(payloads[0].len(), 6);
    assert!(payloads[0].is_nul_terminated());
    assert_eq!(harness.handler.texts(), vec!["hello".to_string()]);
    harness.settle().await;
    let limiter = harness.limiter().clone();
    assert_eq!(harness.stop().await, LoopExit::Shutdown);
    assert_eq!(limiter.available(), 2, "the loop's own permit is returned on stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_immediate_close_releases_slot() {
    // Arrange
    let harness = Harness::start(1, RecordingHandler::new()).await;

    // Act: connect and hang up without sending
    drop(harness.connect().await);

    // Assert
    harness.settle().await;
    assert_eq!(harness.handler.calls(), 0);

    // The slot is usable again
    send_and_wait_for_close(harness.connect().await, "after").await;
    harness.wait_for_calls(1).await;
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handler_failure_releases_slot() {
    // Arrange
    let harness = Harness::start(1, RecordingHandler::failing()).await;

    // Act
    for text in ["one", "two", "three"] {
        send_and_wait_for_close(harness.connect().await, text).await;
    }

    // Assert
    harness.wait_for_calls(3).await;
    harness.settle().await;
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handler_panic_releases_slot() {
    // Arrange
    let harness = Harness::start(1, RecordingHandler::panicking()).await;

    // Act: with capacity 1 the second client is only accepted if the
    // panicking worker gave its permit back
    send_and_wait_for_close(harness.connect().await, "boom").await;
    send_and_wait_for_close(harness.connect().await, "again").await;

    // Assert
    harness.wait_for_calls(2).await;
    harness.settle().await;
    assert_eq!(harness.stop().await, LoopExit::Shutdown);
}

// ── Admission control ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_third_client_waits_for_a_free_slot() {
    // Arrange: capacity 2, two silent clients occupy both slots
    let harness = Harness::start(2, RecordingHandler::new()).await;
    let mut states = harness.listener_loop.subscribe_state();

    let mut first = harness.connect().await;
    harness.wait_for_active(1).await;
    let second = harness.connect().await;
    harness.wait_for_active(2).await;
    tokio::time::timeout(
        PATIENCE,
        states.wait_for(|s| *s == ListenerState::AwaitingSlot),
    )
    .await
    .expect("listener parks waiting for a slot")
    .unwrap();

    // Act: the third client connects and sends; it can only sit in the backlog
    let third = harness.connect().await;
    let third_task = tokio::spawn(send_and_wait_for_close(third, "third"));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Assert: nothing was delivered while both slots were busy
    assert_eq!(harness.handler.calls(), 0);
    assert_eq!(harness.limiter().held(), 2);
    assert_eq!(harness.listener_loop.state(), ListenerState::AwaitingSlot);

    // Act: the first client finishes, freeing a slot
    send_message(&mut first, "first").await.unwrap();

    // Assert: the third is now served, the second still holds its slot
    tokio::time::timeout(PATIENCE, third_task)
        .await
        .expect("third client served")
        .unwrap();
    harness.wait_for_calls(2).await;
    assert_eq!(
        harness.handler.texts(),
        vec!["first".to_string(), "third".to_string()]
    );
    harness.wait_for_active(1).await;

    send_and_wait_for_close(second, "second").await;
    harness.wait_for_calls(3).await;
    harness.settle().await;
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_more_clients_than_capacity_are_all_served() {
    // Arrange
    const CAPACITY: usize = 3;
    const CLIENTS: usize = 12;
    let harness = Harness::start(CAPACITY, RecordingHandler::new()).await;

    let sampler = {
        let limiter = harness.limiter().clone();
        tokio::spawn(async move {
            let mut peak = 0;
            loop {
                peak = peak.max(limiter.held());
                if limiter.is_closed() {
                    return peak;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    // Act
    let mut clients = Vec::new();
    for i in 0..CLIENTS {
        let stream = harness.connect().await;
        let text = format!("client-{i}");
        clients.push(tokio::spawn(async move {
            send_and_wait_for_close(stream, &text).await;
        }));
    }
    for client in clients {
        tokio::time::timeout(PATIENCE, client)
            .await
            .expect("every client is served")
            .unwrap();
    }

    // Assert
    harness.wait_for_calls(CLIENTS).await;
    harness.settle().await;
    let mut texts = harness.handler.texts();
    texts.sort();
    let mut expected: Vec<String> = (0..CLIENTS).map(|i| format!("client-{i}")).collect();
    expected.sort();
    assert_eq!(texts, expected);

    harness.limiter().close();
    let peak = sampler.await.unwrap();
    assert!(peak <= CAPACITY, "peak {peak} exceeded capacity {CAPACITY}");
    harness.task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_timeout_frees_slot_held_by_silent_client() {
    // Arrange: capacity 1, short timeout
    let settings = WorkerSettings {
        read_timeout: Some(Duration::from_millis(100)),
        ..WorkerSettings::default()
    };
    let harness = Harness::start_with(1, RecordingHandler::new(), settings).await;
    let _silent = harness.connect().await;
    harness.wait_for_active(1).await;

    // Act: the next client can only get in once the silent one times out
    send_and_wait_for_close(harness.connect().await, "patient").await;

    // Assert
    harness.wait_for_calls(1).await;
    assert_eq!(harness.handler.texts(), vec!["patient".to_string()]);
    harness.settle().await;
    harness.stop().await;
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_stops_accepting_but_lets_workers_finish() {
    // Arrange: one silent client in flight
    let harness = Harness::start(2, RecordingHandler::new()).await;
    let mut in_flight = harness.connect().await;
    harness.wait_for_active(1).await;
    let handler = Arc::clone(&harness.handler);
    let listener_loop = Arc::clone(&harness.listener_loop);

    // Act
    let exit = harness.stop().await;

    // Assert: the loop is stopped, the worker still finishes its connection
    assert_eq!(exit, LoopExit::Shutdown);
    assert_eq!(listener_loop.state(), ListenerState::Stopped);
    send_message(&mut in_flight, "late").await.unwrap();
    eventually(move || {
        let handler = Arc::clone(&handler);
        async move { handler.calls() == 1 }
    })
    .await;
    let limiter = listener_loop.limiter().clone();
    eventually(move || {
        let limiter = limiter.clone();
        async move { limiter.available() == 2 }
    })
    .await;
}
