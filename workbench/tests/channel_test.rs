use async_trait::async_trait;
use futures::channel::mpsc as engine_mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use workbench::channel::{CommandSink, EventStream};
use workbench::{
    ChannelSignal, ClientCommand, Coordinator, PushChannel, PushConnector, QueueFilter, ScopeEngine, ServerEvent,
    SessionNotification, WorkbenchError, WorkbenchResult,
};

const DELAY: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(5);

/// Engine side of one fake connection
struct FakeEngine {
    to_client: engine_mpsc::UnboundedSender<WorkbenchResult<String>>,
    from_client: engine_mpsc::UnboundedReceiver<String>,
}

impl FakeEngine {
    fn push(&self, message: Value) {
        self.to_client.unbounded_send(Ok(message.to_string())).unwrap();
    }

    async fn next_command(&mut self) -> Value {
        let text = timeout(WAIT, self.from_client.next()).await.unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

/// Hands out scripted connections in order, then refuses
#[derive(Clone, Default)]
struct FakeConnector {
    sessions: Arc<Mutex<VecDeque<(CommandSink, EventStream)>>>,
    attempts: Arc<AtomicUsize>,
}

impl FakeConnector {
    fn script(&self) -> FakeEngine {
        let (to_client, from_engine) = engine_mpsc::unbounded::<WorkbenchResult<String>>();
        let (to_engine, from_client) = engine_mpsc::unbounded::<String>();

        let sink: CommandSink = Box::pin(to_engine.sink_map_err(WorkbenchError::channel));
        let stream: EventStream = Box::pin(from_engine);
        self.sessions.lock().unwrap().push_back((sink, stream));

        FakeEngine { to_client, from_client }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushConnector for FakeConnector {
    async fn connect(&self) -> WorkbenchResult<(CommandSink, EventStream)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WorkbenchError::channel("connection refused"))
    }
}

fn intercepted(id: &str) -> Value {
    json!({
        "type": "intercepted",
        "data": {
            "id": id,
            "method": "GET",
            "url": format!("http://app.test/{}", id),
            "host": "app.test",
            "path": format!("/{}", id),
            "headers": {},
            "body": null,
            "timestamp": "2024-06-01T10:00:00"
        }
    })
}

async fn next_notification(notifications: &mut broadcast::Receiver<SessionNotification>) -> SessionNotification {
    timeout(WAIT, notifications.recv()).await.unwrap().unwrap()
}

async fn next_signal(signals: &mut mpsc::Receiver<ChannelSignal>) -> ChannelSignal {
    timeout(WAIT, signals.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_events_decoded_and_unknown_kinds_skipped() {
    let connector = FakeConnector::default();
    let engine = connector.script();

    let (signal_tx, mut signals) = mpsc::channel(16);
    let (_outbound_tx, outbound) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(PushChannel::new(connector.clone(), DELAY).run(signal_tx, outbound, shutdown.clone()));

    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);

    engine.push(json!({"type": "heartbeat", "seq": 1}));
    engine.to_client.unbounded_send(Ok("not json".to_string())).unwrap();
    engine.push(json!({"type": "intercept_status", "enabled": true}));
    engine.push(json!({"type": "forwarded", "id": "9"}));

    assert_eq!(
        next_signal(&mut signals).await,
        ChannelSignal::Event(ServerEvent::InterceptStatus { enabled: true })
    );
    assert_eq!(
        next_signal(&mut signals).await,
        ChannelSignal::Event(ServerEvent::Forwarded { id: "9".to_string() })
    );

    shutdown.cancel();
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Disconnected);
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnects_after_engine_closes() {
    let connector = FakeConnector::default();
    let first = connector.script();
    let mut second = connector.script();

    let (signal_tx, mut signals) = mpsc::channel(16);
    let (outbound_tx, outbound) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(PushChannel::new(connector.clone(), DELAY).run(signal_tx, outbound, shutdown.clone()));

    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);
    drop(first);
    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Disconnected);

    // Issued while disconnected; delivered on the next connection
    outbound_tx.send(ClientCommand::Drop { id: "5".to_string() }).unwrap();

    assert_eq!(next_signal(&mut signals).await, ChannelSignal::Connected);
    assert_eq!(second.next_command().await, json!({"type": "drop", "id": "5"}));
    assert_eq!(connector.attempts(), 2);

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_connects_retry_with_fixed_delay() {
    let connector = FakeConnector::default();

    let (signal_tx, _signals) = mpsc::channel(16);
    let (_outbound_tx, outbound) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(
        PushChannel::new(connector.clone(), Duration::from_millis(50)).run(signal_tx, outbound, shutdown.clone()),
    );

    tokio::time::sleep(Duration::from_millis(230)).await;
    let attempts = connector.attempts();
    assert!((2..=6).contains(&attempts), "unexpected attempt count {}", attempts);

    // Shutdown interrupts the pause between attempts
    shutdown.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_session_resyncs_on_reconnect() {
    let connector = FakeConnector::default();
    let mut first = connector.script();
    let second = connector.script();

    let (signal_tx, signal_rx) = mpsc::channel(16);
    let (outbound_tx, outbound) = mpsc::unbounded_channel();
    let (session, _coordinator) = Coordinator::spawn(ScopeEngine::permissive(), signal_rx, outbound_tx);
    let mut notifications = session.subscribe();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(PushChannel::new(connector.clone(), DELAY).run(signal_tx, outbound, shutdown.clone()));

    assert_eq!(next_notification(&mut notifications).await, SessionNotification::Reset);
    first.push(json!({"type": "intercept_status", "enabled": true}));
    first.push(intercepted("1"));
    assert_eq!(next_notification(&mut notifications).await, SessionNotification::InterceptStatus { enabled: true });
    assert!(matches!(next_notification(&mut notifications).await, SessionNotification::Added { request } if request.id == "1"));

    session.forward("1", None).await.unwrap();
    assert_eq!(first.next_command().await, json!({"type": "forward", "id": "1"}));

    drop(first);
    assert_eq!(next_notification(&mut notifications).await, SessionNotification::Disconnected);
    assert_eq!(next_notification(&mut notifications).await, SessionNotification::Reset);

    let status = session.status().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.enabled, None);
    assert!(session.queue(QueueFilter::default()).await.unwrap().is_empty());

    // The engine re-pushes what it still holds
    second.push(json!({"type": "intercept_status", "enabled": false}));
    second.push(intercepted("2"));
    assert_eq!(next_notification(&mut notifications).await, SessionNotification::InterceptStatus { enabled: false });
    assert!(matches!(next_notification(&mut notifications).await, SessionNotification::Added { request } if request.id == "2"));

    shutdown.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}
