//! Client driver tests against a scripted connector

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use roomwire::client::{
    BrokerClient, ClientConfig, ClientError, ClientHooks, ClientState, Connector, Transport,
    TransportEvent,
};

/// Server end of a scripted transport
struct Peer {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<TransportEvent>,
}

impl Peer {
    async fn recv(&mut self) -> Value {
        let raw = self.from_client.recv().await.expect("client hung up");
        serde_json::from_str(&raw).unwrap()
    }
}

/// Accepts while the script says so, refuses once it runs out
struct ScriptedConnector {
    script: Mutex<VecDeque<bool>>,
    attempts: AtomicUsize,
    peers: mpsc::UnboundedSender<Peer>,
}

impl ScriptedConnector {
    fn new(script: &[bool]) -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            attempts: AtomicUsize::new(0),
            peers,
        });
        (connector, rx)
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn push(&self, accept: bool) {
        self.script.lock().unwrap().push_back(accept);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str, buffer: usize) -> Result<Transport, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let accept = self.script.lock().unwrap().pop_front().unwrap_or(false);
        if !accept {
            return Err(ClientError::Connect("refused".into()));
        }

        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);
        let _ = self.peers.send(Peer {
            from_client: out_rx,
            to_client: in_tx,
        });
        Ok(Transport {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == name).count()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl ClientHooks for RecordingHooks {
    fn on_open(&self) {
        self.push("open");
    }

    fn on_close(&self) {
        self.push("close");
    }

    fn on_error(&self, _error: &ClientError) {
        self.push("error");
    }

    fn on_reconnect_attempt(&self, attempt: u32) {
        self.push(format!("attempt:{}", attempt));
    }

    fn on_reconnect_failed(&self, _error: &ClientError) {
        self.push("failed");
    }

    fn on_reconnected(&self) {
        self.push("reconnected");
    }
}

fn config() -> ClientConfig {
    ClientConfig::new("ws://broker.test/ws")
}

async fn wait_for_state(client: &BrokerClient, wanted: ClientState) {
    let mut states = client.watch_state();
    states
        .wait_for(|state| *state == wanted)
        .await
        .expect("driver stopped");
}

#[tokio::test(start_paused = true)]
async fn test_max_attempts_reports_failure_once() {
    let (connector, mut peers) = ScriptedConnector::new(&[true]);
    let hooks = Arc::new(RecordingHooks::default());
    let client =
        BrokerClient::with_connector(config().with_max_attempts(2), connector.clone(), hooks.clone())
            .unwrap();

    wait_for_state(&client, ClientState::Open).await;
    let peer = peers.recv().await.unwrap();
    peer.to_client.send(TransportEvent::Closed).await.unwrap();

    wait_for_state(&client, ClientState::Failed).await;
    assert_eq!(connector.attempts(), 3);
    assert_eq!(hooks.count("failed"), 1);
    assert_eq!(hooks.count("error"), 2);
    assert_eq!(
        hooks.events(),
        vec!["open", "close", "attempt:1", "error", "attempt:2", "error", "failed"]
    );

    // No further automatic attempts
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 3);
    assert_eq!(hooks.count("failed"), 1);

    connector.push(true);
    assert_ok!(client.connect());
    wait_for_state(&client, ClientState::Open).await;
    assert_eq!(connector.attempts(), 4);
    assert!(hooks.events().ends_with(&["open".to_string(), "reconnected".to_string()]));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_restarts_streak() {
    let (connector, mut peers) = ScriptedConnector::new(&[true, false, true]);
    let hooks = Arc::new(RecordingHooks::default());
    let client = BrokerClient::with_connector(
        config()
            .with_cooldown(Duration::from_secs(5))
            .with_reconnect_strategy(|_| Duration::from_secs(10)),
        connector.clone(),
        hooks.clone(),
    )
    .unwrap();

    wait_for_state(&client, ClientState::Open).await;
    let peer = peers.recv().await.unwrap();
    peer.to_client.send(TransportEvent::Closed).await.unwrap();

    // attempt 1 refused after 10s, which is past the cooldown, so the
    // streak restarts instead of moving to attempt 2
    let peer = peers.recv().await.unwrap();
    wait_for_state(&client, ClientState::Open).await;
    assert_eq!(
        hooks.events(),
        vec!["open", "close", "attempt:1", "error", "attempt:1", "open", "reconnected"]
    );

    peer.to_client.send(TransportEvent::Closed).await.unwrap();
    wait_for_state(&client, ClientState::Reconnecting { attempt: 1 }).await;
}

#[tokio::test(start_paused = true)]
async fn test_identity_handshake_and_listeners() {
    let (connector, mut peers) = ScriptedConnector::new(&[true]);
    let client = BrokerClient::with_connector(
        config().with_id("device-42"),
        connector,
        Arc::new(RecordingHooks::default()),
    )
    .unwrap();

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    client.on("session-restored", move |data| {
        let _ = seen_tx.send(data);
    });

    let mut peer = peers.recv().await.unwrap();
    let handshake = peer.recv().await;
    assert_eq!(handshake, json!({"event": "reconnect", "data": {"id": "device-42"}}));

    peer.to_client
        .send(TransportEvent::Frame("garbage".into()))
        .await
        .unwrap();
    peer.to_client
        .send(TransportEvent::Frame(
            json!({"event": "session-restored", "data": {"id": "device-42", "rooms": ["A"], "tags": []}})
                .to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(seen.recv().await.unwrap()["rooms"], json!(["A"]));

    wait_for_state(&client, ClientState::Open).await;
    assert_ok!(client.send("chat", json!({"text": "hi"})));
    assert_eq!(peer.recv().await["event"], "chat");
}

#[tokio::test(start_paused = true)]
async fn test_manual_close_suppresses_reconnect() {
    let (connector, mut peers) = ScriptedConnector::new(&[true, true]);
    let hooks = Arc::new(RecordingHooks::default());
    let client =
        BrokerClient::with_connector(config(), connector.clone(), hooks.clone()).unwrap();

    wait_for_state(&client, ClientState::Open).await;
    let mut peer = peers.recv().await.unwrap();

    assert_ok!(client.close());
    wait_for_state(&client, ClientState::ClosedManual).await;
    // Writer side dropped
    assert!(peer.from_client.recv().await.is_none());

    assert_ok!(client.network_regained());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.state(), ClientState::ClosedManual);
    assert_eq!(assert_err!(client.send("x", json!(null))), ClientError::NotOpen);

    assert_ok!(client.connect());
    wait_for_state(&client, ClientState::Open).await;
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_network_regained_skips_backoff_after_failure() {
    let (connector, _peers) = ScriptedConnector::new(&[]);
    let hooks = Arc::new(RecordingHooks::default());
    let client = BrokerClient::with_connector(
        config().auto_connect(false).with_max_attempts(1),
        connector.clone(),
        hooks.clone(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(client.state(), ClientState::Idle);
    assert_eq!(connector.attempts(), 0);

    assert_ok!(client.network_regained());
    // Initial attempt refused, one retry refused, then give up
    wait_for_state(&client, ClientState::Failed).await;
    assert_eq!(connector.attempts(), 2);

    connector.push(true);
    let before = tokio::time::Instant::now();
    assert_ok!(client.network_regained());
    wait_for_state(&client, ClientState::Open).await;
    assert!(before.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = BrokerClient::with_connector(
        ClientConfig::new("http://nope"),
        ScriptedConnector::new(&[]).0,
        Arc::new(RecordingHooks::default()),
    );
    assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
}
