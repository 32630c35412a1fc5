//! Resilient client for the broker.
//!
//! [`BrokerClient`] owns a background driver task that establishes the
//! transport through a [`Connector`], applies the [`Lifecycle`] state machine
//! to every outcome and keeps at most one backoff timer armed.

mod config;
mod connector;
mod error;
mod hooks;
mod lifecycle;

pub use config::{default_backoff, ClientConfig, ReconnectStrategy};
pub use connector::{Connector, Transport, TransportEvent, WsConnector};
pub use error::ClientError;
pub use hooks::{ClientHooks, NoopClientHooks};
pub use lifecycle::{ClientState, Lifecycle, Transition};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Sleep};

use crate::websocket::{events, format, Envelope};

type Listener = Arc<dyn Fn(Value) + Send + Sync>;
type Listeners = Arc<DashMap<String, Listener>>;
type PendingConnect = BoxFuture<'static, Result<Transport, ClientError>>;

#[derive(Debug)]
enum Command {
    Connect,
    Close,
    NetworkRegained,
    Send(String),
}

pub struct BrokerClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ClientState>,
    listeners: Listeners,
}

impl BrokerClient {
    /// Build a WebSocket client. Must be called inside a tokio runtime.
    pub fn new(config: ClientConfig, hooks: Arc<dyn ClientHooks>) -> Result<Self, ClientError> {
        Self::with_connector(config, Arc::new(WsConnector), hooks)
    }

    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        hooks: Arc<dyn ClientHooks>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let lifecycle = Lifecycle::new(config, Instant::now());
        let (state_tx, state_rx) = watch::channel(lifecycle.state());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let listeners: Listeners = Arc::new(DashMap::new());

        let driver = Driver {
            lifecycle,
            connector,
            hooks,
            listeners: listeners.clone(),
            state_tx,
            outbound: None,
            inbound: None,
            pending: None,
            timer: None,
        };
        tokio::spawn(driver.run(commands_rx));

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            listeners,
        })
    }

    /// Register the handler for inbound `event`, replacing any earlier one
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.listeners.insert(event.into(), Arc::new(handler));
    }

    /// Send an envelope on the open transport
    pub fn send(&self, event: &str, data: Value) -> Result<(), ClientError> {
        if self.state() != ClientState::Open {
            return Err(ClientError::NotOpen);
        }
        self.command(Command::Send(format(event, data).to_string()))
    }

    /// Connect now, superseding any pending backoff and undoing a manual close
    pub fn connect(&self) -> Result<(), ClientError> {
        self.command(Command::Connect)
    }

    /// Close and stop reconnecting until the next [`BrokerClient::connect`]
    pub fn close(&self) -> Result<(), ClientError> {
        self.command(Command::Close)
    }

    /// Signal that network connectivity came back
    pub fn network_regained(&self) -> Result<(), ClientError> {
        self.command(Command::NetworkRegained)
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Receiver observing every state change
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Transport("client driver has stopped".into()))
    }
}

struct Driver {
    lifecycle: Lifecycle,
    connector: Arc<dyn Connector>,
    hooks: Arc<dyn ClientHooks>,
    listeners: Listeners,
    state_tx: watch::Sender<ClientState>,
    outbound: Option<mpsc::Sender<String>>,
    inbound: Option<mpsc::Receiver<TransportEvent>>,
    pending: Option<PendingConnect>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        if self.lifecycle.state() == ClientState::Connecting {
            self.start_connect();
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Client dropped
                    None => break,
                },
                result = poll_slot(&mut self.pending) => {
                    self.pending = None;
                    self.on_connect_result(result).await;
                }
                event = next_event(&mut self.inbound) => {
                    self.on_transport_event(event);
                }
                _ = poll_slot(&mut self.timer) => {
                    self.timer = None;
                    if self.lifecycle.timer_fired() {
                        self.start_connect();
                    }
                }
            }
            self.publish();
        }

        tracing::debug!("Client driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if self.lifecycle.connect_requested() {
                    self.timer = None;
                    self.drop_transport();
                    self.start_connect();
                }
            }
            Command::Close => {
                self.lifecycle.on_manual_close();
                self.timer = None;
                self.pending = None;
                if self.drop_transport() {
                    self.hooks.on_close();
                }
            }
            Command::NetworkRegained => {
                if self.lifecycle.on_network_regained() {
                    tracing::debug!("Network regained, reconnecting now");
                    self.timer = None;
                    self.start_connect();
                }
            }
            Command::Send(frame) => self.write(frame).await,
        }
    }

    fn start_connect(&mut self) {
        let connector = self.connector.clone();
        let url = self.lifecycle.config().url.clone();
        let buffer = self.lifecycle.config().outbound_buffer;
        tracing::debug!(url = %url, "Connecting");
        self.pending = Some(Box::pin(async move { connector.connect(&url, buffer).await }));
    }

    async fn on_connect_result(&mut self, result: Result<Transport, ClientError>) {
        match result {
            Ok(transport) => {
                let reconnected = self.lifecycle.on_open(Instant::now());
                self.outbound = Some(transport.outbound);
                self.inbound = Some(transport.inbound);
                tracing::info!(reconnected, "Connection open");

                self.hooks.on_open();
                if reconnected {
                    self.hooks.on_reconnected();
                }

                if let Some(id) = self.lifecycle.config().id.clone() {
                    self.write(format(events::RECONNECT, json!({ "id": id })).to_string())
                        .await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connection attempt failed");
                self.hooks.on_error(&e);
                let transition = self.lifecycle.on_connect_failed(Instant::now());
                self.apply(transition);
            }
        }
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(raw)) => self.deliver(&raw),
            Some(TransportEvent::Error(message)) => {
                self.hooks.on_error(&ClientError::Transport(message));
            }
            Some(TransportEvent::Closed) | None => {
                self.drop_transport();
                self.hooks.on_close();
                let transition = self.lifecycle.on_close(Instant::now());
                self.apply(transition);
            }
        }
    }

    fn deliver(&self, raw: &str) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        let listener = self
            .listeners
            .get(&envelope.event)
            .map(|l| l.value().clone());
        match listener {
            Some(listener) => listener(envelope.data),
            None => tracing::trace!(event = %envelope.event, "No listener for event"),
        }
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Retry { attempt, delay } => {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
                self.hooks.on_reconnect_attempt(attempt);
                self.timer = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Transition::Failed { attempts } => {
                tracing::warn!(attempts, "Giving up reconnecting");
                self.hooks
                    .on_reconnect_failed(&ClientError::ReconnectExhausted(attempts));
            }
            Transition::Nothing => {}
        }
    }

    async fn write(&mut self, frame: String) {
        let Some(outbound) = &self.outbound else {
            tracing::debug!("Dropping frame, transport not open");
            return;
        };
        if outbound.send(frame).await.is_err() {
            tracing::debug!("Transport writer has stopped");
        }
    }

    /// Release the current transport. Returns true if one was held.
    fn drop_transport(&mut self) -> bool {
        self.inbound = None;
        self.outbound.take().is_some()
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|state| {
            let next = self.lifecycle.state();
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_event(rx: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
