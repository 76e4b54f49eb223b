//! MQTT link manager
//!
//! Owns one TLS-protected MQTT session to one printer. After the initial
//! handshake an IO task drives the `rumqttc` event loop, forwards publishes
//! in arrival order through a bounded channel, and reconnects at a fixed
//! interval until the attempt cap is reached.

use super::tls::transport_for;
use super::{Publisher, TopicSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode, Transport,
};
use spoolwatch_core::{thread_safe_rw, ConnectionError, LinkConfig, LinkState, ThreadSafeRw};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Largest packet accepted or sent; full reports run to tens of kilobytes
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Requests buffered between the client handle and the event loop
const REQUEST_CAPACITY: usize = 64;

/// Time allowed to flush a DISCONNECT before the socket is dropped
const DISCONNECT_FLUSH: Duration = Duration::from_millis(250);

/// A publish received from the printer
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Topic the message arrived on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Receive time
    pub received_at: DateTime<Utc>,
}

/// State shared between the manager and its IO task
#[derive(Clone)]
struct Shared {
    serial: String,
    state: ThreadSafeRw<LinkState>,
    client: ThreadSafeRw<Option<AsyncClient>>,
    subscriptions: ThreadSafeRw<Vec<String>>,
}

impl Shared {
    fn set_state(&self, state: LinkState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!(serial = %self.serial, from = %previous, to = %state, "Link state changed");
        }
    }
}

/// Connection, subscription, and reconnection for one printer
pub struct LinkManager {
    config: LinkConfig,
    topics: TopicSet,
    client_id: String,
    transport: Transport,
    shared: Shared,
    inbound_tx: mpsc::Sender<InboundMessage>,
    shutdown_tx: ThreadSafeRw<Option<watch::Sender<bool>>>,
    io_task: ThreadSafeRw<Option<JoinHandle<()>>>,
}

impl LinkManager {
    /// Create a manager and the receiver its inbound messages arrive on
    pub fn new(config: LinkConfig, inbound_capacity: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));
        let topics = TopicSet::for_serial(&config.serial);
        let client_id = generate_client_id();
        let transport = transport_for(&config);

        let manager = Self {
            shared: Shared {
                serial: config.serial.clone(),
                state: thread_safe_rw(LinkState::Disconnected),
                client: thread_safe_rw(None),
                subscriptions: thread_safe_rw(Vec::new()),
            },
            config,
            topics,
            client_id,
            transport,
            inbound_tx,
            shutdown_tx: thread_safe_rw(None),
            io_task: thread_safe_rw(None),
        };
        (manager, inbound_rx)
    }

    /// Link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Topics for this printer
    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// MQTT client identifier used for every session of this manager
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current connection state
    pub fn status(&self) -> LinkState {
        *self.shared.state.read()
    }

    /// Establish the session
    ///
    /// Resolves once the broker acknowledges the connection. Fails with
    /// [`ConnectionError::ConnectionTimeout`] when the handshake exceeds the
    /// configured timeout, or [`ConnectionError::FailedToConnect`] on a
    /// transport or authentication error. Calling it while a session is
    /// already running is a no-op.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        if self.io_running() {
            tracing::debug!(serial = %self.config.serial, "Connect requested while link is running");
            return Ok(());
        }
        self.validate()?;

        self.shared.set_state(LinkState::Connecting);
        tracing::info!(
            serial = %self.config.serial,
            host = %self.config.host,
            port = self.config.port,
            client_id = %self.client_id,
            "Connecting to printer"
        );

        let (client, mut eventloop) = AsyncClient::new(self.mqtt_options(), REQUEST_CAPACITY);

        let handshake = tokio::time::timeout(
            self.config.connect_timeout,
            await_connack(&mut eventloop, &self.config),
        )
        .await;

        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.shared.set_state(LinkState::Disconnected);
                tracing::error!(serial = %self.config.serial, error = %e, "Connection failed");
                return Err(e);
            }
            Err(_) => {
                self.shared.set_state(LinkState::Disconnected);
                let e = ConnectionError::ConnectionTimeout {
                    timeout_ms: self.config.connect_timeout.as_millis() as u64,
                };
                tracing::error!(serial = %self.config.serial, error = %e, "Connection failed");
                return Err(e);
            }
        }

        *self.shared.client.write() = Some(client);
        self.shared.set_state(LinkState::Connected);
        tracing::info!(serial = %self.config.serial, "Connected to printer");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.write() = Some(shutdown_tx);

        let io = IoLoop {
            shared: self.shared.clone(),
            inbound_tx: self.inbound_tx.clone(),
            reconnect_interval: self.config.reconnect_interval,
            max_attempts: self.config.max_reconnect_attempts,
        };
        let handle = tokio::spawn(io.run(eventloop, shutdown_rx));
        *self.io_task.write() = Some(handle);

        Ok(())
    }

    /// Subscribe to the printer's report, status, progress, and material topics
    ///
    /// A topic that fails is logged and skipped; the others still go out.
    /// The topics are remembered and re-subscribed after every reconnect.
    /// Returns the number of subscriptions sent, or an error when none could
    /// be sent.
    pub async fn subscribe_to_topics(&self) -> Result<usize, ConnectionError> {
        let client = self.client()?;
        *self.shared.subscriptions.write() = self.topics.subscriptions.clone();

        let mut sent = 0;
        let mut last_error = None;
        for topic in &self.topics.subscriptions {
            match client.subscribe(topic.as_str(), QoS::AtMostOnce).await {
                Ok(()) => {
                    tracing::debug!(serial = %self.config.serial, topic = %topic, "Subscribed");
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(serial = %self.config.serial, topic = %topic, error = %e, "Subscribe failed");
                    last_error = Some(ConnectionError::SubscribeFailed {
                        topic: topic.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        match last_error {
            Some(e) if sent == 0 => Err(e),
            _ => {
                tracing::info!(serial = %self.config.serial, topics = sent, "Subscriptions sent");
                Ok(sent)
            }
        }
    }

    /// Tear down the session and stop any pending reconnection
    ///
    /// Safe to call repeatedly or before `connect`.
    pub async fn disconnect(&self) {
        let client = self.shared.client.write().take();
        if let Some(client) = client {
            if let Err(e) = client.try_disconnect() {
                tracing::debug!(serial = %self.config.serial, error = %e, "Disconnect request not queued");
            }
        }

        if let Some(tx) = self.shutdown_tx.write().take() {
            let _ = tx.send(true);
        }

        let handle = self.io_task.write().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(DISCONNECT_FLUSH * 4, handle).await.is_err() {
                abort.abort();
            }
            tracing::info!(serial = %self.config.serial, "Disconnected from printer");
        }

        self.shared.set_state(LinkState::Disconnected);
    }

    fn io_running(&self) -> bool {
        self.io_task
            .read()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn client(&self) -> Result<AsyncClient, ConnectionError> {
        if let LinkState::Failed { attempts } = self.status() {
            return Err(ConnectionError::ReconnectExhausted { attempts });
        }
        self.shared
            .client
            .read()
            .clone()
            .ok_or_else(|| ConnectionError::NotConnected {
                serial: self.config.serial.clone(),
            })
    }

    fn validate(&self) -> Result<(), ConnectionError> {
        let reason = if self.config.host.trim().is_empty() {
            Some("host is empty")
        } else if self.config.serial.trim().is_empty() {
            Some("serial is empty")
        } else if self.config.port == 0 {
            Some("port is zero")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ConnectionError::InvalidParameters {
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keepalive);
        options.set_credentials(&self.config.username, &self.config.access_code);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        options.set_transport(self.transport.clone());
        options
    }
}

#[async_trait]
impl Publisher for LinkManager {
    fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ConnectionError> {
        let client = self.client()?;
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected {
                serial: self.config.serial.clone(),
            });
        }
        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| ConnectionError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.write().take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.io_task.write().take() {
            handle.abort();
        }
    }
}

/// Poll until the broker answers the CONNECT
async fn await_connack(eventloop: &mut EventLoop, config: &LinkConfig) -> Result<(), ConnectionError> {
    let failed = |reason: String| ConnectionError::FailedToConnect {
        host: config.host.clone(),
        port: config.port,
        reason,
    };

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(failed(format!("broker refused connection: {:?}", code))),
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(failed(e.to_string())),
        }
    }
}

/// Background task that owns the event loop after the handshake
struct IoLoop {
    shared: Shared,
    inbound_tx: mpsc::Sender<InboundMessage>,
    reconnect_interval: Duration,
    max_attempts: u32,
}

impl IoLoop {
    async fn run(self, mut eventloop: EventLoop, mut shutdown_rx: watch::Receiver<bool>) {
        let serial = self.shared.serial.clone();
        let mut attempts: u32 = 0;

        loop {
            let event = tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = tokio::time::timeout(DISCONNECT_FLUSH, eventloop.poll()).await;
                    break;
                }
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                        received_at: Utc::now(),
                    };
                    if self.inbound_tx.send(message).await.is_err() {
                        tracing::debug!(serial = %serial, "Inbound receiver dropped, stopping link");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        if attempts > 0 {
                            tracing::info!(serial = %serial, attempts, "Reconnected to printer");
                        }
                        attempts = 0;
                        self.shared.set_state(LinkState::Connected);
                        self.resubscribe();
                    } else {
                        tracing::warn!(serial = %serial, code = ?ack.code, "Broker refused reconnection");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    let rejected = ack
                        .return_codes
                        .iter()
                        .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                        .count();
                    if rejected > 0 {
                        tracing::warn!(serial = %serial, rejected, "Broker rejected subscriptions");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    let lost = ConnectionError::ConnectionLost {
                        reason: e.to_string(),
                    };

                    attempts += 1;
                    if attempts > self.max_attempts {
                        tracing::error!(
                            serial = %serial,
                            attempts = self.max_attempts,
                            error = %lost,
                            "Reconnection attempts exhausted"
                        );
                        self.shared.set_state(LinkState::Failed {
                            attempts: self.max_attempts,
                        });
                        *self.shared.client.write() = None;
                        break;
                    }

                    tracing::warn!(
                        serial = %serial,
                        attempt = attempts,
                        max = self.max_attempts,
                        error = %lost,
                        "Connection lost, retrying"
                    );
                    self.shared
                        .set_state(LinkState::Reconnecting { attempt: attempts });

                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = tokio::time::sleep(self.reconnect_interval) => {}
                    }
                }
            }
        }

        tracing::debug!(serial = %serial, "Link IO task stopped");
    }

    fn resubscribe(&self) {
        let client = self.shared.client.read().clone();
        let Some(client) = client else {
            return;
        };
        let topics = self.shared.subscriptions.read().clone();
        for topic in topics {
            if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                tracing::warn!(serial = %self.shared.serial, topic = %topic, error = %e, "Resubscribe failed");
            }
        }
    }
}

fn generate_client_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("spoolwatch_{}", &id[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// CONNACK, session not present, accepted
    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    /// Plain-TCP broker stand-in
    ///
    /// The first session is acknowledged and then dropped. Later sessions
    /// are closed before the CONNACK until `recover` is set, after which
    /// they are acknowledged and held open.
    struct FlakyBroker {
        port: u16,
        sessions: Arc<AtomicUsize>,
        recover: Arc<AtomicBool>,
    }

    impl FlakyBroker {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let sessions = Arc::new(AtomicUsize::new(0));
            let recover = Arc::new(AtomicBool::new(false));

            let (count, healthy) = (sessions.clone(), recover.clone());
            tokio::spawn(async move {
                let mut held = Vec::new();
                while let Ok((mut socket, _)) = listener.accept().await {
                    let index = count.fetch_add(1, Ordering::SeqCst);
                    let mut connect = [0u8; 512];
                    let _ = socket.read(&mut connect).await;

                    if healthy.load(Ordering::SeqCst) {
                        let _ = socket.write_all(&CONNACK).await;
                        held.push(socket);
                    } else if index == 0 {
                        let _ = socket.write_all(&CONNACK).await;
                        let _ = socket.flush().await;
                    }
                }
            });

            Self {
                port,
                sessions,
                recover,
            }
        }
    }

    fn config(port: u16) -> LinkConfig {
        let mut config = LinkConfig::new("127.0.0.1", "12345678", "01S00A");
        config.port = port;
        config.connect_timeout = Duration::from_millis(300);
        config
    }

    #[test]
    fn test_client_id_shape() {
        let id = generate_client_id();
        assert!(id.starts_with("spoolwatch_"));
        assert_eq!(id.len(), "spoolwatch_".len() + 12);
        assert_ne!(id, generate_client_id());
    }

    #[tokio::test]
    async fn test_new_manager_is_disconnected() {
        let (link, _rx) = LinkManager::new(config(8883), 8);
        assert_eq!(link.status(), LinkState::Disconnected);
        assert!(!link.is_connected());
        assert_eq!(link.topics().request, "device/01S00A/request");
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let (link, _rx) = LinkManager::new(config(8883), 8);
        assert!(matches!(
            link.subscribe_to_topics().await,
            Err(ConnectionError::NotConnected { .. })
        ));
        assert!(matches!(
            link.publish("device/01S00A/request", b"{}".to_vec()).await,
            Err(ConnectionError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (link, _rx) = LinkManager::new(config(8883), 8);
        link.disconnect().await;
        link.disconnect().await;
        assert_eq!(link.status(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let mut cfg = config(8883);
        cfg.host = String::new();
        let (link, _rx) = LinkManager::new(cfg, 8);
        assert!(matches!(
            link.connect().await,
            Err(ConnectionError::InvalidParameters { .. })
        ));
        assert_eq!(link.status(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_connection_fails() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let (link, _rx) = LinkManager::new(config(port), 8);

        let err = link.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::FailedToConnect { .. }));
        assert_eq!(link.status(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_silent_broker_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept and hold the socket without ever answering the handshake
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (link, _rx) = LinkManager::new(config(port), 8);
        let err = link.connect().await.unwrap_err();
        assert_eq!(err, ConnectionError::ConnectionTimeout { timeout_ms: 300 });
        assert_eq!(link.status(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_is_bounded_and_recoverable() {
        let broker = FlakyBroker::start().await;
        let mut cfg = config(broker.port);
        cfg.max_reconnect_attempts = 2;
        cfg.reconnect_interval = Duration::from_millis(100);
        let (mut link, _rx) = LinkManager::new(cfg, 8);
        link.transport = Transport::Tcp;

        link.connect().await.unwrap();

        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let state = link.status();
            if seen.last() != Some(&state) {
                seen.push(state);
            }
            if matches!(state, LinkState::Failed { .. }) {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "link never gave up: {seen:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let attempts: Vec<u32> = seen
            .iter()
            .filter_map(|state| match state {
                LinkState::Reconnecting { attempt } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2]);
        assert_eq!(link.status(), LinkState::Failed { attempts: 2 });
        assert!(link.shared.client.read().is_none());
        assert_eq!(broker.sessions.load(Ordering::SeqCst), 3);
        assert_eq!(
            link.publish("device/01S00A/request", b"{}".to_vec()).await,
            Err(ConnectionError::ReconnectExhausted { attempts: 2 })
        );

        // Only an explicit connect brings the link back
        broker.recover.store(true, Ordering::SeqCst);
        link.connect().await.unwrap();
        assert_eq!(link.status(), LinkState::Connected);
        assert!(link.is_connected());

        link.disconnect().await;
        assert_eq!(link.status(), LinkState::Disconnected);
    }
}
