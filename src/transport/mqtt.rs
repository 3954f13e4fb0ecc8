// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport implementation over rumqttc.
//!
//! Maintains one persistent broker connection, forwards inbound traffic as
//! [`TransportEvent`]s, and restores the subscription set after every
//! reconnect (the broker forgets it: sessions are opened non-persistent so
//! a returning client never resumes stale state).

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause between event-loop polls while the connection is down, so a broker
/// outage does not turn into a hot reconnect loop.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// MQTT connection for the resource layer.
///
/// `MqttTransport` is cheaply cloneable (via `Arc`); all clones share one
/// broker connection. Construct it through [`MqttTransport::builder`], which
/// also hands out the [`TransportEvent`] receiver.
///
/// # Examples
///
/// ```no_run
/// use metabus::transport::MqttTransport;
///
/// # async fn example() -> Result<(), metabus::TransportError> {
/// let (transport, events) = MqttTransport::builder()
///     .url("mqtt://192.168.1.50:1883")
///     .client_id("sensor-hub")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MqttTransport {
    inner: Arc<MqttTransportInner>,
}

struct MqttTransportInner {
    /// The MQTT async client for requests.
    client: AsyncClient,
    /// Topics currently subscribed, re-issued after every reconnect.
    subscribed: Mutex<HashSet<String>>,
    /// Connection status.
    connected: AtomicBool,
    /// Set by `disconnect()` so the event pump stops instead of reconnecting.
    closing: AtomicBool,
    host: String,
    port: u16,
}

impl MqttTransport {
    /// Creates a new builder for configuring an MQTT transport.
    #[must_use]
    pub fn builder() -> MqttTransportBuilder {
        MqttTransportBuilder::default()
    }

    /// Returns whether the transport is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.port
    }
}

impl Transport for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.inner
            .client
            .publish(topic, QoS::ExactlyOnce, retain, payload)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        // Track the topic before issuing the request so a reconnect racing
        // the request still restores it.
        let inserted = self.inner.subscribed.lock().insert(topic.to_string());

        match self.inner.client.subscribe(topic, QoS::ExactlyOnce).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if inserted {
                    self.inner.subscribed.lock().remove(topic);
                }
                Err(TransportError::Request(e.to_string()))
            }
        }
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.inner.subscribed.lock().remove(topic);
        self.inner
            .client
            .unsubscribe(topic)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        tracing::info!(
            host = %self.inner.host,
            port = %self.inner.port,
            "Disconnecting from MQTT broker"
        );

        self.inner.closing.store(true, Ordering::Release);
        self.inner.connected.store(false, Ordering::Release);
        self.inner
            .client
            .disconnect()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("host", &self.inner.host)
            .field("port", &self.inner.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for creating an MQTT transport.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use metabus::transport::MqttTransport;
///
/// # async fn example() -> Result<(), metabus::TransportError> {
/// let (transport, events) = MqttTransport::builder()
///     .url("mqtt://192.168.1.50:1883")
///     .client_id("sensor-hub")
///     .credentials("user", "password")
///     .keep_alive(Duration::from_secs(60))
///     .connection_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttTransportBuilder {
    url: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    keep_alive: Option<Duration>,
    connection_timeout: Option<Duration>,
    last_will: Option<(String, Vec<u8>, bool)>,
}

impl MqttTransportBuilder {
    /// Sets the broker URL (e.g. `mqtt://192.168.1.50:1883`).
    ///
    /// Accepts `mqtt://` and `tcp://` schemes or a bare `host[:port]`;
    /// the port defaults to 1883.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the MQTT client identifier.
    ///
    /// Defaults to a random `metabus-<hex>` identifier when unset.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Sets authentication credentials for the broker.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = Some(duration);
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.connection_timeout = Some(duration);
        self
    }

    /// Sets the last-will message the broker publishes if this connection
    /// dies without a clean disconnect.
    #[must_use]
    pub fn last_will(mut self, topic: impl Into<String>, payload: Vec<u8>, retain: bool) -> Self {
        self.last_will = Some((topic.into(), payload, retain));
        self
    }

    /// Builds the transport and connects to the broker.
    ///
    /// Returns the transport together with the receiver for its
    /// [`TransportEvent`]s. Resolves once the broker acknowledges the
    /// connection; the first [`TransportEvent::Connected`] is still
    /// delivered through the channel.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The URL is not set or cannot be parsed
    /// - Connection fails
    /// - Connection times out
    pub async fn build(
        self,
    ) -> Result<(MqttTransport, mpsc::Receiver<TransportEvent>), TransportError> {
        let url = self
            .url
            .ok_or_else(|| TransportError::InvalidAddress("broker URL is required".to_string()))?;
        let (host, port) = parse_mqtt_url(&url)?;

        let client_id = self.client_id.unwrap_or_else(|| {
            let id = uuid::Uuid::new_v4().simple().to_string();
            format!("metabus-{}", &id[..8])
        });

        let mut mqtt_options = MqttOptions::new(&client_id, &host, port);
        mqtt_options.set_keep_alive(self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE));
        mqtt_options.set_clean_session(true);

        if let (Some(username), Some(password)) = (self.username, self.password) {
            mqtt_options.set_credentials(username, password);
        }

        if let Some((topic, payload, retain)) = self.last_will {
            mqtt_options.set_last_will(LastWill::new(topic, payload, QoS::ExactlyOnce, retain));
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let inner = Arc::new(MqttTransportInner {
            client,
            subscribed: Mutex::new(HashSet::new()),
            connected: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            host: host.clone(),
            port,
        });

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Channel to signal when ConnAck is received
        let (connack_tx, connack_rx) = oneshot::channel();

        tokio::spawn(run_event_pump(
            event_loop,
            Arc::clone(&inner),
            events_tx,
            Some(connack_tx),
        ));

        // Wait for ConnAck with timeout
        let timeout = self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %host,
                    port = %port,
                    client_id = %client_id,
                    "Connected to MQTT broker"
                );
            }
            Ok(Err(_)) => {
                return Err(TransportError::ConnectionFailed(
                    "MQTT event loop terminated unexpectedly".to_string(),
                ));
            }
            Err(_) => {
                return Err(TransportError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )));
            }
        }

        Ok((MqttTransport { inner }, events_rx))
    }
}

/// Parses an MQTT URL into host and port.
fn parse_mqtt_url(url: &str) -> Result<(String, u16), TransportError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| TransportError::InvalidAddress(format!("Invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        (url.to_string(), 1883)
    };

    Ok((host, port))
}

/// Drives the rumqttc event loop and forwards traffic to the event channel.
///
/// Exits when the event receiver is dropped (every transport user is gone)
/// or after a requested disconnect; on other connection errors it keeps
/// polling so rumqttc reconnects.
async fn run_event_pump(
    mut event_loop: EventLoop,
    inner: Arc<MqttTransportInner>,
    events_tx: mpsc::Sender<TransportEvent>,
    connack_tx: Option<oneshot::Sender<()>>,
) {
    use rumqttc::{Event, Packet};

    let mut connack_tx = connack_tx;

    loop {
        if events_tx.is_closed() {
            tracing::debug!("MQTT event receiver dropped, stopping event loop");
            break;
        }

        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connected");
                inner.connected.store(true, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }

                // Restore subscriptions from a separate task: awaiting the
                // request channel here would stall the loop that drains it.
                let restore = Arc::clone(&inner);
                let restore_tx = events_tx.clone();
                tokio::spawn(async move {
                    let topics: Vec<String> =
                        restore.subscribed.lock().iter().cloned().collect();
                    for topic in topics {
                        if let Err(e) = restore.client.subscribe(&topic, QoS::ExactlyOnce).await {
                            tracing::warn!(
                                topic = %topic,
                                error = %e,
                                "Failed to restore subscription"
                            );
                        }
                    }
                    let _ = restore_tx.send(TransportEvent::Connected).await;
                });
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::trace!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT message received"
                );
                let message = TransportEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if events_tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                if inner.connected.swap(false, Ordering::AcqRel) {
                    tracing::info!("MQTT broker closed the connection");
                    let event = TransportEvent::Disconnected {
                        reason: "server closed the connection".to_string(),
                    };
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                if inner.closing.load(Ordering::Acquire) {
                    tracing::debug!("MQTT event loop stopped after disconnect");
                    break;
                }
                if inner.connected.swap(false, Ordering::AcqRel) {
                    tracing::warn!(error = %e, "MQTT connection lost");
                    let event = TransportEvent::Disconnected {
                        reason: e.to_string(),
                    };
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mqtt_url_with_port() {
        let (host, port) = parse_mqtt_url("mqtt://192.168.1.50:1883").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_default_port() {
        let (host, port) = parse_mqtt_url("192.168.1.50").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_tcp_scheme() {
        let (host, port) = parse_mqtt_url("tcp://broker.local:8883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_mqtt_url_invalid_port() {
        let result = parse_mqtt_url("broker.local:not-a-port");
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[test]
    fn builder_chain() {
        let builder = MqttTransportBuilder::default()
            .url("mqtt://broker:1883")
            .client_id("my-client")
            .credentials("user", "pass")
            .keep_alive(Duration::from_secs(60))
            .connection_timeout(Duration::from_secs(5))
            .last_will("meta/clients/my-client", Vec::new(), true);

        assert_eq!(builder.url, Some("mqtt://broker:1883".to_string()));
        assert_eq!(builder.client_id, Some("my-client".to_string()));
        assert_eq!(builder.username, Some("user".to_string()));
        assert_eq!(builder.password, Some("pass".to_string()));
        assert_eq!(builder.keep_alive, Some(Duration::from_secs(60)));
        assert_eq!(builder.connection_timeout, Some(Duration::from_secs(5)));
        let (will_topic, will_payload, will_retain) = builder.last_will.unwrap();
        assert_eq!(will_topic, "meta/clients/my-client");
        assert!(will_payload.is_empty());
        assert!(will_retain);
    }

    #[tokio::test]
    async fn builder_missing_url_fails() {
        let result = MqttTransportBuilder::default().build().await;
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }
}
