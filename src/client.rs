// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The high-level client: registration, properties, events and the
//! connection lifecycle behind one cloneable handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::registry::{Behaviour, Directory, DirectorySnapshot, Registration, directory_topic};
use crate::transport::{MqttTransport, Transport, TransportEvent};
use crate::value::Value;
use crate::watch::{Multiplexer, WatchId};

/// Base client identifier used when none is configured.
const DEFAULT_CLIENT_ID: &str = "metabus-client";

/// Client description used when none is configured.
const DEFAULT_DESCRIPTION: &str = "A metabus client.";

/// Unique identifier for a connection listener.
///
/// Returned by [`Client::on_connected`] and [`Client::on_disconnected`];
/// pass it to [`Client::remove_listener`] to detach the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

/// Type alias for connection-established listeners.
type ConnectedCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for connection-lost listeners, invoked with the reason.
type DisconnectedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Shared state behind every clone of a [`Client`].
struct ClientInner<T: Transport> {
    transport: Arc<T>,
    client_id: String,
    multiplexer: Multiplexer<T>,
    directory: Directory<T>,
    connected: AtomicBool,
    next_listener_id: AtomicU64,
    connected_listeners: Mutex<HashMap<ListenerId, ConnectedCallback>>,
    disconnected_listeners: Mutex<HashMap<ListenerId, DisconnectedCallback>>,
}

/// A pub/sub client for directory-announcing message buses.
///
/// The client distinguishes two resource kinds sharing one topic space:
/// *properties* carry a retained last value that new watchers receive on
/// joining, *events* are transient and only reach watchers attached at the
/// time of sending. Everything a client registers is published as a retained
/// directory snapshot under `meta/clients/<clientId>`, and the broker wipes
/// that snapshot via the connection's last will when the client dies.
///
/// Cloning is cheap and every clone drives the same connection.
///
/// # Examples
///
/// ```ignore
/// use metabus::{Behaviour, Client};
/// use serde_json::json;
///
/// let client = Client::builder("mqtt://192.168.1.50")
///     .description("Kitchen lamp driver")
///     .build()
///     .await?;
///
/// client
///     .register("lamp/power", Behaviour::PropertyOneToMany, "Lamp power state")
///     .await?;
/// client.set_property("lamp/power", json!(true)).await?;
///
/// let watch = client
///     .watch_event("kitchen/motion", |topic, value| {
///         println!("{topic}: {value}");
///     })
///     .await?;
/// ```
pub struct Client<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

impl Client<MqttTransport> {
    /// Creates a builder for a client connected over MQTT.
    #[must_use]
    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            url: url.into(),
            client_id: None,
            unique_client_id: true,
            description: None,
            credentials: None,
            keep_alive: None,
            connection_timeout: None,
        }
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client on top of an already-built transport.
    ///
    /// `events` must be the event stream paired with `transport`. Session
    /// setup is the caller's responsibility here; in particular, nothing
    /// arranges the last will that removes `meta/clients/<clientId>` when
    /// the connection dies. [`ClientBuilder`] does both for MQTT.
    #[must_use]
    pub fn with_transport(
        transport: Arc<T>,
        events: mpsc::Receiver<TransportEvent>,
        client_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let client_id = client_id.into();
        let inner = Arc::new(ClientInner {
            multiplexer: Multiplexer::new(Arc::clone(&transport)),
            directory: Directory::new(Arc::clone(&transport), &client_id, description),
            transport,
            client_id,
            connected: AtomicBool::new(false),
            next_listener_id: AtomicU64::new(1),
            connected_listeners: Mutex::new(HashMap::new()),
            disconnected_listeners: Mutex::new(HashMap::new()),
        });
        Self::spawn_dispatcher(&inner, events);
        Self { inner }
    }

    /// Spawns the task routing transport events into the client.
    ///
    /// The task holds the inner state weakly: dropping the last client
    /// handle ends it, it never keeps the client alive on its own.
    fn spawn_dispatcher(inner: &Arc<ClientInner<T>>, mut events: mpsc::Receiver<TransportEvent>) {
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match event {
                    TransportEvent::Connected => {
                        inner.connected.store(true, Ordering::Release);
                        tracing::info!(
                            client_id = %inner.client_id,
                            "Connected, announcing registration directory"
                        );
                        inner.directory.trigger();
                        let listeners: Vec<ConnectedCallback> =
                            inner.connected_listeners.lock().values().cloned().collect();
                        for listener in listeners {
                            listener();
                        }
                    }
                    TransportEvent::Disconnected { reason } => {
                        inner.connected.store(false, Ordering::Release);
                        tracing::info!(
                            client_id = %inner.client_id,
                            reason = %reason,
                            "Connection lost"
                        );
                        let listeners: Vec<DisconnectedCallback> = inner
                            .disconnected_listeners
                            .lock()
                            .values()
                            .cloned()
                            .collect();
                        for listener in listeners {
                            listener(&reason);
                        }
                    }
                    TransportEvent::Message { topic, payload } => {
                        if let Err(e) = inner.multiplexer.dispatch(&topic, &payload) {
                            tracing::warn!(
                                topic = %topic,
                                error = %e,
                                "Dropping undecodable message"
                            );
                        }
                    }
                }
            }
            tracing::debug!("Transport event stream ended");
        });
    }

    /// Returns this client's identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Returns this client's human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.inner.directory.description()
    }

    /// Returns whether the transport currently has a live connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Registers `path` in this client's directory and publishes the
    /// updated snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing the directory snapshot fails.
    pub async fn register(
        &self,
        path: impl Into<String>,
        behaviour: Behaviour,
        description: impl Into<String>,
    ) -> Result<()> {
        self.register_with(path, Registration::new(behaviour, description))
            .await
    }

    /// Registers `path` with full control over the registration entry,
    /// including disconnect options.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing the directory snapshot fails.
    pub async fn register_with(
        &self,
        path: impl Into<String>,
        registration: Registration,
    ) -> Result<()> {
        self.inner.directory.set_entry(path, registration).await?;
        Ok(())
    }

    /// Removes `path` from this client's directory and publishes the
    /// updated snapshot. Unknown paths republish unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing the directory snapshot fails.
    pub async fn unregister(&self, path: &str) -> Result<()> {
        self.inner.directory.remove_entry(path).await?;
        Ok(())
    }

    /// Forces a republish of the registration directory and waits for it.
    ///
    /// Registrations publish on their own; this is for recovering from
    /// situations the client cannot see, such as a registrar restart.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing the directory snapshot fails.
    pub async fn send_registration(&self) -> Result<()> {
        self.inner.directory.publish().await?;
        Ok(())
    }

    /// Returns a copy of the directory as currently registered.
    #[must_use]
    pub fn registrations(&self) -> DirectorySnapshot {
        self.inner.directory.snapshot()
    }

    /// Watches a property topic.
    ///
    /// The callback runs on every value change and on deletion (with
    /// [`Value::Absent`]). If the property already has a known value, the
    /// callback additionally receives that value once, shortly after this
    /// call returns.
    ///
    /// # Errors
    ///
    /// Returns an error if subscribing fails; no watcher is attached then.
    pub async fn watch_property<F>(&self, topic: &str, callback: F) -> Result<WatchId>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        Ok(self.inner.multiplexer.watch(topic, callback, true).await?)
    }

    /// Stops watching a property topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the final unsubscribe fails; the watcher is
    /// detached regardless.
    pub async fn unwatch_property(&self, topic: &str, id: WatchId) -> Result<()> {
        Ok(self.inner.multiplexer.unwatch(topic, id).await?)
    }

    /// Watches an event topic.
    ///
    /// The callback runs for events arriving while the watch is attached;
    /// there is no replay of past events.
    ///
    /// # Errors
    ///
    /// Returns an error if subscribing fails; no watcher is attached then.
    pub async fn watch_event<F>(&self, topic: &str, callback: F) -> Result<WatchId>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        Ok(self.inner.multiplexer.watch(topic, callback, false).await?)
    }

    /// Stops watching an event topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the final unsubscribe fails; the watcher is
    /// detached regardless.
    pub async fn unwatch_event(&self, topic: &str, id: WatchId) -> Result<()> {
        Ok(self.inner.multiplexer.unwatch(topic, id).await?)
    }

    /// Sets a property to the given value.
    ///
    /// The value is published retained: watchers joining later still
    /// receive it.
    ///
    /// # Errors
    ///
    /// Returns an error if the publish fails.
    pub async fn set_property(&self, topic: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        tracing::debug!(topic = %topic, value = %value, "Setting property");
        self.inner
            .transport
            .publish(topic, value.encode(), true)
            .await?;
        Ok(())
    }

    /// Deletes a property.
    ///
    /// Publishes a retained empty payload, clearing the broker-side value;
    /// watchers observe the deletion as [`Value::Absent`].
    ///
    /// # Errors
    ///
    /// Returns an error if the publish fails.
    pub async fn delete_property(&self, topic: &str) -> Result<()> {
        tracing::debug!(topic = %topic, "Deleting property");
        self.inner
            .transport
            .publish(topic, Value::Absent.encode(), true)
            .await?;
        Ok(())
    }

    /// Sends an event with the given value.
    ///
    /// Events are not retained; only currently attached watchers see them.
    ///
    /// # Errors
    ///
    /// Returns an error if the publish fails.
    pub async fn send_event(&self, topic: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        tracing::debug!(topic = %topic, value = %value, "Sending event");
        self.inner
            .transport
            .publish(topic, value.encode(), false)
            .await?;
        Ok(())
    }

    /// Registers a listener invoked whenever the connection is established,
    /// including reconnects.
    pub fn on_connected<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        self.inner
            .connected_listeners
            .lock()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a listener invoked whenever the connection is lost, with
    /// the reason.
    pub fn on_disconnected<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        self.inner
            .disconnected_listeners
            .lock()
            .insert(id, Arc::new(callback));
        id
    }

    /// Removes a connection listener. Returns `false` if the ID is not
    /// attached (e.g. already removed).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.connected_listeners.lock().remove(&id).is_some()
            || self
                .inner
                .disconnected_listeners
                .lock()
                .remove(&id)
                .is_some()
    }

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Disconnects from the broker.
    ///
    /// Watcher bookkeeping is dropped without per-topic unsubscribes; the
    /// last will takes care of removing the registration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport refuses the disconnect request.
    pub async fn disconnect(&self) -> Result<()> {
        tracing::info!(client_id = %self.inner.client_id, "Disconnecting");
        self.inner.connected.store(false, Ordering::Release);
        self.inner.multiplexer.clear();
        self.inner.transport.disconnect().await?;
        Ok(())
    }
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.inner.client_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for a [`Client`] over MQTT.
///
/// Created via [`Client::builder`].
#[derive(Debug)]
pub struct ClientBuilder {
    url: String,
    client_id: Option<String>,
    unique_client_id: bool,
    description: Option<String>,
    credentials: Option<(String, String)>,
    keep_alive: Option<Duration>,
    connection_timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Sets the client identifier (default: `metabus-client`).
    ///
    /// A random suffix is still appended unless
    /// [`unique_client_id`](Self::unique_client_id) is disabled.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Controls whether a random suffix is appended to the client
    /// identifier (default: `true`).
    ///
    /// The suffix keeps concurrently running instances of the same program
    /// from fighting over one broker session. Disable it only for clients
    /// whose identity must be stable across restarts.
    #[must_use]
    pub fn unique_client_id(mut self, unique: bool) -> Self {
        self.unique_client_id = unique;
        self
    }

    /// Sets the human-readable description published in the registration
    /// directory (default: `A metabus client.`).
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets authentication credentials for the broker.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = Some(duration);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.connection_timeout = Some(duration);
        self
    }

    /// Resolves the effective client identifier.
    fn resolve_client_id(&self) -> String {
        let base = self
            .client_id
            .clone()
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        if self.unique_client_id {
            format!(
                "{base}-{}",
                &uuid::Uuid::new_v4().simple().to_string()[..8]
            )
        } else {
            base
        }
    }

    /// Connects to the broker and builds the client.
    ///
    /// The connection carries a last will that clears the retained
    /// directory snapshot at `meta/clients/<clientId>` if this client dies
    /// without a clean disconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker URL is invalid or the connection
    /// cannot be established within the timeout.
    pub async fn build(self) -> Result<Client<MqttTransport>> {
        let client_id = self.resolve_client_id();
        let description = self
            .description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

        let mut builder = MqttTransport::builder()
            .url(self.url)
            .client_id(&client_id)
            .last_will(directory_topic(&client_id), Vec::new(), true);
        if let Some((username, password)) = self.credentials {
            builder = builder.credentials(username, password);
        }
        if let Some(keep_alive) = self.keep_alive {
            builder = builder.keep_alive(keep_alive);
        }
        if let Some(timeout) = self.connection_timeout {
            builder = builder.connection_timeout(timeout);
        }

        let (transport, events) = builder.build().await?;
        Ok(Client::with_transport(
            Arc::new(transport),
            events,
            client_id,
            description,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn client(
        transport: &Arc<MockTransport>,
    ) -> (Client<MockTransport>, mpsc::Sender<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let client = Client::with_transport(
            Arc::clone(transport),
            events_rx,
            "test-client",
            "A test client",
        );
        (client, events_tx)
    }

    #[tokio::test]
    async fn connection_event_triggers_directory_announcement() {
        let transport = MockTransport::new();
        let (client, events) = client(&transport);

        client
            .register("lamp/power", Behaviour::PropertyOneToMany, "Lamp power")
            .await
            .unwrap();
        let sent_before = transport.publishes().len();
        assert!(!client.is_connected());

        events.send(TransportEvent::Connected).await.unwrap();
        transport.wait_for_publishes(sent_before + 1).await;

        assert!(client.is_connected());
        let last = transport.publishes().last().unwrap().clone();
        assert_eq!(last.topic, "meta/clients/test-client");
        assert!(last.retain);
        assert!(last.json()["topics"].get("lamp/power").is_some());
    }

    #[tokio::test]
    async fn registration_edits_during_send_coalesce() {
        let transport = MockTransport::new();
        let (client, _events) = client(&transport);
        transport.gate_publishes();

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.send_registration().await })
        };
        transport.wait_for_publishes(1).await;
        assert_eq!(transport.publishes()[0].json()["topics"], json!({}));

        let mut edits = Vec::new();
        for path in ["a/x", "a/y", "a/z"] {
            let client = client.clone();
            edits.push(tokio::spawn(async move {
                client
                    .register(path, Behaviour::EventOneToMany, "An event")
                    .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.pending_publishes(), 1);

        transport.release_publish(Ok(()));
        transport.wait_for_publishes(2).await;
        transport.release_publish(Ok(()));

        first.await.unwrap().unwrap();
        for edit in edits {
            edit.await.unwrap().unwrap();
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        let publishes = transport.publishes();
        assert_eq!(publishes.len(), 2);
        let topics = &publishes[1].json()["topics"];
        assert!(topics.get("a/x").is_some());
        assert!(topics.get("a/y").is_some());
        assert!(topics.get("a/z").is_some());
    }

    #[tokio::test]
    async fn set_and_delete_property_wire_shape() {
        let transport = MockTransport::new();
        let (client, _events) = client(&transport);

        client.set_property("lamp/power", json!(true)).await.unwrap();
        client.delete_property("lamp/power").await.unwrap();

        let publishes = transport.publishes();
        assert_eq!(publishes[0].topic, "lamp/power");
        assert_eq!(publishes[0].payload, b"true");
        assert!(publishes[0].retain);

        assert_eq!(publishes[1].topic, "lamp/power");
        assert!(publishes[1].payload.is_empty());
        assert!(publishes[1].retain);
    }

    #[tokio::test]
    async fn events_are_published_unretained() {
        let transport = MockTransport::new();
        let (client, _events) = client(&transport);

        client
            .send_event("kitchen/motion", json!({"zone": 2}))
            .await
            .unwrap();
        client.send_event("kitchen/ping", json!(null)).await.unwrap();

        let publishes = transport.publishes();
        assert_eq!(publishes[0].json(), json!({"zone": 2}));
        assert!(!publishes[0].retain);
        assert_eq!(publishes[1].payload, b"null");
        assert!(!publishes[1].retain);
    }

    #[tokio::test]
    async fn deletion_reaches_watchers_as_absent() {
        let transport = MockTransport::new();
        let (client, events) = client(&transport);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_callback = Arc::clone(&seen);
        client
            .watch_property("lamp/power", move |_, value| {
                seen_in_callback.lock().push(value.clone());
            })
            .await
            .unwrap();

        events
            .send(TransportEvent::Message {
                topic: "lamp/power".to_string(),
                payload: b"true".to_vec(),
            })
            .await
            .unwrap();
        events
            .send(TransportEvent::Message {
                topic: "lamp/power".to_string(),
                payload: Vec::new(),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(*seen.lock(), vec![Value::Json(json!(true)), Value::Absent]);
    }

    #[tokio::test]
    async fn undecodable_message_is_dropped_and_stream_continues() {
        let transport = MockTransport::new();
        let (client, events) = client(&transport);

        let counter = Arc::new(AtomicU32::new(0));
        let counter_in_callback = Arc::clone(&counter);
        client
            .watch_event("kitchen/motion", move |_, _| {
                counter_in_callback.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        events
            .send(TransportEvent::Message {
                topic: "kitchen/motion".to_string(),
                payload: b"{not json".to_vec(),
            })
            .await
            .unwrap();
        events
            .send(TransportEvent::Message {
                topic: "kitchen/motion".to_string(),
                payload: b"1".to_vec(),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connection_listeners_fire_and_remove() {
        let transport = MockTransport::new();
        let (client, events) = client(&transport);

        let connects = Arc::new(AtomicU32::new(0));
        let connects_in_callback = Arc::clone(&connects);
        let connect_id = client.on_connected(move || {
            connects_in_callback.fetch_add(1, Ordering::SeqCst);
        });

        let reasons = Arc::new(Mutex::new(Vec::new()));
        let reasons_in_callback = Arc::clone(&reasons);
        client.on_disconnected(move |reason| {
            reasons_in_callback.lock().push(reason.to_string());
        });

        events.send(TransportEvent::Connected).await.unwrap();
        events
            .send(TransportEvent::Disconnected {
                reason: "connection reset".to_string(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(*reasons.lock(), vec!["connection reset".to_string()]);
        assert!(!client.is_connected());

        assert!(client.remove_listener(connect_id));
        assert!(!client.remove_listener(connect_id));

        events.send(TransportEvent::Connected).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn disconnect_clears_watches_and_closes_transport() {
        let transport = MockTransport::new();
        let (client, _events) = client(&transport);

        client.watch_event("a/x", |_, _| {}).await.unwrap();
        client.watch_property("a/y", |_, _| {}).await.unwrap();

        client.disconnect().await.unwrap();

        assert!(transport.is_disconnected());
        assert!(client.inner.multiplexer.is_empty());
        assert!(transport.unsubscribes().is_empty());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn unregister_republishes_without_the_path() {
        let transport = MockTransport::new();
        let (client, _events) = client(&transport);

        client
            .register("a/x", Behaviour::EventOneToMany, "X")
            .await
            .unwrap();
        client.unregister("a/x").await.unwrap();

        assert!(client.registrations().topics.is_empty());
        let last = transport.publishes().last().unwrap().json();
        assert_eq!(last["topics"], json!({}));
    }

    #[test]
    fn builder_defaults() {
        let builder = Client::builder("mqtt://localhost");
        assert!(builder.client_id.is_none());
        assert!(builder.unique_client_id);
        assert!(builder.description.is_none());

        let id = builder.resolve_client_id();
        assert!(id.starts_with("metabus-client-"));
        assert_eq!(id.len(), "metabus-client-".len() + 8);
    }

    #[test]
    fn builder_exact_client_id() {
        let builder = Client::builder("mqtt://localhost")
            .client_id("hallway-sensor")
            .unique_client_id(false)
            .description("Hallway PIR")
            .credentials("user", "pass")
            .keep_alive(Duration::from_secs(10))
            .connection_timeout(Duration::from_secs(3));

        assert_eq!(builder.resolve_client_id(), "hallway-sensor");
        assert_eq!(builder.description.as_deref(), Some("Hallway PIR"));
        assert_eq!(
            builder.credentials,
            Some(("user".to_string(), "pass".to_string()))
        );
    }

    #[test]
    fn listener_id_display() {
        assert_eq!(ListenerId(7).to_string(), "Listener(7)");
    }
}
