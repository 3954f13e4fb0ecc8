// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Watcher registry mapping topics to callbacks and cached values.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{DecodeError, TransportError};
use crate::transport::Transport;
use crate::value::Value;

/// Unique identifier for an attached watcher.
///
/// This ID is returned when attaching a watcher and is the handle for
/// detaching it later. IDs are unique within a multiplexer's lifetime, so
/// two watchers running the same closure stay independently removable.
///
/// # Examples
///
/// ```ignore
/// let id = client.watch_property("home/temp", |_topic, value| { /* ... */ }).await?;
///
/// // Later, stop watching
/// client.unwatch_property("home/temp", id).await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    /// Creates a new watch ID with the given value.
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watch({})", self.0)
    }
}

/// Type alias for watcher callbacks.
type WatchCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// State kept per watched topic.
struct WatchEntry {
    /// Watchers in attach order. The same closure may be attached twice
    /// under different IDs; both are invoked on every message.
    callbacks: Vec<(WatchId, WatchCallback)>,
    /// Most recent value delivered for this topic, including the absent
    /// marker after a deletion. `None` until the first inbound message.
    last_value: Option<Value>,
}

/// Fan-out registry multiplexing watchers onto transport subscriptions.
///
/// An entry exists for a topic exactly while it has at least one watcher:
/// attaching the first watcher subscribes at the transport, detaching the
/// last one unsubscribes. Inbound messages are decoded once, cached as the
/// topic's last value, and fanned out to every watcher in attach order.
pub struct Multiplexer<T: Transport> {
    transport: Arc<T>,
    /// Counter for generating unique watch IDs.
    next_id: AtomicU64,
    /// Shared with replay tasks, which re-check it at delivery time.
    entries: Arc<Mutex<HashMap<String, WatchEntry>>>,
}

impl<T: Transport> Multiplexer<T> {
    /// Creates an empty multiplexer over the given transport.
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Generates a new unique watch ID.
    fn next_id(&self) -> WatchId {
        WatchId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Attaches a watcher to `topic`, subscribing at the transport if this
    /// is the topic's first watcher.
    ///
    /// For property topics (`is_property`), a watcher joining a topic that
    /// already has a cached value receives that value once, asynchronously,
    /// after this call returns; existing watchers hear nothing from the
    /// replay.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the underlying subscribe fails. The
    /// watcher is rolled back in that case, so a later attempt re-issues
    /// the subscribe instead of joining an entry the broker never heard of.
    pub async fn watch<F>(
        &self,
        topic: &str,
        callback: F,
        is_property: bool,
    ) -> Result<WatchId, TransportError>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let callback: WatchCallback = Arc::new(callback);

        // `Some(replay)` when an entry already existed. The first watcher
        // inserts its entry before awaiting the subscribe so a concurrent
        // watch of the same topic joins instead of double-subscribing.
        let joined = {
            let mut entries = self.entries.lock();
            match entries.get_mut(topic) {
                Some(entry) => {
                    entry.callbacks.push((id, Arc::clone(&callback)));
                    Some(is_property && entry.last_value.is_some())
                }
                None => {
                    entries.insert(
                        topic.to_string(),
                        WatchEntry {
                            callbacks: vec![(id, Arc::clone(&callback))],
                            last_value: None,
                        },
                    );
                    None
                }
            }
        };

        match joined {
            Some(replay) => {
                tracing::trace!(topic = %topic, watch = %id, "Joined existing watch");
                if replay {
                    self.schedule_replay(topic, id, callback);
                }
                Ok(id)
            }
            None => {
                tracing::debug!(topic = %topic, watch = %id, "Subscribing to topic");
                if let Err(e) = self.transport.subscribe(topic).await {
                    self.entries.lock().remove(topic);
                    tracing::warn!(
                        topic = %topic,
                        error = %e,
                        "Subscribe failed, watch rolled back"
                    );
                    return Err(e);
                }
                Ok(id)
            }
        }
    }

    /// Detaches the watcher `id` from `topic`, unsubscribing at the
    /// transport when it was the topic's last watcher.
    ///
    /// Detaching an unknown topic or ID is a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the underlying unsubscribe fails; the
    /// watcher stays detached regardless.
    pub async fn unwatch(&self, topic: &str, id: WatchId) -> Result<(), TransportError> {
        let last_watcher = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(topic) else {
                return Ok(());
            };
            let Some(position) = entry.callbacks.iter().position(|(other, _)| *other == id)
            else {
                return Ok(());
            };
            entry.callbacks.remove(position);
            if entry.callbacks.is_empty() {
                entries.remove(topic);
                true
            } else {
                false
            }
        };

        if last_watcher {
            tracing::debug!(topic = %topic, watch = %id, "Unsubscribing from topic");
            self.transport.unsubscribe(topic).await?;
        } else {
            tracing::trace!(topic = %topic, watch = %id, "Detached watcher");
        }
        Ok(())
    }

    /// Routes an inbound message to the topic's watchers.
    ///
    /// Returns `Ok(true)` if the message was delivered, `Ok(false)` if the
    /// topic has no watchers (legitimate in the window between an
    /// unsubscribe request and the broker honoring it).
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if a non-empty payload is not valid JSON; the
    /// message is dropped and no watcher runs.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Result<bool, DecodeError> {
        let value = Value::decode(payload)?;

        // Snapshot the watcher list under the lock and invoke outside it,
        // so a callback that watches or unwatches cannot corrupt iteration.
        let callbacks: Vec<WatchCallback> = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(topic) else {
                tracing::trace!(topic = %topic, "Dropping message for unwatched topic");
                return Ok(false);
            };
            entry.last_value = Some(value.clone());
            entry
                .callbacks
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };

        tracing::trace!(topic = %topic, watchers = callbacks.len(), "Dispatching message");
        for callback in &callbacks {
            callback(topic, &value);
        }
        Ok(true)
    }

    /// Schedules delivery of the cached value to a late-joining watcher.
    ///
    /// The value is read when the task fires, not captured now: a live
    /// message arriving in between must win, and a watcher already detached
    /// again must hear nothing.
    fn schedule_replay(&self, topic: &str, id: WatchId, callback: WatchCallback) {
        let entries = Arc::clone(&self.entries);
        let topic = topic.to_string();
        tokio::spawn(async move {
            let value = {
                let entries = entries.lock();
                match entries.get(&topic) {
                    Some(entry) if entry.callbacks.iter().any(|(other, _)| *other == id) => {
                        entry.last_value.clone()
                    }
                    _ => None,
                }
            };
            if let Some(value) = value {
                tracing::trace!(topic = %topic, watch = %id, "Replaying cached value");
                callback(&topic, &value);
            }
        });
    }

    /// Number of watchers currently attached to `topic`.
    #[must_use]
    pub fn watcher_count(&self, topic: &str) -> usize {
        self.entries
            .lock()
            .get(topic)
            .map_or(0, |entry| entry.callbacks.len())
    }

    /// Returns `true` if no topic is being watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops all watcher bookkeeping without issuing transport calls.
    ///
    /// Shutdown path: connection teardown makes per-topic unsubscribes
    /// pointless.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<T: Transport> std::fmt::Debug for Multiplexer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("watched_topics", &self.entries.lock().len())
            .finish()
    }
}
