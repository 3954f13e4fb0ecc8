// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Directory state and the snapshot publish cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::registry::{DirectorySnapshot, Registration, directory_topic};
use crate::transport::Transport;

/// State guarded by the directory lock.
struct DirectoryState {
    entries: BTreeMap<String, Registration>,
    /// Set by every mutation, cleared by the publish cycle immediately
    /// before it serializes: an edit landing mid-send re-arms the loop.
    dirty: bool,
    /// Completion channel of the running publish cycle, if any. Present
    /// exactly while a cycle owns the publish path.
    in_flight: Option<broadcast::Sender<Result<(), TransportError>>>,
}

/// The authoritative set of locally registered resources, published as a
/// retained snapshot whenever it changes.
///
/// Edits are batched: any number of registration changes made while a
/// snapshot is being sent coalesce into a single follow-up publish, and all
/// callers waiting on the directory converge on the completion of the same
/// cycle. At most one snapshot publish is ever in flight.
pub struct Directory<T: Transport> {
    transport: Arc<T>,
    /// Retained snapshot destination (`meta/clients/<clientId>`).
    topic: String,
    description: String,
    state: Arc<Mutex<DirectoryState>>,
}

impl<T: Transport> Directory<T> {
    /// Creates a directory for the given client identity.
    ///
    /// The directory starts dirty: the first publish announces it (empty or
    /// not) even before any registration is added.
    #[must_use]
    pub fn new(transport: Arc<T>, client_id: &str, description: impl Into<String>) -> Self {
        Self {
            transport,
            topic: directory_topic(client_id),
            description: description.into(),
            state: Arc::new(Mutex::new(DirectoryState {
                entries: BTreeMap::new(),
                dirty: true,
                in_flight: None,
            })),
        }
    }

    /// Returns the topic the snapshot is published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the client description carried by every snapshot.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns a copy of the current directory content.
    #[must_use]
    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            description: self.description.clone(),
            topics: self.state.lock().entries.clone(),
        }
    }

    /// Inserts or overwrites the registration at `path` and publishes.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the publish cycle covering this edit
    /// fails.
    pub async fn set_entry(
        &self,
        path: impl Into<String>,
        registration: Registration,
    ) -> Result<(), TransportError> {
        let path = path.into();
        tracing::debug!(
            path = %path,
            behaviour = %registration.behaviour,
            "Registering resource"
        );
        self.state.lock().entries.insert(path, registration);
        self.publish().await
    }

    /// Removes the registration at `path` (no-op if absent) and publishes.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the publish cycle covering this edit
    /// fails.
    pub async fn remove_entry(&self, path: &str) -> Result<(), TransportError> {
        if self.state.lock().entries.remove(path).is_some() {
            tracing::debug!(path = %path, "Unregistering resource");
        } else {
            tracing::trace!(path = %path, "Unregistering unknown resource");
        }
        self.publish().await
    }

    /// Marks the directory dirty and waits until a snapshot at least as new
    /// as the current state has been published.
    ///
    /// If a publish cycle is already running, this joins it; otherwise it
    /// starts one. All concurrent callers of the same cycle receive the
    /// same result.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the cycle's snapshot send fails. The
    /// directory content is untouched by the failure; a later call retries
    /// with current data.
    pub async fn publish(&self) -> Result<(), TransportError> {
        let (mut receiver, start_cycle) = {
            let mut state = self.state.lock();
            state.dirty = true;
            if let Some(sender) = &state.in_flight {
                (sender.subscribe(), false)
            } else {
                let (sender, receiver) = broadcast::channel(1);
                state.in_flight = Some(sender);
                (receiver, true)
            }
        };

        if start_cycle {
            self.spawn_cycle();
        }

        match receiver.recv().await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ChannelClosed(
                "publish cycle ended without a result".to_string(),
            )),
        }
    }

    /// Marks the directory dirty and ensures a publish cycle is running,
    /// without waiting for it.
    ///
    /// Used on connection establishment to re-announce the directory; cycle
    /// failures are logged by the cycle itself.
    pub fn trigger(&self) {
        let start_cycle = {
            let mut state = self.state.lock();
            state.dirty = true;
            if state.in_flight.is_some() {
                false
            } else {
                let (sender, _receiver) = broadcast::channel(1);
                state.in_flight = Some(sender);
                true
            }
        };

        if start_cycle {
            self.spawn_cycle();
        }
    }

    /// Spawns the publish cycle owning `state.in_flight`.
    ///
    /// The cycle loops while the directory is dirty, publishing a complete
    /// snapshot per iteration. The quiescence check and the completion
    /// hand-off share one critical section, so a caller that marks the
    /// directory dirty either joins this cycle before it settles or finds
    /// `in_flight` empty and starts the next one: no edit is left unsent.
    fn spawn_cycle(&self) {
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let topic = self.topic.clone();
        let description = self.description.clone();

        tokio::spawn(async move {
            loop {
                let encoded = {
                    let mut state = state.lock();
                    if !state.dirty {
                        let sender = state.in_flight.take();
                        drop(state);
                        if let Some(sender) = sender {
                            let _ = sender.send(Ok(()));
                        }
                        tracing::trace!(topic = %topic, "Directory publish cycle settled");
                        return;
                    }
                    state.dirty = false;
                    let snapshot = DirectorySnapshot {
                        description: description.clone(),
                        topics: state.entries.clone(),
                    };
                    serde_json::to_vec(&snapshot)
                };

                let payload = match encoded {
                    Ok(payload) => payload,
                    Err(e) => {
                        let sender = state.lock().in_flight.take();
                        if let Some(sender) = sender {
                            let _ = sender.send(Err(TransportError::Request(format!(
                                "directory snapshot encoding failed: {e}"
                            ))));
                        }
                        return;
                    }
                };

                tracing::debug!(
                    topic = %topic,
                    bytes = payload.len(),
                    "Publishing registration directory"
                );
                if let Err(e) = transport.publish(&topic, payload, true).await {
                    tracing::warn!(topic = %topic, error = %e, "Directory publish failed");
                    let sender = state.lock().in_flight.take();
                    if let Some(sender) = sender {
                        let _ = sender.send(Err(e));
                    }
                    return;
                }
            }
        });
    }
}

impl<T: Transport> std::fmt::Debug for Directory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Directory")
            .field("topic", &self.topic)
            .field("entries", &state.entries.len())
            .field("dirty", &state.dirty)
            .field("publishing", &state.in_flight.is_some())
            .finish()
    }
}
