// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory transport double for unit tests.
//!
//! Records every request, optionally holds publishes open until the test
//! releases them (to exercise edit-during-publish paths), and fails
//! individual requests on demand.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::transport::Transport;

/// A recorded publish request.
#[derive(Debug, Clone)]
pub(crate) struct PublishCall {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl PublishCall {
    /// Decodes the payload as JSON for snapshot assertions.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("publish payload is not JSON")
    }
}

#[derive(Default)]
struct MockInner {
    publishes: Vec<PublishCall>,
    subscribes: Vec<String>,
    unsubscribes: Vec<String>,
    gate_publishes: bool,
    pending: VecDeque<oneshot::Sender<Result<(), TransportError>>>,
    next_publish_error: Option<TransportError>,
    next_subscribe_error: Option<TransportError>,
    next_unsubscribe_error: Option<TransportError>,
    disconnected: bool,
}

/// Scriptable in-memory [`Transport`] implementation.
#[derive(Default)]
pub(crate) struct MockTransport {
    inner: Mutex<MockInner>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Holds every subsequent publish open until [`Self::release_publish`]
    /// completes it.
    pub fn gate_publishes(&self) {
        self.inner.lock().gate_publishes = true;
    }

    /// Completes the oldest held publish with `result`.
    ///
    /// # Panics
    ///
    /// Panics if no publish is currently held open.
    pub fn release_publish(&self, result: Result<(), TransportError>) {
        let tx = self
            .inner
            .lock()
            .pending
            .pop_front()
            .expect("no publish in flight");
        let _ = tx.send(result);
    }

    /// Number of publishes currently held open.
    pub fn pending_publishes(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Fails the next publish with `error` (bypasses the gate).
    pub fn fail_next_publish(&self, error: TransportError) {
        self.inner.lock().next_publish_error = Some(error);
    }

    /// Fails the next subscribe with `error`.
    pub fn fail_next_subscribe(&self, error: TransportError) {
        self.inner.lock().next_subscribe_error = Some(error);
    }

    /// Fails the next unsubscribe with `error`.
    pub fn fail_next_unsubscribe(&self, error: TransportError) {
        self.inner.lock().next_unsubscribe_error = Some(error);
    }

    pub fn publishes(&self) -> Vec<PublishCall> {
        self.inner.lock().publishes.clone()
    }

    pub fn subscribes(&self) -> Vec<String> {
        self.inner.lock().subscribes.clone()
    }

    pub fn unsubscribes(&self) -> Vec<String> {
        self.inner.lock().unsubscribes.clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.lock().disconnected
    }

    /// Waits until at least `count` publishes have been requested
    /// (including ones currently held open).
    pub async fn wait_for_publishes(&self, count: usize) {
        loop {
            if self.inner.lock().publishes.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

impl Transport for MockTransport {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransportError> {
        let gate = {
            let mut inner = self.inner.lock();
            inner.publishes.push(PublishCall {
                topic: topic.to_string(),
                payload,
                retain,
            });
            if let Some(error) = inner.next_publish_error.take() {
                return Err(error);
            }
            if inner.gate_publishes {
                let (tx, rx) = oneshot::channel();
                inner.pending.push_back(tx);
                Some(rx)
            } else {
                None
            }
        };

        match gate {
            Some(rx) => rx
                .await
                .map_err(|_| TransportError::ChannelClosed("publish gate dropped".to_string()))?,
            None => Ok(()),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.subscribes.push(topic.to_string());
        if let Some(error) = inner.next_subscribe_error.take() {
            return Err(error);
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.unsubscribes.push(topic.to_string());
        if let Some(error) = inner.next_unsubscribe_error.take() {
            return Err(error);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.lock().disconnected = true;
        Ok(())
    }
}
