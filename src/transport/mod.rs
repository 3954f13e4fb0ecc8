// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport boundary for the broker connection.
//!
//! The [`Transport`] trait is the seam between the resource layer and the
//! underlying pub/sub connection:
//!
//! - [`MqttTransport`]: the production implementation over rumqttc
//!
//! Implementations deliver connection-lifecycle changes and inbound messages
//! as [`TransportEvent`]s over an `mpsc` channel handed out when the
//! transport is constructed. All traffic moves at the exactly-once service
//! level; watchers and directory snapshots rely on it.

mod mqtt;

pub use mqtt::{MqttTransport, MqttTransportBuilder};

use std::future::Future;

use crate::error::TransportError;

/// A notification delivered by a transport implementation.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The broker acknowledged a new connection (initial or after a
    /// reconnect). Subscriptions have already been restored when this fires.
    Connected,

    /// The connection was lost. The transport keeps trying to reconnect;
    /// a later [`TransportEvent::Connected`] signals recovery.
    Disconnected {
        /// Human-readable cause, for logging.
        reason: String,
    },

    /// An inbound message on a subscribed topic.
    Message {
        /// The topic the message arrived on.
        topic: String,
        /// The raw message body. Empty bodies are meaningful (deletion /
        /// payload-less events), so they are delivered, not filtered.
        payload: Vec<u8>,
    },
}

/// Trait for pub/sub transports the resource layer can run over.
///
/// Methods return named `Send` futures rather than plain `async fn` because
/// callers hold implementations behind generics inside spawned tasks.
/// Implementations are free to use `async fn` in their `impl` blocks.
pub trait Transport: Send + Sync + 'static {
    /// Publishes a payload to a topic at the exactly-once service level.
    ///
    /// # Arguments
    ///
    /// * `topic` - The destination topic
    /// * `payload` - The raw message body (may be empty)
    /// * `retain` - Whether the broker should retain the message
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the publish is rejected or the connection
    /// is unusable.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribes to a topic at the exactly-once service level.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the subscribe is rejected.
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Unsubscribes from a topic.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the unsubscribe is rejected.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the disconnect request cannot be sent.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
