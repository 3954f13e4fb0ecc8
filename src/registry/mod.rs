// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registration directory types and publishing.
//!
//! Every client advertises the resources it produces or consumes as a
//! retained JSON snapshot at `meta/clients/<clientId>`:
//!
//! - [`Behaviour`] - What kind of resource a topic carries
//! - [`Registration`] - One advertised resource
//! - [`DirectorySnapshot`] - The complete wire payload
//! - [`Directory`] - Holds the registrations and batches snapshot publishes

mod directory;

pub use directory::Directory;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Directory topic for a client identity.
///
/// The registration snapshot is published retained at this topic, and the
/// same topic carries the client's last will, so a vanished client reads as
/// an explicitly emptied directory.
#[must_use]
pub fn directory_topic(client_id: &str) -> String {
    format!("meta/clients/{client_id}")
}

/// Declared behaviour of a registered resource.
///
/// The `1:N`/`N:1` direction is seen from the registering client: `1:N`
/// resources have this client as their single producer, `N:1` resources
/// have it as their single consumer.
///
/// # Examples
///
/// ```
/// use metabus::Behaviour;
///
/// assert_eq!(Behaviour::PropertyOneToMany.as_str(), "PROPERTY-1:N");
/// assert!(Behaviour::PropertyOneToMany.is_property());
/// assert!(!Behaviour::EventManyToOne.is_property());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Behaviour {
    /// A property this client owns: it is the only writer, any number of
    /// clients may watch it.
    #[serde(rename = "PROPERTY-1:N")]
    PropertyOneToMany,

    /// A property this client watches, settable by any number of clients.
    #[serde(rename = "PROPERTY-N:1")]
    PropertyManyToOne,

    /// An event this client emits for any number of listeners.
    #[serde(rename = "EVENT-1:N")]
    EventOneToMany,

    /// An event this client listens for, sendable by any number of clients.
    #[serde(rename = "EVENT-N:1")]
    EventManyToOne,
}

impl Behaviour {
    /// Returns the wire string for this behaviour.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PropertyOneToMany => "PROPERTY-1:N",
            Self::PropertyManyToOne => "PROPERTY-N:1",
            Self::EventOneToMany => "EVENT-1:N",
            Self::EventManyToOne => "EVENT-N:1",
        }
    }

    /// Returns `true` for the property behaviours.
    #[must_use]
    pub const fn is_property(&self) -> bool {
        matches!(self, Self::PropertyOneToMany | Self::PropertyManyToOne)
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One advertised resource in a client's registration directory.
///
/// # Examples
///
/// ```
/// use metabus::{Behaviour, Registration};
/// use serde_json::json;
///
/// let registration = Registration::new(Behaviour::PropertyOneToMany, "Lamp brightness")
///     .with_delete_on_unregister(true)
///     .with_on_unsubscribe(json!(0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Declared behaviour of the resource.
    pub behaviour: Behaviour,

    /// Human-readable description of the resource.
    pub description: String,

    /// Value the directory server should publish to the resource when this
    /// client disappears.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unsubscribe: Option<serde_json::Value>,

    /// For properties: ask the directory server to delete the retained
    /// value when the resource is unregistered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_on_unregister: Option<bool>,
}

impl Registration {
    /// Creates a registration with the given behaviour and description.
    #[must_use]
    pub fn new(behaviour: Behaviour, description: impl Into<String>) -> Self {
        Self {
            behaviour,
            description: description.into(),
            on_unsubscribe: None,
            delete_on_unregister: None,
        }
    }

    /// Sets the value to publish to the resource when this client
    /// disappears.
    #[must_use]
    pub fn with_on_unsubscribe(mut self, value: serde_json::Value) -> Self {
        self.on_unsubscribe = Some(value);
        self
    }

    /// Sets whether the retained value is deleted on unregister
    /// (properties only).
    #[must_use]
    pub fn with_delete_on_unregister(mut self, delete: bool) -> Self {
        self.delete_on_unregister = Some(delete);
        self
    }
}

/// Complete wire snapshot of a client's registration directory.
///
/// Consumers replace their entire view of a client on every received
/// snapshot; the payload is never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Human-readable description of the client.
    pub description: String,

    /// Registered resources keyed by topic path.
    pub topics: BTreeMap<String, Registration>,
}
