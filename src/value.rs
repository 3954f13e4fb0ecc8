// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload values exchanged over the bus.
//!
//! Every message body is either a JSON document or the distinguished empty
//! payload. Deleting a property means publishing the empty payload retained,
//! and an event may fire without a payload, so the empty body is a
//! first-class value rather than an error.

use std::fmt;

use crate::error::DecodeError;

/// A decoded message payload.
///
/// # Examples
///
/// ```
/// use metabus::Value;
///
/// let value = Value::decode(b"{\"level\": 42}").unwrap();
/// assert!(!value.is_absent());
///
/// let absent = Value::decode(b"").unwrap();
/// assert!(absent.is_absent());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A JSON document.
    Json(serde_json::Value),

    /// The distinguished empty payload.
    ///
    /// Publishing it retained deletes a property; receiving it for a watched
    /// property means the property was deleted (or never set).
    Absent,
}

impl Value {
    /// Decodes a raw message body.
    ///
    /// An empty body maps to [`Value::Absent`]; any other body must be valid
    /// JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] if a non-empty body is not valid JSON.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Ok(Self::Absent);
        }
        Ok(Self::Json(serde_json::from_slice(payload)?))
    }

    /// Encodes the value into a message body.
    ///
    /// [`Value::Absent`] encodes to the empty body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Json(v) => v.to_string().into_bytes(),
            Self::Absent => Vec::new(),
        }
    }

    /// Returns `true` for the distinguished empty payload.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the contained JSON document, if any.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Absent => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => write!(f, "{v}"),
            Self::Absent => f.write_str("absent"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}
