// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `metabus` library.
//!
//! This module provides the error hierarchy for handling failures across the
//! library: transport communication, payload decoding, and client
//! configuration.

use thiserror::Error;

/// The main error type for this library.
///
/// This enum encompasses all possible errors that can occur when talking to
/// a broker through a [`Client`](crate::Client).
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during transport communication.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error occurred while decoding an inbound payload.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors related to transport communication.
///
/// Variants carry their underlying cause as a message string so the type
/// stays `Clone`; completion results are fanned out to every caller awaiting
/// the same directory publish cycle, which requires cloning the error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A publish, subscribe, or unsubscribe request was rejected.
    #[error("request failed: {0}")]
    Request(String),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to decoding inbound payloads.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::InvalidAddress("bad-port".to_string());
        assert_eq!(err.to_string(), "invalid address: bad-port");
    }

    #[test]
    fn error_from_transport_error() {
        let transport_err = TransportError::ConnectionFailed("refused".to_string());
        let err: Error = transport_err.into();
        assert!(matches!(
            err,
            Error::Transport(TransportError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn transport_error_is_clone() {
        let err = TransportError::Request("publish rejected".to_string());
        let copy = err.clone();
        assert_eq!(err, copy);
    }

    #[test]
    fn decode_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = DecodeError::Json(json_err);
        assert!(err.to_string().starts_with("JSON parse error:"));
    }
}
