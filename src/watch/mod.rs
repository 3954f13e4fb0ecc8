// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription multiplexing for watched topics.
//!
//! This module provides the fan-out layer between logical watchers and
//! transport subscriptions:
//!
//! - [`WatchId`] - Unique identifier for detaching a watcher
//! - [`Multiplexer`] - Per-topic watcher registry with last-value caching
//!
//! Any number of watchers share a single transport subscription per topic;
//! the first watcher subscribes, the last one out unsubscribes.

mod multiplexer;

pub use multiplexer::{Multiplexer, WatchId};
