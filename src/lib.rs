// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! metabus - A Rust client library for the Qth home-automation meta-layer.
//!
//! Qth organises a plain MQTT broker into a discoverable home-automation
//! bus: every topic is declared as either a *property* (retained, always
//! readable) or an *event* (transient), and every client announces what it
//! serves in a retained registration directory under `meta/clients/`. This
//! crate implements the client side of those conventions.
//!
//! # Supported Features
//!
//! - **Properties**: set, delete and watch retained values; watchers
//!   joining late automatically receive the current value
//! - **Events**: send and watch transient notifications
//! - **Registration**: announce served topics with descriptions and
//!   disconnect behaviour, maintained as a single retained snapshot
//! - **Connection lifecycle**: last-will directory cleanup, automatic
//!   resubscription after reconnects, connect/disconnect listeners
//!
//! # Quick Start
//!
//! ## Serving a Property
//!
//! ```no_run
//! use metabus::{Behaviour, Client};
//!
//! #[tokio::main]
//! async fn main() -> metabus::Result<()> {
//!     let client = Client::builder("mqtt://192.168.1.50:1883")
//!         .description("Kitchen lamp driver")
//!         .build()
//!         .await?;
//!
//!     client
//!         .register(
//!             "kitchen/lamp/power",
//!             Behaviour::PropertyOneToMany,
//!             "Lamp power state",
//!         )
//!         .await?;
//!     client
//!         .set_property("kitchen/lamp/power", serde_json::json!(true))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Watching Properties and Events
//!
//! ```no_run
//! use metabus::Client;
//!
//! #[tokio::main]
//! async fn main() -> metabus::Result<()> {
//!     let client = Client::builder("mqtt://192.168.1.50:1883").build().await?;
//!
//!     // Called with the current value right away, then on every change.
//!     client
//!         .watch_property("kitchen/lamp/power", |topic, value| {
//!             println!("{topic} is now {value}");
//!         })
//!         .await?;
//!
//!     // Called only for events sent while we are watching.
//!     client
//!         .watch_event("kitchen/motion", |_, value| {
//!             println!("Motion: {value}");
//!         })
//!         .await?;
//!
//!     client.on_disconnected(|reason| {
//!         eprintln!("Connection lost: {reason}");
//!     });
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     client.disconnect().await
//! }
//! ```

mod client;
pub mod error;
pub mod registry;
pub mod transport;
mod value;
pub mod watch;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientBuilder, ListenerId};
pub use error::{DecodeError, Error, Result, TransportError};
pub use registry::{Behaviour, Directory, DirectorySnapshot, Registration, directory_topic};
pub use transport::{MqttTransport, MqttTransportBuilder, Transport, TransportEvent};
pub use value::Value;
pub use watch::{Multiplexer, WatchId};
