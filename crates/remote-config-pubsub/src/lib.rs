// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote Configuration publisher/subscriber pipeline.
//!
//! Application servers commonly pre-fork many workers. Remote Config may start
//! polling the agent in the parent before the workers exist, and every worker
//! must still see each new payload quickly without polling the agent itself.
//!
//! The owning process publishes each polled payload into a [`Connector`]; a
//! [`RemoteConfigSubscriber`] thread in every process reads that connector and
//! runs the product callback. A [`PubSub`] (or [`PubSubMergeFirst`]) binds one
//! publisher and one subscriber around one connector, and the
//! [`PubSubRegistry`] routes products to bindings.
//!
//! ```text
//!  owning process                      every process
//!  RC client ─> Publisher ─> Connector ─> Subscriber thread ─> callback
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod capabilities;
pub mod config;
pub mod connector;
pub mod error;
pub mod metadata;
pub mod publisher;
pub mod pubsub;
pub mod registry;
#[cfg(unix)]
pub mod shared_memory;
pub mod subscriber;
pub mod version;

pub use capabilities::AppSecCapabilities;
pub use config::{PollInterval, PubSubSettings, DEFAULT_POLL_INTERVAL};
pub use connector::{Connector, FileConnector, MemoryConnector};
pub use error::{ConnectorError, PubSubError};
pub use metadata::{is_disabled, ConfigMetadata, RawConfig, SharedData};
pub use publisher::{PreprocessFn, RemoteConfigPublisher, RemoteConfigPublisherMergeFirst};
pub use pubsub::{PubSub, PubSubBinding, PubSubMergeFirst};
pub use registry::{PubSubRegistry, TargetUpdate};
#[cfg(unix)]
pub use shared_memory::{SharedMemoryConnector, DEFAULT_SHARED_MEMORY_CAPACITY};
pub use subscriber::{RemoteConfigCallback, RemoteConfigSubscriber};
