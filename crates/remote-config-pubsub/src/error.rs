// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by connectors, publishers, subscribers and the product registry.

use thiserror::Error;

/// Failures raised while moving a payload through a [`crate::Connector`].
///
/// Connectors never retry on their own: the subscriber loop logs the error and
/// the next poll tries again.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connector payload could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("payload of {size} bytes exceeds the connector capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },
}

/// Errors surfaced by the PubSub bindings and the product registry.
#[derive(Debug, Error)]
pub enum PubSubError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("failed to spawn subscriber worker `{name}`: {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no PubSub registered for product `{0}`")]
    UnknownProduct(String),
}
