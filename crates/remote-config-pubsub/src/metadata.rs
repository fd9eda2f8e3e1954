// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload types carried through the distribution pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque product payload. The distribution layer only passes it through.
pub type RawConfig = Value;

/// Identifies one configuration unit as issued by the Remote Config backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration id, unique within a product.
    pub id: String,
    /// Product the configuration belongs to (e.g. `LIVE_DEBUGGING`).
    pub product: String,
    /// Version of the target file.
    pub version: i64,
    /// SHA256 of the target file, when the client knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
    /// Length in bytes of the target file, when the client knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl ConfigMetadata {
    pub fn new(id: impl Into<String>, product: impl Into<String>, version: i64) -> Self {
        Self {
            id: id.into(),
            product: product.into(),
            version,
            sha256_hash: None,
            length: None,
        }
    }
}

/// Content of a connector slot: the latest payload and, for direct
/// publishers, the metadata it was published with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedData {
    #[serde(default)]
    pub metadata: Option<ConfigMetadata>,
    pub config: RawConfig,
}

/// Borrowed form of [`SharedData`] used to serialize without cloning.
#[derive(Serialize)]
pub(crate) struct SharedDataRef<'a> {
    pub(crate) metadata: Option<&'a ConfigMetadata>,
    pub(crate) config: &'a RawConfig,
}

/// Returns `true` for the sentinel values that retract a configuration
/// (`null` and `false`).
pub fn is_disabled(config: &RawConfig) -> bool {
    matches!(config, Value::Null | Value::Bool(false))
}
