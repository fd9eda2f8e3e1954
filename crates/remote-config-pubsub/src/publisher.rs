// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Write side of the pipeline.
//!
//! [`RemoteConfigPublisher`] forwards every payload straight to its connector.
//! [`RemoteConfigPublisherMergeFirst`] keeps one fragment per target file and
//! only writes once [`RemoteConfigPublisherMergeFirst::dispatch`] composes them,
//! so subscribers never observe a partially updated product.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::map::Entry;
use serde_json::{Map, Value};
use tracing::debug;

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::metadata::{is_disabled, ConfigMetadata, RawConfig};

/// Pure transformation applied to a payload right before it is written.
pub type PreprocessFn = Arc<dyn Fn(RawConfig) -> RawConfig + Send + Sync>;

/// Store-and-forward publisher.
pub struct RemoteConfigPublisher {
    connector: Arc<dyn Connector>,
    preprocess: Option<PreprocessFn>,
}

impl RemoteConfigPublisher {
    pub fn new(connector: Arc<dyn Connector>, preprocess: Option<PreprocessFn>) -> Self {
        Self {
            connector,
            preprocess,
        }
    }

    pub fn publish(
        &self,
        metadata: &ConfigMetadata,
        config: RawConfig,
    ) -> Result<(), ConnectorError> {
        let config = match &self.preprocess {
            Some(preprocess) => preprocess(config),
            None => config,
        };
        debug!(config_id = %metadata.id, product = %metadata.product, "publishing remote config");
        self.connector.write(Some(metadata), &config)
    }
}

impl fmt::Debug for RemoteConfigPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfigPublisher")
            .field("connector", &self.connector)
            .field("preprocess", &self.preprocess.is_some())
            .finish()
    }
}

/// Publisher assembling per-target fragments into one composite payload.
pub struct RemoteConfigPublisherMergeFirst {
    connector: Arc<dyn Connector>,
    preprocess: Option<PreprocessFn>,
    fragments: Mutex<BTreeMap<String, RawConfig>>,
}

impl RemoteConfigPublisherMergeFirst {
    pub fn new(connector: Arc<dyn Connector>, preprocess: Option<PreprocessFn>) -> Self {
        Self {
            connector,
            preprocess,
            fragments: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records the latest fragment for `target` without writing anything.
    ///
    /// A disabled fragment (`null`/`false`) retracts the target.
    pub fn append(&self, target: impl Into<String>, fragment: RawConfig) {
        let target = target.into();
        let mut fragments = self.fragments.lock().unwrap_or_else(PoisonError::into_inner);
        if is_disabled(&fragment) {
            debug!(target_file = %target, "retracting remote config fragment");
            fragments.remove(&target);
        } else {
            fragments.insert(target, fragment);
        }
    }

    /// Names of the targets currently held in the working set.
    pub fn targets(&self) -> Vec<String> {
        self.fragments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Merges every accumulated fragment and performs a single connector write.
    pub fn dispatch(&self) -> Result<(), ConnectorError> {
        let merged = {
            let fragments = self.fragments.lock().unwrap_or_else(PoisonError::into_inner);
            merge_fragments(&fragments)
        };
        let merged = match &self.preprocess {
            Some(preprocess) => preprocess(merged),
            None => merged,
        };
        debug!("dispatching merged remote config");
        self.connector.write(None, &merged)
    }
}

impl fmt::Debug for RemoteConfigPublisherMergeFirst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfigPublisherMergeFirst")
            .field("connector", &self.connector)
            .field("preprocess", &self.preprocess.is_some())
            .field("targets", &self.targets())
            .finish()
    }
}

/// Combines fragments in target-name order.
///
/// Arrays are concatenated, objects are merged key by key (later targets win)
/// and any other value replaces what was there.
pub(crate) fn merge_fragments(fragments: &BTreeMap<String, RawConfig>) -> RawConfig {
    let mut merged = Map::new();
    for (target, fragment) in fragments {
        let Value::Object(entries) = fragment else {
            debug!(target_file = %target, "ignoring non-object remote config fragment");
            continue;
        };
        for (key, value) in entries {
            match merged.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(value.clone());
                }
                Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                    (Value::Array(existing), Value::Array(items)) => {
                        existing.extend(items.iter().cloned());
                    }
                    (Value::Object(existing), Value::Object(items)) => {
                        for (k, v) in items {
                            existing.insert(k.clone(), v.clone());
                        }
                    }
                    (existing, _) => {
                        debug!(target_file = %target, key = %key, "overriding merged remote config value");
                        *existing = value.clone();
                    }
                },
            }
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use serde_json::json;

    #[test]
    fn direct_publisher_applies_preprocessing() {
        let connector = Arc::new(MemoryConnector::new());
        let preprocess: PreprocessFn = Arc::new(|mut config: RawConfig| {
            if let Value::Object(map) = &mut config {
                map.insert("preprocessed".into(), Value::Bool(true));
            }
            config
        });
        let publisher = RemoteConfigPublisher::new(connector.clone(), Some(preprocess));

        let metadata = ConfigMetadata::new("cfg", "ASM_FEATURES", 1);
        publisher
            .publish(&metadata, json!({"asm": {"enabled": true}}))
            .expect("publish");

        let data = connector.read().expect("read").expect("payload");
        assert_eq!(data.metadata, Some(metadata));
        assert_eq!(
            data.config,
            json!({"asm": {"enabled": true}, "preprocessed": true})
        );
    }

    #[test]
    fn merge_first_does_not_write_until_dispatch() {
        let connector = Arc::new(MemoryConnector::new());
        let publisher = RemoteConfigPublisherMergeFirst::new(connector.clone(), None);

        publisher.append("datadog/2/ASM_DATA/blocked_ips/config", json!({"rules_data": [1]}));
        assert!(connector.read().expect("read").is_none());

        publisher.dispatch().expect("dispatch");
        let data = connector.read().expect("read").expect("payload");
        assert!(data.metadata.is_none());
        assert_eq!(data.config, json!({"rules_data": [1]}));
    }

    #[test]
    fn merge_first_concatenates_lists_and_merges_objects() {
        let connector = Arc::new(MemoryConnector::new());
        let publisher = RemoteConfigPublisherMergeFirst::new(connector.clone(), None);

        publisher.append("a", json!({"rules_data": [{"id": "blocked_ips"}], "asm": {"enabled": true}}));
        publisher.append("b", json!({"rules_data": [{"id": "blocked_users"}], "asm": {"mode": "x"}}));
        publisher.append("c", json!({"version": 2}));
        publisher.dispatch().expect("dispatch");

        let data = connector.read().expect("read").expect("payload");
        assert_eq!(
            data.config,
            json!({
                "rules_data": [{"id": "blocked_ips"}, {"id": "blocked_users"}],
                "asm": {"enabled": true, "mode": "x"},
                "version": 2,
            })
        );
    }

    #[test]
    fn merge_first_retracts_disabled_targets() {
        let connector = Arc::new(MemoryConnector::new());
        let publisher = RemoteConfigPublisherMergeFirst::new(connector.clone(), None);

        publisher.append("a", json!({"rules_data": [1]}));
        publisher.append("b", json!({"rules_data": [2]}));
        publisher.append("a", json!(false));
        assert_eq!(publisher.targets(), vec!["b".to_string()]);

        publisher.dispatch().expect("dispatch");
        let data = connector.read().expect("read").expect("payload");
        assert_eq!(data.config, json!({"rules_data": [2]}));
    }

    #[test]
    fn merge_ignores_non_object_fragments() {
        let mut fragments = BTreeMap::new();
        fragments.insert("a".to_string(), json!([1, 2]));
        fragments.insert("b".to_string(), json!({"k": "v"}));
        assert_eq!(merge_fragments(&fragments), json!({"k": "v"}));
    }
}
