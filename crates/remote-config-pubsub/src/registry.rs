// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Product to binding routing.
//!
//! Several products may register the same binding (for example every ASM
//! product feeding one merge-first binding). Lifecycle operations act on each
//! distinct binding once, so a shared binding runs a single worker.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::PubSubError;
use crate::metadata::{ConfigMetadata, RawConfig};
use crate::pubsub::PubSubBinding;

/// One target file delivered by the Remote Config client for a product.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetUpdate {
    /// Target path, e.g. `datadog/2/LIVE_DEBUGGING/<id>/config`.
    pub target: String,
    pub metadata: ConfigMetadata,
    pub config: RawConfig,
}

/// Registry of the bindings that receive each product's payloads.
#[derive(Debug, Default)]
pub struct PubSubRegistry {
    products: RwLock<BTreeMap<String, Arc<dyn PubSubBinding>>>,
}

impl PubSubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `product` to `binding`, returning the binding it replaces.
    pub fn register(
        &self,
        product: impl Into<String>,
        binding: Arc<dyn PubSubBinding>,
    ) -> Option<Arc<dyn PubSubBinding>> {
        let product = product.into();
        debug!(product = %product, binding = %binding.name(), "registering remote config product");
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product, binding)
    }

    pub fn unregister(&self, product: &str) -> Option<Arc<dyn PubSubBinding>> {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(product)
    }

    pub fn get(&self, product: &str) -> Option<Arc<dyn PubSubBinding>> {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(product)
            .cloned()
    }

    /// Registered product names, sorted.
    pub fn products(&self) -> Vec<String> {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Publishes one polling round of target files for `product`.
    pub fn dispatch(&self, product: &str, updates: Vec<TargetUpdate>) -> Result<(), PubSubError> {
        let binding = self
            .get(product)
            .ok_or_else(|| PubSubError::UnknownProduct(product.to_string()))?;
        for update in updates {
            binding.receive(&update.target, &update.metadata, update.config)?;
        }
        binding.commit()
    }

    pub fn start_subscribers(&self) -> Result<(), PubSubError> {
        for binding in self.bindings() {
            binding.start_subscriber()?;
        }
        Ok(())
    }

    /// Respawns every worker; call in a child process after `fork`.
    pub fn restart_subscribers(&self) -> Result<(), PubSubError> {
        for binding in self.bindings() {
            binding.restart_subscriber()?;
        }
        Ok(())
    }

    pub fn stop_all(&self) {
        for binding in self.bindings() {
            binding.stop();
        }
    }

    /// Runs one synchronous poll on every distinct binding.
    pub fn poll_all(&self) {
        for binding in self.bindings() {
            if let Err(err) = binding.poll_data() {
                warn!(binding = %binding.name(), error = %err, "remote config poll failed");
            }
        }
    }

    /// Distinct bindings, in product order of first registration.
    fn bindings(&self) -> Vec<Arc<dyn PubSubBinding>> {
        let products = self.products.read().unwrap_or_else(PoisonError::into_inner);
        let mut unique: Vec<Arc<dyn PubSubBinding>> = Vec::new();
        for binding in products.values() {
            if !unique.iter().any(|seen| same_binding(seen, binding)) {
                unique.push(Arc::clone(binding));
            }
        }
        unique
    }
}

fn same_binding(a: &Arc<dyn PubSubBinding>, b: &Arc<dyn PubSubBinding>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollInterval;
    use crate::connector::MemoryConnector;
    use crate::pubsub::{PubSub, PubSubMergeFirst};
    use crate::subscriber::RemoteConfigCallback;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn update(target: &str, product: &str, config: Value) -> TargetUpdate {
        TargetUpdate {
            target: target.to_string(),
            metadata: ConfigMetadata::new(target, product, 1),
            config,
        }
    }

    #[test]
    fn dispatch_to_unknown_product_fails() {
        let registry = PubSubRegistry::new();
        let err = registry
            .dispatch("APM_TRACING", vec![])
            .expect_err("unknown product");
        assert!(matches!(err, PubSubError::UnknownProduct(p) if p == "APM_TRACING"));
    }

    #[test]
    fn merge_first_binding_is_shared_across_products() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let callback: Arc<dyn RemoteConfigCallback> =
            Arc::new(move |_: Option<&ConfigMetadata>, config: &RawConfig| {
                sink.lock().expect("lock").push(config.clone());
            });
        let asm: Arc<dyn PubSubBinding> = Arc::new(PubSubMergeFirst::new(
            "ASM",
            Arc::new(MemoryConnector::new()),
            None,
            callback,
            PollInterval::default(),
        ));

        let registry = PubSubRegistry::new();
        registry.register("ASM_DATA", asm.clone());
        registry.register("ASM_DD", asm.clone());
        assert_eq!(registry.products(), vec!["ASM_DATA", "ASM_DD"]);
        assert_eq!(registry.bindings().len(), 1);

        registry
            .dispatch(
                "ASM_DATA",
                vec![update("data", "ASM_DATA", json!({"rules_data": [1]}))],
            )
            .expect("dispatch");
        registry
            .dispatch(
                "ASM_DD",
                vec![update("dd", "ASM_DD", json!({"rules": [{"id": "r1"}]}))],
            )
            .expect("dispatch");
        registry.poll_all();

        let received = received.lock().expect("lock");
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0],
            json!({"rules_data": [1], "rules": [{"id": "r1"}]})
        );
    }

    #[test]
    fn lifecycle_operations_touch_each_binding_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: Arc<dyn RemoteConfigCallback> =
            Arc::new(move |_: Option<&ConfigMetadata>, _: &RawConfig| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let connector = Arc::new(MemoryConnector::new());
        let di = Arc::new(PubSub::new(
            "DI",
            connector,
            callback,
            PollInterval::new(Duration::from_millis(5)),
        ));

        let registry = PubSubRegistry::new();
        registry.register("LIVE_DEBUGGING", di.clone());
        registry.register("LIVE_DEBUGGING_SYMBOL_DB", di.clone());

        registry.start_subscribers().expect("start");
        assert!(di.subscriber().is_running());
        registry.restart_subscribers().expect("restart");
        assert!(di.subscriber().is_running());
        registry.stop_all();
        assert!(!di.subscriber().is_running());

        assert!(registry.unregister("LIVE_DEBUGGING").is_some());
        assert_eq!(registry.products(), vec!["LIVE_DEBUGGING_SYMBOL_DB"]);
    }
}
