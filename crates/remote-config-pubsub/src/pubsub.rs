// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Publisher/subscriber pairs bound to one shared connector.
//!
//! A Remote Config product registers a binding. The owning process publishes
//! every payload it polls; each process (the owner included) runs a
//! subscriber thread reading the same connector and executing the product
//! callback.
//!
//! ```rust,ignore
//! let adapter: Arc<dyn RemoteConfigCallback> = Arc::new(debugger_callback);
//! let pubsub = Arc::new(PubSub::new(
//!     "LIVE_DEBUGGING",
//!     Arc::new(FileConnector::new("/tmp/dd-rc/live_debugging.json")),
//!     adapter,
//!     settings.poll_interval_handle(),
//! ));
//! registry.register("LIVE_DEBUGGING", pubsub.clone());
//! pubsub.start_subscriber()?;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::PollInterval;
use crate::connector::Connector;
use crate::error::PubSubError;
use crate::metadata::{ConfigMetadata, RawConfig};
use crate::publisher::{PreprocessFn, RemoteConfigPublisher, RemoteConfigPublisherMergeFirst};
use crate::subscriber::{RemoteConfigCallback, RemoteConfigSubscriber};

/// Operations the product registry needs from any binding flavour.
pub trait PubSubBinding: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn start_subscriber(&self) -> Result<(), PubSubError>;

    /// Replaces the worker; required in a child process after `fork`.
    fn restart_subscriber(&self) -> Result<(), PubSubError>;

    fn stop(&self);

    /// Executes one read+callback cycle synchronously, bypassing the timer.
    ///
    /// A worker inherited across `fork` is respawned first.
    fn poll_data(&self) -> Result<bool, PubSubError>;

    /// Hands one target file update to the publisher. A worker inherited
    /// across `fork` is respawned first.
    fn receive(
        &self,
        target: &str,
        metadata: &ConfigMetadata,
        config: RawConfig,
    ) -> Result<(), PubSubError>;

    /// Called once all updates of a polling round were received.
    fn commit(&self) -> Result<(), PubSubError>;
}

/// Binding whose publisher forwards each payload as soon as it arrives.
#[derive(Debug)]
pub struct PubSub {
    publisher: RemoteConfigPublisher,
    subscriber: RemoteConfigSubscriber,
}

impl PubSub {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        callback: Arc<dyn RemoteConfigCallback>,
        interval: PollInterval,
    ) -> Self {
        Self {
            publisher: RemoteConfigPublisher::new(connector.clone(), None),
            subscriber: RemoteConfigSubscriber::new(name, connector, callback, interval),
        }
    }

    /// Same as [`PubSub::new`] with a pre-processing step applied before writes.
    pub fn with_preprocess(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        preprocess: PreprocessFn,
        callback: Arc<dyn RemoteConfigCallback>,
        interval: PollInterval,
    ) -> Self {
        Self {
            publisher: RemoteConfigPublisher::new(connector.clone(), Some(preprocess)),
            subscriber: RemoteConfigSubscriber::new(name, connector, callback, interval),
        }
    }

    pub fn publish(&self, metadata: &ConfigMetadata, config: RawConfig) -> Result<(), PubSubError> {
        Ok(self.publisher.publish(metadata, config)?)
    }

    pub fn subscriber(&self) -> &RemoteConfigSubscriber {
        &self.subscriber
    }
}

impl PubSubBinding for PubSub {
    fn name(&self) -> &str {
        self.subscriber.name()
    }

    fn start_subscriber(&self) -> Result<(), PubSubError> {
        self.subscriber.start()
    }

    fn restart_subscriber(&self) -> Result<(), PubSubError> {
        self.subscriber.force_restart()
    }

    fn stop(&self) {
        self.subscriber.stop();
    }

    fn poll_data(&self) -> Result<bool, PubSubError> {
        self.subscriber.restart_if_forked()?;
        Ok(self.subscriber.poll_once()?)
    }

    fn receive(
        &self,
        _target: &str,
        metadata: &ConfigMetadata,
        config: RawConfig,
    ) -> Result<(), PubSubError> {
        self.subscriber.restart_if_forked()?;
        self.publish(metadata, config)
    }

    fn commit(&self) -> Result<(), PubSubError> {
        Ok(())
    }
}

/// Binding that reassembles all target files of its products before any
/// subscriber sees a payload.
#[derive(Debug)]
pub struct PubSubMergeFirst {
    publisher: RemoteConfigPublisherMergeFirst,
    subscriber: RemoteConfigSubscriber,
}

impl PubSubMergeFirst {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        preprocess: Option<PreprocessFn>,
        callback: Arc<dyn RemoteConfigCallback>,
        interval: PollInterval,
    ) -> Self {
        Self {
            publisher: RemoteConfigPublisherMergeFirst::new(connector.clone(), preprocess),
            subscriber: RemoteConfigSubscriber::new(name, connector, callback, interval),
        }
    }

    /// Accumulates the content of one target file.
    pub fn append(&self, target: impl Into<String>, config_content: RawConfig) {
        self.publisher.append(target, config_content);
    }

    /// Writes the merge of every appended target.
    pub fn publish(&self) -> Result<(), PubSubError> {
        Ok(self.publisher.dispatch()?)
    }

    pub fn subscriber(&self) -> &RemoteConfigSubscriber {
        &self.subscriber
    }
}

impl PubSubBinding for PubSubMergeFirst {
    fn name(&self) -> &str {
        self.subscriber.name()
    }

    fn start_subscriber(&self) -> Result<(), PubSubError> {
        self.subscriber.start()
    }

    fn restart_subscriber(&self) -> Result<(), PubSubError> {
        self.subscriber.force_restart()
    }

    fn stop(&self) {
        self.subscriber.stop();
    }

    fn poll_data(&self) -> Result<bool, PubSubError> {
        self.subscriber.restart_if_forked()?;
        Ok(self.subscriber.poll_once()?)
    }

    fn receive(
        &self,
        target: &str,
        _metadata: &ConfigMetadata,
        config: RawConfig,
    ) -> Result<(), PubSubError> {
        self.subscriber.restart_if_forked()?;
        self.append(target, config);
        Ok(())
    }

    fn commit(&self) -> Result<(), PubSubError> {
        self.publish()
    }
}
