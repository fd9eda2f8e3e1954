// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-process polling worker.
//!
//! Each [`RemoteConfigSubscriber`] owns at most one dedicated OS thread that
//! repeatedly reads its connector and hands non-empty payloads to a callback.
//! The thread drives a current-thread Tokio runtime so the sleep between polls
//! can be interrupted by a [`CancellationToken`].
//!
//! Threads do not survive `fork`. The worker therefore records the process id
//! it was spawned in; when the subscriber is used from a different process the
//! worker is considered lost and [`RemoteConfigSubscriber::start`] (or
//! [`RemoteConfigSubscriber::restart_if_forked`], which the PubSub bindings
//! call on every poll and publish) spawns a new one in the child.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::PollInterval;
use crate::connector::Connector;
use crate::error::{ConnectorError, PubSubError};
use crate::metadata::{ConfigMetadata, RawConfig};

/// Receives payloads read by a subscriber.
///
/// Invocations from one subscriber never overlap. The same callback may be
/// shared by several subscribers, in which case it must tolerate concurrent
/// calls.
pub trait RemoteConfigCallback: Send + Sync {
    fn on_config(&self, metadata: Option<&ConfigMetadata>, config: &RawConfig);
}

impl<F> RemoteConfigCallback for F
where
    F: Fn(Option<&ConfigMetadata>, &RawConfig) + Send + Sync,
{
    fn on_config(&self, metadata: Option<&ConfigMetadata>, config: &RawConfig) {
        self(metadata, config)
    }
}

/// State shared between the subscriber handle and its worker thread.
struct SubscriberShared {
    name: String,
    connector: Arc<dyn Connector>,
    callback: Arc<dyn RemoteConfigCallback>,
    interval: PollInterval,
}

impl SubscriberShared {
    /// Reads the connector once and runs the callback when a payload exists.
    fn poll_once(&self) -> Result<bool, ConnectorError> {
        let Some(data) = self.connector.read()? else {
            return Ok(false);
        };
        debug!(pid = process::id(), name = %self.name, "subscriber executing callback");
        self.callback.on_config(data.metadata.as_ref(), &data.config);
        Ok(true)
    }

    /// Poll used by the worker loop: nothing read or raised by the callback
    /// may terminate the loop.
    fn poll_logged(&self) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.poll_once())) {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                debug!(pid = process::id(), name = %self.name, error = %err, "subscriber failed to read connector");
            }
            Err(_) => {
                error!(pid = process::id(), name = %self.name, "subscriber callback panicked");
            }
        }
    }
}

/// Handle on a spawned worker thread.
struct Worker {
    pid: u32,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    fn belongs_to_current_process(&self) -> bool {
        self.pid == process::id()
    }

    fn is_alive(&self) -> bool {
        self.belongs_to_current_process() && !self.handle.is_finished()
    }

    fn shutdown(self, name: &str) {
        if !self.belongs_to_current_process() {
            // The thread only exists in the parent; its handle is meaningless
            // here and must not be joined or detached.
            debug!(pid = process::id(), name = %name, "discarding subscriber worker inherited across fork");
            std::mem::forget(self.handle);
            return;
        }
        self.cancel.cancel();
        if self.handle.thread().id() == thread::current().id() {
            // Stopped from inside the callback: the loop exits on its own.
            return;
        }
        if self.handle.join().is_err() {
            error!(pid = process::id(), name = %name, "subscriber worker terminated abnormally");
        }
    }
}

/// Background poller delivering connector payloads to a callback.
pub struct RemoteConfigSubscriber {
    shared: Arc<SubscriberShared>,
    worker: Mutex<Option<Worker>>,
}

impl RemoteConfigSubscriber {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        callback: Arc<dyn RemoteConfigCallback>,
        interval: PollInterval,
    ) -> Self {
        let name = name.into();
        debug!(pid = process::id(), name = %name, "subscriber init");
        Self {
            shared: Arc::new(SubscriberShared {
                name,
                connector,
                callback,
                interval,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Interval handle the worker reads before every sleep.
    pub fn interval(&self) -> &PollInterval {
        &self.shared.interval
    }

    /// Whether a worker thread is alive in the current process.
    pub fn is_running(&self) -> bool {
        self.lock_worker().as_ref().is_some_and(Worker::is_alive)
    }

    /// Spawns the worker unless one is already running in this process.
    pub fn start(&self) -> Result<(), PubSubError> {
        let mut worker = self.lock_worker();
        if worker.as_ref().is_some_and(Worker::is_alive) {
            return Ok(());
        }
        if let Some(stale) = worker.take() {
            stale.shutdown(&self.shared.name);
        }
        debug!(pid = process::id(), name = %self.shared.name, "subscriber starts");
        *worker = Some(self.spawn_worker()?);
        Ok(())
    }

    /// Respawns the worker when the recorded one was started by another
    /// process (the parent before a `fork`).
    ///
    /// Returns whether a new worker was spawned. A subscriber that was never
    /// started, or was stopped, is left alone.
    pub fn restart_if_forked(&self) -> Result<bool, PubSubError> {
        let forked = self
            .lock_worker()
            .as_ref()
            .is_some_and(|worker| !worker.belongs_to_current_process());
        if !forked {
            return Ok(false);
        }
        debug!(pid = process::id(), name = %self.shared.name, "subscriber worker lost to fork");
        self.start()?;
        Ok(true)
    }

    /// Stops the worker (if any) and immediately starts a new one.
    pub fn force_restart(&self) -> Result<(), PubSubError> {
        debug!(pid = process::id(), name = %self.shared.name, "subscriber worker restarts");
        self.stop();
        self.start()
    }

    /// Signals the worker and waits for it to exit.
    ///
    /// The worker observes the request immediately, even mid-sleep; an
    /// in-flight callback is allowed to finish.
    pub fn stop(&self) {
        let worker = self.lock_worker().take();
        if let Some(worker) = worker {
            worker.shutdown(&self.shared.name);
            debug!(pid = process::id(), name = %self.shared.name, "subscriber stopped");
        }
    }

    /// Runs one read+callback cycle on the calling thread.
    ///
    /// Returns whether the callback was invoked.
    pub fn poll_once(&self) -> Result<bool, ConnectorError> {
        self.shared.poll_once()
    }

    /// Makes the current worker look as if a parent process had spawned it.
    /// Returns the token still able to stop the real thread.
    #[cfg(test)]
    pub(crate) fn simulate_fork(&self) -> Option<CancellationToken> {
        let mut worker = self.lock_worker();
        let worker = worker.as_mut()?;
        worker.pid = worker.pid.wrapping_add(1);
        Some(worker.cancel.clone())
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_worker(&self) -> Result<Worker, PubSubError> {
        let shared = Arc::clone(&self.shared);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("rc-subscriber-{}", self.shared.name))
            .spawn(move || run_worker(shared, worker_cancel))
            .map_err(|source| PubSubError::WorkerSpawn {
                name: self.shared.name.clone(),
                source,
            })?;
        Ok(Worker {
            pid: process::id(),
            cancel,
            handle,
        })
    }
}

impl Drop for RemoteConfigSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for RemoteConfigSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfigSubscriber")
            .field("name", &self.shared.name)
            .field("connector", &self.shared.connector)
            .field("interval", &self.shared.interval.get())
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_worker(shared: Arc<SubscriberShared>, cancel: CancellationToken) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(name = %shared.name, error = %err, "unable to build subscriber runtime");
            return;
        }
    };

    runtime.block_on(async {
        while !cancel.is_cancelled() {
            shared.poll_logged();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(shared.interval.get()) => {}
            }
        }
    });
    debug!(pid = process::id(), name = %shared.name, "subscriber worker exited");
}
