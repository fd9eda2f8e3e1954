// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Probe lifecycle adapter for the Remote Configuration subscriber.
//!
//! Each payload delivered for a configuration id is a full snapshot of the
//! probes under that id. The adapter diffs it against the previous snapshot
//! and emits the minimal set of events, always in the order deleted, modified,
//! new. It also emits a periodic status heartbeat listing every live probe.
//!
//! Subscribers re-deliver the current payload on every poll, so applying the
//! same snapshot twice must, and does, produce no events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use remote_config_pubsub::{
    is_disabled, ConfigMetadata, Connector, PollInterval, PubSub, RawConfig,
    RemoteConfigCallback,
};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::DebuggerConfig;
use crate::factory::ProbeFactory;
use crate::filter::EnvVersionFilter;
use crate::probe::Probe;

/// Remote Configuration product carrying probe definitions.
pub const LIVE_DEBUGGING_PRODUCT: &str = "LIVE_DEBUGGING";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbePollerEvent {
    NewProbes,
    DeletedProbes,
    ModifiedProbes,
    StatusUpdate,
}

/// Receives probe lifecycle events.
pub trait ProbeEventSink: Send + Sync {
    fn on_probe_event(&self, event: ProbePollerEvent, probes: Vec<Probe>);
}

impl<F> ProbeEventSink for F
where
    F: Fn(ProbePollerEvent, Vec<Probe>) + Send + Sync,
{
    fn on_probe_event(&self, event: ProbePollerEvent, probes: Vec<Probe>) {
        self(event, probes)
    }
}

/// Time source for the status heartbeat.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type ProbeTable = BTreeMap<String, Probe>;

/// Difference between two probe tables of the same configuration id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeDiff {
    pub new: Vec<Probe>,
    pub deleted: Vec<Probe>,
    pub modified: Vec<Probe>,
}

impl ProbeDiff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    /// Events in dispatch order, empty groups omitted.
    pub fn into_events(self) -> Vec<(ProbePollerEvent, Vec<Probe>)> {
        [
            (ProbePollerEvent::DeletedProbes, self.deleted),
            (ProbePollerEvent::ModifiedProbes, self.modified),
            (ProbePollerEvent::NewProbes, self.new),
        ]
        .into_iter()
        .filter(|(_, probes)| !probes.is_empty())
        .collect()
    }
}

/// Compares two snapshots keyed by probe id.
pub fn diff_probes(prev: &ProbeTable, next: &ProbeTable) -> ProbeDiff {
    let mut diff = ProbeDiff::default();
    for (id, probe) in next {
        match prev.get(id) {
            None => diff.new.push(probe.clone()),
            Some(old) if old != probe => diff.modified.push(probe.clone()),
            Some(_) => {}
        }
    }
    diff.deleted = prev
        .iter()
        .filter(|(id, _)| !next.contains_key(*id))
        .map(|(_, probe)| probe.clone())
        .collect();
    diff
}

struct AdapterState {
    configs: BTreeMap<String, ProbeTable>,
    /// `None` when the interval is too large to ever elapse.
    next_status: Option<Instant>,
}

/// Turns Remote Configuration payloads into [`ProbePollerEvent`]s.
pub struct ProbeRcAdapter {
    factory: ProbeFactory,
    filter: EnvVersionFilter,
    sink: Arc<dyn ProbeEventSink>,
    clock: Arc<dyn Clock>,
    diagnostics_interval: Duration,
    state: Mutex<AdapterState>,
}

impl ProbeRcAdapter {
    pub fn new(factory: ProbeFactory, sink: Arc<dyn ProbeEventSink>, config: &DebuggerConfig) -> Self {
        Self::with_clock(factory, sink, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        factory: ProbeFactory,
        sink: Arc<dyn ProbeEventSink>,
        config: &DebuggerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let next_status = clock.now().checked_add(config.diagnostics_interval);
        Self {
            factory,
            filter: config.filter(),
            sink,
            clock,
            diagnostics_interval: config.diagnostics_interval,
            state: Mutex::new(AdapterState {
                configs: BTreeMap::new(),
                next_status,
            }),
        }
    }

    /// Every live probe across all configuration ids.
    pub fn probes(&self) -> Vec<Probe> {
        let state = self.lock_state();
        state
            .configs
            .values()
            .flat_map(|table| table.values().cloned())
            .collect()
    }

    pub fn config_ids(&self) -> Vec<String> {
        self.lock_state().configs.keys().cloned().collect()
    }

    /// Applies one snapshot for `config_id` and dispatches the resulting events.
    pub fn update_probes_for_config(&self, config_id: &str, config: &RawConfig) {
        let entries: Vec<&Value> = if is_disabled(config) {
            Vec::new()
        } else {
            match config {
                Value::Array(entries) => entries.iter().collect(),
                Value::Object(_) => vec![config],
                other => {
                    error!(config_id = %config_id, payload = %other, "remote-config: unexpected probe configuration payload");
                    return;
                }
            }
        };
        let built: Vec<_> = entries
            .into_iter()
            .map(|raw| (raw, self.factory.build_probe(raw)))
            .collect();

        let diff = {
            let mut state = self.lock_state();
            let prev = state.configs.remove(config_id).unwrap_or_default();
            let mut next = ProbeTable::new();

            for (raw, result) in built {
                let probe = match result {
                    Ok(probe) => probe,
                    Err(err) => {
                        let probe_id = raw.get("id").and_then(Value::as_str);
                        error!(config_id = %config_id, probe_id = ?probe_id, error = %err, "remote-config: cannot build probe");
                        // Keep the last good version rather than deleting it.
                        if let Some(previous) = probe_id.and_then(|id| prev.get(id)) {
                            next.insert(previous.probe_id.clone(), previous.clone());
                        }
                        continue;
                    }
                };
                if !self.filter.matches(&probe) {
                    debug!(config_id = %config_id, probe_id = %probe.probe_id, "probe does not target this env/version");
                    continue;
                }
                if let Some(replaced) = next.insert(probe.probe_id.clone(), probe) {
                    warn!(config_id = %config_id, probe_id = %replaced.probe_id, "duplicate probe id in snapshot, keeping the last one");
                }
            }

            let diff = diff_probes(&prev, &next);
            if !next.is_empty() {
                state.configs.insert(config_id.to_string(), next);
            }
            diff
        };

        for (event, probes) in diff.into_events() {
            debug!(config_id = %config_id, event = ?event, count = probes.len(), "dispatching probe event");
            self.sink.on_probe_event(event, probes);
        }
    }

    /// Emits the status heartbeat when due, at most once per interval.
    fn maybe_emit_status(&self) {
        let probes = {
            let mut state = self.lock_state();
            let now = self.clock.now();
            match state.next_status {
                Some(deadline) if now >= deadline => {}
                _ => return,
            }
            state.next_status = now.checked_add(self.diagnostics_interval);
            state
                .configs
                .values()
                .flat_map(|table| table.values().cloned())
                .collect::<Vec<_>>()
        };
        debug!(count = probes.len(), "emitting probe status update");
        self.sink.on_probe_event(ProbePollerEvent::StatusUpdate, probes);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteConfigCallback for ProbeRcAdapter {
    fn on_config(&self, metadata: Option<&ConfigMetadata>, config: &RawConfig) {
        self.maybe_emit_status();
        let Some(metadata) = metadata else {
            debug!("no remote config metadata");
            return;
        };
        self.update_probes_for_config(&metadata.id, config);
    }
}

impl fmt::Debug for ProbeRcAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRcAdapter")
            .field("factory", &self.factory)
            .field("filter", &self.filter)
            .field("diagnostics_interval", &self.diagnostics_interval)
            .field("config_ids", &self.config_ids())
            .finish_non_exhaustive()
    }
}

/// Binds `adapter` to a PubSub delivering the probe product.
pub fn live_debugging_pubsub(
    adapter: Arc<ProbeRcAdapter>,
    connector: Arc<dyn Connector>,
    interval: PollInterval,
) -> PubSub {
    PubSub::new("DI", connector, adapter, interval)
}
