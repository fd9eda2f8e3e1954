// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven settings for the PubSub pipeline.
//!
//! The poll interval is exposed as a shared [`PollInterval`] handle: every
//! subscriber worker re-reads it before each sleep, so operators can change
//! the cadence without restarting the workers.

use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Name of the environment variable toggling remote configuration.
const ENV_ENABLED: &str = "DD_REMOTE_CONFIGURATION_ENABLED";
/// Environment variable holding the poll interval in (fractional) seconds.
const ENV_POLL_INTERVAL: &str = "DD_REMOTE_CONFIG_POLL_INTERVAL_SECONDS";

/// Poll interval used when none (or an invalid one) is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest sleep a worker will ever take, so a zero interval cannot spin.
const MIN_POLL_INTERVAL_MS: u64 = 1;

/// Live-reloadable poll interval shared between the settings owner and workers.
#[derive(Debug, Clone)]
pub struct PollInterval {
    millis: Arc<AtomicU64>,
}

impl PollInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(to_millis(interval))),
        }
    }

    /// Current interval; takes effect on the next worker sleep.
    pub fn get(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::Relaxed))
    }

    pub fn set(&self, interval: Duration) {
        self.millis.store(to_millis(interval), Ordering::Relaxed);
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

fn to_millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis())
        .unwrap_or(u64::MAX)
        .max(MIN_POLL_INTERVAL_MS)
}

/// Settings captured from the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubSettings {
    /// Whether remote configuration is enabled. Defaults to `true`.
    pub enabled: bool,
    /// Delay between two subscriber polls.
    pub poll_interval: Duration,
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PubSubSettings {
    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        Self {
            enabled: parse_bool(map.get(ENV_ENABLED).map(String::as_str), true),
            poll_interval: parse_seconds(map.get(ENV_POLL_INTERVAL).map(String::as_str))
                .unwrap_or(DEFAULT_POLL_INTERVAL),
        }
    }

    /// Creates a fresh interval handle seeded from these settings.
    pub fn poll_interval_handle(&self) -> PollInterval {
        PollInterval::new(self.poll_interval)
    }

    /// Pushes these settings into an existing handle (live reload).
    pub fn apply(&self, interval: &PollInterval) {
        interval.set(self.poll_interval);
    }
}

/// Parses boolean values from strings, falling back to the provided default.
pub(crate) fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}

/// Parses a strictly positive, finite number of seconds.
fn parse_seconds(value: Option<&str>) -> Option<Duration> {
    let seconds: f64 = value?.trim().parse().ok()?;
    if seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn settings_from_process_environment() {
        env::set_var(ENV_POLL_INTERVAL, "1.5");
        env::set_var(ENV_ENABLED, "no");

        let settings = PubSubSettings::from_os_env();
        assert!(!settings.enabled);
        assert_eq!(settings.poll_interval, Duration::from_millis(1500));

        env::remove_var(ENV_POLL_INTERVAL);
        env::remove_var(ENV_ENABLED);
    }

    #[test]
    fn settings_defaults() {
        let settings = PubSubSettings::from_env_iter::<Vec<(String, String)>, _, _>(vec![]);
        assert!(settings.enabled);
        assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(settings, PubSubSettings::default());
    }

    #[test]
    fn settings_read_fractional_interval() {
        let settings = PubSubSettings::from_env_iter(vec![
            (ENV_POLL_INTERVAL, "0.25"),
            (ENV_ENABLED, "False"),
        ]);
        assert!(!settings.enabled);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn invalid_interval_falls_back_to_default() {
        for raw in ["", "abc", "-1", "0", "NaN", "inf", "1e30"] {
            let settings = PubSubSettings::from_env_iter(vec![(ENV_POLL_INTERVAL, raw)]);
            assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL, "{raw}");
        }
    }

    #[test]
    fn poll_interval_is_shared_between_clones() {
        let interval = PollInterval::new(Duration::from_secs(1));
        let worker_view = interval.clone();

        let settings = PubSubSettings::from_env_iter(vec![(ENV_POLL_INTERVAL, "2")]);
        settings.apply(&interval);
        assert_eq!(worker_view.get(), Duration::from_secs(2));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let interval = PollInterval::new(Duration::ZERO);
        assert_eq!(interval.get(), Duration::from_millis(MIN_POLL_INTERVAL_MS));
    }

    #[test]
    fn parse_bool_permits_common_variants() {
        assert!(parse_bool(Some("YES"), false));
        assert!(!parse_bool(Some("0"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }
}
