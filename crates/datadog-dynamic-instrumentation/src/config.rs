// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::filter::EnvVersionFilter;

const ENV_DIAGNOSTICS_INTERVAL: &str = "DD_DYNAMIC_INSTRUMENTATION_DIAGNOSTICS_INTERVAL";
const ENV_EXPRESSION_CACHE_SIZE: &str = "DD_DYNAMIC_INSTRUMENTATION_EXPRESSION_CACHE_SIZE";
const ENV_ENV: &str = "DD_ENV";
const ENV_VERSION: &str = "DD_VERSION";

pub const DEFAULT_DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_EXPRESSION_CACHE_SIZE: usize = 256;

/// Dynamic instrumentation settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct DebuggerConfig {
    /// Delay between two probe status heartbeats.
    pub diagnostics_interval: Duration,
    /// Application environment; probes tagged with another `env` are ignored.
    pub env: Option<String>,
    /// Application version; probes tagged with another `version` are ignored.
    pub version: Option<String>,
    /// Capacity of the compiled expression cache.
    pub expression_cache_size: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            diagnostics_interval: DEFAULT_DIAGNOSTICS_INTERVAL,
            env: None,
            version: None,
            expression_cache_size: DEFAULT_EXPRESSION_CACHE_SIZE,
        }
    }
}

impl DebuggerConfig {
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds the config from key/value pairs (typically for tests).
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
        let non_empty = |key: &str| {
            map.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            diagnostics_interval: map
                .get(ENV_DIAGNOSTICS_INTERVAL)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or(DEFAULT_DIAGNOSTICS_INTERVAL),
            env: non_empty(ENV_ENV),
            version: non_empty(ENV_VERSION),
            expression_cache_size: map
                .get(ENV_EXPRESSION_CACHE_SIZE)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_EXPRESSION_CACHE_SIZE),
        }
    }

    /// Tag filter matching this application's env and version.
    pub fn filter(&self) -> EnvVersionFilter {
        EnvVersionFilter::new(self.env.clone(), self.version.clone())
    }
}
