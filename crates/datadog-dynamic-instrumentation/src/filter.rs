// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::probe::Probe;

/// Keeps the probes targeting this application's `env` and `version`.
///
/// A probe without an `env` (or `version`) tag matches any value. A tagged
/// probe only matches when the application reports the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVersionFilter {
    env: Option<String>,
    version: Option<String>,
}

impl EnvVersionFilter {
    pub fn new(env: Option<String>, version: Option<String>) -> Self {
        Self { env, version }
    }

    pub fn matches(&self, probe: &Probe) -> bool {
        tag_matches(probe.tag("env"), self.env.as_deref())
            && tag_matches(probe.tag("version"), self.version.as_deref())
    }
}

fn tag_matches(tag: Option<&str>, configured: Option<&str>) -> bool {
    tag.map_or(true, |tag| Some(tag) == configured)
}
