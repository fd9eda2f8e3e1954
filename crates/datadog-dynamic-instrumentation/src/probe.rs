// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Probe model.
//!
//! A [`Probe`] is one of a closed set of kinds ([`ProbeType`]) placed at a
//! [`ProbeLocation`]. Kind-specific attributes live in [`ProbeDetails`].
//! Probes compare structurally; expressions compare by DSL source.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expression::DdExpression;

/// Snapshots per second when a log probe captures snapshots.
pub const DEFAULT_SNAPSHOT_PROBE_RATE: f64 = 1.0;
/// Log lines per second for probes that only emit a message.
pub const DEFAULT_PROBE_RATE: f64 = 5000.0;
/// Condition evaluation errors reported per second.
pub const DEFAULT_PROBE_CONDITION_ERROR_RATE: f64 = 1.0 / 60.0 / 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeType {
    LogProbe,
    MetricProbe,
    SpanProbe,
}

impl ProbeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogProbe => "LOG_PROBE",
            Self::MetricProbe => "METRIC_PROBE",
            Self::SpanProbe => "SPAN_PROBE",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "LOG_PROBE" => Some(Self::LogProbe),
            "METRIC_PROBE" => Some(Self::MetricProbe),
            "SPAN_PROBE" => Some(Self::SpanProbe),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a function probe fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluateAt {
    Entry,
    Exit,
    #[default]
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeLocation {
    Line {
        source_file: String,
        line: u32,
    },
    Function {
        module: String,
        func_qname: String,
        evaluate_at: EvaluateAt,
    },
}

impl ProbeLocation {
    pub fn is_line(&self) -> bool {
        matches!(self, Self::Line { .. })
    }
}

/// How much of the captured state a snapshot may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub max_level: u32,
    pub max_size: u32,
    pub max_len: u32,
    pub max_fields: u32,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_level: 1,
            max_size: 50,
            max_len: 255,
            max_fields: 20,
        }
    }
}

/// A piece of a log probe message template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    Literal(String),
    Expression(DdExpression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogProbeSpec {
    /// Emission rate limit, per second.
    pub rate: f64,
    pub take_snapshot: bool,
    /// `None` when the probe did not ask for specific limits.
    pub limits: Option<CaptureLimits>,
    pub template: Option<String>,
    pub segments: Vec<TemplateSegment>,
}

impl LogProbeSpec {
    pub fn effective_limits(&self) -> CaptureLimits {
        self.limits.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    Count,
    Gauge,
    Histogram,
    Distribution,
}

impl MetricKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "COUNT" => Some(Self::Count),
            "GAUGE" => Some(Self::Gauge),
            "HISTOGRAM" => Some(Self::Histogram),
            "DISTRIBUTION" => Some(Self::Distribution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricProbeSpec {
    pub name: String,
    pub kind: MetricKind,
    /// Value recorded on each hit; counts default to one when absent.
    pub value: Option<DdExpression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeDetails {
    Log(LogProbeSpec),
    Metric(MetricProbeSpec),
    Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub probe_id: String,
    pub version: i64,
    pub tags: BTreeMap<String, String>,
    pub condition: Option<DdExpression>,
    pub condition_error_rate: f64,
    pub location: ProbeLocation,
    pub details: ProbeDetails,
}

impl Probe {
    pub fn probe_type(&self) -> ProbeType {
        match self.details {
            ProbeDetails::Log(_) => ProbeType::LogProbe,
            ProbeDetails::Metric(_) => ProbeType::MetricProbe,
            ProbeDetails::Span => ProbeType::SpanProbe,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_type_names_round_trip() {
        for kind in [
            ProbeType::LogProbe,
            ProbeType::MetricProbe,
            ProbeType::SpanProbe,
        ] {
            assert_eq!(ProbeType::parse(kind.as_str()), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).expect("serialize"),
                serde_json::Value::String(kind.to_string())
            );
        }
        assert_eq!(ProbeType::parse("TRIGGER_PROBE"), None);
    }

    #[test]
    fn condition_error_rate_is_one_per_five_minutes() {
        assert!((DEFAULT_PROBE_CONDITION_ERROR_RATE * 300.0 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn log_probe_falls_back_to_default_limits() {
        let spec = LogProbeSpec {
            rate: DEFAULT_PROBE_RATE,
            take_snapshot: false,
            limits: None,
            template: None,
            segments: vec![],
        };
        assert_eq!(spec.effective_limits(), CaptureLimits::default());
        assert_eq!(CaptureLimits::default().max_len, 255);
    }
}
