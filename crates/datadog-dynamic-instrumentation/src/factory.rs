// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builds [`Probe`]s from their Remote Configuration attributes.
//!
//! Construction is driven by `PROBE_BUILDERS`, one entry per probe kind
//! naming the locations the kind supports and the function that reads its
//! kind-specific attributes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ProbeConfigError;
use crate::expression::{DdExpression, ExpressionCache, ExpressionCompiler};
use crate::probe::{
    CaptureLimits, EvaluateAt, LogProbeSpec, MetricKind, MetricProbeSpec, Probe, ProbeDetails,
    ProbeLocation, ProbeType, TemplateSegment, DEFAULT_PROBE_CONDITION_ERROR_RATE,
    DEFAULT_PROBE_RATE, DEFAULT_SNAPSHOT_PROBE_RATE,
};

type Attributes = Map<String, Value>;
type DetailsBuilder = fn(&ProbeFactory, &Attributes) -> Result<ProbeDetails, ProbeConfigError>;

struct ProbeBuilder {
    kind: ProbeType,
    supports_line: bool,
    supports_function: bool,
    details: DetailsBuilder,
}

const PROBE_BUILDERS: &[ProbeBuilder] = &[
    ProbeBuilder {
        kind: ProbeType::LogProbe,
        supports_line: true,
        supports_function: true,
        details: ProbeFactory::log_details,
    },
    ProbeBuilder {
        kind: ProbeType::MetricProbe,
        supports_line: true,
        supports_function: true,
        details: ProbeFactory::metric_details,
    },
    ProbeBuilder {
        kind: ProbeType::SpanProbe,
        supports_line: false,
        supports_function: true,
        details: ProbeFactory::span_details,
    },
];

/// Turns raw probe definitions into [`Probe`]s, compiling their expressions
/// through a cache it owns.
#[derive(Debug)]
pub struct ProbeFactory {
    expressions: ExpressionCache,
}

impl ProbeFactory {
    pub fn new(compiler: Arc<dyn ExpressionCompiler>, cache_size: usize) -> Self {
        Self {
            expressions: ExpressionCache::new(compiler, cache_size),
        }
    }

    pub fn expressions(&self) -> &ExpressionCache {
        &self.expressions
    }

    /// Builds one probe from its attribute object.
    pub fn build_probe(&self, raw: &Value) -> Result<Probe, ProbeConfigError> {
        let attribs = raw
            .as_object()
            .ok_or_else(|| ProbeConfigError::invalid("probe", "expected an object"))?;

        let kind = required_str(attribs, "type", "type")?;
        let probe_id = required_str(attribs, "id", "id")?.to_string();
        let builder = PROBE_BUILDERS
            .iter()
            .find(|b| b.kind.as_str() == kind)
            .ok_or_else(|| ProbeConfigError::UnsupportedType(kind.to_string()))?;

        let location = parse_location(attribs)?;
        match location {
            ProbeLocation::Line { .. } if !builder.supports_line => {
                return Err(ProbeConfigError::UnsupportedLocation {
                    kind: builder.kind,
                    location: "line",
                })
            }
            ProbeLocation::Function { .. } if !builder.supports_function => {
                return Err(ProbeConfigError::UnsupportedLocation {
                    kind: builder.kind,
                    location: "function",
                })
            }
            _ => {}
        }

        Ok(Probe {
            probe_id,
            version: parse_version(attribs)?,
            tags: parse_tags(attribs)?,
            condition: self.compile_expression(attribs, "when")?,
            condition_error_rate: DEFAULT_PROBE_CONDITION_ERROR_RATE,
            location,
            details: (builder.details)(self, attribs)?,
        })
    }

    fn log_details(&self, attribs: &Attributes) -> Result<ProbeDetails, ProbeConfigError> {
        let take_snapshot = match attribs.get("captureSnapshot") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(ProbeConfigError::invalid("captureSnapshot", "expected a boolean")),
        };

        let mut rate = if take_snapshot {
            DEFAULT_SNAPSHOT_PROBE_RATE
        } else {
            DEFAULT_PROBE_RATE
        };
        if let Some(sampling) = attribs.get("sampling").filter(|s| !s.is_null()) {
            if let Some(per_second) = sampling.get("snapshotsPerSecond") {
                rate = per_second.as_f64().ok_or_else(|| {
                    ProbeConfigError::invalid("sampling.snapshotsPerSecond", "expected a number")
                })?;
            }
        }

        let limits = match attribs.get("capture") {
            None | Some(Value::Null) => None,
            Some(Value::Object(capture)) => Some(parse_capture(capture)?),
            Some(_) => return Err(ProbeConfigError::invalid("capture", "expected an object")),
        };

        let template = match attribs.get("template") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ProbeConfigError::invalid("template", "expected a string")),
        };

        let mut segments = Vec::new();
        if let Some(raw_segments) = attribs.get("segments").filter(|s| !s.is_null()) {
            let raw_segments = raw_segments
                .as_array()
                .ok_or_else(|| ProbeConfigError::invalid("segments", "expected an array"))?;
            for segment in raw_segments {
                if let Some(segment) = self.compile_segment(segment)? {
                    segments.push(segment);
                }
            }
        }

        Ok(ProbeDetails::Log(LogProbeSpec {
            rate,
            take_snapshot,
            limits,
            template,
            segments,
        }))
    }

    fn metric_details(&self, attribs: &Attributes) -> Result<ProbeDetails, ProbeConfigError> {
        let name = required_str(attribs, "metricName", "metricName")?.to_string();
        let kind = required_str(attribs, "kind", "kind")?;
        let kind = MetricKind::parse(kind)
            .ok_or_else(|| ProbeConfigError::invalid("kind", format!("unknown metric kind `{kind}`")))?;
        Ok(ProbeDetails::Metric(MetricProbeSpec {
            name,
            kind,
            value: self.compile_expression(attribs, "value")?,
        }))
    }

    fn span_details(&self, _: &Attributes) -> Result<ProbeDetails, ProbeConfigError> {
        Ok(ProbeDetails::Span)
    }

    /// Compiles the `{dsl, json}` expression stored under `field`, if any.
    fn compile_expression(
        &self,
        attribs: &Attributes,
        field: &str,
    ) -> Result<Option<DdExpression>, ProbeConfigError> {
        let Some(expr) = attribs.get(field).filter(|e| !e.is_null()) else {
            return Ok(None);
        };
        let expr = expr
            .as_object()
            .ok_or_else(|| ProbeConfigError::invalid(field, "expected an expression object"))?;
        self.compile_object(expr, field).map(Some)
    }

    fn compile_object(
        &self,
        expr: &Attributes,
        field: &str,
    ) -> Result<DdExpression, ProbeConfigError> {
        let dsl = required_str(expr, "dsl", &format!("{field}.dsl"))?;
        let ast = expr
            .get("json")
            .ok_or_else(|| ProbeConfigError::MissingField(format!("{field}.json")))?;
        Ok(self.expressions.compile(dsl, ast))
    }

    fn compile_segment(&self, segment: &Value) -> Result<Option<TemplateSegment>, ProbeConfigError> {
        let Some(segment) = segment.as_object() else {
            return Err(ProbeConfigError::invalid("segments", "expected segment objects"));
        };
        if let Some(literal) = segment.get("str").and_then(Value::as_str).filter(|s| !s.is_empty()) {
            return Ok(Some(TemplateSegment::Literal(literal.to_string())));
        }
        if segment.get("json").is_some_and(|json| !json.is_null()) {
            return self
                .compile_object(segment, "segments")
                .map(|expr| Some(TemplateSegment::Expression(expr)));
        }
        let skipped = Value::Object(segment.clone());
        debug!(segment = %skipped, "skipping empty template segment");
        Ok(None)
    }
}

fn required_str<'a>(
    attribs: &'a Attributes,
    key: &str,
    field: &str,
) -> Result<&'a str, ProbeConfigError> {
    match attribs.get(key) {
        None | Some(Value::Null) => Err(ProbeConfigError::MissingField(field.to_string())),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ProbeConfigError::invalid(field, "expected a string")),
    }
}

/// First non-null string among `keys`.
fn first_str<'a>(attribs: &'a Attributes, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| attribs.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
}

fn parse_location(attribs: &Attributes) -> Result<ProbeLocation, ProbeConfigError> {
    let place = match attribs.get("where") {
        None | Some(Value::Null) => return Err(ProbeConfigError::MissingField("where".into())),
        Some(Value::Object(place)) => place,
        Some(_) => return Err(ProbeConfigError::invalid("where", "expected an object")),
    };

    let source_file = first_str(place, &["sourceFile"]);
    let module = first_str(place, &["type", "typeName"]);
    let function = first_str(place, &["method", "methodName"]);

    match (source_file, module.or(function)) {
        (Some(_), Some(_)) => Err(ProbeConfigError::AmbiguousLocation),
        (Some(source_file), None) => Ok(ProbeLocation::Line {
            source_file: source_file.to_string(),
            line: parse_line(place)?,
        }),
        (None, Some(_)) => Ok(ProbeLocation::Function {
            module: module
                .ok_or_else(|| ProbeConfigError::MissingField("where.typeName".into()))?
                .to_string(),
            func_qname: function
                .ok_or_else(|| ProbeConfigError::MissingField("where.methodName".into()))?
                .to_string(),
            evaluate_at: parse_evaluate_at(attribs)?,
        }),
        (None, None) => Err(ProbeConfigError::MissingField(
            "where.sourceFile or where.methodName".into(),
        )),
    }
}

/// First entry of `where.lines`; agents send either numbers or numeric strings.
fn parse_line(place: &Attributes) -> Result<u32, ProbeConfigError> {
    let first = place
        .get("lines")
        .and_then(Value::as_array)
        .and_then(|lines| lines.first())
        .ok_or_else(|| ProbeConfigError::MissingField("where.lines".into()))?;
    let line = match first {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    line.and_then(|l| u32::try_from(l).ok())
        .ok_or_else(|| ProbeConfigError::invalid("where.lines", format!("invalid line number {first}")))
}

fn parse_evaluate_at(attribs: &Attributes) -> Result<EvaluateAt, ProbeConfigError> {
    match attribs.get("evaluateAt") {
        None | Some(Value::Null) => Ok(EvaluateAt::Default),
        Some(Value::String(s)) if s == "ENTRY" => Ok(EvaluateAt::Entry),
        Some(Value::String(s)) if s == "EXIT" => Ok(EvaluateAt::Exit),
        Some(Value::String(s)) if s == "DEFAULT" => Ok(EvaluateAt::Default),
        Some(other) => Err(ProbeConfigError::invalid(
            "evaluateAt",
            format!("unknown evaluation point {other}"),
        )),
    }
}

fn parse_version(attribs: &Attributes) -> Result<i64, ProbeConfigError> {
    match attribs.get("version") {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| ProbeConfigError::invalid("version", "expected an integer")),
    }
}

fn parse_tags(attribs: &Attributes) -> Result<BTreeMap<String, String>, ProbeConfigError> {
    let mut tags = BTreeMap::new();
    let Some(raw) = attribs.get("tags").filter(|t| !t.is_null()) else {
        return Ok(tags);
    };
    let raw = raw
        .as_array()
        .ok_or_else(|| ProbeConfigError::invalid("tags", "expected an array"))?;
    for tag in raw {
        let (key, value) = tag
            .as_str()
            .and_then(|t| t.split_once(':'))
            .ok_or_else(|| ProbeConfigError::InvalidTag(tag.to_string()))?;
        tags.insert(key.to_string(), value.to_string());
    }
    Ok(tags)
}

/// Reads the raw capture limits; unset limits keep their default.
fn parse_capture(capture: &Attributes) -> Result<CaptureLimits, ProbeConfigError> {
    let defaults = CaptureLimits::default();
    Ok(CaptureLimits {
        max_level: capture_limit(capture, "maxReferenceDepth")?.unwrap_or(defaults.max_level),
        max_size: capture_limit(capture, "maxCollectionSize")?.unwrap_or(defaults.max_size),
        max_len: capture_limit(capture, "maxLength")?.unwrap_or(defaults.max_len),
        max_fields: capture_limit(capture, "maxFieldDepth")?.unwrap_or(defaults.max_fields),
    })
}

fn capture_limit(capture: &Attributes, name: &str) -> Result<Option<u32>, ProbeConfigError> {
    let Some(value) = capture.get(name).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| ProbeConfigError::invalid(format!("capture.{name}"), "expected a positive integer"))
}
