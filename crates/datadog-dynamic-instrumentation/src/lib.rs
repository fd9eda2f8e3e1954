// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dynamic instrumentation probes delivered through Remote Configuration.
//!
//! [`ProbeFactory`] builds typed [`Probe`]s from raw probe definitions, and
//! [`ProbeRcAdapter`] plugs into a [`remote_config_pubsub::PubSub`] subscriber
//! to turn repeated snapshots into new/modified/deleted events plus a periodic
//! status heartbeat.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod adapter;
pub mod config;
pub mod error;
pub mod expression;
pub mod factory;
pub mod filter;
pub mod lfu;
pub mod probe;

pub use adapter::{
    diff_probes, live_debugging_pubsub, Clock, ProbeDiff, ProbeEventSink, ProbePollerEvent,
    ProbeRcAdapter, SystemClock, LIVE_DEBUGGING_PRODUCT,
};
pub use config::DebuggerConfig;
pub use error::{CompileError, ProbeConfigError};
pub use expression::{DdExpression, ExpressionCache, ExpressionCompiler, ExpressionFn};
pub use factory::ProbeFactory;
pub use filter::EnvVersionFilter;
pub use probe::{
    CaptureLimits, EvaluateAt, LogProbeSpec, MetricKind, MetricProbeSpec, Probe, ProbeDetails,
    ProbeLocation, ProbeType, TemplateSegment,
};
