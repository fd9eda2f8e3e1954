// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::probe::ProbeType;

/// A probe definition that cannot be turned into a [`crate::Probe`].
///
/// Raised per probe entry; the adapter skips the entry and keeps processing
/// the rest of the snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeConfigError {
    #[error("invalid probe attributes: missing `{0}`")]
    MissingField(String),
    #[error("invalid probe attribute `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("unsupported probe type: {0}")]
    UnsupportedType(String),
    #[error("{kind} does not support {location} locations")]
    UnsupportedLocation {
        kind: ProbeType,
        location: &'static str,
    },
    #[error("probe location names both a source file and a function")]
    AmbiguousLocation,
    #[error("invalid probe tag `{0}`, expected `key:value`")]
    InvalidTag(String),
}

impl ProbeConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by an [`crate::ExpressionCompiler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot compile expression: {0}")]
pub struct CompileError(pub String);
