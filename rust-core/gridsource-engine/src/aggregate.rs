// SPDX-License-Identifier: PMPL-1.0-or-later
//! Summary descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::accessor::{AccessorResolver, ResolvedAccessor};
use crate::error::CompileError;

/// Aggregate kinds. `RemoteCount` and `RemoteAvg` only appear in flat plans
/// sent to an execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregateKind {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    RemoteCount,
    RemoteAvg,
}

impl AggregateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Count => "count",
            AggregateKind::Avg => "avg",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::RemoteCount => "REMOTE_COUNT",
            AggregateKind::RemoteAvg => "REMOTE_AVG",
        }
    }

    /// Whether the kind reads a selector.
    pub fn needs_selector(self) -> bool {
        !matches!(self, AggregateKind::Count | AggregateKind::RemoteCount)
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "sum" => AggregateKind::Sum,
            "count" => AggregateKind::Count,
            "avg" => AggregateKind::Avg,
            "min" => AggregateKind::Min,
            "max" => AggregateKind::Max,
            "remote_count" => AggregateKind::RemoteCount,
            "remote_avg" => AggregateKind::RemoteAvg,
            _ => {
                return Err(CompileError::InvalidAggregate {
                    kind: s.to_string(),
                    reason: "unknown summary type".to_string(),
                })
            }
        };
        Ok(kind)
    }
}

impl TryFrom<String> for AggregateKind {
    type Error = CompileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregateKind> for String {
    fn from(kind: AggregateKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A requested summary: `{ "selector": "price", "summaryType": "sum" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(alias = "type")]
    pub summary_type: AggregateKind,
}

impl SummaryInfo {
    pub fn new(summary_type: AggregateKind, selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            summary_type,
        }
    }

    pub fn count() -> Self {
        Self {
            selector: None,
            summary_type: AggregateKind::Count,
        }
    }

    /// Resolves and validates the selector. Counting kinds return `None`.
    ///
    /// SUM and AVG require an additive type, MIN and MAX an ordered one.
    /// Untyped members are accepted and checked when values are folded.
    pub fn resolve(&self, resolver: &mut AccessorResolver) -> Result<Option<ResolvedAccessor>, CompileError> {
        let kind = self.summary_type;
        if !kind.needs_selector() {
            return Ok(None);
        }
        let invalid = |reason: String| CompileError::InvalidAggregate {
            kind: kind.to_string(),
            reason,
        };
        let selector = self
            .selector
            .as_deref()
            .ok_or_else(|| invalid("a selector is required".to_string()))?;
        let accessor = resolver.resolve(selector)?;
        let ty = accessor.value_type();
        let accepted = ty.is_dynamic()
            || match kind {
                AggregateKind::Sum | AggregateKind::Avg | AggregateKind::RemoteAvg => ty.is_summable(),
                _ => ty.is_comparable(),
            };
        if !accepted {
            return Err(invalid(format!("'{selector}' has type {ty}")));
        }
        Ok(Some(accessor))
    }
}
