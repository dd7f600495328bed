// SPDX-License-Identifier: PMPL-1.0-or-later
//! Remote grouping.
//!
//! A hierarchical request ("group by N levels, aggregate M summaries") is
//! rewritten into one flat projection a backend can compute with a plain
//! GROUP BY, then the flat rows it returns are folded back into a group tree.
//!
//! Flat row layout:
//!
//! ```text
//! 0            original record (null for aggregate rows)
//! 1..=G        group keys, outermost first
//! G+1..        aggregate fields, total summaries then group summaries
//!              SUM/MIN/MAX  one field
//!              AVG          two fields: running sum, running count
//!              COUNT        no field, reads the row count
//! last         row count
//! ```
//!
//! The row-count column is shared by every counting entry, including the
//! trailing total count that becomes `totalCount`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accessor::AccessorResolver;
use crate::aggregate::{AggregateKind, SummaryInfo};
use crate::calculator::{AggregateCalculator, AggregateItem, AggregateSpec, FieldRef};
use crate::config::EngineConfig;
use crate::error::{CompileError, EngineError, EvalError};
use crate::grouping::{group_by_levels, Group, GroupItems};
use crate::shape::Shape;
use crate::sum_fix::SumFix;
use crate::value::Value;

static NULL: Value = Value::Null;

/// One row of a flat grouping result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRow(pub Vec<Value>);

impl FlatRow {
    pub fn new(values: Vec<Value>) -> Self {
        FlatRow(values)
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, position: usize) -> Result<&Value, EvalError> {
        self.0.get(position).ok_or(EvalError::MissingField {
            position,
            width: self.0.len(),
        })
    }

    /// The original record at position 0.
    pub fn record(&self) -> &Value {
        self.0.first().unwrap_or(&NULL)
    }

    pub fn into_record(self) -> Value {
        self.0.into_iter().next().unwrap_or_default()
    }
}

impl From<Vec<Value>> for FlatRow {
    fn from(values: Vec<Value>) -> Self {
        FlatRow(values)
    }
}

impl AggregateItem for FlatRow {
    fn read_field(&self, field: &FieldRef) -> Result<Value, EvalError> {
        match field {
            FieldRef::Position(position) => self.get(*position).cloned(),
            FieldRef::Accessor(accessor) => accessor.read(self.record()),
        }
    }
}

/// What a backend computes for one flat position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum FlatColumn {
    Record,
    Key { level: usize },
    Sum { selector: String },
    Min { selector: String },
    Max { selector: String },
    /// Sum of non-null selector values, first half of an AVG pair.
    AvgSum { selector: String },
    /// Count of non-null selector values, second half of an AVG pair.
    AvgCount { selector: String },
    RowCount,
}

/// A rewritten summary entry and the position it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlatAggregate {
    pub kind: AggregateKind,
    /// For `RemoteAvg`, the sum position; the count follows it.
    pub position: usize,
}

impl FlatAggregate {
    fn spec(self) -> AggregateSpec {
        match self.kind {
            AggregateKind::RemoteAvg => AggregateSpec::remote_avg(self.position, self.position + 1),
            kind => AggregateSpec::new(kind, Some(FieldRef::Position(self.position))),
        }
    }
}

/// Flat projection for push-down execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatPlan {
    pub group_count: usize,
    /// Column `i` describes flat position `i`.
    pub columns: Vec<FlatColumn>,
    /// Rewritten total summaries plus the trailing row count.
    pub total: Vec<FlatAggregate>,
    pub group: Vec<FlatAggregate>,
    pub count_position: usize,
}

impl FlatPlan {
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Outcome of [`RemoteGroupTransformer::reconstruct`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGroupingResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<Group<FlatRow>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Vec<Value>>,
    pub total_count: i64,
}

/// Builds flat plans and folds flat rows back into group trees for one
/// record shape.
#[derive(Debug)]
pub struct RemoteGroupTransformer {
    resolver: AccessorResolver,
}

impl RemoteGroupTransformer {
    pub fn new(shape: Arc<Shape>, config: EngineConfig) -> Self {
        Self {
            resolver: AccessorResolver::new(shape, config.guard_nulls),
        }
    }

    /// Rewrites a grouping request into a flat projection.
    pub fn plan(
        &mut self,
        group_count: usize,
        total: &[SummaryInfo],
        group: &[SummaryInfo],
    ) -> Result<FlatPlan, CompileError> {
        let mut columns = vec![FlatColumn::Record];
        columns.extend((0..group_count).map(|level| FlatColumn::Key { level }));

        let mut total_aggregates = self.rewrite(total, &mut columns)?;
        let mut group_aggregates = self.rewrite(group, &mut columns)?;

        let count_position = columns.len();
        columns.push(FlatColumn::RowCount);
        for aggregate in total_aggregates.iter_mut().chain(group_aggregates.iter_mut()) {
            if aggregate.kind == AggregateKind::RemoteCount {
                aggregate.position = count_position;
            }
        }
        total_aggregates.push(FlatAggregate {
            kind: AggregateKind::RemoteCount,
            position: count_position,
        });

        debug!(
            group_count,
            width = columns.len(),
            total = total.len(),
            group = group.len(),
            "flat plan built"
        );
        Ok(FlatPlan {
            group_count,
            columns,
            total: total_aggregates,
            group: group_aggregates,
            count_position,
        })
    }

    fn rewrite(
        &mut self,
        summaries: &[SummaryInfo],
        columns: &mut Vec<FlatColumn>,
    ) -> Result<Vec<FlatAggregate>, CompileError> {
        let mut aggregates = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let accessor = summary.resolve(&mut self.resolver)?;
            let selector = || accessor.as_ref().map(|a| a.path().to_string()).unwrap_or_default();
            let position = columns.len();
            let kind = match summary.summary_type {
                AggregateKind::Count | AggregateKind::RemoteCount => AggregateKind::RemoteCount,
                AggregateKind::Avg | AggregateKind::RemoteAvg => {
                    columns.push(FlatColumn::AvgSum { selector: selector() });
                    columns.push(FlatColumn::AvgCount { selector: selector() });
                    AggregateKind::RemoteAvg
                }
                AggregateKind::Sum => {
                    columns.push(FlatColumn::Sum { selector: selector() });
                    AggregateKind::Sum
                }
                AggregateKind::Min => {
                    columns.push(FlatColumn::Min { selector: selector() });
                    AggregateKind::Min
                }
                AggregateKind::Max => {
                    columns.push(FlatColumn::Max { selector: selector() });
                    AggregateKind::Max
                }
            };
            aggregates.push(FlatAggregate { kind, position });
        }
        Ok(aggregates)
    }

    /// Folds flat rows shaped by [`RemoteGroupTransformer::plan`] back into a
    /// group tree with totals and group summaries.
    pub fn reconstruct(
        &mut self,
        rows: Vec<FlatRow>,
        group_count: usize,
        total: &[SummaryInfo],
        group: &[SummaryInfo],
    ) -> Result<RemoteGroupingResult, EngineError> {
        let plan = self.plan(group_count, total, group)?;
        let row_count = rows.len();

        let mut data = if group_count > 0 {
            let groups = group_by_levels(rows, group_count, &mut |row: &FlatRow, level| {
                row.get(level + 1).cloned()
            })?;
            GroupItems::Groups(groups)
        } else {
            GroupItems::Rows(rows)
        };

        let calculator = AggregateCalculator::new(
            plan.total.iter().map(|a| a.spec()).collect(),
            plan.group.iter().map(|a| a.spec()).collect(),
        );
        let mut totals = calculator.run(&mut data)?.unwrap_or_default();

        let total_count = match totals.pop() {
            Some(Value::Int(n)) => n,
            Some(other) => {
                return Err(EvalError::TypeMismatch {
                    expected: "int",
                    found: other.kind_name(),
                }
                .into())
            }
            None => 0,
        };

        let mut sum_fix = SumFix::new();
        sum_fix.fix_values(&mut self.resolver, total, &mut totals)?;
        let groups = match data {
            GroupItems::Groups(mut groups) => {
                sum_fix.fix_groups(&mut self.resolver, group, &mut groups)?;
                Some(groups)
            }
            GroupItems::Rows(_) => None,
        };

        debug!(
            rows = row_count,
            groups = groups.as_ref().map_or(0, Vec::len),
            total_count,
            "flat rows reconstructed"
        );
        Ok(RemoteGroupingResult {
            groups,
            totals: (!totals.is_empty()).then_some(totals),
            total_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ValueType;

    fn transformer() -> RemoteGroupTransformer {
        let shape = Shape::builder("Product")
            .field("category", ValueType::String)
            .field("vendor", ValueType::String)
            .field("price", ValueType::Float64)
            .field("stock", ValueType::Int32)
            .build();
        RemoteGroupTransformer::new(Arc::new(shape), EngineConfig::default())
    }

    fn avg_price() -> Vec<SummaryInfo> {
        vec![SummaryInfo::new(AggregateKind::Avg, "price")]
    }

    #[test]
    fn test_plan_positions_for_average() {
        let plan = transformer().plan(2, &avg_price(), &[]).unwrap();
        assert_eq!(
            plan.columns,
            vec![
                FlatColumn::Record,
                FlatColumn::Key { level: 0 },
                FlatColumn::Key { level: 1 },
                FlatColumn::AvgSum { selector: "price".to_string() },
                FlatColumn::AvgCount { selector: "price".to_string() },
                FlatColumn::RowCount,
            ]
        );
        assert_eq!(
            plan.total,
            vec![
                FlatAggregate { kind: AggregateKind::RemoteAvg, position: 3 },
                FlatAggregate { kind: AggregateKind::RemoteCount, position: 5 },
            ]
        );
        assert_eq!(plan.count_position, 5);
    }

    #[test]
    fn test_count_takes_no_position() {
        let total = vec![
            SummaryInfo::count(),
            SummaryInfo::new(AggregateKind::Sum, "stock"),
        ];
        let group = vec![SummaryInfo::new(AggregateKind::Max, "price"), SummaryInfo::count()];
        let plan = transformer().plan(1, &total, &group).unwrap();
        assert_eq!(plan.width(), 5);
        assert_eq!(
            plan.total,
            vec![
                FlatAggregate { kind: AggregateKind::RemoteCount, position: 4 },
                FlatAggregate { kind: AggregateKind::Sum, position: 2 },
                FlatAggregate { kind: AggregateKind::RemoteCount, position: 4 },
            ]
        );
        assert_eq!(
            plan.group,
            vec![
                FlatAggregate { kind: AggregateKind::Max, position: 3 },
                FlatAggregate { kind: AggregateKind::RemoteCount, position: 4 },
            ]
        );
    }

    #[test]
    fn test_plan_rejects_bad_selectors() {
        let sum_text = vec![SummaryInfo::new(AggregateKind::Sum, "vendor")];
        assert!(matches!(
            transformer().plan(0, &sum_text, &[]),
            Err(CompileError::InvalidAggregate { .. })
        ));
        let unknown = vec![SummaryInfo::new(AggregateKind::Min, "colour")];
        assert!(transformer().plan(0, &[], &unknown).is_err());
    }

    #[test]
    fn test_reconstruct_average_example() {
        let rows = vec![FlatRow::new(vec![
            Value::Null,
            Value::from("A"),
            Value::from("B"),
            Value::Int(100),
            Value::Int(4),
            Value::Int(7),
        ])];
        let result = transformer().reconstruct(rows, 2, &avg_price(), &[]).unwrap();
        assert_eq!(result.totals, Some(vec![Value::Float(25.0)]));
        assert_eq!(result.total_count, 7);

        let groups = result.groups.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, Value::from("A"));
        assert_eq!(groups[0].count, Some(1));
    }

    #[test]
    fn test_totals_absent_without_total_summaries() {
        let rows = vec![FlatRow::new(vec![Value::Null, Value::from("A"), Value::Int(3)])];
        let result = transformer().reconstruct(rows, 1, &[], &[]).unwrap();
        assert_eq!(result.totals, None);
        assert_eq!(result.total_count, 3);
    }

    #[test]
    fn test_empty_input_defaults() {
        let total = vec![
            SummaryInfo::new(AggregateKind::Sum, "stock"),
            SummaryInfo::count(),
            SummaryInfo::new(AggregateKind::Avg, "price"),
            SummaryInfo::new(AggregateKind::Sum, "price"),
        ];
        let result = transformer().reconstruct(Vec::new(), 0, &total, &[]).unwrap();
        assert_eq!(
            result.totals,
            Some(vec![Value::Int(0), Value::Int(0), Value::Null, Value::Float(0.0)])
        );
        assert_eq!(result.total_count, 0);
        assert!(result.groups.is_none());
    }

    #[test]
    fn test_sql_style_null_sum_in_group() {
        let group = vec![SummaryInfo::new(AggregateKind::Sum, "stock"), SummaryInfo::count()];
        let rows = vec![
            FlatRow::new(vec![Value::Null, Value::from("tools"), Value::Null, Value::Int(2)]),
            FlatRow::new(vec![Value::Null, Value::from("toys"), Value::Int(9), Value::Int(1)]),
        ];
        let result = transformer().reconstruct(rows, 1, &[], &group).unwrap();
        let groups = result.groups.unwrap();
        assert_eq!(groups[0].summary, Some(vec![Value::Int(0), Value::Int(2)]));
        assert_eq!(groups[1].summary, Some(vec![Value::Int(9), Value::Int(1)]));
        assert_eq!(result.total_count, 3);
    }

    #[test]
    fn test_short_row_is_reported() {
        let rows = vec![FlatRow::new(vec![Value::Null, Value::from("A")])];
        let err = transformer().reconstruct(rows, 1, &avg_price(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::Eval(EvalError::MissingField { position: 2, .. })));
    }

    #[test]
    fn test_plan_serializes_for_backends() {
        let plan = transformer().plan(1, &[SummaryInfo::new(AggregateKind::Min, "price")], &[]).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["columns"][1], serde_json::json!({"op": "key", "level": 0}));
        assert_eq!(json["columns"][2], serde_json::json!({"op": "min", "selector": "price"}));
        assert_eq!(json["total"][0]["kind"], serde_json::json!("min"));
    }
}
