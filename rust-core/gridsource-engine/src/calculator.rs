// SPDX-License-Identifier: PMPL-1.0-or-later
//! Aggregate evaluation over rows and group trees.
//!
//! The calculator walks a [`GroupItems`] tree once. Each row is folded into
//! the total aggregators and into the aggregators of every group on the path
//! down to it; when a group is left its aggregators are finished into
//! `group.summary`.
//!
//! The same calculator serves records in memory (fields read through
//! accessors) and flat rows returned by a backend (fields read by position).

use std::cmp::Ordering;

use crate::accessor::{AccessorResolver, ResolvedAccessor};
use crate::accumulator::{Accumulator, DynamicAccumulator};
use crate::aggregate::{AggregateKind, SummaryInfo};
use crate::error::{CompileError, EvalError};
use crate::grouping::GroupItems;
use crate::value::{canonical_cmp, Value};

/// Where an aggregate reads its input.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    Accessor(ResolvedAccessor),
    Position(usize),
}

/// Something an aggregate can read fields from.
pub trait AggregateItem {
    fn read_field(&self, field: &FieldRef) -> Result<Value, EvalError>;
}

impl AggregateItem for Value {
    fn read_field(&self, field: &FieldRef) -> Result<Value, EvalError> {
        match field {
            FieldRef::Accessor(accessor) => accessor.read(self),
            FieldRef::Position(_) => Err(EvalError::TypeMismatch {
                expected: "flat row",
                found: self.kind_name(),
            }),
        }
    }
}

/// One aggregate to compute.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    /// Input field; `None` for COUNT.
    pub field: Option<FieldRef>,
    /// Running-count field of a REMOTE_AVG pair.
    pub count_field: Option<FieldRef>,
}

impl AggregateSpec {
    pub fn new(kind: AggregateKind, field: Option<FieldRef>) -> Self {
        Self {
            kind,
            field,
            count_field: None,
        }
    }

    pub fn remote_avg(sum: usize, count: usize) -> Self {
        Self {
            kind: AggregateKind::RemoteAvg,
            field: Some(FieldRef::Position(sum)),
            count_field: Some(FieldRef::Position(count)),
        }
    }
}

#[derive(Debug)]
enum Aggregator {
    Sum(DynamicAccumulator, bool),
    Count(u64),
    Avg(DynamicAccumulator, u64),
    Min(Option<Value>),
    Max(Option<Value>),
    RemoteCount(i64),
    RemoteAvg(DynamicAccumulator, i64),
}

impl Aggregator {
    fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Sum => Aggregator::Sum(DynamicAccumulator::default(), false),
            AggregateKind::Count => Aggregator::Count(0),
            AggregateKind::Avg => Aggregator::Avg(DynamicAccumulator::default(), 0),
            AggregateKind::Min => Aggregator::Min(None),
            AggregateKind::Max => Aggregator::Max(None),
            AggregateKind::RemoteCount => Aggregator::RemoteCount(0),
            AggregateKind::RemoteAvg => Aggregator::RemoteAvg(DynamicAccumulator::default(), 0),
        }
    }

    fn step<T: AggregateItem>(&mut self, spec: &AggregateSpec, item: &T) -> Result<(), EvalError> {
        let input = match &spec.field {
            Some(field) => item.read_field(field)?,
            None => Value::Null,
        };
        match self {
            Aggregator::Count(n) => *n += 1,
            Aggregator::Sum(acc, seen) => {
                if !input.is_null() {
                    acc.add(&input)?;
                    *seen = true;
                }
            }
            Aggregator::Avg(acc, count) => {
                if !input.is_null() {
                    acc.add(&input)?;
                    *count += 1;
                }
            }
            Aggregator::Min(current) => keep_extreme(current, input, Ordering::Less),
            Aggregator::Max(current) => keep_extreme(current, input, Ordering::Greater),
            Aggregator::RemoteCount(total) => *total = total.saturating_add(as_count(&input)?),
            Aggregator::RemoteAvg(acc, count) => {
                if !input.is_null() {
                    acc.add(&input)?;
                }
                if let Some(field) = &spec.count_field {
                    *count = count.saturating_add(as_count(&item.read_field(field)?)?);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Aggregator::Sum(acc, seen) => {
                if seen {
                    acc.value()
                } else {
                    Value::Null
                }
            }
            Aggregator::Count(n) => Value::Int(i64::try_from(n).unwrap_or(i64::MAX)),
            Aggregator::Avg(acc, count) => acc.divide(count),
            Aggregator::Min(v) | Aggregator::Max(v) => v.unwrap_or_default(),
            Aggregator::RemoteCount(n) => Value::Int(n),
            Aggregator::RemoteAvg(acc, count) => acc.divide(u64::try_from(count).unwrap_or(0)),
        }
    }
}

fn keep_extreme(current: &mut Option<Value>, candidate: Value, wanted: Ordering) {
    if candidate.is_null() {
        return;
    }
    match current {
        Some(existing) if canonical_cmp(&candidate, existing) != wanted => {}
        _ => *current = Some(candidate),
    }
}

fn as_count(value: &Value) -> Result<i64, EvalError> {
    match value {
        Value::Null => Ok(0),
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        other => Err(EvalError::TypeMismatch {
            expected: "count",
            found: other.kind_name(),
        }),
    }
}

/// Computes total and per-group aggregates.
#[derive(Debug, Clone, Default)]
pub struct AggregateCalculator {
    total: Vec<AggregateSpec>,
    group: Vec<AggregateSpec>,
}

impl AggregateCalculator {
    pub fn new(total: Vec<AggregateSpec>, group: Vec<AggregateSpec>) -> Self {
        Self { total, group }
    }

    /// Calculator over records, reading selectors through `resolver`.
    pub fn for_records(
        resolver: &mut AccessorResolver,
        total: &[SummaryInfo],
        group: &[SummaryInfo],
    ) -> Result<Self, CompileError> {
        let mut specs = |summaries: &[SummaryInfo]| -> Result<Vec<AggregateSpec>, CompileError> {
            summaries
                .iter()
                .map(|summary| {
                    let field = summary.resolve(resolver)?.map(FieldRef::Accessor);
                    Ok(AggregateSpec::new(summary.summary_type, field))
                })
                .collect()
        };
        Ok(Self::new(specs(total)?, specs(group)?))
    }

    /// Folds `data`, storing group summaries in place. Returns the totals, or
    /// `None` when no total aggregates were requested.
    pub fn run<T: AggregateItem>(&self, data: &mut GroupItems<T>) -> Result<Option<Vec<Value>>, EvalError> {
        let mut totals = self.fresh(&self.total);
        let mut stack = Vec::new();
        self.visit(data, &mut totals, &mut stack)?;
        if self.total.is_empty() {
            return Ok(None);
        }
        Ok(Some(totals.into_iter().map(Aggregator::finish).collect()))
    }

    fn fresh(&self, specs: &[AggregateSpec]) -> Vec<Aggregator> {
        specs.iter().map(|spec| Aggregator::new(spec.kind)).collect()
    }

    fn visit<T: AggregateItem>(
        &self,
        data: &mut GroupItems<T>,
        totals: &mut [Aggregator],
        stack: &mut Vec<Vec<Aggregator>>,
    ) -> Result<(), EvalError> {
        match data {
            GroupItems::Rows(rows) => {
                for row in rows.iter() {
                    for (aggregator, spec) in totals.iter_mut().zip(&self.total) {
                        aggregator.step(spec, row)?;
                    }
                    for set in stack.iter_mut() {
                        for (aggregator, spec) in set.iter_mut().zip(&self.group) {
                            aggregator.step(spec, row)?;
                        }
                    }
                }
            }
            GroupItems::Groups(groups) => {
                for group in groups.iter_mut() {
                    if !self.group.is_empty() {
                        stack.push(self.fresh(&self.group));
                    }
                    if let Some(items) = group.items.as_mut() {
                        self.visit(items, totals, stack)?;
                    }
                    if self.group.is_empty() {
                        continue;
                    }
                    if let Some(set) = stack.pop() {
                        group.summary = Some(set.into_iter().map(Aggregator::finish).collect());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::{group_by_levels, Group};
    use crate::shape::{Shape, ValueType};
    use std::sync::Arc;

    fn resolver() -> AccessorResolver {
        let shape = Shape::builder("Sale")
            .field("region", ValueType::String)
            .nullable("amount", ValueType::Int32)
            .field("price", ValueType::Float64)
            .build();
        AccessorResolver::new(Arc::new(shape), false)
    }

    fn sales() -> Vec<Value> {
        vec![
            Value::object([("region", Value::from("N")), ("amount", Value::Int(10)), ("price", Value::Float(1.5))]),
            Value::object([("region", Value::from("S")), ("amount", Value::Null), ("price", Value::Float(2.0))]),
            Value::object([("region", Value::from("N")), ("amount", Value::Int(5)), ("price", Value::Float(0.5))]),
        ]
    }

    #[test]
    fn test_totals_over_records() {
        let mut resolver = resolver();
        let calc = AggregateCalculator::for_records(
            &mut resolver,
            &[
                SummaryInfo::new(AggregateKind::Sum, "amount"),
                SummaryInfo::count(),
                SummaryInfo::new(AggregateKind::Avg, "amount"),
                SummaryInfo::new(AggregateKind::Min, "price"),
                SummaryInfo::new(AggregateKind::Max, "region"),
            ],
            &[],
        )
        .unwrap();
        let totals = calc.run(&mut GroupItems::Rows(sales())).unwrap().unwrap();
        assert_eq!(
            totals,
            vec![
                Value::Int(15),
                Value::Int(3),
                Value::Float(7.5),
                Value::Float(0.5),
                Value::from("S"),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        let mut resolver = resolver();
        let calc = AggregateCalculator::for_records(
            &mut resolver,
            &[
                SummaryInfo::new(AggregateKind::Sum, "amount"),
                SummaryInfo::count(),
                SummaryInfo::new(AggregateKind::Avg, "price"),
                SummaryInfo::new(AggregateKind::Max, "price"),
            ],
            &[],
        )
        .unwrap();
        let totals = calc.run(&mut GroupItems::<Value>::Rows(Vec::new())).unwrap().unwrap();
        // SUM stays null here; the empty-sum fix-up supplies the zero.
        assert_eq!(totals, vec![Value::Null, Value::Int(0), Value::Null, Value::Null]);
    }

    #[test]
    fn test_group_summaries() {
        let mut resolver = resolver();
        let region = resolver.resolve("region").unwrap();
        let calc = AggregateCalculator::for_records(
            &mut resolver,
            &[SummaryInfo::count()],
            &[SummaryInfo::new(AggregateKind::Sum, "amount"), SummaryInfo::count()],
        )
        .unwrap();
        let groups: Vec<Group<Value>> =
            group_by_levels(sales(), 1, &mut |row: &Value, _| region.read(row)).unwrap();
        let mut data = GroupItems::Groups(groups);
        let totals = calc.run(&mut data).unwrap();
        assert_eq!(totals, Some(vec![Value::Int(3)]));

        let GroupItems::Groups(groups) = data else {
            unreachable!()
        };
        assert_eq!(groups[0].summary, Some(vec![Value::Int(15), Value::Int(2)]));
        assert_eq!(groups[1].summary, Some(vec![Value::Null, Value::Int(1)]));
    }

    #[test]
    fn test_no_total_summaries() {
        let calc = AggregateCalculator::default();
        assert_eq!(calc.run(&mut GroupItems::Rows(sales())).unwrap(), None);
    }
}
