// SPDX-License-Identifier: PMPL-1.0-or-later
//! Empty-SUM normalization.
//!
//! Backends disagree on SUM over no rows: some return zero, SQL engines return
//! null. Results are normalized to the additive identity of the selector's
//! type. Defaults are memoized per selector for the lifetime of one
//! [`SumFix`], which callers scope to a single request.

use std::collections::HashMap;

use tracing::trace;

use crate::accessor::AccessorResolver;
use crate::accumulator::AccumulatorFactory;
use crate::aggregate::{AggregateKind, SummaryInfo};
use crate::error::CompileError;
use crate::grouping::{Group, GroupItems};
use crate::value::Value;

#[derive(Debug, Default)]
pub struct SumFix {
    defaults: HashMap<String, Value>,
}

impl SumFix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces null SUM results in `values`, which are positioned like
    /// `summaries`.
    pub fn fix_values(
        &mut self,
        resolver: &mut AccessorResolver,
        summaries: &[SummaryInfo],
        values: &mut [Value],
    ) -> Result<(), CompileError> {
        for (summary, value) in summaries.iter().zip(values.iter_mut()) {
            if summary.summary_type != AggregateKind::Sum || !value.is_null() {
                continue;
            }
            let Some(selector) = summary.selector.as_deref() else {
                continue;
            };
            *value = self.default_for(resolver, selector)?;
        }
        Ok(())
    }

    /// Applies [`SumFix::fix_values`] to the summary of every group in the tree.
    pub fn fix_groups<T>(
        &mut self,
        resolver: &mut AccessorResolver,
        summaries: &[SummaryInfo],
        groups: &mut [Group<T>],
    ) -> Result<(), CompileError> {
        if summaries.is_empty() {
            return Ok(());
        }
        for group in groups {
            if let Some(summary) = group.summary.as_mut() {
                self.fix_values(resolver, summaries, summary)?;
            }
            if let Some(GroupItems::Groups(children)) = group.items.as_mut() {
                self.fix_groups(resolver, summaries, children)?;
            }
        }
        Ok(())
    }

    fn default_for(&mut self, resolver: &mut AccessorResolver, selector: &str) -> Result<Value, CompileError> {
        if let Some(cached) = self.defaults.get(selector) {
            return Ok(cached.clone());
        }
        let accessor = resolver.resolve(selector)?;
        let default = AccumulatorFactory::empty_sum(accessor.value_type());
        trace!(selector, default = %default, "empty sum default");
        self.defaults.insert(selector.to_string(), default.clone());
        Ok(default)
    }

    /// Number of distinct selectors resolved so far.
    pub fn cached_selectors(&self) -> usize {
        self.defaults.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Shape, ValueType};
    use chrono::TimeDelta;
    use std::sync::Arc;

    fn resolver() -> AccessorResolver {
        let shape = Shape::builder("Task")
            .field("hours", ValueType::Float64)
            .field("points", ValueType::Int32)
            .field("spent", ValueType::Duration)
            .build();
        AccessorResolver::new(Arc::new(shape), false)
    }

    #[test]
    fn test_null_sums_become_type_zero() {
        let mut resolver = resolver();
        let summaries = [
            SummaryInfo::new(AggregateKind::Sum, "hours"),
            SummaryInfo::new(AggregateKind::Sum, "points"),
            SummaryInfo::new(AggregateKind::Sum, "spent"),
            SummaryInfo::new(AggregateKind::Avg, "hours"),
            SummaryInfo::new(AggregateKind::Sum, "points"),
        ];
        let mut values = vec![Value::Null, Value::Null, Value::Null, Value::Null, Value::Int(4)];
        let mut fix = SumFix::new();
        fix.fix_values(&mut resolver, &summaries, &mut values).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Float(0.0),
                Value::Int(0),
                Value::Duration(TimeDelta::zero()),
                Value::Null,
                Value::Int(4),
            ]
        );
        assert_eq!(fix.cached_selectors(), 3);
    }

    #[test]
    fn test_group_tree() {
        let mut resolver = resolver();
        let summaries = [SummaryInfo::new(AggregateKind::Sum, "points")];
        let mut inner = Group::new(Value::from("x"), GroupItems::<Value>::Rows(Vec::new()));
        inner.summary = Some(vec![Value::Null]);
        let mut outer = Group::new(Value::from("a"), GroupItems::Groups(vec![inner]));
        outer.summary = Some(vec![Value::Int(3)]);

        let mut groups = vec![outer];
        SumFix::new().fix_groups(&mut resolver, &summaries, &mut groups).unwrap();
        assert_eq!(groups[0].summary, Some(vec![Value::Int(3)]));
        let Some(GroupItems::Groups(children)) = &groups[0].items else {
            unreachable!()
        };
        assert_eq!(children[0].summary, Some(vec![Value::Int(0)]));
    }
}
