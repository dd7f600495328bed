// SPDX-License-Identifier: PMPL-1.0-or-later
//! Stable multi-key record sorting

use std::cmp::Ordering;

use gridsource_engine::{canonical_cmp, AccessorResolver, CompileError, EvalError, ResolvedAccessor, Value};

use crate::options::SortingInfo;

/// Sorts records by a list of selectors. Nulls order first; `desc` reverses
/// a level, nulls included.
#[derive(Debug, Clone)]
pub struct RecordSorter {
    keys: Vec<(ResolvedAccessor, bool)>,
}

impl RecordSorter {
    pub fn new(resolver: &mut AccessorResolver, sort: &[SortingInfo]) -> Result<Self, CompileError> {
        let keys = sort
            .iter()
            .map(|s| Ok((resolver.resolve(&s.selector)?, s.desc)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sorts `records` in place. Equal records keep their relative order.
    pub fn sort(&self, records: &mut Vec<Value>) -> Result<(), EvalError> {
        if self.keys.is_empty() || records.len() < 2 {
            return Ok(());
        }
        let mut keyed = records
            .drain(..)
            .map(|record| {
                let key = self
                    .keys
                    .iter()
                    .map(|(accessor, _)| accessor.read(&record))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((key, record))
            })
            .collect::<Result<Vec<_>, EvalError>>()?;
        keyed.sort_by(|(a, _), (b, _)| self.compare(a, b));
        records.extend(keyed.into_iter().map(|(_, record)| record));
        Ok(())
    }

    fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((left, right), (_, desc)) in a.iter().zip(b).zip(&self.keys) {
            let ordering = canonical_cmp(left, right);
            let ordering = if *desc { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsource_engine::{Shape, ValueType};
    use serde_json::json;
    use std::sync::Arc;

    fn resolver() -> AccessorResolver {
        let shape = Shape::builder("Row")
            .field("team", ValueType::String)
            .nullable("score", ValueType::Int32)
            .field("id", ValueType::Int32)
            .build();
        AccessorResolver::new(Arc::new(shape), true)
    }

    fn rows() -> Vec<Value> {
        [
            json!({"team": "b", "score": 3, "id": 1}),
            json!({"team": "a", "score": null, "id": 2}),
            json!({"team": "b", "score": 1, "id": 3}),
            json!({"team": "a", "score": 7, "id": 4}),
            json!({"team": "b", "score": 3, "id": 5}),
        ]
        .into_iter()
        .map(Value::from)
        .collect()
    }

    fn ids(rows: &[Value]) -> Vec<i64> {
        rows.iter().filter_map(|r| r.member("id").and_then(Value::as_i64)).collect()
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let sorter = RecordSorter::new(
            &mut resolver(),
            &[SortingInfo::new("team"), SortingInfo::new("score").descending()],
        )
        .unwrap();
        let mut rows = rows();
        sorter.sort(&mut rows).unwrap();
        assert_eq!(ids(&rows), vec![4, 2, 1, 5, 3]);
    }

    #[test]
    fn test_nulls_first_ascending() {
        let sorter = RecordSorter::new(&mut resolver(), &[SortingInfo::new("score")]).unwrap();
        let mut rows = rows();
        sorter.sort(&mut rows).unwrap();
        assert_eq!(ids(&rows), vec![2, 3, 1, 5, 4]);
    }

    #[test]
    fn test_unknown_selector() {
        assert!(RecordSorter::new(&mut resolver(), &[SortingInfo::new("rank")]).is_err());
    }
}
