// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-memory execution backend.
//!
//! Evaluates predicates directly against stored [`Value`] records. Flat
//! grouping plans are executed the way a SQL engine would run the equivalent
//! GROUP BY: SUM, MIN and MAX over only nulls yield null, and an ungrouped
//! plan always produces exactly one row.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gridsource_engine::{
    canonical_cmp, grouping_key, AccessorResolver, AccumulatorFactory, CompileError, EvalError, FlatColumn, FlatRow,
    Predicate, ResolvedAccessor, Shape, Value,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::backend::{ExecutionBackend, FlatGroupQuery, RecordQuery};
use crate::sort::RecordSorter;

#[derive(Debug, Error)]
pub enum MemoryBackendError {
    #[error("query cancelled")]
    Cancelled,

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("cannot sum '{selector}': no additive type")]
    NotSummable { selector: String },
}

/// Records held in memory behind an async lock.
#[derive(Debug)]
pub struct InMemoryBackend {
    shape: Arc<Shape>,
    records: Arc<RwLock<Vec<Value>>>,
}

impl InMemoryBackend {
    pub fn new(shape: Arc<Shape>, records: Vec<Value>) -> Self {
        Self {
            shape,
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub async fn insert(&self, record: Value) {
        self.records.write().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn resolver(&self) -> AccessorResolver {
        AccessorResolver::new(Arc::clone(&self.shape), true)
    }

    async fn matching(&self, predicate: &Predicate, cancel: &CancellationToken) -> Result<Vec<Value>, MemoryBackendError> {
        if cancel.is_cancelled() {
            return Err(MemoryBackendError::Cancelled);
        }
        let records = self.records.read().await;
        let mut matched = Vec::new();
        for record in records.iter() {
            if predicate.evaluate(record)? {
                matched.push(record.clone());
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl ExecutionBackend for InMemoryBackend {
    type Error = MemoryBackendError;

    fn shape(&self) -> Arc<Shape> {
        Arc::clone(&self.shape)
    }

    fn is_in_memory(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(skip = query.skip, take = ?query.take))]
    async fn load(&self, query: &RecordQuery, cancel: &CancellationToken) -> Result<Vec<Value>, Self::Error> {
        let mut records = self.matching(&query.predicate, cancel).await?;
        RecordSorter::new(&mut self.resolver(), &query.sort)?.sort(&mut records)?;
        let page: Vec<Value> = records
            .into_iter()
            .skip(query.skip)
            .take(query.take.unwrap_or(usize::MAX))
            .collect();
        debug!(returned = page.len(), "records loaded");
        Ok(page)
    }

    async fn count(&self, predicate: &Predicate, cancel: &CancellationToken) -> Result<usize, Self::Error> {
        Ok(self.matching(predicate, cancel).await?.len())
    }

    #[instrument(skip_all, fields(levels = query.grouping.len(), width = query.plan.width()))]
    async fn load_flat_groups(
        &self,
        query: &FlatGroupQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<FlatRow>, Self::Error> {
        let records = self.matching(&query.predicate, cancel).await?;
        let mut resolver = self.resolver();
        let keys = query
            .grouping
            .iter()
            .map(|g| resolver.resolve(&g.selector))
            .collect::<Result<Vec<_>, _>>()?;
        let columns = query
            .plan
            .columns
            .iter()
            .map(|column| column_accessor(&mut resolver, column).map(|a| (column, a)))
            .collect::<Result<Vec<_>, CompileError>>()?;

        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut buckets: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();
        for record in records {
            let key = keys.iter().map(|k| k.read(&record)).collect::<Result<Vec<_>, _>>()?;
            let hashed: Vec<Value> = key.iter().map(grouping_key).collect();
            match index.get(&hashed) {
                Some(&at) => buckets[at].1.push(record),
                None => {
                    index.insert(hashed, buckets.len());
                    buckets.push((key, vec![record]));
                }
            }
        }
        if keys.is_empty() && buckets.is_empty() {
            buckets.push((Vec::new(), Vec::new()));
        }
        buckets.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b)
                .zip(&query.grouping)
                .map(|((x, y), level)| {
                    let ordering = canonical_cmp(x, y);
                    if level.desc {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let mut rows = Vec::with_capacity(buckets.len());
        for (key, members) in &buckets {
            let mut values = Vec::with_capacity(columns.len());
            for (column, accessor) in &columns {
                values.push(compute_column(column, accessor.as_ref(), key, members)?);
            }
            rows.push(FlatRow::new(values));
        }
        debug!(rows = rows.len(), "flat groups computed");
        Ok(rows)
    }
}

fn column_accessor(
    resolver: &mut AccessorResolver,
    column: &FlatColumn,
) -> Result<Option<ResolvedAccessor>, CompileError> {
    match column {
        FlatColumn::Sum { selector }
        | FlatColumn::Min { selector }
        | FlatColumn::Max { selector }
        | FlatColumn::AvgSum { selector }
        | FlatColumn::AvgCount { selector } => resolver.resolve(selector).map(Some),
        FlatColumn::Record | FlatColumn::Key { .. } | FlatColumn::RowCount => Ok(None),
    }
}

fn compute_column(
    column: &FlatColumn,
    accessor: Option<&ResolvedAccessor>,
    key: &[Value],
    members: &[Value],
) -> Result<Value, MemoryBackendError> {
    let non_null = || -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::new();
        if let Some(accessor) = accessor {
            for record in members {
                let value = accessor.read(record)?;
                if !value.is_null() {
                    values.push(value);
                }
            }
        }
        Ok(values)
    };

    let value = match column {
        FlatColumn::Record => Value::Null,
        FlatColumn::Key { level } => key.get(*level).cloned().unwrap_or_default(),
        FlatColumn::RowCount => Value::Int(members.len() as i64),
        FlatColumn::AvgCount { .. } => Value::Int(non_null()?.len() as i64),
        FlatColumn::Sum { selector } | FlatColumn::AvgSum { selector } => {
            let values = non_null()?;
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut accumulator = accessor
                .and_then(|a| AccumulatorFactory::for_type(a.value_type()))
                .ok_or_else(|| MemoryBackendError::NotSummable {
                    selector: selector.clone(),
                })?;
            for value in &values {
                accumulator.add(value)?;
            }
            accumulator.value()
        }
        FlatColumn::Min { .. } => non_null()?
            .into_iter()
            .min_by(canonical_cmp)
            .unwrap_or_default(),
        FlatColumn::Max { .. } => non_null()?
            .into_iter()
            .max_by(canonical_cmp)
            .unwrap_or_default(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsource_engine::{AggregateKind, EngineConfig, GroupingInfo, RemoteGroupTransformer, SummaryInfo, ValueType};
    use serde_json::json;

    fn backend() -> InMemoryBackend {
        let shape = Shape::builder("Ticket")
            .field("queue", ValueType::String)
            .nullable("points", ValueType::Int32)
            .build();
        let records = [
            json!({"queue": "ops", "points": 3}),
            json!({"queue": "dev", "points": null}),
            json!({"queue": "ops", "points": 5}),
            json!({"queue": "dev", "points": null}),
        ]
        .into_iter()
        .map(Value::from)
        .collect();
        InMemoryBackend::new(Arc::new(shape), records)
    }

    fn flat_query(backend: &InMemoryBackend, grouping: Vec<GroupingInfo>) -> FlatGroupQuery {
        let mut transformer = RemoteGroupTransformer::new(backend.shape(), EngineConfig::default());
        let plan = transformer
            .plan(
                grouping.len(),
                &[SummaryInfo::new(AggregateKind::Sum, "points")],
                &[SummaryInfo::new(AggregateKind::Min, "points")],
            )
            .unwrap();
        FlatGroupQuery {
            predicate: Predicate::always(),
            grouping,
            plan,
        }
    }

    #[tokio::test]
    async fn test_flat_groups_follow_sql_semantics() {
        let backend = backend();
        let query = flat_query(&backend, vec![GroupingInfo::new("queue").descending()]);
        let rows = backend.load_flat_groups(&query, &CancellationToken::new()).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            FlatRow::new(vec![Value::Null, Value::from("ops"), Value::Int(8), Value::Int(3), Value::Int(2)])
        );
        assert_eq!(
            rows[1],
            FlatRow::new(vec![Value::Null, Value::from("dev"), Value::Null, Value::Null, Value::Int(2)])
        );
    }

    #[tokio::test]
    async fn test_dynamic_key_groups_integral_floats_with_ints() {
        let shape = Shape::builder("Ticket")
            .field("tag", ValueType::Dynamic)
            .nullable("points", ValueType::Int32)
            .build();
        let records = [
            json!({"tag": 1, "points": 2}),
            json!({"tag": 1.0, "points": 4}),
            json!({"tag": 1.5, "points": 1}),
        ]
        .into_iter()
        .map(Value::from)
        .collect();
        let backend = InMemoryBackend::new(Arc::new(shape), records);
        let query = flat_query(&backend, vec![GroupingInfo::new("tag")]);
        let rows = backend.load_flat_groups(&query, &CancellationToken::new()).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            FlatRow::new(vec![Value::Null, Value::Int(1), Value::Int(6), Value::Int(2), Value::Int(2)])
        );
    }

    #[tokio::test]
    async fn test_ungrouped_plan_yields_one_row() {
        let backend = InMemoryBackend::new(backend().shape(), Vec::new());
        let query = flat_query(&backend, Vec::new());
        let rows = backend.load_flat_groups(&query, &CancellationToken::new()).await.unwrap();
        assert_eq!(rows, vec![FlatRow::new(vec![Value::Null, Value::Null, Value::Null, Value::Int(0)])]);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_reads() {
        let backend = backend();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = backend.count(&Predicate::always(), &cancel).await.unwrap_err();
        assert!(matches!(err, MemoryBackendError::Cancelled));
    }

    #[tokio::test]
    async fn test_insert_and_page() {
        let backend = backend();
        backend.insert(Value::from(json!({"queue": "qa", "points": 1}))).await;
        assert_eq!(backend.len().await, 5);

        let query = RecordQuery {
            predicate: Predicate::always(),
            sort: vec![crate::options::SortingInfo::new("queue")],
            skip: 1,
            take: Some(2),
        };
        let page = backend.load(&query, &CancellationToken::new()).await.unwrap();
        let queues: Vec<_> = page.iter().filter_map(|r| r.member("queue").and_then(Value::as_str)).collect();
        assert_eq!(queues, vec!["dev", "ops"]);
    }
}
