// SPDX-License-Identifier: PMPL-1.0-or-later
//! Execution backend seam.
//!
//! The loader never touches storage itself. It hands compiled predicates,
//! sort orders and flat grouping plans to an [`ExecutionBackend`], which may
//! evaluate them in memory or translate them for a database.

use std::sync::Arc;

use async_trait::async_trait;
use gridsource_engine::{FlatPlan, FlatRow, GroupingInfo, Predicate, Shape, Value};
use tokio_util::sync::CancellationToken;

use crate::options::SortingInfo;

/// A filtered, sorted, paged record read.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub predicate: Predicate,
    pub sort: Vec<SortingInfo>,
    pub skip: usize,
    pub take: Option<usize>,
}

impl RecordQuery {
    /// All records matching `predicate`, in backend order.
    pub fn all(predicate: Predicate) -> Self {
        Self {
            predicate,
            sort: Vec::new(),
            skip: 0,
            take: None,
        }
    }
}

/// A push-down grouping request. Rows returned must follow `plan.columns`
/// position by position, one row per distinct key combination, ordered by
/// the grouping levels.
#[derive(Debug, Clone)]
pub struct FlatGroupQuery {
    pub predicate: Predicate,
    pub grouping: Vec<GroupingInfo>,
    pub plan: FlatPlan,
}

/// Storage the loader delegates to.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Shape of the records this backend serves.
    fn shape(&self) -> Arc<Shape>;

    /// In-memory backends evaluate predicates against live values, so the
    /// loader guards null intermediates for them.
    fn is_in_memory(&self) -> bool {
        false
    }

    /// Load records.
    async fn load(&self, query: &RecordQuery, cancel: &CancellationToken) -> Result<Vec<Value>, Self::Error>;

    /// Count records matching `predicate`.
    async fn count(&self, predicate: &Predicate, cancel: &CancellationToken) -> Result<usize, Self::Error>;

    /// Execute a flat grouping plan.
    async fn load_flat_groups(
        &self,
        query: &FlatGroupQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<FlatRow>, Self::Error>;
}
