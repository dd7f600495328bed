// SPDX-License-Identifier: PMPL-1.0-or-later
//! Load orchestration.
//!
//! A load request takes one of four paths:
//!
//! - count query: only the number of matching records
//! - plain: a sorted page of records, with optional totals and total count
//! - local grouping: every matching record is loaded and grouped in process
//! - remote grouping: the backend runs a flat GROUP BY plan and the loader
//!   rebuilds the tree; chosen when push-down grouping is enabled and the
//!   innermost level is collapsed, since leaf rows are then never needed
//!
//! Cancellation is observed before and after every backend call, and while a
//! call is pending.

use std::future::Future;
use std::sync::Arc;

use gridsource_engine::{
    group_by_levels, AccessorResolver, AggregateCalculator, CustomFilterCompilers, EngineConfig, EvalError,
    FilterCompiler, FlatRow, Group, GroupItems, GroupingInfo, Predicate, RemoteGroupTransformer,
    RemoteGroupingResult, SumFix, SummaryInfo, Value,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::backend::{ExecutionBackend, FlatGroupQuery, RecordQuery};
use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::options::{LoadOptions, SortingInfo};

/// Records or top-level groups of a load result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoadData {
    Records(Vec<Value>),
    Groups(Vec<Group<Value>>),
}

impl LoadData {
    pub fn len(&self) -> usize {
        match self {
            LoadData::Records(records) => records.len(),
            LoadData::Groups(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Option<&[Value]> {
        match self {
            LoadData::Records(records) => Some(records),
            LoadData::Groups(_) => None,
        }
    }

    pub fn groups(&self) -> Option<&[Group<Value>]> {
        match self {
            LoadData::Groups(groups) => Some(groups),
            LoadData::Records(_) => None,
        }
    }
}

/// Response of one load request. Counts that were not requested are -1.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub data: LoadData,
    pub total_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Vec<Value>>,
    pub group_count: i64,
}

impl LoadResult {
    fn new(data: LoadData) -> Self {
        Self {
            data,
            total_count: -1,
            summary: None,
            group_count: -1,
        }
    }
}

/// Serves grid load requests from an [`ExecutionBackend`].
#[derive(Debug)]
pub struct DataSourceLoader<B> {
    backend: Arc<B>,
    config: LoaderConfig,
    custom_compilers: Option<Arc<CustomFilterCompilers>>,
}

impl<B: ExecutionBackend> DataSourceLoader<B> {
    pub fn new(backend: Arc<B>, config: LoaderConfig) -> Self {
        Self {
            backend,
            config,
            custom_compilers: None,
        }
    }

    /// Consult `registry` before the built-in binary compilation.
    pub fn with_custom_compilers(mut self, registry: Arc<CustomFilterCompilers>) -> Self {
        self.custom_compilers = Some(registry);
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Runs `load` to completion on the current thread without cancellation.
    pub fn load_blocking(&self, options: &LoadOptions) -> Result<LoadResult, LoadError<B::Error>> {
        futures::executor::block_on(self.load(options, &CancellationToken::new()))
    }

    #[instrument(skip_all, fields(grouped = options.is_grouped(), skip = options.skip, take = ?options.take))]
    pub async fn load(
        &self,
        options: &LoadOptions,
        cancel: &CancellationToken,
    ) -> Result<LoadResult, LoadError<B::Error>> {
        let engine = self.engine_config(options);
        let predicate = self.compile_filter(options, engine)?;

        if options.is_count_query {
            let count = self
                .delegate(cancel, "count", self.backend.count(&predicate, cancel))
                .await?;
            let mut result = LoadResult::new(LoadData::Records(Vec::new()));
            result.total_count = count as i64;
            return Ok(result);
        }

        let remote = self.uses_remote_grouping(options);
        debug!(remote, collapsed = options.last_level_collapsed(), "routing load request");
        let result = if !options.is_grouped() {
            self.load_records(options, predicate, engine, remote, cancel).await?
        } else if remote && options.last_level_collapsed() {
            self.load_remote_groups(options, predicate, engine, cancel).await?
        } else {
            self.load_local_groups(options, predicate, engine, cancel).await?
        };

        debug!(
            returned = result.data.len(),
            total_count = result.total_count,
            group_count = result.group_count,
            "load complete"
        );
        Ok(result)
    }

    fn engine_config(&self, options: &LoadOptions) -> EngineConfig {
        let mut engine = self.config.engine;
        if let Some(string_to_lower) = options.string_to_lower {
            engine.string_to_lower = string_to_lower;
        }
        if self.backend.is_in_memory() {
            engine.guard_nulls = true;
        }
        engine
    }

    fn uses_remote_grouping(&self, options: &LoadOptions) -> bool {
        options
            .remote_grouping
            .or(self.config.remote_grouping)
            .unwrap_or(!self.backend.is_in_memory())
    }

    fn compile_filter(&self, options: &LoadOptions, engine: EngineConfig) -> Result<Predicate, LoadError<B::Error>> {
        let Some(criteria) = options.criteria() else {
            return Ok(Predicate::always());
        };
        let mut compiler = FilterCompiler::new(self.backend.shape(), engine);
        if let Some(registry) = &self.custom_compilers {
            compiler = compiler.with_custom_compilers(Arc::clone(registry));
        }
        Ok(compiler.compile_json(criteria)?)
    }

    /// Awaits a backend call, surfacing cancellation observed before, during
    /// or after it as [`LoadError::Cancelled`]. A backend failure outranks a
    /// cancellation that arrives with it.
    async fn delegate<T, F>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        call: F,
    ) -> Result<T, LoadError<B::Error>>
    where
        F: Future<Output = Result<T, B::Error>>,
    {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        debug!(operation, "delegating to backend");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = call => Some(result),
        };
        match result {
            Some(Err(err)) => {
                warn!(operation, error = %err, "backend call failed");
                Err(LoadError::Backend(err))
            }
            Some(Ok(_)) if cancel.is_cancelled() => Err(LoadError::Cancelled),
            Some(Ok(value)) => Ok(value),
            None => {
                debug!(operation, "cancelled while pending");
                Err(LoadError::Cancelled)
            }
        }
    }

    async fn load_records(
        &self,
        options: &LoadOptions,
        predicate: Predicate,
        engine: EngineConfig,
        remote: bool,
        cancel: &CancellationToken,
    ) -> Result<LoadResult, LoadError<B::Error>> {
        let take = options.effective_take(self.config.max_take);
        let summary = if options.total_summary.is_empty() {
            None
        } else if remote {
            let (result, _) = self
                .push_down(&predicate, &[], &options.total_summary, &[], engine, cancel)
                .await?;
            result.totals
        } else {
            let records = self
                .delegate(cancel, "load", self.backend.load(&RecordQuery::all(predicate.clone()), cancel))
                .await?;
            let mut resolver = AccessorResolver::new(self.backend.shape(), engine.guard_nulls);
            let calculator = AggregateCalculator::for_records(&mut resolver, &options.total_summary, &[])?;
            let mut items = GroupItems::Rows(records);
            let mut totals = calculator.run(&mut items)?.unwrap_or_default();
            SumFix::new().fix_values(&mut resolver, &options.total_summary, &mut totals)?;
            Some(totals)
        };

        let query = RecordQuery {
            predicate,
            sort: options.sort.clone(),
            skip: options.skip,
            take,
        };
        let data = self.delegate(cancel, "load", self.backend.load(&query, cancel)).await?;
        let total_count = match (options.require_total_count, options.skip == 0 && take.is_none()) {
            (false, _) => -1,
            (true, true) => data.len() as i64,
            (true, false) => self
                .delegate(cancel, "count", self.backend.count(&query.predicate, cancel))
                .await? as i64,
        };

        let mut result = LoadResult::new(LoadData::Records(data));
        result.total_count = total_count;
        result.summary = summary;
        Ok(result)
    }

    async fn load_local_groups(
        &self,
        options: &LoadOptions,
        predicate: Predicate,
        engine: EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<LoadResult, LoadError<B::Error>> {
        let mut sort: Vec<SortingInfo> = options.group.iter().map(SortingInfo::from).collect();
        sort.extend(options.sort.iter().cloned());
        let query = RecordQuery {
            sort,
            ..RecordQuery::all(predicate)
        };
        let records = self.delegate(cancel, "load", self.backend.load(&query, cancel)).await?;
        let record_count = records.len();

        let mut resolver = AccessorResolver::new(self.backend.shape(), engine.guard_nulls);
        let keys = options
            .group
            .iter()
            .map(|g| resolver.resolve(&g.selector))
            .collect::<Result<Vec<_>, _>>()?;
        let groups = group_by_levels(records, keys.len(), &mut |record: &Value, level| keys[level].read(record))?;

        let calculator = AggregateCalculator::for_records(&mut resolver, &options.total_summary, &options.group_summary)?;
        let mut items = GroupItems::Groups(groups);
        let mut totals = calculator.run(&mut items)?;
        let mut groups = match items {
            GroupItems::Groups(groups) => groups,
            GroupItems::Rows(_) => Vec::new(),
        };

        let mut sum_fix = SumFix::new();
        if let Some(totals) = totals.as_mut() {
            sum_fix.fix_values(&mut resolver, &options.total_summary, totals)?;
        }
        sum_fix.fix_groups(&mut resolver, &options.group_summary, &mut groups)?;
        if options.last_level_collapsed() {
            groups.iter_mut().for_each(collapse_leaves);
        }

        let mut result = self.paginate_groups(options, groups);
        if options.require_total_count {
            result.total_count = record_count as i64;
        }
        result.summary = totals;
        Ok(result)
    }

    async fn load_remote_groups(
        &self,
        options: &LoadOptions,
        predicate: Predicate,
        engine: EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<LoadResult, LoadError<B::Error>> {
        let (remote, count_position) = self
            .push_down(
                &predicate,
                &options.group,
                &options.total_summary,
                &options.group_summary,
                engine,
                cancel,
            )
            .await?;
        let groups = remote
            .groups
            .unwrap_or_default()
            .into_iter()
            .map(|group| collapse_flat(group, count_position))
            .collect::<Result<Vec<_>, EvalError>>()?;

        let mut result = self.paginate_groups(options, groups);
        if options.require_total_count {
            result.total_count = remote.total_count;
        }
        result.summary = remote.totals;
        Ok(result)
    }

    /// Plans, executes and reconstructs a flat grouping request. Returns the
    /// reconstruction and the plan's row-count position.
    async fn push_down(
        &self,
        predicate: &Predicate,
        grouping: &[GroupingInfo],
        total: &[SummaryInfo],
        group: &[SummaryInfo],
        engine: EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<(RemoteGroupingResult, usize), LoadError<B::Error>> {
        let mut transformer = RemoteGroupTransformer::new(self.backend.shape(), engine);
        let plan = transformer.plan(grouping.len(), total, group)?;
        let count_position = plan.count_position;
        let query = FlatGroupQuery {
            predicate: predicate.clone(),
            grouping: grouping.to_vec(),
            plan,
        };
        let rows = self
            .delegate(cancel, "load_flat_groups", self.backend.load_flat_groups(&query, cancel))
            .await?;
        let result = transformer.reconstruct(rows, grouping.len(), total, group)?;
        Ok((result, count_position))
    }

    fn paginate_groups(&self, options: &LoadOptions, groups: Vec<Group<Value>>) -> LoadResult {
        let group_count = groups.len();
        let take = options.effective_take(self.config.max_take).unwrap_or(usize::MAX);
        let page: Vec<_> = groups.into_iter().skip(options.skip).take(take).collect();
        let mut result = LoadResult::new(LoadData::Groups(page));
        if options.require_group_count {
            result.group_count = group_count as i64;
        }
        result
    }
}

/// Drops the rows of innermost groups, keeping their counts.
fn collapse_leaves(group: &mut Group<Value>) {
    match group.items.as_mut() {
        Some(GroupItems::Groups(children)) => children.iter_mut().for_each(collapse_leaves),
        Some(GroupItems::Rows(_)) => group.items = None,
        None => {}
    }
}

/// Converts a reconstructed group to a collapsed record group. Leaf counts
/// come from the row-count column of the flat rows they folded.
fn collapse_flat(group: Group<FlatRow>, count_position: usize) -> Result<Group<Value>, EvalError> {
    let (items, count) = match group.items {
        Some(GroupItems::Groups(children)) => {
            let children = children
                .into_iter()
                .map(|child| collapse_flat(child, count_position))
                .collect::<Result<Vec<_>, _>>()?;
            (Some(GroupItems::Groups(children)), group.count)
        }
        Some(GroupItems::Rows(rows)) => {
            let mut count = 0usize;
            for row in &rows {
                let value = row.get(count_position)?;
                let n = value.as_i64().ok_or(EvalError::TypeMismatch {
                    expected: "int",
                    found: value.kind_name(),
                })?;
                count += usize::try_from(n).unwrap_or(0);
            }
            (None, Some(count))
        }
        None => (None, group.count),
    };
    Ok(Group {
        key: group.key,
        items,
        count,
        summary: group.summary,
    })
}
