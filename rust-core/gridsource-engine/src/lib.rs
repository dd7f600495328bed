// SPDX-License-Identifier: PMPL-1.0-or-later
//! GridSource Engine
//!
//! Server-side core of a paginated data-grid protocol.
//! Compiles loosely typed filter criteria into predicates over records,
//! rewrites hierarchical grouping/aggregation requests into flat plans for
//! push-down execution, and folds flat results back into group trees.

pub mod accessor;
pub mod accumulator;
pub mod aggregate;
pub mod calculator;
pub mod coerce;
pub mod config;
pub mod criteria;
pub mod error;
pub mod filter;
pub mod grouping;
pub mod predicate;
pub mod remote;
pub mod shape;
pub mod sum_fix;
pub mod value;

pub use accessor::{AccessStep, AccessorResolver, Progression, ResolvedAccessor};
pub use accumulator::{Accumulator, AccumulatorFactory};
pub use aggregate::{AggregateKind, SummaryInfo};
pub use calculator::{AggregateCalculator, AggregateItem, AggregateSpec, FieldRef};
pub use coerce::{coerce_literal, CoercionFailure};
pub use config::EngineConfig;
pub use criteria::{CriteriaNode, GroupItem};
pub use error::{CompileError, EngineError, EvalError};
pub use filter::{BinaryExpressionInfo, BinaryFilterCompiler, CustomFilterCompilers, FilterCompiler};
pub use grouping::{group_by_levels, grouping_key, Group, GroupItems, GroupingInfo};
pub use predicate::{CompareOp, CompareStrategy, Predicate, TextOp};
pub use remote::{FlatAggregate, FlatColumn, FlatPlan, FlatRow, RemoteGroupTransformer, RemoteGroupingResult};
pub use shape::{CustomType, EnumType, FieldDef, Shape, ValueType};
pub use sum_fix::SumFix;
pub use value::{canonical_cmp, compare_values, values_equal, Value};
