// SPDX-License-Identifier: PMPL-1.0-or-later
//! Engine error types.

use thiserror::Error;

/// Errors raised while compiling criteria, accessors or aggregate plans.
///
/// Compile errors are never recovered inside the engine. A literal that cannot
/// be coerced to the accessor type is not an error: the clause compiles to
/// `false` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown member '{member}' in path '{path}' of shape '{shape}'")]
    UnknownMember {
        path: String,
        member: String,
        shape: String,
    },

    #[error("mixing of and/or is not allowed inside a single group")]
    MixedConnectors,

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("type '{type_name}' of '{path}' does not support {operation}")]
    NotComparable {
        path: String,
        type_name: String,
        operation: &'static str,
    },

    #[error("malformed criteria: {0}")]
    MalformedCriteria(String),

    #[error("invalid {kind} aggregate: {reason}")]
    InvalidAggregate { kind: String, reason: String },
}

/// Errors raised while evaluating a compiled predicate, accessor or aggregate
/// against concrete data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A null intermediate value was dereferenced with null guarding disabled.
    #[error("null reference while reading '{path}'")]
    NullReference { path: String },

    #[error("flat row has no field at position {position} (width {width})")]
    MissingField { position: usize, width: usize },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("custom predicate failed: {0}")]
    Custom(String),
}

/// Umbrella error for operations that both compile and evaluate, such as
/// reconstructing a remote grouping result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
