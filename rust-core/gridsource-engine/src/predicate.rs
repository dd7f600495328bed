// SPDX-License-Identifier: PMPL-1.0-or-later
//! Compiled predicates.
//!
//! The filter compiler produces a [`Predicate`] tree that is interpreted node
//! by node against a record. Every comparison node carries its resolved
//! accessor and the comparison strategy the compiler chose from the member's
//! static type, so evaluation never consults the shape again.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::accessor::ResolvedAccessor;
use crate::coerce::coerce_literal;
use crate::error::EvalError;
use crate::shape::{CompareFn, EqualityFn, ValueType};
use crate::value::{compare_values, values_equal, Value};

/// String tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

impl TextOp {
    fn apply(self, haystack: &str, needle: &str) -> bool {
        match self {
            TextOp::Contains => haystack.contains(needle),
            TextOp::StartsWith => haystack.starts_with(needle),
            TextOp::EndsWith => haystack.ends_with(needle),
        }
    }

    fn token(self) -> &'static str {
        match self {
            TextOp::Contains => "contains",
            TextOp::StartsWith => "startswith",
            TextOp::EndsWith => "endswith",
        }
    }
}

/// Relational and equality operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Parses an already lower-cased operator token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "=" => Some(CompareOp::Eq),
            "<>" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    /// Whether a three-way comparison result satisfies this operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// How a comparison node compares the accessor value with its literal.
#[derive(Debug, Clone, Copy)]
pub enum CompareStrategy {
    /// Built-in operators with lifted null semantics.
    Native,
    /// Generic value equality, for types without an equality operator.
    Equals,
    /// A declared equality operator.
    EqualityOperator(EqualityFn),
    /// Enum compared by underlying integer.
    Underlying,
    /// A declared relational operator.
    Operator(CompareFn),
    /// Instance three-way compare; the receiver must not be null.
    CompareTo(CompareFn),
    /// Static three-way compare; orders nulls itself.
    StaticCompare(CompareFn),
    /// Runtime three-way compare for untyped members.
    Dynamic { fold_case: bool },
}

/// Signature of a predicate supplied by a custom binary compiler.
pub type CustomTest = dyn Fn(&Value) -> Result<bool, EvalError> + Send + Sync;

/// Predicate fragment produced by a custom binary compiler.
#[derive(Clone)]
pub struct CustomPredicate {
    description: String,
    test: Arc<CustomTest>,
}

impl CustomPredicate {
    pub fn new<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Value) -> Result<bool, EvalError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            test: Arc::new(test),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A compiled filter.
#[derive(Debug, Clone)]
pub enum Predicate {
    Constant(bool),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Text {
        accessor: ResolvedAccessor,
        op: TextOp,
        needle: String,
    },
    Compare {
        accessor: ResolvedAccessor,
        op: CompareOp,
        value: Value,
        strategy: CompareStrategy,
    },
    Custom(CustomPredicate),
}

impl Predicate {
    /// Predicate that accepts every record.
    pub fn always() -> Self {
        Predicate::Constant(true)
    }

    pub fn negate(inner: Predicate) -> Self {
        match inner {
            Predicate::Constant(b) => Predicate::Constant(!b),
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    pub fn custom<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Value) -> Result<bool, EvalError> + Send + Sync + 'static,
    {
        Predicate::Custom(CustomPredicate::new(description, test))
    }

    /// Constant predicates report their value.
    pub fn as_constant(&self) -> Option<bool> {
        match self {
            Predicate::Constant(b) => Some(*b),
            _ => None,
        }
    }

    /// Evaluates the predicate against one record.
    pub fn evaluate(&self, record: &Value) -> Result<bool, EvalError> {
        match self {
            Predicate::Constant(b) => Ok(*b),
            Predicate::Not(inner) => inner.evaluate(record).map(|b| !b),
            Predicate::And(parts) => {
                for part in parts {
                    if !part.evaluate(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(parts) => {
                for part in parts {
                    if part.evaluate(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Text { accessor, op, needle } => {
                let text = match accessor.read(record)? {
                    Value::Null if accessor.guards_nulls() => String::new(),
                    Value::Null => {
                        return Err(EvalError::NullReference {
                            path: accessor.path().to_string(),
                        })
                    }
                    Value::String(s) => s,
                    other => other.display_text(),
                };
                Ok(op.apply(&text, needle))
            }
            Predicate::Compare {
                accessor,
                op,
                value,
                strategy,
            } => {
                let actual = accessor.read(record)?;
                compare(&actual, *op, value, *strategy, accessor)
            }
            Predicate::Custom(custom) => (custom.test)(record),
        }
    }
}

fn compare(
    actual: &Value,
    op: CompareOp,
    literal: &Value,
    strategy: CompareStrategy,
    accessor: &ResolvedAccessor,
) -> Result<bool, EvalError> {
    match strategy {
        CompareStrategy::Native | CompareStrategy::Underlying => Ok(lifted(actual, op, literal, |a, b| {
            if op.is_equality() {
                Some(if values_equal(a, b) {
                    Ordering::Equal
                } else {
                    Ordering::Less
                })
            } else {
                compare_values(a, b)
            }
        })),
        CompareStrategy::Equals => {
            let equal = values_equal(actual, literal);
            Ok(if op == CompareOp::Ne { !equal } else { equal })
        }
        CompareStrategy::EqualityOperator(eq) => Ok(lifted(actual, op, literal, |a, b| {
            Some(if eq(a, b) { Ordering::Equal } else { Ordering::Less })
        })),
        CompareStrategy::Operator(cmp) => Ok(lifted(actual, op, literal, |a, b| Some(cmp(a, b)))),
        CompareStrategy::CompareTo(cmp) => {
            if actual.is_null() {
                return if accessor.guards_nulls() {
                    Ok(false)
                } else {
                    Err(EvalError::NullReference {
                        path: accessor.path().to_string(),
                    })
                };
            }
            Ok(op.accepts(cmp(actual, literal)))
        }
        CompareStrategy::StaticCompare(cmp) => Ok(op.accepts(cmp(actual, literal))),
        CompareStrategy::Dynamic { fold_case } => Ok(op.accepts(dynamic_compare(actual, literal, fold_case))),
    }
}

/// Lifted operator semantics: two nulls are equal, a null differs from every
/// value, and ordering against null is false.
fn lifted<F>(actual: &Value, op: CompareOp, literal: &Value, cmp: F) -> bool
where
    F: FnOnce(&Value, &Value) -> Option<Ordering>,
{
    match (actual.is_null(), literal.is_null()) {
        (true, true) => op == CompareOp::Eq,
        (true, false) | (false, true) => op == CompareOp::Ne,
        (false, false) => match cmp(actual, literal) {
            Some(ordering) => op.accepts(ordering),
            None => op == CompareOp::Ne,
        },
    }
}

/// Three-way comparison of a runtime value with a client literal. Nulls sort
/// first. The literal is converted to the runtime value's type when possible;
/// otherwise both sides are compared as text.
pub fn dynamic_compare(actual: &Value, literal: &Value, fold_case: bool) -> Ordering {
    match (actual, literal) {
        (Value::Null, Value::Null) => return Ordering::Equal,
        (Value::Null, _) => return Ordering::Less,
        (_, Value::Null) => return Ordering::Greater,
        (Value::String(a), Value::String(b)) if fold_case => {
            return a.to_lowercase().cmp(&b.to_lowercase());
        }
        _ => {}
    }

    if let Some(ordering) = compare_values(actual, literal) {
        return ordering;
    }
    if let Some(ty) = runtime_type(actual) {
        if let Ok(converted) = coerce_literal(literal, &ty) {
            if let Some(ordering) = compare_values(actual, &converted) {
                return ordering;
            }
        }
    }

    let (a, b) = (actual.display_text(), literal.display_text());
    if fold_case {
        a.to_lowercase().cmp(&b.to_lowercase())
    } else {
        a.cmp(&b)
    }
}

fn runtime_type(value: &Value) -> Option<ValueType> {
    match value {
        Value::Bool(_) => Some(ValueType::Bool),
        Value::Int(_) => Some(ValueType::Int64),
        Value::Float(_) => Some(ValueType::Float64),
        Value::DateTime(_) => Some(ValueType::DateTime),
        Value::Duration(_) => Some(ValueType::Duration),
        Value::Uuid(_) => Some(ValueType::Uuid),
        _ => None,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str| -> fmt::Result {
            write!(f, "(")?;
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{part}")?;
            }
            write!(f, ")")
        };
        match self {
            Predicate::Constant(b) => write!(f, "{b}"),
            Predicate::Not(inner) => write!(f, "!{inner}"),
            Predicate::And(parts) => join(f, parts, "and"),
            Predicate::Or(parts) => join(f, parts, "or"),
            Predicate::Text { accessor, op, needle } => {
                write!(f, "{} {} \"{}\"", accessor.path(), op.token(), needle)
            }
            Predicate::Compare {
                accessor, op, value, ..
            } => write!(f, "{} {} {}", accessor.path(), op.token(), value),
            Predicate::Custom(custom) => write!(f, "{}", custom.description),
        }
    }
}
