// SPDX-License-Identifier: PMPL-1.0-or-later
//! Filter criteria compiler.
//!
//! Turns a [`CriteriaNode`] into a [`Predicate`] by recursive descent:
//!
//! 1. Groups combine their clauses with one connector; mixing `and` and `or`
//!    among more than one clause is a [`CompileError::MixedConnectors`].
//! 2. `["!", x]` negates `x`.
//! 3. Binary clauses go first to the registered custom compilers, then to
//!    default handling (string tests or typed comparisons).
//!
//! A literal that cannot be converted to the member's type makes its clause
//! constant `false`; it never aborts the compilation.

use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::Regex;
use tracing::debug;

use crate::accessor::{AccessorResolver, ResolvedAccessor};
use crate::coerce::coerce_literal;
use crate::config::EngineConfig;
use crate::criteria::{CriteriaNode, GroupItem};
use crate::error::CompileError;
use crate::predicate::{CompareOp, CompareStrategy, Predicate, TextOp};
use crate::shape::{EqualitySupport, OrderingSupport, Shape, ValueType};
use crate::value::Value;

static AND_CONNECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)and|&").expect("connector pattern is valid"));

const STRING_OPERATIONS: [&str; 4] = ["contains", "notcontains", "startswith", "endswith"];

/// What a custom compiler sees of a binary clause.
#[derive(Debug, Clone)]
pub struct BinaryExpressionInfo {
    /// Accessor path as written by the client.
    pub accessor: String,
    /// Lower-cased operator token (`=` when omitted).
    pub operation: String,
    pub value: Value,
    pub string_to_lower: bool,
    pub shape: Arc<Shape>,
}

/// A pluggable handler for binary clauses.
///
/// Returning `Ok(None)` declines the clause. The compiler is passed along so a
/// handler can resolve accessors or fall back to
/// [`FilterCompiler::compile_non_custom_binary`].
pub trait BinaryFilterCompiler: Send + Sync {
    fn compile(
        &self,
        info: &BinaryExpressionInfo,
        compiler: &mut FilterCompiler,
    ) -> Result<Option<Predicate>, CompileError>;
}

impl<F> BinaryFilterCompiler for F
where
    F: Fn(&BinaryExpressionInfo, &mut FilterCompiler) -> Result<Option<Predicate>, CompileError> + Send + Sync,
{
    fn compile(
        &self,
        info: &BinaryExpressionInfo,
        compiler: &mut FilterCompiler,
    ) -> Result<Option<Predicate>, CompileError> {
        self(info, compiler)
    }
}

/// Ordered registry of custom binary compilers.
///
/// Safe for concurrent use. Each compilation works on a snapshot taken when
/// the first binary clause is seen, so registering while compiling does not
/// affect compilations already running.
#[derive(Default)]
pub struct CustomFilterCompilers {
    compilers: RwLock<Vec<Arc<dyn BinaryFilterCompiler>>>,
}

impl CustomFilterCompilers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a compiler; earlier registrations take precedence.
    pub fn register<C>(&self, compiler: C)
    where
        C: BinaryFilterCompiler + 'static,
    {
        self.compilers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(compiler));
    }

    /// Appends a closure compiler.
    pub fn register_fn<F>(&self, compiler: F)
    where
        F: Fn(&BinaryExpressionInfo, &mut FilterCompiler) -> Result<Option<Predicate>, CompileError>
            + Send
            + Sync
            + 'static,
    {
        self.register(compiler);
    }

    pub fn len(&self) -> usize {
        self.compilers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.compilers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn snapshot(&self) -> Vec<Arc<dyn BinaryFilterCompiler>> {
        self.compilers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for CustomFilterCompilers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomFilterCompilers")
            .field("len", &self.len())
            .finish()
    }
}

/// Compiles criteria against one record shape.
///
/// A compiler holds the accessor cache for its lifetime; create one per
/// request.
pub struct FilterCompiler {
    resolver: AccessorResolver,
    config: EngineConfig,
    custom: Option<Arc<CustomFilterCompilers>>,
    custom_snapshot: Option<Vec<Arc<dyn BinaryFilterCompiler>>>,
}

impl std::fmt::Debug for FilterCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCompiler")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .field("custom", &self.custom)
            .finish_non_exhaustive()
    }
}

impl FilterCompiler {
    pub fn new(shape: Arc<Shape>, config: EngineConfig) -> Self {
        Self {
            resolver: AccessorResolver::new(shape, config.guard_nulls),
            config,
            custom: None,
            custom_snapshot: None,
        }
    }

    pub fn with_custom_compilers(mut self, registry: Arc<CustomFilterCompilers>) -> Self {
        self.custom = Some(registry);
        self.custom_snapshot = None;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shape(&self) -> &Arc<Shape> {
        self.resolver.shape()
    }

    /// Resolves an accessor path with this compiler's null guarding.
    pub fn resolve(&mut self, path: &str) -> Result<ResolvedAccessor, CompileError> {
        self.resolver.resolve(path)
    }

    /// Parses and compiles a JSON criteria array.
    pub fn compile_json(&mut self, json: &serde_json::Value) -> Result<Predicate, CompileError> {
        let node = CriteriaNode::from_json(json)?;
        self.compile(&node)
    }

    pub fn compile(&mut self, node: &CriteriaNode) -> Result<Predicate, CompileError> {
        let predicate = self.compile_node(node)?;
        debug!(
            shape = %self.shape().name,
            predicate = %predicate,
            "criteria compiled"
        );
        Ok(predicate)
    }

    fn compile_node(&mut self, node: &CriteriaNode) -> Result<Predicate, CompileError> {
        match node {
            CriteriaNode::Group(items) => self.compile_group(items),
            CriteriaNode::Unary(inner) => Ok(Predicate::negate(self.compile_node(inner)?)),
            CriteriaNode::Binary {
                accessor,
                operation,
                value,
            } => {
                let operation = operation
                    .as_deref()
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| "=".to_string());
                self.compile_binary(accessor, &operation, value)
            }
        }
    }

    fn compile_group(&mut self, items: &[GroupItem]) -> Result<Predicate, CompileError> {
        let mut operands = Vec::new();
        let mut is_and = true;
        let mut next_is_and = true;

        for item in items {
            match item {
                GroupItem::Connector(token) => {
                    next_is_and = AND_CONNECTOR.is_match(token);
                }
                GroupItem::Node(node) => {
                    if operands.len() > 1 && is_and != next_is_and {
                        return Err(CompileError::MixedConnectors);
                    }
                    is_and = next_is_and;
                    operands.push(self.compile_node(node)?);
                    next_is_and = true;
                }
            }
        }

        match operands.len() {
            0 => Err(CompileError::MalformedCriteria("group without clauses".to_string())),
            1 => Ok(operands.remove(0)),
            _ if is_and => Ok(Predicate::And(operands)),
            _ => Ok(Predicate::Or(operands)),
        }
    }

    fn compile_binary(&mut self, accessor: &str, operation: &str, value: &Value) -> Result<Predicate, CompileError> {
        if let Some(registry) = &self.custom {
            let snapshot = self
                .custom_snapshot
                .get_or_insert_with(|| registry.snapshot())
                .clone();
            if !snapshot.is_empty() {
                let info = BinaryExpressionInfo {
                    accessor: accessor.to_string(),
                    operation: operation.to_string(),
                    value: value.clone(),
                    string_to_lower: self.config.string_to_lower,
                    shape: Arc::clone(self.shape()),
                };
                for compiler in &snapshot {
                    if let Some(predicate) = compiler.compile(&info, self)? {
                        debug!(accessor, operation, "binary clause claimed by custom compiler");
                        return Ok(predicate);
                    }
                }
            }
        }
        self.compile_non_custom_binary(accessor, operation, value)
    }

    /// Default handling of a binary clause, bypassing custom compilers.
    ///
    /// `operation` is matched case-insensitively.
    pub fn compile_non_custom_binary(
        &mut self,
        accessor: &str,
        operation: &str,
        value: &Value,
    ) -> Result<Predicate, CompileError> {
        let operation = operation.to_lowercase();
        let is_string_op = STRING_OPERATIONS.contains(&operation.as_str());
        let fold_case = self.config.string_to_lower;

        let resolved = self.resolver.resolve_with(accessor, |progression| {
            if is_string_op {
                progression.force_to_string();
            }
            if fold_case && progression.last_type().is_textual() {
                progression.add_to_lower();
            }
        })?;

        if is_string_op {
            return Ok(self.compile_string_op(resolved, &operation, value));
        }

        let op = CompareOp::from_token(&operation)
            .ok_or_else(|| CompileError::UnsupportedOperator(operation.clone()))?;

        if resolved.value_type().is_dynamic() {
            return Ok(Predicate::Compare {
                accessor: resolved,
                op,
                value: value.clone(),
                strategy: CompareStrategy::Dynamic { fold_case },
            });
        }

        let literal = match coerce_literal(value, resolved.value_type()) {
            Ok(literal) => literal,
            Err(failure) => {
                debug!(accessor, error = %failure, "literal not convertible, clause is false");
                return Ok(Predicate::Constant(false));
            }
        };

        if literal.is_null() && !resolved.is_nullable() && !op.is_equality() {
            return Ok(Predicate::Constant(false));
        }

        let literal = match literal {
            Value::String(s) if fold_case => Value::String(s.to_lowercase()),
            other => other,
        };

        let strategy = match self.comparison_strategy(&resolved, op, &literal)? {
            Some(strategy) => strategy,
            None => return Ok(Predicate::Constant(false)),
        };

        Ok(Predicate::Compare {
            accessor: resolved,
            op,
            value: literal,
            strategy,
        })
    }

    fn compile_string_op(&self, accessor: ResolvedAccessor, operation: &str, value: &Value) -> Predicate {
        let mut needle = value.display_text();
        if self.config.string_to_lower {
            needle = needle.to_lowercase();
        }
        let text = |op| Predicate::Text {
            accessor: accessor.clone(),
            op,
            needle: needle.clone(),
        };
        match operation {
            "startswith" => text(TextOp::StartsWith),
            "endswith" => text(TextOp::EndsWith),
            "notcontains" => Predicate::negate(text(TextOp::Contains)),
            _ => text(TextOp::Contains),
        }
    }

    /// Picks how a typed comparison is evaluated. `None` means the clause can
    /// never hold.
    fn comparison_strategy(
        &self,
        accessor: &ResolvedAccessor,
        op: CompareOp,
        literal: &Value,
    ) -> Result<Option<CompareStrategy>, CompileError> {
        let ty = accessor.value_type();
        let not_comparable = |operation: &'static str| CompileError::NotComparable {
            path: accessor.path().to_string(),
            type_name: ty.type_name(),
            operation,
        };

        if op.is_equality() {
            return match ty.equality() {
                EqualitySupport::Native if matches!(ty, ValueType::Enum(_)) => Ok(Some(CompareStrategy::Underlying)),
                EqualitySupport::Native => Ok(Some(CompareStrategy::Native)),
                EqualitySupport::Operator(eq) => Ok(Some(CompareStrategy::EqualityOperator(eq))),
                EqualitySupport::None if self.config.supports_equals_method => Ok(Some(CompareStrategy::Equals)),
                EqualitySupport::None => Err(not_comparable("equality")),
            };
        }

        match ty.ordering() {
            OrderingSupport::Native => Ok(Some(CompareStrategy::Native)),
            OrderingSupport::Underlying => Ok(Some(CompareStrategy::Underlying)),
            OrderingSupport::Operator(cmp) => Ok(Some(CompareStrategy::Operator(cmp))),
            OrderingSupport::CompareTo(_) if literal.is_null() => Ok(None),
            OrderingSupport::CompareTo(cmp) => Ok(Some(CompareStrategy::CompareTo(cmp))),
            OrderingSupport::StaticCompare(cmp) => Ok(Some(CompareStrategy::StaticCompare(cmp))),
            OrderingSupport::None => Err(not_comparable("ordering")),
        }
    }
}
