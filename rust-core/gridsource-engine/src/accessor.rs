// SPDX-License-Identifier: PMPL-1.0-or-later
//! Accessor path resolution.
//!
//! A dotted path such as `customer.address.city` is resolved once against a
//! [`Shape`] into a [`ResolvedAccessor`]: a chain of [`AccessStep`]s carrying
//! the static type reached at each step. The chain (the "progression") stays
//! open for post-processing until the accessor is handed to a predicate, so the
//! filter compiler can append a stringification or case-folding step to the
//! last expression.
//!
//! Null handling follows the resolver's `guard_nulls` setting. With guarding
//! on, reading through a null intermediate yields [`Value::Null`]; with it off
//! the read fails with [`EvalError::NullReference`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::{CompileError, EvalError};
use crate::shape::{Shape, ValueType};
use crate::value::Value;

/// One step of a resolved accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessStep {
    /// Statically resolved member read.
    Member {
        name: String,
        ty: ValueType,
        nullable: bool,
    },
    /// Member read below a dynamic member; resolved when the record is read.
    DynamicMember { name: String },
    /// Conversion of the previous value to its text form.
    Stringify { from: ValueType },
    /// Lower-casing. When it replaced a stringification step, `from` keeps the
    /// type that step converted from.
    Lowercase { from: Option<ValueType> },
}

/// A member chain resolved against a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAccessor {
    path: String,
    steps: Vec<AccessStep>,
    value_type: ValueType,
    nullable: bool,
    guard_nulls: bool,
}

impl ResolvedAccessor {
    /// Path text as written by the client.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn steps(&self) -> &[AccessStep] {
        &self.steps
    }

    /// Static type of the value this accessor produces.
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Whether a read can produce null.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn guards_nulls(&self) -> bool {
        self.guard_nulls
    }

    /// Reads the accessor's value off a record.
    pub fn read(&self, record: &Value) -> Result<Value, EvalError> {
        let mut current = record.clone();
        for step in &self.steps {
            current = match step {
                AccessStep::Member { name, .. } | AccessStep::DynamicMember { name } => {
                    match current {
                        Value::Null => return self.null_intermediate(),
                        Value::Object(mut map) => map.remove(name.as_str()).or_else(|| {
                            // Record keys may differ in case from the path.
                            let key = map.keys().find(|k| k.eq_ignore_ascii_case(name))?.clone();
                            map.remove(&key)
                        }),
                        other => {
                            return Err(EvalError::TypeMismatch {
                                expected: "object",
                                found: other.kind_name(),
                            })
                        }
                    }
                    .unwrap_or(Value::Null)
                }
                AccessStep::Stringify { from } => match current {
                    Value::Null if from.is_reference() => return self.null_intermediate(),
                    Value::Null => Value::String(String::new()),
                    other => Value::String(stringify(&other, from)),
                },
                AccessStep::Lowercase { from } => match current {
                    Value::Null => match from {
                        Some(ty) if !ty.is_reference() => Value::String(String::new()),
                        _ => return self.null_intermediate(),
                    },
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => {
                        let text = match from {
                            Some(ty) => stringify(&other, ty),
                            None => other.display_text(),
                        };
                        Value::String(text.to_lowercase())
                    }
                },
            };
        }
        Ok(current)
    }

    fn null_intermediate(&self) -> Result<Value, EvalError> {
        if self.guard_nulls {
            Ok(Value::Null)
        } else {
            Err(EvalError::NullReference {
                path: self.path.clone(),
            })
        }
    }
}

/// Text form of a value of a known static type. Enums render their member
/// name when the value matches one.
fn stringify(value: &Value, ty: &ValueType) -> String {
    if let (ValueType::Enum(enum_type), Value::Int(i)) = (ty, value) {
        if let Some(name) = enum_type.name_of(*i) {
            return name.to_string();
        }
    }
    value.display_text()
}

/// Post-processing view of a resolved accessor's step chain.
#[derive(Debug)]
pub struct Progression<'a> {
    accessor: &'a mut ResolvedAccessor,
}

impl Progression<'_> {
    pub fn last_type(&self) -> &ValueType {
        &self.accessor.value_type
    }

    /// Appends a stringification step unless the chain already yields text.
    pub fn force_to_string(&mut self) {
        let from = self.accessor.value_type.clone();
        if from.is_textual() {
            return;
        }
        self.accessor.steps.push(AccessStep::Stringify { from });
        self.accessor.value_type = ValueType::String;
    }

    /// Appends case folding. A directly preceding stringification step is
    /// removed and folded into the new step.
    pub fn add_to_lower(&mut self) {
        let from = match self.accessor.steps.last() {
            Some(AccessStep::Stringify { from }) => {
                let from = from.clone();
                self.accessor.steps.pop();
                Some(from)
            }
            _ => None,
        };
        self.accessor.steps.push(AccessStep::Lowercase { from });
        self.accessor.value_type = ValueType::String;
    }
}

/// Resolves accessor paths against one root shape, caching resolutions by
/// path text for the resolver's lifetime.
#[derive(Debug)]
pub struct AccessorResolver {
    shape: Arc<Shape>,
    guard_nulls: bool,
    cache: HashMap<String, ResolvedAccessor>,
}

impl AccessorResolver {
    pub fn new(shape: Arc<Shape>, guard_nulls: bool) -> Self {
        Self {
            shape,
            guard_nulls,
            cache: HashMap::new(),
        }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Resolves `path` without post-processing.
    pub fn resolve(&mut self, path: &str) -> Result<ResolvedAccessor, CompileError> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached.clone());
        }
        let resolved = resolve_path(&self.shape, path, self.guard_nulls)?;
        trace!(path, steps = resolved.steps.len(), "accessor resolved");
        self.cache.insert(path.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Resolves `path` and lets `post` adjust the step chain before the
    /// accessor is returned. The cached resolution is left untouched.
    pub fn resolve_with<F>(&mut self, path: &str, post: F) -> Result<ResolvedAccessor, CompileError>
    where
        F: FnOnce(&mut Progression<'_>),
    {
        let mut resolved = self.resolve(path)?;
        post(&mut Progression {
            accessor: &mut resolved,
        });
        Ok(resolved)
    }
}

fn resolve_path(root: &Arc<Shape>, path: &str, guard_nulls: bool) -> Result<ResolvedAccessor, CompileError> {
    let unknown = |member: &str, owner: &str| CompileError::UnknownMember {
        path: path.to_string(),
        member: member.to_string(),
        shape: owner.to_string(),
    };

    let mut steps = Vec::new();
    let mut current = ValueType::Object(Arc::clone(root));
    let mut nullable = false;
    let mut intermediate_nullable = false;

    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(unknown(segment, &current.type_name()));
        }
        intermediate_nullable |= nullable;
        match &current {
            ValueType::Object(shape) => {
                let member = shape
                    .member(segment)
                    .ok_or_else(|| unknown(segment, &shape.name))?;
                steps.push(AccessStep::Member {
                    name: member.name.clone(),
                    ty: member.def.ty.clone(),
                    nullable: member.def.nullable,
                });
                nullable = member.def.nullable;
                current = member.def.ty.clone();
            }
            ValueType::Dynamic => {
                steps.push(AccessStep::DynamicMember {
                    name: segment.to_string(),
                });
                nullable = true;
            }
            other => return Err(unknown(segment, &other.type_name())),
        }
    }

    Ok(ResolvedAccessor {
        path: path.to_string(),
        steps,
        value_type: current,
        nullable: nullable || (guard_nulls && intermediate_nullable),
        guard_nulls,
    })
}
