// SPDX-License-Identifier: PMPL-1.0-or-later
//! Record shapes and value types.
//!
//! A [`Shape`] is the static description of a record: its members and the
//! type of each one. Shapes are registered once and shared read-only between
//! compilations. The capabilities a type exposes (native equality, ordering
//! operators, three-way compare methods) decide how the filter compiler
//! builds comparisons, so custom types declare them up front through
//! [`CustomType`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::value::{compare_values, Value};

/// Three-way comparison between two values of one type.
pub type CompareFn = fn(&Value, &Value) -> Ordering;

/// Native equality operator of a custom type.
pub type EqualityFn = fn(&Value, &Value) -> bool;

/// Converts a client literal into a value of a custom type. `None` means the
/// literal is not convertible.
pub type CoerceFn = fn(&Value) -> Option<Value>;

/// Static type of a record member.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    DateTime,
    Duration,
    Uuid,
    Enum(Arc<EnumType>),
    Object(Arc<Shape>),
    Custom(Arc<CustomType>),
    /// Fully untyped member; comparisons are resolved at evaluation time.
    Dynamic,
}

/// How a type supports `=` and `<>`.
#[derive(Debug, Clone, Copy)]
pub enum EqualitySupport {
    /// Built-in equality.
    Native,
    /// A declared equality operator.
    Operator(EqualityFn),
    /// No equality operator; only generic value equality is available.
    None,
}

/// How a type supports `<`, `<=`, `>` and `>=`.
#[derive(Debug, Clone, Copy)]
pub enum OrderingSupport {
    /// Built-in relational operators.
    Native,
    /// Enum compared by its underlying integer.
    Underlying,
    /// A declared relational operator.
    Operator(CompareFn),
    /// Instance three-way compare; only defined for non-null receivers.
    CompareTo(CompareFn),
    /// Static three-way compare that also orders nulls.
    StaticCompare(CompareFn),
    /// No comparison mechanism.
    None,
}

impl ValueType {
    pub fn object(shape: Shape) -> Self {
        ValueType::Object(Arc::new(shape))
    }

    pub fn enumeration(enum_type: EnumType) -> Self {
        ValueType::Enum(Arc::new(enum_type))
    }

    pub fn custom(custom: CustomType) -> Self {
        ValueType::Custom(Arc::new(custom))
    }

    /// Type name for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            ValueType::Bool => "bool".to_string(),
            ValueType::Int32 => "int32".to_string(),
            ValueType::Int64 => "int64".to_string(),
            ValueType::Float32 => "float32".to_string(),
            ValueType::Float64 => "float64".to_string(),
            ValueType::String => "string".to_string(),
            ValueType::DateTime => "datetime".to_string(),
            ValueType::Duration => "duration".to_string(),
            ValueType::Uuid => "uuid".to_string(),
            ValueType::Enum(e) => e.name.clone(),
            ValueType::Object(s) => s.name.clone(),
            ValueType::Custom(c) => c.name.clone(),
            ValueType::Dynamic => "dynamic".to_string(),
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ValueType::String)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ValueType::Dynamic)
    }

    /// Reference-like types can always hold null.
    pub fn is_reference(&self) -> bool {
        match self {
            ValueType::String | ValueType::Object(_) | ValueType::Dynamic => true,
            ValueType::Custom(c) => !c.value_type,
            _ => false,
        }
    }

    /// Types with an additive identity, accepted by SUM and AVG.
    pub fn is_summable(&self) -> bool {
        matches!(
            self,
            ValueType::Int32
                | ValueType::Int64
                | ValueType::Float32
                | ValueType::Float64
                | ValueType::Duration
        )
    }

    pub fn equality(&self) -> EqualitySupport {
        match self {
            ValueType::Object(_) => EqualitySupport::None,
            ValueType::Custom(c) => match c.equality {
                Some(op) => EqualitySupport::Operator(op),
                None => EqualitySupport::None,
            },
            _ => EqualitySupport::Native,
        }
    }

    pub fn ordering(&self) -> OrderingSupport {
        match self {
            ValueType::Int32
            | ValueType::Int64
            | ValueType::Float32
            | ValueType::Float64
            | ValueType::DateTime
            | ValueType::Duration
            | ValueType::Dynamic => OrderingSupport::Native,
            ValueType::Enum(_) => OrderingSupport::Underlying,
            ValueType::Bool | ValueType::Uuid => OrderingSupport::CompareTo(compare_natural),
            ValueType::String => OrderingSupport::StaticCompare(compare_text),
            ValueType::Object(_) => OrderingSupport::None,
            ValueType::Custom(c) => {
                if let Some(op) = c.relational {
                    OrderingSupport::Operator(op)
                } else if let (true, Some(cmp)) = (c.value_type, c.compare_to) {
                    OrderingSupport::CompareTo(cmp)
                } else if let Some(cmp) = c.compare {
                    OrderingSupport::StaticCompare(cmp)
                } else {
                    OrderingSupport::None
                }
            }
        }
    }

    /// Whether MIN/MAX can be computed over values of this type.
    pub fn is_comparable(&self) -> bool {
        !matches!(self.ordering(), OrderingSupport::None)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

fn compare_natural(a: &Value, b: &Value) -> Ordering {
    compare_values(a, b).unwrap_or(Ordering::Equal)
}

/// Ordinal text comparison where null sorts before every string.
fn compare_text(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => compare_natural(a, b),
    }
}

/// An enumeration: named members backed by integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<(String, i64)>,
}

impl EnumType {
    pub fn new<S: Into<String>>(name: impl Into<String>, members: impl IntoIterator<Item = (S, i64)>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// Underlying value of a member name (case-sensitive).
    pub fn value_of(&self, member: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| *value)
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }
}

/// A user-registered type and the comparison capabilities it exposes.
#[derive(Debug, Clone)]
pub struct CustomType {
    pub name: String,
    /// Value types cannot be null unless a member is declared nullable.
    pub value_type: bool,
    pub equality: Option<EqualityFn>,
    pub relational: Option<CompareFn>,
    pub compare_to: Option<CompareFn>,
    pub compare: Option<CompareFn>,
    pub coerce: Option<CoerceFn>,
}

impl CustomType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: false,
            equality: None,
            relational: None,
            compare_to: None,
            compare: None,
            coerce: None,
        }
    }

    pub fn value_type(mut self) -> Self {
        self.value_type = true;
        self
    }

    pub fn with_equality(mut self, op: EqualityFn) -> Self {
        self.equality = Some(op);
        self
    }

    pub fn with_relational(mut self, op: CompareFn) -> Self {
        self.relational = Some(op);
        self
    }

    pub fn with_compare_to(mut self, cmp: CompareFn) -> Self {
        self.compare_to = Some(cmp);
        self
    }

    pub fn with_compare(mut self, cmp: CompareFn) -> Self {
        self.compare = Some(cmp);
        self
    }

    pub fn with_coerce(mut self, coerce: CoerceFn) -> Self {
        self.coerce = Some(coerce);
        self
    }
}

impl PartialEq for CustomType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value_type == other.value_type
    }
}

/// Member type plus nullability.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub ty: ValueType,
    pub nullable: bool,
}

impl FieldDef {
    /// Nullable only if the type is reference-like.
    pub fn new(ty: ValueType) -> Self {
        let nullable = ty.is_reference();
        Self { ty, nullable }
    }

    pub fn nullable(ty: ValueType) -> Self {
        Self { ty, nullable: true }
    }
}

/// A named member of a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub def: FieldDef,
}

/// Static description of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub name: String,
    members: Vec<Member>,
}

impl Shape {
    pub fn builder(name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Looks a member up by exact name, then by a unique case-insensitive
    /// match.
    pub fn member(&self, name: &str) -> Option<&Member> {
        if let Some(exact) = self.members.iter().find(|m| m.name == name) {
            return Some(exact);
        }
        let mut candidates = self
            .members
            .iter()
            .filter(|m| m.name.eq_ignore_ascii_case(name));
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }
}

/// Builder for [`Shape`].
#[derive(Debug)]
pub struct ShapeBuilder {
    name: String,
    members: Vec<Member>,
}

impl ShapeBuilder {
    /// Adds a member with default nullability for its type.
    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.members.push(Member {
            name: name.into(),
            def: FieldDef::new(ty),
        });
        self
    }

    /// Adds a member that may hold null.
    pub fn nullable(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.members.push(Member {
            name: name.into(),
            def: FieldDef::nullable(ty),
        });
        self
    }

    pub fn build(self) -> Shape {
        Shape {
            name: self.name,
            members: self.members,
        }
    }
}
