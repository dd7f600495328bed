// SPDX-License-Identifier: PMPL-1.0-or-later
//! Running sums per numeric type.
//!
//! Each accumulator starts at its type's zero, so a fresh accumulator's
//! [`Accumulator::value`] is the "empty sum" for that type.

use chrono::TimeDelta;

use crate::error::EvalError;
use crate::shape::ValueType;
use crate::value::Value;

pub trait Accumulator: Send + std::fmt::Debug {
    /// Folds one non-null value in.
    fn add(&mut self, value: &Value) -> Result<(), EvalError>;

    /// Current sum.
    fn value(&self) -> Value;

    /// Sum divided by `count`; null when `count` is zero.
    fn divide(&self, count: u64) -> Value;
}

#[derive(Debug, Default)]
pub struct IntAccumulator {
    sum: i128,
}

impl Accumulator for IntAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), EvalError> {
        match value {
            Value::Int(i) => {
                self.sum += i128::from(*i);
                Ok(())
            }
            other => Err(mismatch("int", other)),
        }
    }

    fn value(&self) -> Value {
        match i64::try_from(self.sum) {
            Ok(sum) => Value::Int(sum),
            Err(_) => Value::Float(self.sum as f64),
        }
    }

    fn divide(&self, count: u64) -> Value {
        if count == 0 {
            return Value::Null;
        }
        Value::Float(self.sum as f64 / count as f64)
    }
}

#[derive(Debug, Default)]
pub struct FloatAccumulator {
    sum: f64,
}

impl Accumulator for FloatAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), EvalError> {
        match value.as_f64() {
            Some(f) => {
                self.sum += f;
                Ok(())
            }
            None => Err(mismatch("float", value)),
        }
    }

    fn value(&self) -> Value {
        Value::Float(self.sum)
    }

    fn divide(&self, count: u64) -> Value {
        if count == 0 {
            return Value::Null;
        }
        Value::Float(self.sum / count as f64)
    }
}

#[derive(Debug)]
pub struct DurationAccumulator {
    sum: TimeDelta,
}

impl Default for DurationAccumulator {
    fn default() -> Self {
        Self { sum: TimeDelta::zero() }
    }
}

impl Accumulator for DurationAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), EvalError> {
        match value {
            Value::Duration(d) => {
                self.sum = self.sum.checked_add(d).ok_or_else(|| {
                    EvalError::Custom("duration sum overflow".to_string())
                })?;
                Ok(())
            }
            other => Err(mismatch("duration", other)),
        }
    }

    fn value(&self) -> Value {
        Value::Duration(self.sum)
    }

    fn divide(&self, count: u64) -> Value {
        if count == 0 {
            return Value::Null;
        }
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        let avg = match self.sum.num_nanoseconds() {
            Some(nanos) => TimeDelta::nanoseconds(nanos / count),
            None => TimeDelta::milliseconds(self.sum.num_milliseconds() / count),
        };
        Value::Duration(avg)
    }
}

/// Accumulator for untyped members. The running sum takes the kind of the
/// first value folded in; ints widen to floats when a float arrives.
#[derive(Debug, Default)]
pub enum DynamicAccumulator {
    #[default]
    Empty,
    Int(i128),
    Float(f64),
    Duration(TimeDelta),
}

impl Accumulator for DynamicAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), EvalError> {
        let next = match (&*self, value) {
            (DynamicAccumulator::Empty, Value::Int(i)) => DynamicAccumulator::Int(i128::from(*i)),
            (DynamicAccumulator::Empty, Value::Float(f)) => DynamicAccumulator::Float(*f),
            (DynamicAccumulator::Empty, Value::Duration(d)) => DynamicAccumulator::Duration(*d),
            (DynamicAccumulator::Int(sum), Value::Int(i)) => DynamicAccumulator::Int(sum + i128::from(*i)),
            (DynamicAccumulator::Int(sum), Value::Float(f)) => DynamicAccumulator::Float(*sum as f64 + f),
            (DynamicAccumulator::Float(sum), Value::Int(_) | Value::Float(_)) => {
                DynamicAccumulator::Float(sum + value.as_f64().unwrap_or_default())
            }
            (DynamicAccumulator::Duration(sum), Value::Duration(d)) => DynamicAccumulator::Duration(
                sum.checked_add(d)
                    .ok_or_else(|| EvalError::Custom("duration sum overflow".to_string()))?,
            ),
            (_, other) => return Err(mismatch("number", other)),
        };
        *self = next;
        Ok(())
    }

    fn value(&self) -> Value {
        match self {
            DynamicAccumulator::Empty => Value::Int(0),
            DynamicAccumulator::Int(sum) => IntAccumulator { sum: *sum }.value(),
            DynamicAccumulator::Float(sum) => Value::Float(*sum),
            DynamicAccumulator::Duration(sum) => Value::Duration(*sum),
        }
    }

    fn divide(&self, count: u64) -> Value {
        match self {
            DynamicAccumulator::Empty => Value::Null,
            DynamicAccumulator::Int(sum) => IntAccumulator { sum: *sum }.divide(count),
            DynamicAccumulator::Float(sum) => FloatAccumulator { sum: *sum }.divide(count),
            DynamicAccumulator::Duration(sum) => DurationAccumulator { sum: *sum }.divide(count),
        }
    }
}

pub struct AccumulatorFactory;

impl AccumulatorFactory {
    /// Accumulator for a static member type; `None` for types without an
    /// additive identity.
    pub fn for_type(ty: &ValueType) -> Option<Box<dyn Accumulator>> {
        match ty {
            ValueType::Int32 | ValueType::Int64 => Some(Box::<IntAccumulator>::default()),
            ValueType::Float32 | ValueType::Float64 => Some(Box::<FloatAccumulator>::default()),
            ValueType::Duration => Some(Box::<DurationAccumulator>::default()),
            ValueType::Dynamic => Some(Box::<DynamicAccumulator>::default()),
            _ => None,
        }
    }

    /// Additive identity of a type, used for SUM over no rows.
    pub fn empty_sum(ty: &ValueType) -> Value {
        Self::for_type(ty).map_or(Value::Int(0), |acc| acc.value())
    }
}

fn mismatch(expected: &'static str, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected,
        found: found.kind_name(),
    }
}
