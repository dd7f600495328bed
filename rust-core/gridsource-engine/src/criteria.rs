// SPDX-License-Identifier: PMPL-1.0-or-later
//! Criteria syntax tree.
//!
//! Criteria travel as nested JSON arrays:
//!
//! ```text
//! ["age", ">", 30]                                  binary
//! ["name", "Ada"]                                   binary, operator defaults to "="
//! ["!", ["age", ">", 30]]                           unary negation
//! [["age", ">", 30], "and", ["name", "Ada"]]        group
//! ```
//!
//! Parsing only checks structure. Member names, operators and connector
//! consistency are checked by the filter compiler.

use serde::{Deserialize, Deserializer};

use crate::error::CompileError;
use crate::value::Value;

/// One unit of the filter grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum CriteriaNode {
    Binary {
        accessor: String,
        /// Operator token as written, `None` when omitted.
        operation: Option<String>,
        value: Value,
    },
    Unary(Box<CriteriaNode>),
    Group(Vec<GroupItem>),
}

/// A child of a group: a nested clause or a connector token.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupItem {
    Node(CriteriaNode),
    Connector(String),
}

impl CriteriaNode {
    pub fn binary(accessor: impl Into<String>, operation: impl Into<String>, value: impl Into<Value>) -> Self {
        CriteriaNode::Binary {
            accessor: accessor.into(),
            operation: Some(operation.into()),
            value: value.into(),
        }
    }

    pub fn negate(node: CriteriaNode) -> Self {
        CriteriaNode::Unary(Box::new(node))
    }

    pub fn group(items: impl IntoIterator<Item = GroupItem>) -> Self {
        CriteriaNode::Group(items.into_iter().collect())
    }

    /// Parses a criteria array.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CompileError> {
        let items = match json {
            serde_json::Value::Array(items) if !items.is_empty() => items,
            serde_json::Value::Array(_) => {
                return Err(CompileError::MalformedCriteria("empty criteria array".to_string()))
            }
            other => {
                return Err(CompileError::MalformedCriteria(format!(
                    "expected an array, found {other}"
                )))
            }
        };

        match &items[0] {
            serde_json::Value::Array(_) => parse_group(items),
            serde_json::Value::String(s) if s == "!" => {
                let operand = items.get(1).ok_or_else(|| {
                    CompileError::MalformedCriteria("negation without an operand".to_string())
                })?;
                Ok(CriteriaNode::negate(Self::from_json(operand)?))
            }
            _ => parse_binary(items),
        }
    }
}

impl GroupItem {
    pub fn node(node: CriteriaNode) -> Self {
        GroupItem::Node(node)
    }

    pub fn connector(token: impl Into<String>) -> Self {
        GroupItem::Connector(token.into())
    }
}

fn parse_group(items: &[serde_json::Value]) -> Result<CriteriaNode, CompileError> {
    items
        .iter()
        .map(|item| match item {
            serde_json::Value::String(token) => Ok(GroupItem::Connector(token.clone())),
            serde_json::Value::Array(_) => CriteriaNode::from_json(item).map(GroupItem::Node),
            other => Err(CompileError::MalformedCriteria(format!(
                "unexpected group member {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(CriteriaNode::Group)
}

fn parse_binary(items: &[serde_json::Value]) -> Result<CriteriaNode, CompileError> {
    if items.len() < 2 {
        return Err(CompileError::MalformedCriteria(format!(
            "binary clause needs at least two elements, found {}",
            items.len()
        )));
    }
    let accessor = match &items[0] {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let operation = if items.len() > 2 {
        Some(match &items[1] {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    } else {
        None
    };
    let value = items.last().map(Value::from).unwrap_or_default();
    Ok(CriteriaNode::Binary {
        accessor,
        operation,
        value,
    })
}

impl<'de> Deserialize<'de> for CriteriaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        CriteriaNode::from_json(&json).map_err(serde::de::Error::custom)
    }
}
