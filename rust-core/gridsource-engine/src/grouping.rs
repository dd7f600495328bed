// SPDX-License-Identifier: PMPL-1.0-or-later
//! Group descriptors and hierarchical group trees.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One grouping level: `{ "selector": "region", "desc": false, "isExpanded": true }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingInfo {
    pub selector: String,
    #[serde(default)]
    pub desc: bool,
    /// Omitted means expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_expanded: Option<bool>,
}

impl GroupingInfo {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            desc: false,
            is_expanded: None,
        }
    }

    pub fn descending(mut self) -> Self {
        self.desc = true;
        self
    }

    pub fn collapsed(mut self) -> Self {
        self.is_expanded = Some(false);
        self
    }

    pub fn expanded(&self) -> bool {
        self.is_expanded.unwrap_or(true)
    }
}

/// Children of a group: nested groups or, at the last level, rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GroupItems<T> {
    Groups(Vec<Group<T>>),
    Rows(Vec<T>),
}

impl<T> GroupItems<T> {
    pub fn len(&self) -> usize {
        match self {
            GroupItems::Groups(groups) => groups.len(),
            GroupItems::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A node of a grouping result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group<T> {
    pub key: Value,
    /// `None` for collapsed groups.
    pub items: Option<GroupItems<T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Vec<Value>>,
}

impl<T> Group<T> {
    pub fn new(key: Value, items: GroupItems<T>) -> Self {
        let count = items.len();
        Self {
            key,
            items: Some(items),
            count: Some(count),
            summary: None,
        }
    }

    /// Number of rows under this node, across all levels.
    pub fn leaf_row_count(&self) -> usize {
        match &self.items {
            Some(GroupItems::Rows(rows)) => rows.len(),
            Some(GroupItems::Groups(groups)) => groups.iter().map(Group::leaf_row_count).sum(),
            None => 0,
        }
    }

    /// Converts the rows of this subtree, keeping keys, counts and summaries.
    pub fn map_rows<U, F>(self, f: &mut F) -> Group<U>
    where
        F: FnMut(T) -> U,
    {
        let items = self.items.map(|items| match items {
            GroupItems::Rows(rows) => GroupItems::Rows(rows.into_iter().map(&mut *f).collect()),
            GroupItems::Groups(groups) => {
                GroupItems::Groups(groups.into_iter().map(|g| g.map_rows(f)).collect())
            }
        });
        Group {
            key: self.key,
            items,
            count: self.count,
            summary: self.summary,
        }
    }
}

/// Hash key a group is collected under. Integral floats fold onto ints so
/// `1` and `1.0` share a group, matching [`crate::values_equal`].
pub fn grouping_key(value: &Value) -> Value {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Int(*f as i64),
        other => other.clone(),
    }
}

/// Groups `rows` into `levels` nested levels. `key_of(row, level)` returns the
/// row's key at a level. Groups appear in the order their first row arrives.
pub fn group_by_levels<T, E, F>(rows: Vec<T>, levels: usize, key_of: &mut F) -> Result<Vec<Group<T>>, E>
where
    F: FnMut(&T, usize) -> Result<Value, E>,
{
    group_level(rows, 0, levels, key_of)
}

fn group_level<T, E, F>(rows: Vec<T>, level: usize, levels: usize, key_of: &mut F) -> Result<Vec<Group<T>>, E>
where
    F: FnMut(&T, usize) -> Result<Value, E>,
{
    let mut index: HashMap<Value, usize> = HashMap::new();
    let mut buckets: Vec<(Value, Vec<T>)> = Vec::new();
    for row in rows {
        let key = key_of(&row, level)?;
        match index.get(&grouping_key(&key)) {
            Some(&at) => buckets[at].1.push(row),
            None => {
                index.insert(grouping_key(&key), buckets.len());
                buckets.push((key, vec![row]));
            }
        }
    }

    buckets
        .into_iter()
        .map(|(key, rows)| {
            let items = if level + 1 < levels {
                GroupItems::Groups(group_level(rows, level + 1, levels, key_of)?)
            } else {
                GroupItems::Rows(rows)
            };
            Ok(Group::new(key, items))
        })
        .collect()
}
