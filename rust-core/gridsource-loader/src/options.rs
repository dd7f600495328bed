// SPDX-License-Identifier: PMPL-1.0-or-later
//! Load request options, as sent by the grid

use gridsource_engine::{GroupingInfo, SummaryInfo};
use serde::{Deserialize, Serialize};

/// One sort level: `{ "selector": "name", "desc": true }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingInfo {
    pub selector: String,
    #[serde(default)]
    pub desc: bool,
}

impl SortingInfo {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            desc: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.desc = true;
        self
    }
}

impl From<&GroupingInfo> for SortingInfo {
    fn from(group: &GroupingInfo) -> Self {
        Self {
            selector: group.selector.clone(),
            desc: group.desc,
        }
    }
}

/// Options of a single load request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadOptions {
    pub skip: usize,
    /// `None` or zero loads everything after `skip`.
    pub take: Option<usize>,
    pub require_total_count: bool,
    pub require_group_count: bool,
    /// Only count matching records.
    pub is_count_query: bool,
    /// Raw criteria; `null` or `[]` means no filter.
    pub filter: Option<serde_json::Value>,
    pub sort: Vec<SortingInfo>,
    pub group: Vec<GroupingInfo>,
    pub total_summary: Vec<SummaryInfo>,
    pub group_summary: Vec<SummaryInfo>,
    pub remote_grouping: Option<bool>,
    pub string_to_lower: Option<bool>,
}

impl LoadOptions {
    /// The filter criteria, if any non-empty criteria were sent.
    pub fn criteria(&self) -> Option<&serde_json::Value> {
        self.filter.as_ref().filter(|f| match f {
            serde_json::Value::Null => false,
            serde_json::Value::Array(items) => !items.is_empty(),
            _ => true,
        })
    }

    pub fn is_grouped(&self) -> bool {
        !self.group.is_empty()
    }

    /// Whether the innermost group level is collapsed, so leaves carry only
    /// counts and summaries.
    pub fn last_level_collapsed(&self) -> bool {
        self.group.last().is_some_and(|g| !g.expanded())
    }

    pub fn effective_take(&self, max_take: Option<usize>) -> Option<usize> {
        let take = self.take.filter(|&t| t > 0);
        match (take, max_take) {
            (Some(t), Some(max)) => Some(t.min(max)),
            (None, Some(max)) => Some(max),
            (take, None) => take,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsource_engine::AggregateKind;
    use serde_json::json;

    #[test]
    fn test_grid_request_parses() {
        let options: LoadOptions = serde_json::from_value(json!({
            "skip": 20,
            "take": 10,
            "requireTotalCount": true,
            "filter": [["name", "contains", "a"], "and", ["age", ">", 3]],
            "sort": [{"selector": "name", "desc": true}],
            "group": [{"selector": "city", "isExpanded": false}],
            "totalSummary": [{"selector": "age", "summaryType": "sum"}],
            "groupSummary": [{"summaryType": "count"}]
        }))
        .unwrap();

        assert_eq!(options.skip, 20);
        assert_eq!(options.take, Some(10));
        assert!(options.require_total_count);
        assert!(!options.require_group_count);
        assert_eq!(options.sort, vec![SortingInfo::new("name").descending()]);
        assert!(options.is_grouped());
        assert!(options.last_level_collapsed());
        assert_eq!(options.total_summary[0].summary_type, AggregateKind::Sum);
        assert!(options.criteria().is_some());
    }

    #[test]
    fn test_empty_filter_is_no_filter() {
        let mut options = LoadOptions {
            filter: Some(json!([])),
            ..Default::default()
        };
        assert!(options.criteria().is_none());
        options.filter = Some(serde_json::Value::Null);
        assert!(options.criteria().is_none());
        options.filter = None;
        assert!(options.criteria().is_none());
    }

    #[test]
    fn test_effective_take() {
        let options = LoadOptions {
            take: Some(50),
            ..Default::default()
        };
        assert_eq!(options.effective_take(None), Some(50));
        assert_eq!(options.effective_take(Some(20)), Some(20));

        let unbounded = LoadOptions {
            take: Some(0),
            ..Default::default()
        };
        assert_eq!(unbounded.effective_take(None), None);
        assert_eq!(unbounded.effective_take(Some(5)), Some(5));
    }
}
