// SPDX-License-Identifier: PMPL-1.0-or-later
//! Loader configuration

use gridsource_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Configuration for [`crate::DataSourceLoader`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Compiler settings; per-request options may override `string_to_lower`.
    pub engine: EngineConfig,
    /// Push-down grouping default. `None` enables it for every backend that is
    /// not in memory.
    pub remote_grouping: Option<bool>,
    /// Upper bound applied to `take`. `None` leaves paging untouched.
    pub max_take: Option<usize>,
}

impl LoaderConfig {
    pub fn with_remote_grouping(mut self, enabled: bool) -> Self {
        self.remote_grouping = Some(enabled);
        self
    }

    pub fn with_max_take(mut self, max_take: usize) -> Self {
        self.max_take = Some(max_take);
        self
    }
}
