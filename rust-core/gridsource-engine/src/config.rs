// SPDX-License-Identifier: PMPL-1.0-or-later
//! Engine configuration.
//!
//! Defaults follow the data-grid protocol's server defaults:
//! - guard_nulls: false (null intermediates are an evaluation error)
//! - string_to_lower: false (comparisons are case-sensitive)
//! - supports_equals_method: true

use serde::{Deserialize, Serialize};

/// Options shared by the filter compiler, the aggregate calculator and the
/// remote group transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Short-circuit null intermediates in accessor paths to "no value".
    pub guard_nulls: bool,
    /// Lower-case string operands before comparing.
    pub string_to_lower: bool,
    /// Compile equality on types without a native `==` to a generic value
    /// equality test. When disabled such comparisons are rejected.
    pub supports_equals_method: bool,
}

impl EngineConfig {
    /// Copy of this configuration with null guarding switched on.
    pub fn with_guard_nulls(mut self, guard_nulls: bool) -> Self {
        self.guard_nulls = guard_nulls;
        self
    }

    /// Copy of this configuration with case folding switched on or off.
    pub fn with_string_to_lower(mut self, string_to_lower: bool) -> Self {
        self.string_to_lower = string_to_lower;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            guard_nulls: false,
            string_to_lower: false,
            supports_equals_method: true,
        }
    }
}
