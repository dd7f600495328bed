// SPDX-License-Identifier: PMPL-1.0-or-later
//! GridSource Loader
//!
//! Drives one grid load request end to end: compiles the filter, picks local
//! or push-down grouping, delegates to an [`ExecutionBackend`] and shapes the
//! response the grid expects.

pub mod backend;
pub mod config;
pub mod error;
pub mod loader;
pub mod memory;
pub mod options;
pub mod sort;

pub use backend::{ExecutionBackend, FlatGroupQuery, RecordQuery};
pub use config::LoaderConfig;
pub use error::LoadError;
pub use loader::{DataSourceLoader, LoadData, LoadResult};
pub use memory::{InMemoryBackend, MemoryBackendError};
pub use options::{LoadOptions, SortingInfo};
pub use sort::RecordSorter;
