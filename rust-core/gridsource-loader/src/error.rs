// SPDX-License-Identifier: PMPL-1.0-or-later
//! Loader errors

use gridsource_engine::{CompileError, EngineError, EvalError};
use thiserror::Error;

/// Failure of a load request. `E` is the backend's own error type.
#[derive(Debug, Error)]
pub enum LoadError<E> {
    #[error(transparent)]
    Backend(E),

    #[error("load cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    Compile(#[from] CompileError),

    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),
}

impl<E> From<EngineError> for LoadError<E> {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Compile(e) => LoadError::Compile(e),
            EngineError::Eval(e) => LoadError::Eval(e),
        }
    }
}

impl<E> LoadError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}
