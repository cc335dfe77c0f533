use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::eval::EvalError;
use crate::level::MAX_LEVEL;
use crate::search::time_control::TimeControlMode;
use crate::types::Selectivity;

/// Fatal configuration errors raised while building a [`crate::search::Search`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load evaluation weights: {0}")]
    Eval(#[from] EvalError),
    #[error("invalid level {0}, valid range is 0..={MAX_LEVEL}")]
    InvalidLevel(usize),
    #[error("cannot reconfigure the engine while a search is running")]
    SearchRunning,
}

/// Engine construction parameters.
pub struct SearchOptions {
    /// Transposition table size in mebibytes.
    pub tt_mb_size: usize,
    /// Worker thread count; clamped to the machine's CPU count.
    pub n_threads: usize,
    /// Weight file path; `None` selects the zero-weight evaluator.
    pub eval_path: Option<PathBuf>,
    /// Strength level, 0..=60.
    pub level: usize,
}

impl SearchOptions {
    /// Options with the given hash size and defaults elsewhere.
    #[must_use]
    pub fn new(tt_mb_size: usize) -> Self {
        SearchOptions {
            tt_mb_size,
            ..Default::default()
        }
    }

    /// Overrides the worker count.
    #[must_use]
    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    /// Supplies a weight file.
    #[must_use]
    pub fn with_eval_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.eval_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the strength level.
    #[must_use]
    pub fn with_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            tt_mb_size: 64,
            n_threads: num_cpus::get(),
            eval_path: None,
            level: 21,
        }
    }
}

/// Per-run parameters.
#[derive(Clone)]
pub struct SearchRunOptions {
    /// Starting selectivity for the midgame.
    pub selectivity: Selectivity,
    /// Deadline control; [`TimeControlMode::Infinite`] runs to the level's
    /// depth.
    pub time: TimeControlMode,
    /// Observer invoked after each completed iteration.
    pub callback: Option<std::sync::Arc<crate::search::SearchProgressCallback>>,
}

impl Default for SearchRunOptions {
    fn default() -> Self {
        SearchRunOptions {
            selectivity: crate::probcut::NO_SELECTIVITY,
            time: TimeControlMode::Infinite,
            callback: None,
        }
    }
}
