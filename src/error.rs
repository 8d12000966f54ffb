//! Error types for the simulation engine.

use thiserror::Error;

/// Which index space an out-of-range index belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Group,
    Rule,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Group => write!(f, "group"),
            IndexKind::Rule => write!(f, "rule"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} index {index} out of range (limit {limit})")]
    InvalidIndex {
        kind: IndexKind,
        index: usize,
        limit: usize,
    },

    #[error("no free cell for group {group}: placed {placed} of {requested} particles")]
    WorldFull {
        group: usize,
        placed: usize,
        requested: usize,
    },

    #[error("cell ({x}, {y}) is occupied or outside the world")]
    CellUnavailable { x: usize, y: usize },

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to build rule worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("a tick is already in flight")]
    TickInFlight,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub(crate) fn group(index: usize, limit: usize) -> Self {
        EngineError::InvalidIndex {
            kind: IndexKind::Group,
            index,
            limit,
        }
    }

    pub(crate) fn rule(index: usize, limit: usize) -> Self {
        EngineError::InvalidIndex {
            kind: IndexKind::Rule,
            index,
            limit,
        }
    }
}
