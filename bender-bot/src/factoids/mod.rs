//! Factoid knowledge base: a keyword maps to a deduplicated set of facts.

mod set;
mod store;

use std::path::PathBuf;

pub use set::{Factoid, FactoidSet, NewFactoid};
pub use store::{FactoidStore, SearchResults, normalize_keyword};

/// Errors from factoid store operations.
#[derive(Debug, thiserror::Error)]
pub enum FactoidError {
    #[error("factoid not found")]
    NotFound,

    #[error("fact already exists")]
    AlreadyExists,

    #[error("ambiguous key")]
    Ambiguous,

    #[error("invalid UTF-8")]
    InvalidEncoding,

    #[error(transparent)]
    InvalidPattern(#[from] regex::Error),

    #[error("error encoding database: {0}")]
    Encode(#[from] serde_json::Error),

    /// The change was made in memory but not written to disk. `fact` is
    /// the fact that was stored or removed.
    #[error("error syncing to file {}: {source}", path.display())]
    Sync {
        path: PathBuf,
        source: std::io::Error,
        fact: Option<Box<Factoid>>,
    },

    #[error("error loading database at {}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing database at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl FactoidError {
    /// Attach the fact a failed sync was for.
    fn for_fact(self, changed: &Factoid) -> Self {
        match self {
            Self::Sync { path, source, .. } => Self::Sync {
                path,
                source,
                fact: Some(Box::new(changed.clone())),
            },
            other => other,
        }
    }
}
