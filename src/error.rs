use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Problems that stop a run before any page is read.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("dump not found: {}", .0.display())]
    DumpMissing(PathBuf),

    #[error("failed to create output directory {}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    #[error("markup nested deeper than {limit} levels at byte {offset}")]
    NestingTooDeep { offset: usize, limit: usize },
}

/// Why a single page produced no article. Never fatal to the run.
#[derive(Error, Debug)]
pub enum CleanError {
    #[error("markup error: {0}")]
    Markup(#[from] MarkupError),

    #[error("cleaner panicked: {0}")]
    Panicked(String),
}

/// A batch that could not be persisted; its articles are lost.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to encode batch {number}: {source}")]
    Encode {
        number: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WriteError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
