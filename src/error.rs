use std::path::PathBuf;

/// Crate-wide error type.
///
/// Per-image extraction failures are deliberately absent here: they are
/// recovered locally as sentinel-valued records and never surface as `Err`.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed persisted table {path}: {reason}")]
    MalformedTable { path: PathBuf, reason: String },

    #[error("no image named {0} in the current working set")]
    UnknownImage(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl CatalogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        CatalogError::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
