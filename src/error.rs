use std::path::PathBuf;

/// Errors raised while reading track and station data.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a FeatureCollection, found {0}")]
    NotAFeatureCollection(String),

    #[error("Malformed coordinate: expected [lon, lat], found {0:?}")]
    MalformedCoordinate(Vec<f64>),
}

/// Errors raised while loading a scenario descriptor and the files it refers to.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown unit class: {0}")]
    UnknownUnitClass(String),

    #[error("Network import failed: {0}")]
    Import(#[from] ImportError),

    #[error("The network contains no track to place units on")]
    EmptyNetwork,
}

/// Errors raised when addressing units in a unit database.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("No unit at index {0}")]
    UnknownUnit(usize),
}

/// Errors raised while exporting or restoring state snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot holds {found} units but the database holds {expected}")]
    UnitCountMismatch { expected: usize, found: usize },
}
