//! Error types for the richter snapshot loader.

use std::path::PathBuf;

use snafu::prelude::*;

/// Errors that can occur while locating or reading a raw snapshot.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SnapshotError {
    /// No snapshot candidate exists at the input location.
    #[snafu(display("No snapshot found at {}", path.display()))]
    NotFound { path: PathBuf },

    /// IO failure while scanning or reading the input.
    #[snafu(display("Failed to read snapshot {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors that can occur while parsing a snapshot document.
///
/// These are fatal: a malformed document aborts the run before any
/// output is produced.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseError {
    /// The document is not valid JSON.
    #[snafu(display("Snapshot is not valid JSON: {source}"))]
    Json { source: serde_json::Error },

    /// The document root is not a JSON object.
    #[snafu(display("Snapshot root is not a JSON object"))]
    RootNotObject,

    /// The document root has no `features` array.
    #[snafu(display("Snapshot root has no 'features' array"))]
    MissingFeatures,
}

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Skip-ratio threshold outside [0, 1].
    #[snafu(display("skip_ratio_threshold must be within [0, 1], got {value}"))]
    InvalidThreshold { value: f64 },

    /// Rows-per-file must be positive.
    #[snafu(display("rows_per_file must be greater than zero"))]
    ZeroRowsPerFile,
}

/// Errors that can occur while persisting records to the destination table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Destination is locked by a concurrent run.
    #[snafu(display("Destination is locked by a concurrent run (lock file {})", path.display()))]
    Locked { path: PathBuf },

    /// Failed to create the lock file or staging directory.
    #[snafu(display("Failed to prepare destination {}: {source}", path.display()))]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to encode records into Arrow arrays.
    #[snafu(display("Failed to encode records: {source}"))]
    Encode {
        source: arrow::error::ArrowError,
    },

    /// Failed to write Parquet data.
    #[snafu(display("Failed to write Parquet: {source}"))]
    Parquet {
        source: parquet::errors::ParquetError,
    },

    /// Failed to read the existing table during a merge.
    #[snafu(display("Failed to read existing table file {}: {source}", path.display()))]
    ExistingRead {
        path: PathBuf,
        source: parquet::errors::ParquetError,
    },

    /// Existing table schema does not match the declared canonical schema.
    #[snafu(display("Existing table file {} does not match the canonical schema", path.display()))]
    SchemaMismatch { path: PathBuf },

    /// Failed to write a staging file.
    #[snafu(display("Failed to write staging file {}: {source}", path.display()))]
    StagingWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to commit the staged table via atomic rename.
    #[snafu(display("Failed to commit staged table to {}: {source}", path.display()))]
    Commit {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A blocking encode/decode task panicked.
    #[snafu(display("Blocking task failed: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

/// Top-level pipeline errors.
///
/// Every variant is fatal to the run; per-record validation failures are
/// aggregated in the validation report instead and only surface here when
/// their proportion exceeds the configured skip-ratio threshold.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Snapshot could not be located or read.
    #[snafu(display("Snapshot error: {source}"))]
    Snapshot { source: SnapshotError },

    /// Snapshot document is malformed.
    #[snafu(display("Parse error: {source}"))]
    Parse { source: ParseError },

    /// Destination could not be written.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// Too many records failed validation.
    #[snafu(display(
        "{failed}/{total} records failed validation (threshold {threshold}): {detail}"
    ))]
    ValidationThreshold {
        failed: usize,
        total: usize,
        threshold: f64,
        detail: String,
    },
}

impl PipelineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config { .. } => 1,
            PipelineError::Snapshot { .. } => 2,
            PipelineError::Parse { .. } => 3,
            PipelineError::Sink { .. } => 4,
            PipelineError::ValidationThreshold { .. } => 5,
        }
    }
}

impl From<SnapshotError> for PipelineError {
    fn from(source: SnapshotError) -> Self {
        PipelineError::Snapshot { source }
    }
}

impl From<ParseError> for PipelineError {
    fn from(source: ParseError) -> Self {
        PipelineError::Parse { source }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<SinkError> for PipelineError {
    fn from(source: SinkError) -> Self {
        PipelineError::Sink { source }
    }
}
