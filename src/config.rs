//! Configuration for the richter snapshot loader.

use std::path::{Path, PathBuf};

use parquet::basic::{Compression as ParquetCodec, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the sink treats the existing destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Upsert by `earthquake_id` into the existing table. The default:
    /// reprocessing a feed never discards history.
    #[default]
    Merge,
    /// Replace the whole table with this run's records.
    Overwrite,
}

/// Parquet compression codec for output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Zstd,
    Gzip,
    None,
}

impl Compression {
    /// Convert to the parquet writer codec.
    pub fn to_parquet(self) -> ParquetCodec {
        match self {
            Compression::Zstd => ParquetCodec::ZSTD(ZstdLevel::default()),
            Compression::Gzip => ParquetCodec::GZIP(GzipLevel::default()),
            Compression::None => ParquetCodec::UNCOMPRESSED,
        }
    }
}

/// Main configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Snapshot file, or a directory of `.json` captures (newest wins).
    pub input: PathBuf,
    /// Destination table directory.
    pub output: PathBuf,
    /// Maximum tolerated fraction of records failing validation before
    /// the run is marked failed rather than degraded-success.
    #[serde(default = "default_skip_ratio_threshold")]
    pub skip_ratio_threshold: f64,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub compression: Compression,
    /// Records per output part file.
    #[serde(default = "default_rows_per_file")]
    pub rows_per_file: usize,
}

fn default_skip_ratio_threshold() -> f64 {
    0.05
}

fn default_rows_per_file() -> usize {
    50_000
}

impl Config {
    /// Create a configuration with default policies for the given paths.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            skip_ratio_threshold: default_skip_ratio_threshold(),
            write_mode: WriteMode::default(),
            compression: Compression::default(),
            rows_per_file: default_rows_per_file(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.skip_ratio_threshold) {
            return Err(ConfigError::InvalidThreshold {
                value: self.skip_ratio_threshold,
            });
        }
        if self.rows_per_file == 0 {
            return Err(ConfigError::ZeroRowsPerFile);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml_parsing() {
        let yaml = r#"
input: data/raw
output: data/processed/earthquakes
skip_ratio_threshold: 0.1
write_mode: overwrite
compression: gzip
rows_per_file: 1000
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.input, PathBuf::from("data/raw"));
        assert_eq!(config.skip_ratio_threshold, 0.1);
        assert_eq!(config.write_mode, WriteMode::Overwrite);
        assert_eq!(config.compression, Compression::Gzip);
        assert_eq!(config.rows_per_file, 1000);
    }

    #[test]
    fn test_config_defaults() {
        let yaml = r#"
input: data/raw
output: data/processed/earthquakes
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.skip_ratio_threshold, 0.05);
        assert_eq!(config.write_mode, WriteMode::Merge);
        assert_eq!(config.compression, Compression::Zstd);
        assert_eq!(config.rows_per_file, 50_000);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let yaml = r#"
input: a
output: b
skip_ratio_threshold: 1.5
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold { .. }));
    }

    #[test]
    fn test_zero_rows_per_file_rejected() {
        let yaml = r#"
input: a
output: b
rows_per_file: 0
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRowsPerFile));
    }
}
