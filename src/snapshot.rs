//! Snapshot location and parsing.
//!
//! The input is either an explicit snapshot file or a directory produced
//! by the external fetcher, holding `earthquakes_<stamp>.json` captures.
//! When given a directory the reader selects the most recently created
//! `.json` candidate, breaking ties by greatest lexicographic filename so
//! selection stays deterministic.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::error::{IoSnafu, ParseError, SnapshotError};

/// A parsed raw snapshot: the ordered feature sequence of one capture.
///
/// Features are kept as raw JSON values; the extractor applies the
/// field mapping and the validator applies the type contract, so a
/// malformed feature never aborts the parse of the whole document.
#[derive(Debug)]
pub struct RawSnapshot {
    pub features: Vec<Value>,
}

/// A snapshot file candidate found while scanning a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub created: SystemTime,
}

/// Pick the winning candidate: latest creation time, ties broken by
/// greatest lexicographic filename.
pub fn pick_latest(mut candidates: Vec<Candidate>) -> Option<PathBuf> {
    candidates.sort_by(|a, b| {
        a.created
            .cmp(&b.created)
            .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    });
    candidates.pop().map(|c| c.path)
}

/// Locate the snapshot file to process.
///
/// A file path is used as-is; a directory is scanned for `.json`
/// candidates. Returns [`SnapshotError::NotFound`] when no candidate
/// exists.
pub async fn locate(input: &Path) -> Result<PathBuf, SnapshotError> {
    let meta = match tokio::fs::metadata(input).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::NotFound {
                path: input.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: input.to_path_buf(),
                source,
            });
        }
    };

    if meta.is_file() {
        return Ok(input.to_path_buf());
    }

    let mut candidates = Vec::new();
    let mut entries = tokio::fs::read_dir(input).await.context(IoSnafu {
        path: input.to_path_buf(),
    })?;
    while let Some(entry) = entries.next_entry().await.context(IoSnafu {
        path: input.to_path_buf(),
    })? {
        let path = entry.path();
        if path.extension().map(|ext| ext == "json").unwrap_or(false) {
            let meta = entry.metadata().await.context(IoSnafu {
                path: path.clone(),
            })?;
            // Not all filesystems report a birth time
            let created = meta.created().or_else(|_| meta.modified()).context(
                IoSnafu {
                    path: path.clone(),
                },
            )?;
            candidates.push(Candidate { path, created });
        }
    }

    debug!(
        directory = %input.display(),
        candidates = candidates.len(),
        "Scanned snapshot directory"
    );

    pick_latest(candidates).ok_or_else(|| SnapshotError::NotFound {
        path: input.to_path_buf(),
    })
}

/// Parse raw snapshot bytes into the feature sequence.
///
/// The document must be a JSON object with a top-level `features` array;
/// anything else is a fatal parse error.
pub fn parse(bytes: &[u8]) -> Result<RawSnapshot, ParseError> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|source| ParseError::Json { source })?;

    let root = document.as_object().ok_or(ParseError::RootNotObject)?;

    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingFeatures)?;

    Ok(RawSnapshot {
        features: features.clone(),
    })
}

/// Locate, read, and parse the snapshot at `input`.
///
/// Returns the parsed snapshot together with the path that was selected,
/// for logging and error attribution.
pub async fn read(input: &Path) -> Result<(RawSnapshot, PathBuf), crate::error::PipelineError> {
    let path = locate(input).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
    let snapshot = parse(&bytes)?;

    info!(
        snapshot = %path.display(),
        features = snapshot.features.len(),
        "Read snapshot"
    );

    Ok((snapshot, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn candidate(name: &str, created_secs: u64) -> Candidate {
        Candidate {
            path: PathBuf::from(name),
            created: SystemTime::UNIX_EPOCH + Duration::from_secs(created_secs),
        }
    }

    #[test]
    fn test_pick_latest_by_creation_time() {
        let picked = pick_latest(vec![
            candidate("earthquakes_a.json", 100),
            candidate("earthquakes_b.json", 300),
            candidate("earthquakes_c.json", 200),
        ]);
        assert_eq!(picked, Some(PathBuf::from("earthquakes_b.json")));
    }

    #[test]
    fn test_pick_latest_tie_breaks_lexicographically() {
        let picked = pick_latest(vec![
            candidate("earthquakes_20240101_090000.json", 100),
            candidate("earthquakes_20240101_120000.json", 100),
            candidate("earthquakes_20240101_100000.json", 100),
        ]);
        assert_eq!(
            picked,
            Some(PathBuf::from("earthquakes_20240101_120000.json"))
        );
    }

    #[test]
    fn test_pick_latest_empty() {
        assert_eq!(pick_latest(Vec::new()), None);
    }

    #[tokio::test]
    async fn test_locate_missing_directory() {
        let err = locate(Path::new("/nonexistent/snapshots")).await.unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_locate_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let err = locate(temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_locate_ignores_non_json() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("earthquakes_1.json"), b"{}").unwrap();

        let picked = locate(temp_dir.path()).await.unwrap();
        assert_eq!(picked.file_name().unwrap(), "earthquakes_1.json");
    }

    #[tokio::test]
    async fn test_locate_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");
        std::fs::write(&path, b"{}").unwrap();

        assert_eq!(locate(&path).await.unwrap(), path);
    }

    #[test]
    fn test_parse_requires_features() {
        let err = parse(br#"{"metadata": {}}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingFeatures));

        let err = parse(br#"{"features": 3}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingFeatures));

        let err = parse(b"[1, 2]").unwrap_err();
        assert!(matches!(err, ParseError::RootNotObject));

        let err = parse(b"not json").unwrap_err();
        assert!(matches!(err, ParseError::Json { .. }));
    }

    #[test]
    fn test_parse_preserves_feature_order() {
        let snapshot = parse(br#"{"features": [{"id": "a"}, {"id": "b"}]}"#).unwrap();
        assert_eq!(snapshot.features.len(), 2);
        assert_eq!(snapshot.features[0]["id"], "a");
        assert_eq!(snapshot.features[1]["id"], "b");
    }
}
