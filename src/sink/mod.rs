//! Durable, idempotent persistence of canonical records.
//!
//! Deduplicates by `earthquake_id` (last occurrence in source order wins,
//! a documented total order so output is deterministic), encodes to
//! Parquet part files in a staging directory, and commits via atomic
//! rename under a single-writer lock.

mod encode;
mod store;

pub use encode::{batch_to_records, records_to_batch, StampedRecord};
pub use store::{LockGuard, TableStore};

use std::path::{Path, PathBuf};

use chrono::Utc;
use indexmap::IndexMap;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::config::{Compression, Config, WriteMode};
use crate::error::{
    EncodeSnafu, ParquetSnafu, PrepareSnafu, SinkError, StagingWriteSnafu, TaskJoinSnafu,
};
use crate::record::CanonicalRecord;
use crate::schema::{canonical_schema, matches_canonical};

/// Result of one sink write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Rows in the committed table.
    pub rows_written: usize,
    /// Total bytes of the written part files.
    pub bytes_written: u64,
    /// Number of part files produced.
    pub files_written: usize,
}

/// Sink that persists validated records to a Parquet table directory.
pub struct RecordSink {
    dest: PathBuf,
    mode: WriteMode,
    compression: Compression,
    rows_per_file: usize,
}

impl RecordSink {
    pub fn new(
        dest: &Path,
        mode: WriteMode,
        compression: Compression,
        rows_per_file: usize,
    ) -> Self {
        Self {
            dest: dest.to_path_buf(),
            mode,
            compression,
            rows_per_file,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.output,
            config.write_mode,
            config.compression,
            config.rows_per_file,
        )
    }

    /// Persist this run's records.
    ///
    /// In merge mode the existing table is loaded first and this run's
    /// records upsert into it by id; in overwrite mode the run's records
    /// replace the table. Either way the destination is swapped
    /// atomically and is never observable half-written.
    pub async fn write(&self, records: Vec<CanonicalRecord>) -> Result<WriteSummary, SinkError> {
        let store = TableStore::new(&self.dest);
        store.prepare().await?;

        // Held until return; the guard releases the lock on every exit path.
        let _lock = store.acquire_lock()?;

        let mut table: IndexMap<String, StampedRecord> = IndexMap::new();

        if self.mode == WriteMode::Merge {
            let existing = read_table(&self.dest).await?;
            debug!(rows = existing.len(), "Loaded existing table for merge");
            for (record, stamp) in existing {
                table.insert(record.earthquake_id.clone(), (record, stamp));
            }
        }

        let stamp = Utc::now().timestamp_micros();
        let incoming = records.len();
        for record in records {
            // IndexMap keeps the first insertion position and replaces the
            // value, which is exactly last-occurrence-wins with a stable
            // row order.
            table.insert(record.earthquake_id.clone(), (record, stamp));
        }

        let rows: Vec<StampedRecord> = table.into_values().collect();
        debug!(
            incoming,
            deduplicated = rows.len(),
            mode = ?self.mode,
            "Resolved table rows"
        );

        let staging = store.new_staging_dir();
        tokio::fs::create_dir_all(&staging)
            .await
            .context(PrepareSnafu {
                path: staging.clone(),
            })?;

        let mut summary = WriteSummary {
            rows_written: rows.len(),
            ..WriteSummary::default()
        };

        // An empty table still gets one schema-bearing part file so the
        // destination stays readable.
        let chunks: Vec<&[StampedRecord]> = if rows.is_empty() {
            vec![&[]]
        } else {
            rows.chunks(self.rows_per_file).collect()
        };

        for (i, chunk) in chunks.into_iter().enumerate() {
            let buffer = encode_part_file(chunk.to_vec(), self.compression).await?;
            let path = staging.join(format!("part-{i:05}.parquet"));
            summary.bytes_written += buffer.len() as u64;
            summary.files_written += 1;
            tokio::fs::write(&path, buffer)
                .await
                .context(StagingWriteSnafu { path })?;
        }

        store.commit(&staging).await?;

        info!(
            table = %self.dest.display(),
            rows = summary.rows_written,
            files = summary.files_written,
            bytes = summary.bytes_written,
            "Committed table"
        );

        Ok(summary)
    }
}

/// Encode one chunk of rows into Parquet bytes on a blocking thread.
async fn encode_part_file(
    rows: Vec<StampedRecord>,
    compression: Compression,
) -> Result<Vec<u8>, SinkError> {
    tokio::task::spawn_blocking(move || {
        let batch = records_to_batch(&rows).context(EncodeSnafu)?;

        let props = WriterProperties::builder()
            .set_compression(compression.to_parquet())
            .build();

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, canonical_schema(), Some(props))
            .context(ParquetSnafu)?;
        writer.write(&batch).context(ParquetSnafu)?;
        writer.close().context(ParquetSnafu)?;

        Ok(buffer)
    })
    .await
    .context(TaskJoinSnafu)?
}

/// Read every row of the table at `dest`, in part-file order.
///
/// An absent destination yields an empty table. Files whose schema does
/// not match the canonical declaration are an error, never silently
/// rewritten.
pub async fn read_table(dest: &Path) -> Result<Vec<StampedRecord>, SinkError> {
    let store = TableStore::new(dest);
    let mut rows = Vec::new();

    for path in store.list_part_files().await? {
        let file_rows = tokio::task::spawn_blocking(move || read_part_file(&path))
            .await
            .context(TaskJoinSnafu)??;
        rows.extend(file_rows);
    }

    Ok(rows)
}

fn read_part_file(path: &Path) -> Result<Vec<StampedRecord>, SinkError> {
    use parquet::errors::ParquetError;

    let file = std::fs::File::open(path).map_err(|e| SinkError::ExistingRead {
        path: path.to_path_buf(),
        source: ParquetError::General(e.to_string()),
    })?;

    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|source| SinkError::ExistingRead {
            path: path.to_path_buf(),
            source,
        })?;

    if !matches_canonical(builder.schema()) {
        return Err(SinkError::SchemaMismatch {
            path: path.to_path_buf(),
        });
    }

    let reader = builder.build().map_err(|source| SinkError::ExistingRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| SinkError::ExistingRead {
            path: path.to_path_buf(),
            source: ParquetError::ArrowError(e.to_string()),
        })?;
        rows.extend(batch_to_records(&batch).map_err(|e| SinkError::ExistingRead {
            path: path.to_path_buf(),
            source: ParquetError::ArrowError(e.to_string()),
        })?);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, magnitude: Option<f64>) -> CanonicalRecord {
        CanonicalRecord {
            magnitude,
            ..CanonicalRecord::new(id)
        }
    }

    fn sink(dest: &Path, mode: WriteMode) -> RecordSink {
        RecordSink::new(dest, mode, Compression::Zstd, 50_000)
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");

        let summary = sink(&dest, WriteMode::Overwrite)
            .write(vec![record("a", Some(1.0)), record("b", None)])
            .await
            .unwrap();

        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.files_written, 1);
        assert!(summary.bytes_written > 0);

        let rows = read_table(&dest).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.earthquake_id, "a");
        assert_eq!(rows[1].0.magnitude, None);
    }

    #[tokio::test]
    async fn test_dedup_last_occurrence_wins() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");

        // Same id at two positions; the later value must win while the
        // row keeps its original position.
        let records = vec![
            record("x", Some(1.0)),
            record("us1000abcd", Some(2.0)),
            record("y", Some(3.0)),
            record("us1000abcd", Some(7.0)),
        ];

        let summary = sink(&dest, WriteMode::Overwrite).write(records).await.unwrap();
        assert_eq!(summary.rows_written, 3);

        let rows = read_table(&dest).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|(r, _)| r.earthquake_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "us1000abcd", "y"]);
        assert_eq!(rows[1].0.magnitude, Some(7.0));
    }

    #[tokio::test]
    async fn test_merge_upserts_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");

        sink(&dest, WriteMode::Merge)
            .write(vec![record("a", Some(1.0)), record("b", Some(2.0))])
            .await
            .unwrap();

        let first = read_table(&dest).await.unwrap();

        let summary = sink(&dest, WriteMode::Merge)
            .write(vec![record("b", Some(9.0)), record("c", Some(3.0))])
            .await
            .unwrap();
        assert_eq!(summary.rows_written, 3);

        let rows = read_table(&dest).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|(r, _)| r.earthquake_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(rows[1].0.magnitude, Some(9.0));

        // Untouched row keeps its original processing stamp; rewritten
        // and new rows share this run's stamp.
        assert_eq!(rows[0].1, first[0].1);
        assert_eq!(rows[1].1, rows[2].1);
    }

    #[tokio::test]
    async fn test_overwrite_discards_previous_rows() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");

        sink(&dest, WriteMode::Overwrite)
            .write(vec![record("a", Some(1.0))])
            .await
            .unwrap();
        sink(&dest, WriteMode::Overwrite)
            .write(vec![record("b", Some(2.0))])
            .await
            .unwrap();

        let rows = read_table(&dest).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.earthquake_id, "b");
    }

    #[tokio::test]
    async fn test_idempotent_rows_modulo_stamp() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");
        let records = vec![record("a", Some(1.0)), record("b", None)];

        sink(&dest, WriteMode::Merge).write(records.clone()).await.unwrap();
        let first: Vec<CanonicalRecord> = read_table(&dest)
            .await
            .unwrap()
            .into_iter()
            .map(|(r, _)| r)
            .collect();

        sink(&dest, WriteMode::Merge).write(records).await.unwrap();
        let second: Vec<CanonicalRecord> = read_table(&dest)
            .await
            .unwrap()
            .into_iter()
            .map(|(r, _)| r)
            .collect();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rows_per_file_splits_output() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");

        let records: Vec<CanonicalRecord> = (0..5)
            .map(|i| record(&format!("id{i}"), Some(i as f64)))
            .collect();

        let summary = RecordSink::new(&dest, WriteMode::Overwrite, Compression::None, 2)
            .write(records)
            .await
            .unwrap();

        assert_eq!(summary.files_written, 3);
        assert_eq!(read_table(&dest).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_empty_run_produces_readable_table() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");

        let summary = sink(&dest, WriteMode::Overwrite).write(Vec::new()).await.unwrap();
        assert_eq!(summary.rows_written, 0);
        assert_eq!(summary.files_written, 1);
        assert!(read_table(&dest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locked_destination_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");

        let store = TableStore::new(&dest);
        store.prepare().await.unwrap();
        let _held = store.acquire_lock().unwrap();

        let err = sink(&dest, WriteMode::Merge)
            .write(vec![record("a", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Locked { .. }));
    }

    #[tokio::test]
    async fn test_merge_rejects_foreign_schema() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");
        std::fs::create_dir_all(&dest).unwrap();

        // A parquet file with a different schema
        use arrow::array::{Int64Array, RecordBatch};
        use arrow::datatypes::{DataType, Field, Schema};
        use std::sync::Arc;

        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![1i64]))],
        )
        .unwrap();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        std::fs::write(dest.join("part-00000.parquet"), buffer).unwrap();

        let err = sink(&dest, WriteMode::Merge)
            .write(vec![record("a", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_merge_rejects_same_names_different_types() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("earthquakes");
        std::fs::create_dir_all(&dest).unwrap();

        // Canonical column names, but magnitude stored as text
        use arrow::datatypes::{DataType, Field, Schema};
        use std::sync::Arc;

        let fields: Vec<Field> = canonical_schema()
            .fields()
            .iter()
            .map(|f| {
                if f.name() == "magnitude" {
                    Field::new("magnitude", DataType::Utf8, true)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let mut buffer = Vec::new();
        let writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
        writer.close().unwrap();
        std::fs::write(dest.join("part-00000.parquet"), buffer).unwrap();

        let err = sink(&dest, WriteMode::Merge)
            .write(vec![record("a", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::SchemaMismatch { .. }));
    }
}
