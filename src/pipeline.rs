//! Batch pipeline orchestration.
//!
//! Sequences reader, extractor, validator, and sink into one run and
//! tracks the run's state. Per-record validation failures never fail the
//! run by themselves; they accumulate into the skip-ratio check performed
//! once validation completes.

use std::fmt;
use std::path::PathBuf;

use tracing::{error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::FeatureExtractor;
use crate::sink::{RecordSink, WriteSummary};
use crate::snapshot;
use crate::validate::{SchemaValidator, ValidationReport};

/// States of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Reading,
    Extracting,
    Validating,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Reading => "reading",
            PipelineState::Extracting => "extracting",
            PipelineState::Validating => "validating",
            PipelineState::Writing => "writing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of one completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Snapshot file the run processed.
    pub snapshot: PathBuf,
    pub report: ValidationReport,
    pub write: WriteSummary,
}

/// One batch job: snapshot in, committed table out.
///
/// The pipeline is constructed per run and runs to completion; there is
/// no long-lived service loop.
pub struct Pipeline {
    config: Config,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the batch job.
    ///
    /// On any fatal error the pipeline lands in `Failed` and no partial
    /// output is visible at the destination.
    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        match self.run_stages().await {
            Ok(summary) => {
                self.state = PipelineState::Done;
                Ok(summary)
            }
            Err(e) => {
                // Report the stage that was active when the run failed.
                let stage = self.state;
                self.state = PipelineState::Failed;
                error!(stage = %stage, error = %e, "Run failed");
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self) -> Result<RunSummary, PipelineError> {
        self.config.validate().map_err(PipelineError::from)?;

        self.state = PipelineState::Reading;
        let (raw, snapshot_path) = snapshot::read(&self.config.input).await?;
        let total_seen = raw.features.len();

        self.state = PipelineState::Extracting;
        let mut extractor = FeatureExtractor::new(&raw.features);

        self.state = PipelineState::Validating;
        let validator = SchemaValidator::new();
        let (records, report) = validator.validate_all(&mut extractor, total_seen);

        if report.skip_ratio() > self.config.skip_ratio_threshold {
            return Err(PipelineError::ValidationThreshold {
                failed: report.skipped_validation,
                total: report.total_seen,
                threshold: self.config.skip_ratio_threshold,
                detail: report.failure_summary(),
            });
        }

        self.state = PipelineState::Writing;
        let sink = RecordSink::from_config(&self.config);
        let write = sink.write(records).await?;

        info!(
            snapshot = %snapshot_path.display(),
            features = report.total_seen,
            valid = report.valid,
            skipped_missing_id = report.skipped_missing_id,
            skipped_validation = report.skipped_validation,
            rows = write.rows_written,
            "Run complete"
        );

        Ok(RunSummary {
            snapshot: snapshot_path,
            report,
            write,
        })
    }
}
