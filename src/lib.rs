//! Richter: batch loader for seismic-event snapshots.
//!
//! This crate handles:
//! - Locating and parsing raw GeoJSON-shaped snapshot documents
//! - Flattening nested event features into canonical typed records
//! - Per-record validation that isolates bad records without aborting a run
//! - Deduplicated, atomic writes to a Parquet table

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod sink;
pub mod snapshot;
pub mod validate;

// Re-export commonly used items
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineState, RunSummary};
pub use record::CanonicalRecord;
pub use sink::{RecordSink, WriteSummary};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for CLI use.
///
/// Uses the `RUST_LOG` environment variable for filtering, defaulting to
/// `info` level.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}
