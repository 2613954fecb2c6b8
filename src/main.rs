//! Richter CLI: normalize seismic-event snapshots into a Parquet table.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use richter::config::{Compression, WriteMode};
use richter::{init_tracing, Config, Pipeline};

#[derive(Parser)]
#[command(name = "richter", about = "Batch loader for seismic-event snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the snapshot-to-table pipeline once.
    Process {
        /// Snapshot file, or a directory of .json captures (newest wins).
        input: PathBuf,
        /// Destination table directory.
        output: PathBuf,
        /// Optional YAML configuration file; flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Maximum tolerated fraction of records failing validation.
        #[arg(long)]
        skip_ratio_threshold: Option<f64>,
        /// How to treat the existing destination table.
        #[arg(long, value_enum)]
        mode: Option<WriteMode>,
        /// Parquet compression codec.
        #[arg(long, value_enum)]
        compression: Option<Compression>,
    },
}

fn build_config(
    input: PathBuf,
    output: PathBuf,
    config_path: Option<PathBuf>,
    skip_ratio_threshold: Option<f64>,
    mode: Option<WriteMode>,
    compression: Option<Compression>,
) -> Result<Config, richter::error::ConfigError> {
    let mut config = match config_path {
        Some(path) => {
            let mut from_file = Config::from_file(&path)?;
            from_file.input = input;
            from_file.output = output;
            from_file
        }
        None => Config::new(input, output),
    };

    if let Some(threshold) = skip_ratio_threshold {
        config.skip_ratio_threshold = threshold;
    }
    if let Some(mode) = mode {
        config.write_mode = mode;
    }
    if let Some(compression) = compression {
        config.compression = compression;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let Command::Process {
        input,
        output,
        config,
        skip_ratio_threshold,
        mode,
        compression,
    } = cli.command;

    let config = match build_config(input, output, config, skip_ratio_threshold, mode, compression)
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut pipeline = Pipeline::new(config);
    match pipeline.run().await {
        Ok(summary) => {
            println!(
                "Processed {} ({} features, {} rows written)",
                summary.snapshot.display(),
                summary.report.total_seen,
                summary.write.rows_written
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Pipeline failed: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
