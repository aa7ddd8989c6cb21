use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use chronicler::lifecycle::compact;
use chronicler::storage::OpenArchives;
use chronicler::{Chronicler, ChroniclerConfig, PendingWrite, RotationSettings, NO_CURRENT_FILE};

/// Writes awaited together before reading more input.
const WINDOW: usize = 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive newline-delimited JSON from stdin
    Record(RecordArgs),
    /// Compress archives of one log. Every plaintext archive is treated as
    /// retired, so do not point this at a log that is still being written.
    Compact {
        /// Directory holding the archives
        #[arg(short, long)]
        directory: PathBuf,

        /// Log name (filename prefix)
        #[arg(short, long)]
        name: String,
    },
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// JSON config file; overrides the other flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the archives
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Log name (filename prefix)
    #[arg(short, long)]
    name: Option<String>,

    #[arg(long)]
    days: Option<u64>,

    #[arg(long)]
    hours: Option<u64>,

    #[arg(long)]
    minutes: Option<u64>,

    #[arg(long)]
    seconds: Option<u64>,

    /// Batch interval in milliseconds
    #[arg(long, default_value_t = 100)]
    batch_ms: u64,
}

impl RecordArgs {
    fn into_config(self) -> Result<ChroniclerConfig> {
        if let Some(path) = self.config {
            return ChroniclerConfig::from_json_file(&path)
                .with_context(|| format!("load config {}", path.display()));
        }
        let (Some(directory), Some(name)) = (self.directory, self.name) else {
            bail!("either --config or both --directory and --name are required");
        };
        let rotation = RotationSettings {
            days: self.days,
            hours: self.hours,
            minutes: self.minutes,
            seconds: self.seconds,
            ..Default::default()
        };
        let mut config = ChroniclerConfig::new(directory, name, rotation);
        config.batch_interval_ms = self.batch_ms;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Record(args) => record(args.into_config()?).await,
        Command::Compact { directory, name } => {
            let stats = compact(&directory, &name, &OpenArchives::default())
                .await
                .with_context(|| format!("compact {}", directory.display()))?;
            println!("{}", stats.summary());
            Ok(())
        }
    }
}

async fn record(config: ChroniclerConfig) -> Result<()> {
    info!(
        "Archiving stdin to {} as {}",
        config.directory.display(),
        config.log_name
    );
    let chronicler = Chronicler::open(config).context("open chronicler")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut window: Vec<PendingWrite> = Vec::with_capacity(WINDOW);
    let mut accepted = 0u64;
    let mut failed = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!("skipping invalid JSON line: {}", err);
                continue;
            }
        };
        window.push(chronicler.save_record(&value));
        if window.len() >= WINDOW {
            chronicler.flush().await?;
            for pending in window.drain(..) {
                match pending.await {
                    Ok(()) => accepted += 1,
                    Err(err) => {
                        warn!("write failed: {}", err);
                        failed += 1;
                    }
                }
            }
        }
    }

    chronicler.flush().await?;
    for pending in window.drain(..) {
        match pending.await {
            Ok(()) => accepted += 1,
            Err(err) => {
                warn!("write failed: {}", err);
                failed += 1;
            }
        }
    }

    let last = chronicler
        .current_filename()
        .unwrap_or_else(|| NO_CURRENT_FILE.to_string());
    chronicler.dispose().await.context("dispose chronicler")?;

    info!("Archived {} records ({} failed)", accepted, failed);
    println!("{last}");
    Ok(())
}
