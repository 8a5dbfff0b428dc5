//! The `glimpse caption` command for captioning local files.

use clap::{Args, ValueEnum};
use glimpse_core::output::OutputFormat as CoreOutputFormat;
use glimpse_core::{CaptionStats, Captioner, Config, OutputWriter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the `caption` command.
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image files to caption
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "jsonl")]
    pub format: OutputFormat,

    /// Override the maximum caption length in tokens
    #[arg(long)]
    pub max_len: Option<usize>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON array
    Json,
    /// One JSON object per line
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Execute the caption command.
pub async fn execute(args: CaptionArgs, mut config: Config) -> anyhow::Result<()> {
    apply_max_len(&mut config, args.max_len)?;

    let stats = tokio::task::spawn_blocking(move || -> anyhow::Result<CaptionStats> {
        let captioner = Captioner::load(&config)?;
        let sink: Box<dyn Write> = match &args.output {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(std::io::stdout().lock()),
        };
        let mut writer = OutputWriter::new(sink, args.format.into());
        let stats = caption_files(&captioner, &args.files, &mut writer)?;
        writer.finish()?;
        Ok(stats)
    })
    .await??;

    tracing::info!(
        "Captioned {} image(s), {} failed, in {:.2}s ({:.1} img/s)",
        stats.succeeded,
        stats.failed,
        stats.total_seconds,
        stats.images_per_second
    );

    if stats.succeeded == 0 && stats.failed > 0 {
        anyhow::bail!("No images could be captioned");
    }
    Ok(())
}

/// Apply `--max-len` and re-check the resulting config.
fn apply_max_len(config: &mut Config, max_len: Option<usize>) -> anyhow::Result<()> {
    if let Some(max_len) = max_len {
        config.model.max_caption_len = max_len;
        config.validate()?;
    }
    Ok(())
}

/// Caption each file in turn; a failing file is logged and counted, never fatal.
pub fn caption_files<W: Write>(
    captioner: &Captioner,
    files: &[PathBuf],
    writer: &mut OutputWriter<W>,
) -> anyhow::Result<CaptionStats> {
    let start = Instant::now();
    let mut stats = CaptionStats::default();

    for path in files {
        match captioner.caption_file(path) {
            Ok(record) => {
                writer.push(&record)?;
                stats.succeeded += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to caption {:?}: {}", path, e);
                stats.failed += 1;
            }
        }
    }

    stats.total_seconds = start.elapsed().as_secs_f64();
    if stats.total_seconds > 0.0 {
        stats.images_per_second = stats.succeeded as f64 / stats.total_seconds;
    }
    Ok(stats)
}
