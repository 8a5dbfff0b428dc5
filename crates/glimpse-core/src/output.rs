//! Record output as a JSON array or as JSON Lines.
//!
//! JSON Lines records are written as soon as they arrive, so a long batch can
//! be followed with `tail -f`. JSON output is buffered and emitted as one
//! pretty-printed array by [`OutputWriter::finish`].

use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One JSON array
    Json,
    /// One JSON object per line
    #[default]
    JsonLines,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Ok(Self::JsonLines),
            other => Err(format!("unknown output format '{other}' (expected json or jsonl)")),
        }
    }
}

/// Serializes records in the chosen format.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    buffered: Vec<serde_json::Value>,
    records: usize,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            buffered: Vec::new(),
            records: 0,
        }
    }

    /// Add one record.
    pub fn push<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, record).map_err(io::Error::other)?;
                writeln!(self.writer)?;
            }
            OutputFormat::Json => {
                self.buffered
                    .push(serde_json::to_value(record).map_err(io::Error::other)?);
            }
        }
        self.records += 1;
        Ok(())
    }

    /// Number of records pushed so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Write anything still buffered, flush, and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.format == OutputFormat::Json {
            serde_json::to_writer_pretty(&mut self.writer, &self.buffered)
                .map_err(io::Error::other)?;
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}
