//! Output types of the captioning pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::decoder::Termination;

/// A caption for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    /// Content words joined by single spaces; may be empty
    pub text: String,

    /// Raw decoder output, END included when it was produced
    pub token_ids: Vec<u32>,

    /// Why decoding stopped
    pub termination: Termination,
}

/// Full record for a captioned file, as written by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionedImage {
    /// Path to the source file
    pub file_path: PathBuf,

    /// Just the filename portion
    pub file_name: String,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Detected format ("jpeg", "png", "webp", etc.)
    pub format: String,

    /// File size in bytes
    pub file_size: u64,

    /// Generated caption text
    pub caption: String,

    /// Generated token ids
    pub token_ids: Vec<u32>,

    /// Why decoding stopped
    pub termination: Termination,

    /// Wall time for decode, encode and generation
    pub elapsed_ms: u64,
}

/// Statistics for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptionStats {
    /// Images captioned successfully
    pub succeeded: usize,

    /// Images that failed
    pub failed: usize,

    /// Images per second
    pub images_per_second: f64,

    /// Total time in seconds
    pub total_seconds: f64,
}
