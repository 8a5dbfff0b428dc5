//! Request pipeline.
//!
//! - **decode**: turn uploaded bytes into an image, enforcing size limits
//! - **captioner**: preprocess, encode, decode and assemble a caption

pub mod captioner;
pub mod decode;

pub use captioner::Captioner;
pub use decode::{format_to_string, DecodedImage, ImageDecoder};
