//! Glimpse Core - image captioning inference library.
//!
//! Glimpse turns a photograph into a short English caption with a two-stage
//! network: a convolutional encoder compresses the image into a fixed-width
//! embedding, and a recurrent decoder greedily emits vocabulary ids that are
//! mapped back to words.
//!
//! # Architecture
//!
//! ```text
//! Bytes → Decode → Preprocess (224×224) → Encode (CNN + projection)
//!       → Generate (LSTM, greedy) → Assemble → caption
//! ```
//!
//! All model state is loaded once into a [`Captioner`] and shared read-only
//! between requests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use glimpse_core::{Captioner, Config};
//!
//! let config = Config::load()?;
//! let captioner = Captioner::load(&config)?;
//! let caption = captioner.caption_bytes(&std::fs::read("dog.jpg")?)?;
//! println!("{}", caption.text);
//! ```

pub mod caption;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod scope;
pub mod types;
pub mod vocabulary;
pub mod weights;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use caption::assemble;
pub use config::Config;
pub use decoder::{Decoder, DecoderDims, Termination};
pub use encoder::Encoder;
pub use error::{
    CaptionError, CaptionResult, ConfigError, GlimpseError, ModelError, ModelResult, Result,
};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{Captioner, ImageDecoder};
pub use scope::InferenceScope;
pub use types::{Caption, CaptionStats, CaptionedImage};
pub use vocabulary::Vocabulary;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
