//! Token vocabulary: the bidirectional mapping between words and ids.
//!
//! Ids are dense from 0. The first four are reserved control markers at
//! fixed positions; corpus tokens follow. The decoder's projection width is
//! exactly [`Vocabulary::len`], so the same file must be used for training
//! and inference.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CaptionError, ModelError};

/// Padding marker id.
pub const PAD_ID: u32 = 0;
/// Start-of-sequence marker id.
pub const START_ID: u32 = 1;
/// End-of-sequence marker id.
pub const END_ID: u32 = 2;
/// Unknown-word marker id.
pub const UNKNOWN_ID: u32 = 3;

pub const PAD_TOKEN: &str = "<PAD>";
pub const START_TOKEN: &str = "<SOS>";
pub const END_TOKEN: &str = "<EOS>";
pub const UNKNOWN_TOKEN: &str = "<UNK>";

/// Reserved markers in id order.
pub const RESERVED_TOKENS: [&str; 4] = [PAD_TOKEN, START_TOKEN, END_TOKEN, UNKNOWN_TOKEN];

/// Default minimum corpus frequency for a word to get its own id.
pub const DEFAULT_FREQ_THRESHOLD: usize = 2;

/// On-disk representation.
#[derive(Debug, Serialize, Deserialize)]
struct VocabularyFile {
    freq_threshold: usize,
    tokens: Vec<String>,
}

/// A loaded vocabulary. Immutable once built.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    itos: Vec<String>,
    stoi: HashMap<String, u32>,
    freq_threshold: usize,
}

/// Lowercase, strip ASCII punctuation, and split on whitespace.
///
/// Used when building a vocabulary from a caption corpus; inference never
/// tokenizes.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

impl Vocabulary {
    /// A vocabulary holding only the four reserved markers.
    pub fn reserved_only() -> Self {
        Self::from_tokens_unchecked(
            RESERVED_TOKENS.iter().map(|t| t.to_string()).collect(),
            DEFAULT_FREQ_THRESHOLD,
        )
    }

    /// Build a vocabulary from a caption corpus.
    ///
    /// A word gets the next free id at the moment its running count reaches
    /// `freq_threshold`, so ids follow the order in which words become
    /// frequent enough. A threshold of 0 is treated as 1.
    pub fn build<I, S>(captions: I, freq_threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let threshold = freq_threshold.max(1);
        let mut vocab = Self::reserved_only();
        vocab.freq_threshold = freq_threshold;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for caption in captions {
            for word in tokenize(caption.as_ref()) {
                let count = counts.entry(word.clone()).or_insert(0);
                *count += 1;
                if *count == threshold && !vocab.stoi.contains_key(&word) {
                    vocab.push(word);
                }
            }
        }

        tracing::debug!(
            "Built vocabulary: {} tokens from {} distinct words (threshold {})",
            vocab.len(),
            counts.len(),
            threshold
        );
        vocab
    }

    /// Build from an explicit token list, validating the reserved layout.
    pub fn from_tokens(tokens: Vec<String>, freq_threshold: usize) -> Result<Self, ModelError> {
        for (id, expected) in RESERVED_TOKENS.iter().enumerate() {
            match tokens.get(id) {
                Some(found) if found == expected => {}
                Some(found) => {
                    return Err(ModelError::Vocabulary(format!(
                        "id {id} must be {expected}, found {found:?}"
                    )))
                }
                None => {
                    return Err(ModelError::Vocabulary(format!(
                        "expected at least {} tokens, found {}",
                        RESERVED_TOKENS.len(),
                        tokens.len()
                    )))
                }
            }
        }
        if let Some(pos) = tokens.iter().position(|t| t.is_empty()) {
            return Err(ModelError::Vocabulary(format!("empty token at id {pos}")));
        }

        let vocab = Self::from_tokens_unchecked(tokens, freq_threshold);
        if vocab.stoi.len() != vocab.itos.len() {
            return Err(ModelError::Vocabulary(format!(
                "{} duplicate token(s)",
                vocab.itos.len() - vocab.stoi.len()
            )));
        }
        Ok(vocab)
    }

    fn from_tokens_unchecked(itos: Vec<String>, freq_threshold: usize) -> Self {
        let stoi = itos
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self {
            itos,
            stoi,
            freq_threshold,
        }
    }

    fn push(&mut self, token: String) {
        let id = self.itos.len() as u32;
        self.stoi.insert(token.clone(), id);
        self.itos.push(token);
    }

    /// Load a vocabulary JSON file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::MissingArtifact {
                path: path.to_path_buf(),
                hint: "Build one with `glimpse vocab build` or copy the training vocabulary."
                    .to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let file: VocabularyFile =
            serde_json::from_str(&content).map_err(|e| ModelError::Load {
                path: path.to_path_buf(),
                message: format!("Invalid vocabulary JSON: {e}"),
            })?;
        let vocab = Self::from_tokens(file.tokens, file.freq_threshold)?;

        tracing::info!(
            "Loaded vocabulary: {} tokens ({} reserved) from {:?}",
            vocab.len(),
            RESERVED_TOKENS.len(),
            path
        );
        Ok(vocab)
    }

    /// Write the vocabulary as pretty JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let file = VocabularyFile {
            freq_threshold: self.freq_threshold,
            tokens: self.itos.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Resolve an id to its token.
    pub fn id_to_token(&self, id: u32) -> Result<&str, CaptionError> {
        self.itos
            .get(id as usize)
            .map(String::as_str)
            .ok_or(CaptionError::UnknownToken {
                id,
                vocab_size: self.itos.len(),
            })
    }

    /// Resolve a token to its id, falling back to [`UNKNOWN_ID`].
    pub fn token_to_id(&self, token: &str) -> u32 {
        self.stoi.get(token).copied().unwrap_or(UNKNOWN_ID)
    }

    /// Map a caption to ids: START, tokenized words, END.
    pub fn numericalize(&self, text: &str) -> Vec<u32> {
        std::iter::once(START_ID)
            .chain(tokenize(text).iter().map(|w| self.token_to_id(w)))
            .chain(std::iter::once(END_ID))
            .collect()
    }

    /// Total number of ids, reserved markers included.
    pub fn len(&self) -> usize {
        self.itos.len()
    }

    /// Always false for a valid vocabulary; the reserved markers are present.
    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    /// Minimum corpus frequency used when this vocabulary was built.
    pub fn freq_threshold(&self) -> usize {
        self.freq_threshold
    }

    /// All tokens in id order.
    pub fn tokens(&self) -> &[String] {
        &self.itos
    }
}
