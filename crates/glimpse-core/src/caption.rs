//! Turning generated token ids back into text.

use crate::error::CaptionResult;
use crate::vocabulary::{Vocabulary, END_ID, PAD_ID, START_ID, UNKNOWN_ID};

/// Join the words for `ids` with single spaces.
///
/// Reading stops at the first END; START, PAD and UNKNOWN are dropped. Every
/// id before END must resolve in `vocabulary`.
pub fn assemble(ids: &[u32], vocabulary: &Vocabulary) -> CaptionResult<String> {
    let mut words = Vec::with_capacity(ids.len());
    for &id in ids {
        match id {
            END_ID => break,
            PAD_ID | START_ID | UNKNOWN_ID => continue,
            _ => words.push(vocabulary.id_to_token(id)?),
        }
    }
    Ok(words.join(" "))
}
