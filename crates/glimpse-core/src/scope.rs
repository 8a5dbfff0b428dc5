//! Scoped inference context.
//!
//! Encoding and decoding only run inside an [`InferenceScope`]. The scope is
//! opened by [`InferenceScope::run`] and closed when the closure returns,
//! whether it succeeds or fails, so nothing it sets up can outlive the
//! request that opened it. Parameters are never updated inside a scope and
//! no intermediate activations are kept beyond the current step.

use std::time::{Duration, Instant};

use tracing::span::EnteredSpan;

use crate::error::CaptionResult;

/// Proof that the caller is inside an inference-only region.
///
/// Cannot be constructed outside [`InferenceScope::run`].
pub struct InferenceScope {
    request_id: u64,
    started: Instant,
    _span: EnteredSpan,
}

impl InferenceScope {
    /// Run `f` inside a fresh scope tagged with `request_id`.
    pub fn run<T, F>(request_id: u64, f: F) -> CaptionResult<T>
    where
        F: FnOnce(&InferenceScope) -> CaptionResult<T>,
    {
        let scope = InferenceScope {
            request_id,
            started: Instant::now(),
            _span: tracing::debug_span!("inference", request = request_id).entered(),
        };
        tracing::trace!("Entered inference scope");
        f(&scope)
    }

    /// Identifier of the request this scope belongs to.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Time spent inside the scope so far.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for InferenceScope {
    fn drop(&mut self) {
        tracing::trace!("Left inference scope after {:?}", self.started.elapsed());
    }
}
