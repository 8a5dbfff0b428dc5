//! Image encoder: preprocessed pixels to a fixed-width embedding.
//!
//! The encoder is a pretrained convolutional backbone followed by a learned
//! linear projection and a ReLU. It holds no per-call state.
//!
//! # Usage
//!
//! ```rust,ignore
//! use glimpse_core::encoder::{preprocess, Encoder};
//! use glimpse_core::InferenceScope;
//!
//! let encoder = Encoder::load(&backbone_path, &head_path, 256)?;
//! let tensor = preprocess(&image);
//! let embeddings = InferenceScope::run(1, |scope| encoder.encode(scope, &tensor))?;
//! // embeddings is an Array2<f32> of shape [1, 256]
//! ```

pub mod backbone;
pub mod head;
pub mod preprocess;

use std::path::Path;

use ndarray::{Array2, Array4};

use crate::error::{CaptionError, CaptionResult, ModelError, ModelResult};
use crate::scope::InferenceScope;

pub use self::backbone::{Backbone, OnnxBackbone};
pub use self::head::ProjectionHead;
pub use self::preprocess::{preprocess, preprocess_batch, IMAGE_SIZE};

/// Backbone plus projection head.
pub struct Encoder {
    backbone: Box<dyn Backbone>,
    head: ProjectionHead,
}

impl Encoder {
    /// Pair a backbone with a head, checking that their widths agree.
    ///
    /// Runs one blank image through the backbone, so a backbone/head
    /// mismatch surfaces here rather than on the first request.
    pub fn new(backbone: Box<dyn Backbone>, head: ProjectionHead) -> ModelResult<Self> {
        let size = IMAGE_SIZE as usize;
        let probe = Array4::<f32>::zeros((1, preprocess::CHANNELS, size, size));
        let features = backbone.features(&probe).map_err(|e| ModelError::Load {
            path: Default::default(),
            message: format!("Backbone probe failed: {e}"),
        })?;
        if features.ncols() != head.in_features() {
            return Err(ModelError::ShapeMismatch {
                name: "backbone features".to_string(),
                expected: vec![1, head.in_features()],
                actual: features.shape().to_vec(),
            });
        }
        Ok(Self { backbone, head })
    }

    /// Load the ONNX backbone and safetensors head from disk.
    pub fn load(backbone_path: &Path, head_path: &Path, embed_size: usize) -> ModelResult<Self> {
        tracing::info!("Loading encoder backbone from {:?}", backbone_path);
        let backbone = OnnxBackbone::load(backbone_path)?;
        let head = ProjectionHead::load(head_path, embed_size)?;
        let encoder = Self::new(Box::new(backbone), head)?;
        tracing::info!("Encoder loaded successfully");
        Ok(encoder)
    }

    /// Width of the embeddings this encoder produces.
    pub fn embed_size(&self) -> usize {
        self.head.embed_size()
    }

    /// Encode a `[N, 3, 224, 224]` batch into `[N, embed_size]` embeddings.
    pub fn encode(&self, scope: &InferenceScope, batch: &Array4<f32>) -> CaptionResult<Array2<f32>> {
        let features = self.backbone.features(batch)?;
        if features.nrows() != batch.shape()[0] || features.ncols() != self.head.in_features() {
            return Err(CaptionError::inference(
                "encode",
                format!(
                    "Backbone returned {:?} for a batch of {}, expected width {}",
                    features.shape(),
                    batch.shape()[0],
                    self.head.in_features()
                ),
            ));
        }
        let embeddings = self.head.forward(&features);
        tracing::trace!(
            request = scope.request_id(),
            "Encoded {} image(s) to {:?}",
            batch.shape()[0],
            embeddings.shape()
        );
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seeded_head, ChannelStatsBackbone, FailingBackbone};
    use image::{DynamicImage, RgbImage};

    fn solid(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb(rgb)))
    }

    #[test]
    fn test_new_rejects_width_mismatch() {
        let head = seeded_head(8, ChannelStatsBackbone::WIDTH + 1, 7);
        let err = Encoder::new(Box::new(ChannelStatsBackbone), head).err();
        assert!(matches!(err, Some(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_encode_shape_and_nonnegative() {
        let head = seeded_head(8, ChannelStatsBackbone::WIDTH, 7);
        let encoder = Encoder::new(Box::new(ChannelStatsBackbone), head).unwrap();
        let batch = preprocess_batch(&[solid([200, 10, 10]), solid([10, 10, 200])]);

        let embeddings = InferenceScope::run(1, |scope| encoder.encode(scope, &batch)).unwrap();
        assert_eq!(embeddings.shape(), &[2, 8]);
        assert!(embeddings.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_encode_batch_matches_single() {
        let head = seeded_head(8, ChannelStatsBackbone::WIDTH, 11);
        let encoder = Encoder::new(Box::new(ChannelStatsBackbone), head).unwrap();
        let a = solid([1, 2, 3]);
        let b = solid([250, 128, 0]);

        let (batch, single) = InferenceScope::run(1, |scope| {
            let batch = encoder.encode(scope, &preprocess_batch(&[a.clone(), b.clone()]))?;
            let single = encoder.encode(scope, &preprocess(&b))?;
            Ok((batch, single))
        })
        .unwrap();
        for (x, y) in batch.row(1).iter().zip(single.row(0).iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_new_surfaces_backbone_failure() {
        let head = seeded_head(8, ChannelStatsBackbone::WIDTH, 7);
        let err = Encoder::new(Box::new(FailingBackbone::always()), head).err();
        assert!(matches!(err, Some(ModelError::Load { .. })));
    }
}
