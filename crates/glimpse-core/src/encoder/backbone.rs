//! Convolutional backbone: pooled image features from a preprocessed batch.
//!
//! The production backbone is an ONNX export of the pretrained ResNet-50
//! trunk (everything up to, but not including, the classification layer).

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::Value;

use crate::error::{CaptionError, CaptionResult, ModelError, ModelResult};

/// Feature extractor at the front of the encoder.
///
/// Implementations must be pure functions of their input: no state may
/// survive between calls.
pub trait Backbone: Send + Sync {
    /// Map `[N, 3, H, W]` to `[N, F]` pooled features.
    fn features(&self, batch: &Array4<f32>) -> CaptionResult<Array2<f32>>;
}

/// Wraps an ONNX Runtime session for the backbone.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct OnnxBackbone {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
}

impl OnnxBackbone {
    /// Load the backbone from an ONNX file.
    pub fn load(model_path: &Path) -> ModelResult<Self> {
        if !model_path.exists() {
            return Err(ModelError::MissingArtifact {
                path: model_path.to_path_buf(),
                hint: "Export the trained encoder backbone to ONNX and place it in the model directory."
                    .to_string(),
            });
        }

        let session = Session::builder()
            .map_err(|e| ModelError::Load {
                path: model_path.to_path_buf(),
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| ModelError::Load {
                path: model_path.to_path_buf(),
                message: format!("Failed to load ONNX model: {e}"),
            })?;

        // Detect the input tensor name from model metadata.
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!(
            "Loaded backbone from {:?} (input: {:?}, outputs: {:?})",
            model_path,
            input_name,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }
}

impl Backbone for OnnxBackbone {
    fn features(&self, batch: &Array4<f32>) -> CaptionResult<Array2<f32>> {
        let batch_size = batch.shape()[0];
        if batch_size == 0 {
            return Ok(Array2::zeros((0, 0)));
        }

        // Convert ndarray to (shape, flat_data) for ort.
        let shape: Vec<i64> = batch.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = batch.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data)).map_err(|e| {
            CaptionError::inference("encode", format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self.session.lock().map_err(|e| {
            CaptionError::inference("encode", format!("Session lock poisoned: {e}"))
        })?;

        let outputs = session
            .run(inputs)
            .map_err(|e| CaptionError::inference("encode", format!("ONNX inference failed: {e}")))?;

        // The trunk has a single output: pooled features, either [N, F] or [N, F, 1, 1].
        let (_, pooled) = outputs
            .iter()
            .next()
            .ok_or_else(|| CaptionError::inference("encode", "Backbone produced no output"))?;

        let (out_shape, data) = pooled.try_extract_tensor::<f32>().map_err(|e| {
            CaptionError::inference("encode", format!("Failed to extract features: {e}"))
        })?;

        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
        if dims.first() != Some(&batch_size) || dims.iter().skip(2).any(|&d| d != 1) {
            return Err(CaptionError::inference(
                "encode",
                format!("Unexpected backbone output shape: {:?}", dims),
            ));
        }
        let width = dims.get(1).copied().unwrap_or(1);

        Array2::from_shape_vec((batch_size, width), data.to_vec())
            .map_err(|e| CaptionError::inference("encode", format!("Feature reshape failed: {e}")))
    }
}
