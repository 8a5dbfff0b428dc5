//! Learned projection from backbone features to the embedding width.

use std::path::Path;

use ndarray::{Array1, Array2};

use crate::error::{ModelError, ModelResult};
use crate::weights::ParamFile;

pub(crate) const WEIGHT_TENSOR: &str = "fc.weight";
pub(crate) const BIAS_TENSOR: &str = "fc.bias";

/// `relu(W·x + b)`, applied to each batch row independently.
///
/// Dropout follows the activation during training only; at inference it is
/// the identity and does not appear here.
#[derive(Debug, Clone)]
pub struct ProjectionHead {
    /// `[embed_size, in_features]`
    weight: Array2<f32>,
    /// `[embed_size]`
    bias: Array1<f32>,
}

impl ProjectionHead {
    /// Build from raw parameters.
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> ModelResult<Self> {
        if bias.len() != weight.nrows() {
            return Err(ModelError::ShapeMismatch {
                name: BIAS_TENSOR.to_string(),
                expected: vec![weight.nrows()],
                actual: vec![bias.len()],
            });
        }
        Ok(Self { weight, bias })
    }

    /// Load `fc.weight` / `fc.bias` from a safetensors file.
    ///
    /// The row count must equal `embed_size`; the column count is taken from
    /// the file and later checked against the backbone.
    pub fn load(path: &Path, embed_size: usize) -> ModelResult<Self> {
        let mut params = ParamFile::open(
            path,
            "Export the trained projection head (fc.weight, fc.bias) to safetensors.",
        )?;
        let in_features = match params.shape(WEIGHT_TENSOR) {
            Some([_, cols]) => *cols,
            Some(other) => {
                return Err(ModelError::ShapeMismatch {
                    name: WEIGHT_TENSOR.to_string(),
                    expected: vec![embed_size, 0],
                    actual: other.to_vec(),
                })
            }
            None => {
                return Err(ModelError::MissingTensor {
                    path: path.to_path_buf(),
                    name: WEIGHT_TENSOR.to_string(),
                })
            }
        };
        let weight = params.matrix(WEIGHT_TENSOR, embed_size, in_features)?;
        let bias = params.vector(BIAS_TENSOR, embed_size)?;

        tracing::debug!(
            "Loaded projection head {} -> {} from {:?}",
            in_features,
            embed_size,
            path
        );
        Self::new(weight, bias)
    }

    /// Width of the features this head consumes.
    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    /// Width of the embeddings this head produces.
    pub fn embed_size(&self) -> usize {
        self.weight.nrows()
    }

    /// Project `[N, in_features]` to `[N, embed_size]`.
    pub fn forward(&self, features: &Array2<f32>) -> Array2<f32> {
        let mut out = features.dot(&self.weight.t());
        out += &self.bias;
        out.mapv_inplace(|v| v.max(0.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_forward_projects_and_rectifies() {
        let head = ProjectionHead::new(
            array![[1.0, 0.0, 0.0], [0.0, -1.0, 0.0]],
            array![0.5, 0.0],
        )
        .unwrap();
        let out = head.forward(&array![[1.0, 2.0, 3.0]]);
        let expected: Array2<f32> = array![[1.5, 0.0]];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_forward_rows_are_independent() {
        let head = ProjectionHead::new(array![[1.0, 1.0]], array![0.0]).unwrap();
        let both = head.forward(&array![[1.0, 2.0], [-5.0, 1.0]]);
        let first = head.forward(&array![[1.0, 2.0]]);
        assert_eq!(both.row(0), first.row(0));
        assert_eq!(both[[1, 0]], 0.0);
    }

    #[test]
    fn test_new_rejects_bias_mismatch() {
        let err = ProjectionHead::new(Array2::zeros((4, 2)), Array1::zeros(3)).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_load_checks_embed_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder_head.safetensors");
        crate::weights::write_params(
            &path,
            &[
                (WEIGHT_TENSOR, vec![8, 6], vec![0.1; 48]),
                (BIAS_TENSOR, vec![8], vec![0.0; 8]),
            ],
        )
        .unwrap();

        let head = ProjectionHead::load(&path, 8).unwrap();
        assert_eq!(head.in_features(), 6);
        assert_eq!(head.embed_size(), 8);

        let err = ProjectionHead::load(&path, 256).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
