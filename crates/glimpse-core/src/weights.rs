//! Trained parameter files (safetensors, f32, little-endian).
//!
//! Every tensor is copied out into owned `ndarray` storage at load time and
//! checked against the shape the caller expects, so a mismatched artifact
//! fails at startup instead of on the first request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use safetensors::{Dtype, SafeTensors};

use crate::error::{ModelError, ModelResult};

/// All tensors from one parameter file, decoded to f32.
pub struct ParamFile {
    path: PathBuf,
    tensors: HashMap<String, (Vec<usize>, Vec<f32>)>,
}

impl ParamFile {
    /// Read and decode a safetensors file.
    ///
    /// `hint` is appended to the error when the file does not exist.
    pub fn open(path: &Path, hint: &str) -> ModelResult<Self> {
        if !path.exists() {
            return Err(ModelError::MissingArtifact {
                path: path.to_path_buf(),
                hint: hint.to_string(),
            });
        }

        let bytes = std::fs::read(path).map_err(|e| ModelError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let parsed = SafeTensors::deserialize(&bytes).map_err(|e| ModelError::Load {
            path: path.to_path_buf(),
            message: format!("Invalid safetensors data: {e}"),
        })?;

        let mut tensors = HashMap::new();
        for (name, view) in parsed.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(ModelError::Load {
                    path: path.to_path_buf(),
                    message: format!("Tensor `{name}` is {:?}, expected F32", view.dtype()),
                });
            }
            let data: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            tensors.insert(name, (view.shape().to_vec(), data));
        }

        tracing::debug!("Read {} tensors from {:?}", tensors.len(), path);

        Ok(Self {
            path: path.to_path_buf(),
            tensors,
        })
    }

    /// Path the tensors were read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shape of a tensor, if present.
    pub fn shape(&self, name: &str) -> Option<&[usize]> {
        self.tensors.get(name).map(|(shape, _)| shape.as_slice())
    }

    fn take(&mut self, name: &str, expected: &[usize]) -> ModelResult<Vec<f32>> {
        let (shape, data) = self
            .tensors
            .remove(name)
            .ok_or_else(|| ModelError::MissingTensor {
                path: self.path.clone(),
                name: name.to_string(),
            })?;
        if shape != expected {
            return Err(ModelError::ShapeMismatch {
                name: name.to_string(),
                expected: expected.to_vec(),
                actual: shape,
            });
        }
        Ok(data)
    }

    /// Remove a rank-2 tensor, checking its shape is `[rows, cols]`.
    pub fn matrix(&mut self, name: &str, rows: usize, cols: usize) -> ModelResult<Array2<f32>> {
        let data = self.take(name, &[rows, cols])?;
        Array2::from_shape_vec((rows, cols), data).map_err(|e| ModelError::Load {
            path: self.path.clone(),
            message: format!("Tensor `{name}`: {e}"),
        })
    }

    /// Remove a rank-1 tensor, checking its length.
    pub fn vector(&mut self, name: &str, len: usize) -> ModelResult<Array1<f32>> {
        Ok(Array1::from(self.take(name, &[len])?))
    }

    /// Names of tensors not yet consumed.
    pub fn remaining(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Write f32 tensors to a safetensors file.
#[cfg(any(test, feature = "testing"))]
pub fn write_params<S: AsRef<str>>(
    path: &Path,
    tensors: &[(S, Vec<usize>, Vec<f32>)],
) -> std::io::Result<()> {
    use safetensors::tensor::TensorView;

    let bytes: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, shape, data)| {
            let raw = data.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.as_ref().to_string(), shape.clone(), raw)
        })
        .collect();

    let views = bytes
        .iter()
        .map(|(name, shape, raw)| {
            TensorView::new(Dtype::F32, shape.clone(), raw)
                .map(|view| (name.clone(), view))
                .map_err(std::io::Error::other)
        })
        .collect::<std::io::Result<Vec<_>>>()?;

    safetensors::serialize_to_file(views, &None, path).map_err(std::io::Error::other)
}
