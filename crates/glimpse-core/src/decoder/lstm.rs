//! Stacked LSTM evaluated one time step at a time.
//!
//! Gate layout follows the PyTorch convention the parameters were trained
//! with: the `4H` rows of each weight matrix are the input, forget, cell and
//! output gates, in that order. Inter-layer dropout is a training-time
//! concern and is not applied.

use ndarray::{s, Array1, Array2, ArrayView1};

use crate::error::{ModelError, ModelResult};

/// Recurrent memory threaded through decode steps.
///
/// Both matrices are `[num_layers, hidden_size]`. A step never mutates a
/// state; it returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmState {
    hidden: Array2<f32>,
    cell: Array2<f32>,
}

impl LstmState {
    /// The all-zero state used before the first step.
    pub fn zeros(num_layers: usize, hidden_size: usize) -> Self {
        Self {
            hidden: Array2::zeros((num_layers, hidden_size)),
            cell: Array2::zeros((num_layers, hidden_size)),
        }
    }

    /// Hidden output of every layer.
    pub fn hidden(&self) -> &Array2<f32> {
        &self.hidden
    }

    /// Cell memory of every layer.
    pub fn cell(&self) -> &Array2<f32> {
        &self.cell
    }
}

/// One LSTM layer.
#[derive(Debug, Clone)]
pub struct LstmLayer {
    /// `[4H, input_size]`
    w_ih: Array2<f32>,
    /// `[4H, H]`
    w_hh: Array2<f32>,
    /// `b_ih + b_hh`, `[4H]`
    bias: Array1<f32>,
}

impl LstmLayer {
    /// Build a layer, checking all four tensors agree on `H`.
    pub fn new(
        w_ih: Array2<f32>,
        w_hh: Array2<f32>,
        b_ih: Array1<f32>,
        b_hh: Array1<f32>,
    ) -> ModelResult<Self> {
        let hidden = w_hh.ncols();
        let gates = 4 * hidden;
        let checks = [
            ("weight_ih", vec![gates, w_ih.ncols()], w_ih.shape().to_vec()),
            ("weight_hh", vec![gates, hidden], w_hh.shape().to_vec()),
            ("bias_ih", vec![gates], b_ih.shape().to_vec()),
            ("bias_hh", vec![gates], b_hh.shape().to_vec()),
        ];
        for (name, expected, actual) in checks {
            if expected != actual {
                return Err(ModelError::ShapeMismatch {
                    name: name.to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            w_ih,
            w_hh,
            bias: b_ih + b_hh,
        })
    }

    pub fn input_size(&self) -> usize {
        self.w_ih.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.w_hh.ncols()
    }

    /// `(w_ih, w_hh, combined bias)`.
    pub(crate) fn parameters(&self) -> (&Array2<f32>, &Array2<f32>, &Array1<f32>) {
        (&self.w_ih, &self.w_hh, &self.bias)
    }

    /// Advance one step: `(x, h, c) -> (h', c')`.
    fn forward(
        &self,
        x: ArrayView1<f32>,
        h: ArrayView1<f32>,
        c: ArrayView1<f32>,
    ) -> (Array1<f32>, Array1<f32>) {
        let hs = self.hidden_size();
        let gates = self.w_ih.dot(&x) + self.w_hh.dot(&h) + &self.bias;

        let input = gates.slice(s![0..hs]).mapv(sigmoid);
        let forget = gates.slice(s![hs..2 * hs]).mapv(sigmoid);
        let candidate = gates.slice(s![2 * hs..3 * hs]).mapv(f32::tanh);
        let output = gates.slice(s![3 * hs..4 * hs]).mapv(sigmoid);

        let c_next = &forget * &c + &input * &candidate;
        let h_next = &output * &c_next.mapv(f32::tanh);
        (h_next, c_next)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// A stack of LSTM layers; layer `k + 1` consumes layer `k`'s hidden output.
#[derive(Debug, Clone)]
pub struct Lstm {
    layers: Vec<LstmLayer>,
}

impl Lstm {
    /// Build a stack, checking each layer's input matches the previous width.
    pub fn new(layers: Vec<LstmLayer>) -> ModelResult<Self> {
        let first = layers.first().ok_or_else(|| ModelError::ShapeMismatch {
            name: "lstm layers".to_string(),
            expected: vec![1],
            actual: vec![0],
        })?;
        let hidden = first.hidden_size();
        for (k, layer) in layers.iter().enumerate() {
            if layer.hidden_size() != hidden || (k > 0 && layer.input_size() != hidden) {
                return Err(ModelError::ShapeMismatch {
                    name: format!("lstm layer {k}"),
                    expected: vec![4 * hidden, if k == 0 { layer.input_size() } else { hidden }],
                    actual: vec![4 * layer.hidden_size(), layer.input_size()],
                });
            }
        }
        Ok(Self { layers })
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub(crate) fn layers(&self) -> &[LstmLayer] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn hidden_size(&self) -> usize {
        self.layers[0].hidden_size()
    }

    /// Run one time step through every layer.
    ///
    /// Returns the top layer's hidden output and the replacement state.
    pub fn step(&self, input: ArrayView1<f32>, state: &LstmState) -> (Array1<f32>, LstmState) {
        let mut next = LstmState::zeros(self.num_layers(), self.hidden_size());
        let mut x = input.to_owned();
        for (k, layer) in self.layers.iter().enumerate() {
            let (h, c) = layer.forward(x.view(), state.hidden.row(k), state.cell.row(k));
            next.hidden.row_mut(k).assign(&h);
            next.cell.row_mut(k).assign(&c);
            x = h;
        }
        (x, next)
    }
}
