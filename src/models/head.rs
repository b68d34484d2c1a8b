//! Feed-forward regression head applied to the fused embedding.

use crate::error::StartupError;
use ndarray::{Array1, Array2, ArrayView1};
use safetensors::{Dtype, SafeTensors};
use std::path::Path;

/// Parameter names as stored in the trained checkpoint.
pub const HIDDEN_WEIGHT: &str = "fc.0.weight";
pub const HIDDEN_BIAS: &str = "fc.0.bias";
pub const OUTPUT_WEIGHT: &str = "fc.3.weight";
pub const OUTPUT_BIAS: &str = "fc.3.bias";

/// Dense layer computing `weight · x + bias`, weight shaped `[out, in]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self, String> {
        if weight.nrows() != bias.len() {
            return Err(format!(
                "weight has {} output rows but bias has {} entries",
                weight.nrows(),
                bias.len()
            ));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    fn forward(&self, x: ArrayView1<f32>) -> Array1<f32> {
        self.weight.dot(&x) + &self.bias
    }
}

/// `Linear -> ReLU -> Dropout -> Linear(1)`, evaluated in inference mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionHead {
    hidden: Linear,
    output: Linear,
}

impl RegressionHead {
    pub fn new(hidden: Linear, output: Linear) -> Result<Self, String> {
        if output.in_features() != hidden.out_features() {
            return Err(format!(
                "output layer expects {} inputs but hidden layer produces {}",
                output.in_features(),
                hidden.out_features()
            ));
        }
        if output.out_features() != 1 {
            return Err(format!(
                "output layer must produce a single value, produces {}",
                output.out_features()
            ));
        }
        Ok(Self { hidden, output })
    }

    /// Load the head from a safetensors file holding the four F32 tensors.
    pub fn from_safetensors(bytes: &[u8], source: &Path) -> Result<Self, StartupError> {
        let tensors =
            SafeTensors::deserialize(bytes).map_err(|e| StartupError::corrupt(source, e))?;

        let hidden = Linear::new(
            read_matrix(&tensors, HIDDEN_WEIGHT, source)?,
            read_vector(&tensors, HIDDEN_BIAS, source)?,
        )
        .map_err(|reason| StartupError::incompatible(source, format!("hidden layer: {}", reason)))?;

        let output = Linear::new(
            read_matrix(&tensors, OUTPUT_WEIGHT, source)?,
            read_vector(&tensors, OUTPUT_BIAS, source)?,
        )
        .map_err(|reason| StartupError::incompatible(source, format!("output layer: {}", reason)))?;

        RegressionHead::new(hidden, output).map_err(|reason| StartupError::incompatible(source, reason))
    }

    /// Width of the fused input vector
    pub fn input_dim(&self) -> usize {
        self.hidden.in_features()
    }

    pub fn hidden_width(&self) -> usize {
        self.hidden.out_features()
    }

    /// Hidden and output layers
    pub fn layers(&self) -> (&Linear, &Linear) {
        (&self.hidden, &self.output)
    }

    /// Evaluate the head on one fused vector of length `input_dim()`.
    pub fn forward(&self, fused: ArrayView1<f32>) -> f32 {
        let hidden = self.hidden.forward(fused).mapv(|v| v.max(0.0));
        // Dropout is the identity outside training.
        let out = self.output.forward(hidden.view());
        out[0]
    }
}

fn read_f32(
    tensors: &SafeTensors<'_>,
    name: &str,
    rank: usize,
    source: &Path,
) -> Result<(Vec<usize>, Vec<f32>), StartupError> {
    let view = tensors
        .tensor(name)
        .map_err(|e| StartupError::incompatible(source, format!("tensor '{}': {}", name, e)))?;

    if view.dtype() != Dtype::F32 {
        return Err(StartupError::incompatible(
            source,
            format!("tensor '{}' has dtype {:?}, expected F32", name, view.dtype()),
        ));
    }
    if view.shape().len() != rank {
        return Err(StartupError::incompatible(
            source,
            format!("tensor '{}' has shape {:?}, expected rank {}", name, view.shape(), rank),
        ));
    }

    let values = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((view.shape().to_vec(), values))
}

fn read_matrix(tensors: &SafeTensors<'_>, name: &str, source: &Path) -> Result<Array2<f32>, StartupError> {
    let (shape, values) = read_f32(tensors, name, 2, source)?;
    Array2::from_shape_vec((shape[0], shape[1]), values)
        .map_err(|e| StartupError::corrupt(source, format!("tensor '{}': {}", name, e)))
}

fn read_vector(tensors: &SafeTensors<'_>, name: &str, source: &Path) -> Result<Array1<f32>, StartupError> {
    let (_, values) = read_f32(tensors, name, 1, source)?;
    Ok(Array1::from(values))
}
