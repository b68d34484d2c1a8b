//! Visual encoder: image tensor to flat embedding.

use crate::error::{PredictionError, StartupError};
use crate::preprocess::ImageTensor;
use ndarray::Array1;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Maps a preprocessed image to a fixed-length embedding.
///
/// Implementations must be deterministic and safe to call from several
/// threads at once.
pub trait VisualEncoder: Send + Sync {
    /// Length of the flattened embedding
    fn embedding_dim(&self) -> usize;

    /// Encode one image. The result has exactly `embedding_dim()` entries.
    fn encode(&self, image: &ImageTensor) -> Result<Array1<f32>, PredictionError>;
}

/// ONNX Runtime session plus the tensor names used to drive it
pub struct EncoderSession {
    pub session: Session,
    pub input_name: String,
    pub output_name: String,
}

impl EncoderSession {
    /// Run one image through the session and flatten the output.
    ///
    /// The output may be `[1, D]` or `[1, D, 1, 1]`; anything whose leading
    /// dimension is not 1 is rejected.
    fn run(&mut self, image: &ImageTensor) -> Result<Vec<f32>, String> {
        let input = Tensor::from_array((image.batched_shape(), image.to_vec()))
            .map_err(|e| format!("failed to create input tensor: {}", e))?;

        let outputs = self
            .session
            .run(ort::inputs![&self.input_name => input])
            .map_err(|e| e.to_string())?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| format!("output '{}' missing from session results", self.output_name))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("output '{}' is not an f32 tensor: {}", self.output_name, e))?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        if dims.first() != Some(&1) {
            return Err(format!("expected a batch of one, got output shape {:?}", dims));
        }

        Ok(data.to_vec())
    }
}

/// Residual-network encoder exported to ONNX, truncated before its
/// classification layer.
///
/// Sessions need exclusive access while running, so a small pool is kept and
/// requests are spread across it round-robin.
pub struct OnnxEncoder {
    sessions: Vec<Mutex<EncoderSession>>,
    next: AtomicUsize,
    embedding_dim: usize,
}

impl OnnxEncoder {
    /// Build the encoder and measure the embedding width with an all-zero image.
    pub fn from_sessions(
        sessions: Vec<EncoderSession>,
        source: &Path,
    ) -> Result<Self, StartupError> {
        let mut sessions = sessions;
        let zero_output = sessions
            .first_mut()
            .ok_or_else(|| StartupError::incompatible(source, "no encoder sessions created"))?
            .run(&ImageTensor::zeros())
            .map_err(|reason| StartupError::incompatible(source, format!("zero-image run failed: {}", reason)))?;

        if zero_output.is_empty() {
            return Err(StartupError::incompatible(source, "encoder produced an empty embedding"));
        }

        info!(
            path = %source.display(),
            embedding_dim = zero_output.len(),
            pool_size = sessions.len(),
            "Visual encoder ready"
        );

        Ok(Self {
            embedding_dim: zero_output.len(),
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.sessions.len()
    }
}

impl VisualEncoder for OnnxEncoder {
    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn encode(&self, image: &ImageTensor) -> Result<Array1<f32>, PredictionError> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[slot]
            .lock()
            .map_err(|e| PredictionError::Inference(format!("encoder session lock error: {}", e)))?;

        let embedding = session.run(image).map_err(PredictionError::Inference)?;
        debug!(slot = slot, len = embedding.len(), "Image encoded");

        if embedding.len() != self.embedding_dim {
            return Err(PredictionError::Inference(format!(
                "encoder produced {} values, expected {}",
                embedding.len(),
                self.embedding_dim
            )));
        }

        Ok(Array1::from(embedding))
    }
}
