//! Fusion model: visual embedding and scaled tabular features into one score

use crate::error::PredictionError;
use crate::feature_extractor::FEATURE_COUNT;
use crate::models::encoder::VisualEncoder;
use crate::models::head::RegressionHead;
use crate::preprocess::ImageTensor;
use crate::scaler::ScaledFeatures;
use ndarray::{concatenate, Axis};
use tracing::debug;

/// Encoder and regression head composed into a single forward pass.
///
/// Returns the head's raw output, which is still in normalized score units.
pub struct FusionModel<E> {
    encoder: E,
    head: RegressionHead,
}

impl<E: VisualEncoder> FusionModel<E> {
    /// Compose an encoder with a head. The head must accept the embedding
    /// followed by the tabular features.
    pub fn new(encoder: E, head: RegressionHead) -> Result<Self, String> {
        let expected = encoder.embedding_dim() + FEATURE_COUNT;
        if head.input_dim() != expected {
            return Err(format!(
                "head expects {} inputs but encoder ({}) + tabular ({}) gives {}",
                head.input_dim(),
                encoder.embedding_dim(),
                FEATURE_COUNT,
                expected
            ));
        }
        Ok(Self { encoder, head })
    }

    /// Run one sample through the network.
    pub fn forward(
        &self,
        image: &ImageTensor,
        tabular: &ScaledFeatures,
    ) -> Result<f32, PredictionError> {
        let embedding = self.encoder.encode(image)?;

        let fused = concatenate(Axis(0), &[embedding.view(), tabular.values().view()])
            .map_err(|e| PredictionError::Inference(format!("failed to fuse inputs: {}", e)))?;

        if fused.len() != self.head.input_dim() {
            return Err(PredictionError::Inference(format!(
                "fused vector has {} values, head expects {}",
                fused.len(),
                self.head.input_dim()
            )));
        }

        let raw = self.head.forward(fused.view());
        debug!(raw_score = raw, "Fusion forward pass complete");
        Ok(raw)
    }

    pub fn embedding_dim(&self) -> usize {
        self.encoder.embedding_dim()
    }

    pub fn hidden_width(&self) -> usize {
        self.head.hidden_width()
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }
}
