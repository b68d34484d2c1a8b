//! Process-wide, read-only model state.

use crate::models::encoder::{OnnxEncoder, VisualEncoder};
use crate::models::inference::FusionModel;
use crate::scaler::{FeatureScaler, ScoreScaler};

/// Everything a prediction needs that outlives a single request.
///
/// Built once before the first request and shared immutably afterwards.
pub struct ModelContext<E = OnnxEncoder> {
    model: FusionModel<E>,
    feature_scaler: FeatureScaler,
    score_scaler: ScoreScaler,
}

impl<E: VisualEncoder> ModelContext<E> {
    pub fn new(model: FusionModel<E>, feature_scaler: FeatureScaler, score_scaler: ScoreScaler) -> Self {
        Self {
            model,
            feature_scaler,
            score_scaler,
        }
    }

    pub fn model(&self) -> &FusionModel<E> {
        &self.model
    }

    pub fn feature_scaler(&self) -> &FeatureScaler {
        &self.feature_scaler
    }

    pub fn score_scaler(&self) -> &ScoreScaler {
        &self.score_scaler
    }
}
