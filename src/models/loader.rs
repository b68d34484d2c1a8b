//! Model artifact loader
//!
//! Every failure here is a [`StartupError`]: the service must not accept
//! traffic with missing or incompatible artifacts.

use crate::config::{ArtifactsConfig, InferenceConfig};
use crate::error::StartupError;
use crate::models::context::ModelContext;
use crate::models::encoder::{EncoderSession, OnnxEncoder, VisualEncoder};
use crate::models::head::RegressionHead;
use crate::models::inference::FusionModel;
use crate::scaler::{FeatureScaler, ScoreScaler, StandardScaler};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loads the encoder, head and scalers named in the configuration
pub struct ArtifactLoader {
    artifacts: ArtifactsConfig,
    /// Encoder sessions to create
    pool_size: usize,
    /// Number of threads for ONNX inference per session
    onnx_threads: usize,
}

impl ArtifactLoader {
    pub fn new(artifacts: &ArtifactsConfig, inference: &InferenceConfig) -> Self {
        Self {
            artifacts: artifacts.clone(),
            pool_size: inference.workers.max(1),
            onnx_threads: inference.onnx_threads.max(1),
        }
    }

    /// Load every artifact and assemble the shared model context.
    pub fn load_context(&self) -> Result<ModelContext<OnnxEncoder>, StartupError> {
        let feature_scaler = self.load_feature_scaler()?;
        let score_scaler = self.load_score_scaler()?;
        let head = self.load_head()?;
        let encoder = self.load_encoder()?;

        let context = assemble(
            encoder,
            head,
            feature_scaler,
            score_scaler,
            &self.artifacts.head_path(),
        )?;
        info!(
            embedding_dim = context.model().embedding_dim(),
            hidden_width = context.model().hidden_width(),
            "Model context loaded"
        );
        Ok(context)
    }

    pub fn load_feature_scaler(&self) -> Result<FeatureScaler, StartupError> {
        let path = self.artifacts.feature_scaler_path();
        let scaler = StandardScaler::from_json(&read_artifact(&path)?, &path)?;
        let scaler = FeatureScaler::new(scaler, &path)?;
        info!(path = %path.display(), "Feature scaler loaded");
        Ok(scaler)
    }

    pub fn load_score_scaler(&self) -> Result<ScoreScaler, StartupError> {
        let path = self.artifacts.score_scaler_path();
        let scaler = ScoreScaler::new(StandardScaler::from_json(&read_artifact(&path)?, &path)?, &path)?;
        info!(
            path = %path.display(),
            mean = scaler.mean(),
            scale = scaler.scale(),
            "Score scaler loaded"
        );
        Ok(scaler)
    }

    pub fn load_head(&self) -> Result<RegressionHead, StartupError> {
        let path = self.artifacts.head_path();
        let head = RegressionHead::from_safetensors(&read_artifact(&path)?, &path)?;
        info!(
            path = %path.display(),
            input_dim = head.input_dim(),
            hidden_width = head.hidden_width(),
            "Regression head loaded"
        );
        Ok(head)
    }

    pub fn load_encoder(&self) -> Result<OnnxEncoder, StartupError> {
        let path = self.artifacts.encoder_path();
        if !path.exists() {
            return Err(StartupError::MissingArtifact { path });
        }

        let sessions = (0..self.pool_size)
            .map(|_| self.load_session(&path))
            .collect::<Result<Vec<_>, _>>()?;

        OnnxEncoder::from_sessions(sessions, &path)
    }

    fn load_session(&self, path: &Path) -> Result<EncoderSession, StartupError> {
        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX encoder");

        let session = Session::builder()
            .map_err(session_error(path))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(session_error(path))?
            .with_intra_threads(self.onnx_threads)
            .map_err(session_error(path))?
            .commit_from_file(path)
            .map_err(session_error(path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| StartupError::incompatible(path, "encoder graph has no inputs"))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| StartupError::incompatible(path, "encoder graph has no outputs"))?;

        Ok(EncoderSession {
            session,
            input_name,
            output_name,
        })
    }
}

/// Compose loaded parts, checking the head against the encoder width.
pub fn assemble<E: VisualEncoder>(
    encoder: E,
    head: RegressionHead,
    feature_scaler: FeatureScaler,
    score_scaler: ScoreScaler,
    head_path: &Path,
) -> Result<ModelContext<E>, StartupError> {
    let model = FusionModel::new(encoder, head)
        .map_err(|reason| StartupError::incompatible(head_path, reason))?;
    Ok(ModelContext::new(model, feature_scaler, score_scaler))
}

fn session_error<E: std::fmt::Display>(path: &Path) -> impl Fn(E) -> StartupError + '_ {
    move |e| StartupError::Session {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, StartupError> {
    if !path.exists() {
        return Err(StartupError::MissingArtifact {
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|source| StartupError::Io {
        path: path.to_path_buf(),
        source,
    })
}
