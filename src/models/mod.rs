//! Fusion model components and artifact loading

pub mod context;
pub mod encoder;
pub mod head;
pub mod inference;
pub mod loader;

pub use context::ModelContext;
pub use encoder::{OnnxEncoder, VisualEncoder};
pub use head::RegressionHead;
pub use inference::FusionModel;
pub use loader::ArtifactLoader;
