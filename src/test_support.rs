//! Fixtures shared by unit tests: a deterministic stand-in encoder, small
//! fixed-weight heads, scalers, and in-memory images.

use crate::error::PredictionError;
use crate::feature_extractor::{FeatureMap, TabularFeature, FEATURE_COUNT};
use crate::models::context::ModelContext;
use crate::models::encoder::VisualEncoder;
use crate::models::head::{
    Linear, RegressionHead, HIDDEN_BIAS, HIDDEN_WEIGHT, OUTPUT_BIAS, OUTPUT_WEIGHT,
};
use crate::models::inference::FusionModel;
use crate::preprocess::{ImageTensor, CHANNELS, IMAGE_SIZE};
use crate::scaler::{FeatureScaler, ScoreScaler, StandardScaler};
use crate::service::PredictionService;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{s, Array1, Array2};
use safetensors::tensor::TensorView;
use safetensors::Dtype;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const HIDDEN_WIDTH: usize = 16;

const FEATURE_MEAN: [f64; FEATURE_COUNT] = [800.0, 40.0, 1200.0, 0.3, 1.5, 4.0];
const FEATURE_SCALE: [f64; FEATURE_COUNT] = [400.0, 25.0, 900.0, 0.15, 2.0, 3.0];
const SCORE_MEAN: f64 = 0.42;
const SCORE_SCALE: f64 = 0.17;

/// Encoder that averages each channel over the four image quadrants.
pub struct ChannelMeanEncoder;

impl ChannelMeanEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl VisualEncoder for ChannelMeanEncoder {
    fn embedding_dim(&self) -> usize {
        CHANNELS * 4
    }

    fn encode(&self, image: &ImageTensor) -> Result<Array1<f32>, PredictionError> {
        let half = IMAGE_SIZE as usize / 2;
        let side = IMAGE_SIZE as usize;
        let mut embedding = Vec::with_capacity(self.embedding_dim());

        for c in 0..CHANNELS {
            let quadrants = [
                (0..half, 0..half),
                (0..half, half..side),
                (half..side, 0..half),
                (half..side, half..side),
            ];
            for (rows, cols) in quadrants {
                let quadrant = image.array().slice(s![c, rows, cols]);
                embedding.push(quadrant.mean().unwrap_or(0.0));
            }
        }

        Ok(Array1::from(embedding))
    }
}

/// The feature map from the reference end-to-end scenario
pub fn sample_features() -> FeatureMap {
    [
        ("elevation", 1500.0),
        ("land_cover_class", 10.0),
        ("mean_distance_to_water", 300.0),
        ("mean_ndvi", 0.45),
        ("nighttime_light", 2.1),
        ("slope", 3.2),
    ]
    .into_iter()
    .collect()
}

pub fn feature_standard_scaler() -> StandardScaler {
    StandardScaler {
        feature_names: Some(TabularFeature::ALL.iter().map(|f| f.name().to_string()).collect()),
        mean: FEATURE_MEAN.to_vec(),
        scale: FEATURE_SCALE.to_vec(),
    }
}

pub fn score_standard_scaler() -> StandardScaler {
    StandardScaler {
        feature_names: Some(vec!["score".to_string()]),
        mean: vec![SCORE_MEAN],
        scale: vec![SCORE_SCALE],
    }
}

pub fn test_feature_scaler() -> FeatureScaler {
    FeatureScaler::new(feature_standard_scaler(), Path::new("feature_scaler.json")).unwrap()
}

pub fn test_score_scaler() -> ScoreScaler {
    ScoreScaler::new(score_standard_scaler(), Path::new("score_scaler.json")).unwrap()
}

/// Head with fixed, mixed-sign weights and a positive hidden bias so most
/// hidden units are active.
pub fn test_head(input_dim: usize) -> RegressionHead {
    let hidden_weight = Array2::from_shape_fn((HIDDEN_WIDTH, input_dim), |(i, j)| {
        ((i * 7 + j * 3) % 11) as f32 / 10.0 - 0.5
    });
    let hidden_bias = Array1::from_elem(HIDDEN_WIDTH, 1.0);
    let output_weight =
        Array2::from_shape_fn((1, HIDDEN_WIDTH), |(_, j)| if j % 2 == 0 { 0.25 } else { -0.125 });
    let output_bias = Array1::from_elem(1, 0.1);

    RegressionHead::new(
        Linear::new(hidden_weight, hidden_bias).unwrap(),
        Linear::new(output_weight, output_bias).unwrap(),
    )
    .unwrap()
}

pub fn test_context() -> ModelContext<ChannelMeanEncoder> {
    let encoder = ChannelMeanEncoder::new();
    let head = test_head(encoder.embedding_dim() + FEATURE_COUNT);
    ModelContext::new(
        FusionModel::new(encoder, head).unwrap(),
        test_feature_scaler(),
        test_score_scaler(),
    )
}

pub fn test_service() -> PredictionService<ChannelMeanEncoder> {
    PredictionService::new(Arc::new(test_context()))
}

fn le_bytes(values: impl Iterator<Item = f32>) -> Vec<u8> {
    values.flat_map(|v| v.to_le_bytes()).collect()
}

/// Serialize a head under the checkpoint parameter names
pub fn head_safetensors(head: &RegressionHead) -> Vec<u8> {
    let (hidden, output) = head.layers();
    let buffers = [
        (HIDDEN_WEIGHT, hidden.weight().shape().to_vec(), le_bytes(hidden.weight().iter().copied())),
        (HIDDEN_BIAS, vec![hidden.bias().len()], le_bytes(hidden.bias().iter().copied())),
        (OUTPUT_WEIGHT, output.weight().shape().to_vec(), le_bytes(output.weight().iter().copied())),
        (OUTPUT_BIAS, vec![output.bias().len()], le_bytes(output.bias().iter().copied())),
    ];

    let views: Vec<(&str, TensorView<'_>)> = buffers
        .iter()
        .map(|(name, shape, data)| (*name, TensorView::new(Dtype::F32, shape.clone(), data).unwrap()))
        .collect();

    safetensors::serialize(views, &None).unwrap()
}

pub fn write_head(dir: &Path, head: &RegressionHead) {
    std::fs::write(dir.join("fusion_head.safetensors"), head_safetensors(head)).unwrap();
}

pub fn write_scalers(dir: &Path) {
    std::fs::write(
        dir.join("feature_scaler.json"),
        serde_json::to_vec(&feature_standard_scaler()).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("score_scaler.json"),
        serde_json::to_vec(&score_standard_scaler()).unwrap(),
    )
    .unwrap();
}

/// Directory of the checked-in ONNX encoder graphs.
///
/// `gap_encoder.onnx` pools `[1,3,224,224]` to `[1,3,1,1]`;
/// `batch_of_two_encoder.onnx` stacks that result into `[2,3,1,1]`;
/// `empty_encoder.onnx` slices it down to `[1,0,1,1]`.
pub fn onnx_fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// PNG with a colour gradient, so different regions differ
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    });
    encode_png(img)
}

pub fn solid_png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
