//! Image preprocessing for the visual encoder.
//!
//! The steps and constants must match training-time preprocessing exactly:
//! decode to RGB, stretch to 224x224 with a bilinear filter, scale to
//! `[0, 1]`, then standardize each channel.

use crate::error::PredictionError;
use image::imageops::{self, FilterType};
use ndarray::Array3;

/// Side length of the square encoder input.
pub const IMAGE_SIZE: u32 = 224;

/// Number of colour channels fed to the encoder.
pub const CHANNELS: usize = 3;

/// Per-channel mean of natural-image statistics (RGB).
pub const CHANNEL_MEAN: [f32; CHANNELS] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of natural-image statistics (RGB).
pub const CHANNEL_STD: [f32; CHANNELS] = [0.229, 0.224, 0.225];

/// Normalized image in channel-first layout, shape `[3, 224, 224]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array3<f32>);

impl ImageTensor {
    /// Wrap a channel-first array. Fails unless the shape is `[3, 224, 224]`.
    pub fn from_array(array: Array3<f32>) -> Result<Self, PredictionError> {
        let side = IMAGE_SIZE as usize;
        if array.dim() != (CHANNELS, side, side) {
            return Err(PredictionError::Inference(format!(
                "image tensor has shape {:?}, expected [{}, {}, {}]",
                array.shape(),
                CHANNELS,
                side,
                side
            )));
        }
        Ok(Self(array))
    }

    /// All-zero tensor, run through the encoder at load time
    pub fn zeros() -> Self {
        let side = IMAGE_SIZE as usize;
        Self(Array3::zeros((CHANNELS, side, side)))
    }

    pub fn array(&self) -> &Array3<f32> {
        &self.0
    }

    /// Shape with a leading batch dimension of one
    pub fn batched_shape(&self) -> Vec<i64> {
        std::iter::once(1_i64)
            .chain(self.0.shape().iter().map(|&d| d as i64))
            .collect()
    }

    /// Contiguous values in `[C, H, W]` order
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }
}

/// Stateless decoder/normalizer for encoded image bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Decode, resize, and normalize an encoded image of any common format.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor, PredictionError> {
        // Alpha is dropped, not composited.
        let rgb = image::load_from_memory(bytes)?.to_rgb8();

        // Aspect ratio is not preserved.
        let resized = imageops::resize(&rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle);

        let side = IMAGE_SIZE as usize;
        let mut tensor = Array3::<f32>::zeros((CHANNELS, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..CHANNELS {
                let unit = pixel[c] as f32 / 255.0;
                tensor[[c, y as usize, x as usize]] = (unit - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
            }
        }

        Ok(ImageTensor(tensor))
    }
}
