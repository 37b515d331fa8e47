use anyhow::{Result, ensure};
use image::{DynamicImage, Rgb, Rgb32FImage};
use serde::{Deserialize, Serialize};

use crate::resample::{ResampleFilter, resize_rgb};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// Channel-normalised square image in CHW layout.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    size: usize,
    data: Vec<f32>,
    config: PreprocessConfig,
}

impl NormalizedImage {
    pub fn from_chw(size: usize, data: Vec<f32>, config: PreprocessConfig) -> Result<Self> {
        ensure!(size > 0, "image size must be > 0");
        ensure!(
            data.len() == 3 * size * size,
            "normalised image {size}x{size} needs {} values, got {}",
            3 * size * size,
            data.len()
        );
        Ok(Self { size, data, config })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// CHW values, channel-major.
    pub fn as_chw(&self) -> &[f32] {
        &self.data
    }

    pub fn into_chw(self) -> Vec<f32> {
        self.data
    }

    /// Undoes normalisation, yielding the `[0, 1]` RGB image the network saw.
    pub fn denormalize(&self) -> Rgb32FImage {
        let size = self.size as u32;
        let plane = self.size * self.size;
        Rgb32FImage::from_fn(size, size, |x, y| {
            let idx = y as usize * self.size + x as usize;
            let mut rgb = [0f32; 3];
            for (channel, value) in rgb.iter_mut().enumerate() {
                let raw = self.data[channel * plane + idx];
                *value = (raw * self.config.std[channel] + self.config.mean[channel]).clamp(0.0, 1.0);
            }
            Rgb(rgb)
        })
    }
}

/// Resize to `size x size` (Pillow bilinear), scale to `[0, 1]`, normalise.
pub fn preprocess_image(
    image: &DynamicImage,
    size: usize,
    config: &PreprocessConfig,
) -> Result<NormalizedImage> {
    ensure!(size > 0, "target image size must be > 0");
    ensure!(
        config.std.iter().all(|s| *s != 0.0),
        "normalisation std must be non-zero, got {:?}",
        config.std
    );
    let rgb = image.to_rgb8();
    let resized = resize_rgb(&rgb, size as u32, size as u32, ResampleFilter::Bilinear)?;

    let plane = size * size;
    let mut data = vec![0f32; 3 * plane];
    for (idx, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            data[channel * plane + idx] = (value - config.mean[channel]) / config.std[channel];
        }
    }
    NormalizedImage::from_chw(size, data, *config)
}
