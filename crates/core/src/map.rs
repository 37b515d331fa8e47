use anyhow::{Result, ensure};

use crate::{activation::ActivationMode, resample::resize_cubic_f32};

/// Row-major 2D grid of `f32` values (distances or activations).
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationMap {
    height: usize,
    width: usize,
    values: Vec<f32>,
}

impl ActivationMap {
    pub fn new(height: usize, width: usize, values: Vec<f32>) -> Result<Self> {
        ensure!(
            height > 0 && width > 0,
            "activation map must be non-empty, got {height}x{width}"
        );
        ensure!(
            values.len() == height * width,
            "activation map {height}x{width} needs {} values, got {}",
            height * width,
            values.len()
        );
        Ok(Self {
            height,
            width,
            values,
        })
    }

    pub fn filled(height: usize, width: usize, value: f32) -> Result<Self> {
        Self::new(height, width, vec![value; height * width])
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.width + col]
    }

    pub fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            height: self.height,
            width: self.width,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Converts a distance map into the activation pattern for `mode`.
    pub fn to_activation(&self, mode: ActivationMode, prototype_volume: usize) -> Self {
        self.map(|d| mode.activation(d, prototype_volume))
    }

    /// Bicubic upsampling to `height x width`.
    pub fn upsample(&self, height: usize, width: usize) -> Result<Self> {
        let values = resize_cubic_f32(&self.values, self.height, self.width, height, width)?;
        Self::new(height, width, values)
    }

    /// Min-max normalisation into `[0, 1]`. A constant map normalises to zeros.
    pub fn normalized(&self) -> Self {
        let min = self.min();
        let range = self.max() - min;
        if !(range > 0.0) || !range.is_finite() {
            return self.map(|_| 0.0);
        }
        self.map(|v| (v - min) / range)
    }
}
