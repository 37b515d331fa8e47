use std::str::FromStr;

use anyhow::{Context, Result, bail};
use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, VarBuilder, batch_norm, conv2d};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Conv(usize),
    MaxPool,
}

use Layer::{Conv, MaxPool};

#[rustfmt::skip]
const VGG11: &[Layer] = &[
    Conv(64), MaxPool, Conv(128), MaxPool, Conv(256), Conv(256), MaxPool, Conv(512), Conv(512),
    MaxPool, Conv(512), Conv(512), MaxPool,
];
#[rustfmt::skip]
const VGG13: &[Layer] = &[
    Conv(64), Conv(64), MaxPool, Conv(128), Conv(128), MaxPool, Conv(256), Conv(256), MaxPool,
    Conv(512), Conv(512), MaxPool, Conv(512), Conv(512), MaxPool,
];
#[rustfmt::skip]
const VGG16: &[Layer] = &[
    Conv(64), Conv(64), MaxPool, Conv(128), Conv(128), MaxPool, Conv(256), Conv(256), Conv(256),
    MaxPool, Conv(512), Conv(512), Conv(512), MaxPool, Conv(512), Conv(512), Conv(512), MaxPool,
];
#[rustfmt::skip]
const VGG19: &[Layer] = &[
    Conv(64), Conv(64), MaxPool, Conv(128), Conv(128), MaxPool, Conv(256), Conv(256), Conv(256),
    Conv(256), MaxPool, Conv(512), Conv(512), Conv(512), Conv(512), MaxPool, Conv(512), Conv(512),
    Conv(512), Conv(512), MaxPool,
];

/// Supported VGG backbones, with or without batch normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VggVariant {
    pub depth: usize,
    pub batch_norm: bool,
}

impl VggVariant {
    fn layers(self) -> &'static [Layer] {
        match self.depth {
            11 => VGG11,
            13 => VGG13,
            16 => VGG16,
            _ => VGG19,
        }
    }

    /// Channels produced by the last convolution.
    pub fn out_channels(self) -> usize {
        self.layers()
            .iter()
            .rev()
            .find_map(|layer| match layer {
                Conv(channels) => Some(*channels),
                MaxPool => None,
            })
            .unwrap_or(512)
    }

    /// Total spatial reduction factor of the backbone.
    pub fn downsample_factor(self) -> usize {
        1 << self.layers().iter().filter(|layer| **layer == MaxPool).count()
    }
}

impl FromStr for VggVariant {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        let (name, batch_norm) = match normalized.strip_suffix("_bn") {
            Some(name) => (name, true),
            None => (normalized.as_str(), false),
        };
        let depth = match name {
            "vgg11" => 11,
            "vgg13" => 13,
            "vgg16" => 16,
            "vgg19" => 19,
            _ => bail!("unsupported base architecture `{value}` (expected vgg11/13/16/19, optionally _bn)"),
        };
        Ok(Self { depth, batch_norm })
    }
}

enum FeatureLayer {
    Conv(Conv2d),
    Norm(BatchNorm),
    Relu,
    MaxPool,
}

/// Convolutional trunk of a VGG network, indexed like `torchvision` so
/// checkpoint keys line up (`features.<i>.weight`).
pub struct VggFeatures {
    variant: VggVariant,
    layers: Vec<FeatureLayer>,
}

impl VggFeatures {
    pub fn load(variant: VggVariant, vb: VarBuilder) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let mut layers = Vec::new();
        let mut in_channels = 3;
        for layer in variant.layers() {
            match *layer {
                MaxPool => layers.push(FeatureLayer::MaxPool),
                Conv(out_channels) => {
                    let idx = layers.len();
                    let conv = conv2d(in_channels, out_channels, 3, conv_cfg, vb.pp(idx))
                        .with_context(|| format!("failed to load feature conv {idx}"))?;
                    layers.push(FeatureLayer::Conv(conv));
                    if variant.batch_norm {
                        let idx = layers.len();
                        let norm = batch_norm(out_channels, 1e-5, vb.pp(idx))
                            .with_context(|| format!("failed to load feature batch norm {idx}"))?;
                        layers.push(FeatureLayer::Norm(norm));
                    }
                    layers.push(FeatureLayer::Relu);
                    in_channels = out_channels;
                }
            }
        }
        Ok(Self { variant, layers })
    }

    pub fn variant(&self) -> VggVariant {
        self.variant
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for layer in &self.layers {
            xs = match layer {
                FeatureLayer::Conv(conv) => conv.forward(&xs)?,
                FeatureLayer::Norm(norm) => norm.forward_t(&xs, false)?,
                FeatureLayer::Relu => xs.relu()?,
                FeatureLayer::MaxPool => xs.max_pool2d(2)?,
            };
        }
        Ok(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variants() {
        let variant: VggVariant = "vgg16_bn".parse().unwrap();
        assert_eq!(variant, VggVariant { depth: 16, batch_norm: true });
        let variant: VggVariant = "VGG19".parse().unwrap();
        assert_eq!(variant, VggVariant { depth: 19, batch_norm: false });
        assert!("resnet34".parse::<VggVariant>().is_err());
    }

    #[test]
    fn layer_tables_match_torchvision() {
        let count = |depth| {
            VggVariant { depth, batch_norm: false }
                .layers()
                .iter()
                .filter(|layer| matches!(layer, Conv(_)))
                .count()
        };
        assert_eq!(count(11), 8);
        assert_eq!(count(13), 10);
        assert_eq!(count(16), 13);
        assert_eq!(count(19), 16);
        let variant = VggVariant { depth: 11, batch_norm: false };
        assert_eq!(variant.out_channels(), 512);
        assert_eq!(variant.downsample_factor(), 32);
    }
}
