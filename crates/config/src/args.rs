use std::path::PathBuf;

use clap::Args;
use ppnet_align_core::DeviceKind;

use crate::config::{AnalysisOverride, ConfigOverrides, InferenceOverride};

#[derive(Args, Debug, Clone, Default)]
pub struct CommonModelArgs {
    /// Optional path to a TOML configuration file (created with defaults if missing).
    #[arg(long, value_name = "PATH", help_heading = "Application")]
    pub config: Option<PathBuf>,

    /// Network architecture JSON (defaults to `ppnet.json` beside the checkpoint directory).
    #[arg(long, value_name = "PATH", help_heading = "Application")]
    pub model_config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonInferenceArgs {
    /// Device backend (cpu/cuda/metal).
    #[arg(long, help_heading = "Inference")]
    pub device: Option<DeviceKind>,

    /// GPU ordinal to run on; implies `--device cuda` when no device is given.
    #[arg(long, value_name = "ORDINAL", help_heading = "Inference")]
    pub gpus: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AnalysisArgs {
    /// Number of most activated prototypes to render.
    #[arg(long, value_name = "N", help_heading = "Analysis")]
    pub top_prototypes: Option<usize>,

    /// Number of top predicted classes whose prototypes are rendered.
    #[arg(long, value_name = "K", help_heading = "Analysis")]
    pub top_classes: Option<usize>,

    /// Cap on prototypes rendered per class (all of them when omitted).
    #[arg(long, value_name = "M", help_heading = "Analysis")]
    pub class_prototypes: Option<usize>,

    /// Percentile that bounds the high-activation crop.
    #[arg(long, value_name = "Q", help_heading = "Analysis")]
    pub crop_percentile: Option<f32>,
}

impl From<&CommonInferenceArgs> for InferenceOverride {
    fn from(value: &CommonInferenceArgs) -> Self {
        let device = value
            .device
            .or_else(|| value.gpus.map(|_| DeviceKind::Cuda));
        Self {
            device,
            ordinal: value.gpus,
        }
    }
}

impl From<&AnalysisArgs> for AnalysisOverride {
    fn from(value: &AnalysisArgs) -> Self {
        Self {
            top_prototypes: value.top_prototypes,
            top_classes: value.top_classes,
            class_prototypes: value.class_prototypes,
            crop_percentile: value.crop_percentile,
        }
    }
}

pub fn build_config_overrides(
    model: &CommonModelArgs,
    inference: &CommonInferenceArgs,
    analysis: &AnalysisArgs,
) -> ConfigOverrides {
    ConfigOverrides {
        config_path: model.config.clone(),
        model_config: model.model_config.clone(),
        inference: inference.into(),
        analysis: analysis.into(),
    }
}
