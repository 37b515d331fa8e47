use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, ensure};
use ppnet_align_core::ActivationMode;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "ppnet.json";

/// Architecture description stored next to a checkpoint, since a state dict
/// only carries parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PPNetConfig {
    /// Backbone name such as `vgg19` or `vgg16_bn`. Falls back to the
    /// architecture directory of the checkpoint path when absent.
    #[serde(default)]
    pub base_architecture: Option<String>,
    #[serde(default = "default_img_size")]
    pub img_size: usize,
    /// `[prototypes, channels, height, width]`
    pub prototype_shape: [usize; 4],
    pub num_classes: usize,
    #[serde(default)]
    pub prototype_activation_function: ActivationMode,
    #[serde(default)]
    pub add_on_layers_type: AddOnLayersType,
}

fn default_img_size() -> usize {
    224
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddOnLayersType {
    #[default]
    Bottleneck,
    Regular,
}

impl fmt::Display for AddOnLayersType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bottleneck => f.write_str("bottleneck"),
            Self::Regular => f.write_str("regular"),
        }
    }
}

impl PPNetConfig {
    pub fn num_prototypes(&self) -> usize {
        self.prototype_shape[0]
    }

    pub fn prototype_channels(&self) -> usize {
        self.prototype_shape[1]
    }

    pub fn prototype_volume(&self) -> usize {
        self.prototype_shape[1] * self.prototype_shape[2] * self.prototype_shape[3]
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.img_size > 0, "img_size must be > 0");
        ensure!(
            self.prototype_shape.iter().all(|&dim| dim > 0),
            "prototype_shape must be positive, got {:?}",
            self.prototype_shape
        );
        ensure!(self.num_classes > 0, "num_classes must be > 0");
        ensure!(
            self.num_prototypes() >= self.num_classes,
            "{} prototypes cannot cover {} classes",
            self.num_prototypes(),
            self.num_classes
        );
        ensure!(
            self.num_prototypes() % self.num_classes == 0,
            "{} prototypes do not split evenly over {} classes",
            self.num_prototypes(),
            self.num_classes
        );
        Ok(())
    }

    /// Backbone name, preferring the configured value over `fallback`.
    pub fn resolve_base_architecture(&self, fallback: Option<&str>) -> Result<String> {
        self.base_architecture
            .clone()
            .or_else(|| fallback.map(str::to_string))
            .ok_or_else(|| anyhow!("base_architecture missing from {CONFIG_FILE_NAME}"))
    }
}

pub struct LoadedPPNetConfig {
    pub value: PPNetConfig,
    pub path: PathBuf,
}

/// Loads `explicit` when given, otherwise looks for `ppnet.json` one level
/// above the checkpoint directory and then inside it.
pub fn load_config(explicit: Option<&Path>, checkpoint: &Path) -> Result<LoadedPPNetConfig> {
    let resolved = match explicit {
        Some(path) => {
            ensure!(path.exists(), "model config not found at {}", path.display());
            path.to_path_buf()
        }
        None => resolve_config_path(checkpoint).ok_or_else(|| {
            anyhow!(
                "failed to locate {CONFIG_FILE_NAME} for checkpoint {}",
                checkpoint.display()
            )
        })?,
    };
    let raw = fs::read_to_string(&resolved)
        .with_context(|| format!("failed to read model config at {}", resolved.display()))?;
    let value: PPNetConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse model config at {}", resolved.display()))?;
    value
        .validate()
        .with_context(|| format!("invalid model config at {}", resolved.display()))?;
    Ok(LoadedPPNetConfig {
        value,
        path: resolved,
    })
}

fn resolve_config_path(checkpoint: &Path) -> Option<PathBuf> {
    let checkpoint_dir = checkpoint.parent()?;
    let mut candidates = Vec::with_capacity(2);
    if let Some(run_dir) = checkpoint_dir.parent() {
        candidates.push(run_dir.join(CONFIG_FILE_NAME));
    }
    candidates.push(checkpoint_dir.join(CONFIG_FILE_NAME));
    candidates.into_iter().find(|candidate| candidate.exists())
}
