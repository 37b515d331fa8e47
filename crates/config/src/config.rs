use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use ppnet_align_core::{
    DEFAULT_CROP_PERCENTILE, DeviceKind, DeviceSelection, PreprocessConfig,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application configuration, loaded from an optional TOML file and layered
/// with command-line overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub inference: InferenceSettings,
    pub analysis: AnalysisSettings,
    pub preprocess: PreprocessConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InferenceSettings {
    pub device: DeviceKind,
    pub ordinal: usize,
}

impl InferenceSettings {
    pub fn device_selection(&self) -> DeviceSelection {
        DeviceSelection::new(self.device, self.ordinal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Prototypes rendered under `most_activated_prototypes/`.
    pub top_prototypes: usize,
    /// Predicted classes expanded under `class_prototypes/`.
    pub top_classes: usize,
    /// Per-class cap; every prototype of the class when unset.
    pub class_prototypes: Option<usize>,
    pub crop_percentile: f32,
    pub render: RenderSettings,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_prototypes: 10,
            top_classes: 1,
            class_prototypes: None,
            crop_percentile: DEFAULT_CROP_PERCENTILE,
            render: RenderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// RGB outline colour for bounding boxes.
    pub bbox_color: [u8; 3],
    pub bbox_thickness: u32,
    /// Weight of the test image in the heatmap overlay.
    pub image_weight: f32,
    /// Weight of the colour-mapped activation in the heatmap overlay.
    pub heatmap_weight: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            bbox_color: [255, 255, 0],
            bbox_thickness: 2,
            image_weight: 0.5,
            heatmap_weight: 0.3,
        }
    }
}

impl AppConfig {
    /// Loads `path` when given, writing the defaults there first if the file
    /// does not exist yet. Without a path the built-in defaults are used.
    pub fn load_or_init(path: Option<&Path>) -> Result<(Self, ConfigDescriptor)> {
        match path {
            Some(path) => load_physical_config(path),
            None => Ok((Self::default(), ConfigDescriptor { path: None })),
        }
    }

    pub fn load_with_overrides(overrides: &ConfigOverrides) -> Result<(Self, ConfigDescriptor)> {
        let (mut config, descriptor) = Self::load_or_init(overrides.config_path.as_deref())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok((config, descriptor))
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        self.inference += &overrides.inference;
        self.analysis += &overrides.analysis;
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=100.0).contains(&self.analysis.crop_percentile),
            "crop_percentile must lie in [0, 100], got {}",
            self.analysis.crop_percentile
        );
        ensure!(
            self.analysis.render.bbox_thickness > 0,
            "bbox_thickness must be > 0"
        );
        ensure!(
            self.preprocess.std.iter().all(|s| *s != 0.0),
            "preprocess.std must be non-zero, got {:?}",
            self.preprocess.std
        );
        Ok(())
    }
}

pub struct ConfigDescriptor {
    /// `None` when running on built-in defaults.
    pub path: Option<PathBuf>,
}

fn load_physical_config(path: &Path) -> Result<(AppConfig, ConfigDescriptor)> {
    let path_buf = path.to_path_buf();
    if !path.exists() {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let cfg = AppConfig::default();
        save_config(&path_buf, &cfg)?;
        debug!(path = %path_buf.display(), "wrote default configuration");
        return Ok((
            cfg,
            ConfigDescriptor {
                path: Some(path_buf),
            },
        ));
    }

    let contents = fs::read_to_string(&path_buf)
        .with_context(|| format!("failed to read configuration from {}", path_buf.display()))?;
    let cfg: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse configuration at {}", path_buf.display()))?;
    Ok((
        cfg,
        ConfigDescriptor {
            path: Some(path_buf),
        },
    ))
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)
        .with_context(|| format!("failed to write configuration to {}", path.display()))
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub inference: InferenceOverride,
    pub analysis: AnalysisOverride,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOverride {
    pub device: Option<DeviceKind>,
    pub ordinal: Option<usize>,
}

impl std::ops::AddAssign<&InferenceOverride> for InferenceSettings {
    fn add_assign(&mut self, rhs: &InferenceOverride) {
        if let Some(device) = rhs.device {
            self.device = device;
        }
        if let Some(ordinal) = rhs.ordinal {
            self.ordinal = ordinal;
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOverride {
    pub top_prototypes: Option<usize>,
    pub top_classes: Option<usize>,
    pub class_prototypes: Option<usize>,
    pub crop_percentile: Option<f32>,
}

impl std::ops::AddAssign<&AnalysisOverride> for AnalysisSettings {
    fn add_assign(&mut self, rhs: &AnalysisOverride) {
        if let Some(top_prototypes) = rhs.top_prototypes {
            self.top_prototypes = top_prototypes;
        }
        if let Some(top_classes) = rhs.top_classes {
            self.top_classes = top_classes;
        }
        if rhs.class_prototypes.is_some() {
            self.class_prototypes = rhs.class_prototypes;
        }
        if let Some(percentile) = rhs.crop_percentile {
            self.crop_percentile = percentile;
        }
    }
}
