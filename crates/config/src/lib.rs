pub mod args;
pub mod config;

pub use args::{AnalysisArgs, CommonInferenceArgs, CommonModelArgs, build_config_overrides};
pub use config::{
    AnalysisOverride, AnalysisSettings, AppConfig, ConfigDescriptor, ConfigOverrides,
    InferenceOverride, InferenceSettings, RenderSettings, save_config,
};
