pub mod config;
pub mod features;
pub mod model;

pub use config::{AddOnLayersType, LoadedPPNetConfig, PPNetConfig, load_config};
pub use features::{VggFeatures, VggVariant};
pub use model::{ModelLoadArgs, PPNet, l2_distances, load_model};
