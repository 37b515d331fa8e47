pub mod activation;
pub mod alignment;
pub mod crop;
pub mod map;
pub mod model;
pub mod preprocess;
pub mod ranking;
pub mod resample;
pub mod runtime;
pub mod tensor;

pub use activation::ActivationMode;
pub use alignment::{AlignmentReport, check_alignment, distinct_classes};
pub use crop::{BoundingBox, DEFAULT_CROP_PERCENTILE, find_high_activation_crop};
pub use map::ActivationMap;
pub use model::{ClassIdentity, ClassWeights, DistanceMap, ForwardOutput, PrototypeModel};
pub use preprocess::{NormalizedImage, PreprocessConfig, preprocess_image};
pub use ranking::{argmax, select_class_prototypes, select_top_classes, select_top_prototypes};
pub use runtime::{DeviceKind, DeviceSelection, prepare_device};
