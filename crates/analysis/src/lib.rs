pub mod dataset;
pub mod error;
pub mod log;
pub mod metadata;
pub mod observer;
pub mod paths;
pub mod render;
pub mod report;
pub mod run;
pub mod store;

pub use dataset::DatasetClasses;
pub use error::AnalysisError;
pub use log::AnalysisLog;
pub use metadata::{MetadataError, PrototypeMetadata, PrototypeRecord};
pub use observer::{AnalysisEvent, AnalysisObserver, NoopObserver, RankingScope};
pub use paths::{CheckpointLocation, ImageLocation, OutputLayout, PathParseError};
pub use run::{AnalysisOutcome, AnalysisRequest, run_analysis};
pub use store::PrototypeStore;
