use std::path::PathBuf;

use thiserror::Error;

/// Preconditions that stop an analysis before any artifact is trusted.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("prototype image directory {0} does not exist")]
    MissingPrototypeDir(PathBuf),
    #[error("prototype metadata lists {records} prototypes but the model has {prototypes}")]
    PrototypeCountMismatch { records: usize, prototypes: usize },
    #[error(
        "top_classes ({requested}) must be less than the number of dataset classes ({available})"
    )]
    TooManyClasses { requested: usize, available: usize },
    #[error("class `{class}` is not a dataset class under {root}")]
    UnknownClass { class: String, root: PathBuf },
}
