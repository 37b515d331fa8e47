use std::path::{Path, PathBuf};

use crate::{
    error::AnalysisError,
    metadata::{MetadataError, PrototypeMetadata},
};

/// Images and bounding boxes saved for one push epoch under
/// `<img_dir>/epoch-<N>/`.
#[derive(Debug, Clone)]
pub struct PrototypeStore {
    epoch_dir: PathBuf,
}

impl PrototypeStore {
    pub fn open(img_dir: &Path, epoch: u32) -> Result<Self, AnalysisError> {
        if !img_dir.is_dir() {
            return Err(AnalysisError::MissingPrototypeDir(img_dir.to_path_buf()));
        }
        Ok(Self {
            epoch_dir: img_dir.join(format!("epoch-{epoch}")),
        })
    }

    pub fn epoch_dir(&self) -> &Path {
        &self.epoch_dir
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.epoch_dir.join("bb.npy")
    }

    pub fn load_metadata(&self) -> Result<PrototypeMetadata, MetadataError> {
        PrototypeMetadata::load(&self.metadata_path())
    }

    /// Cropped prototype patch.
    pub fn patch_path(&self, prototype: usize) -> PathBuf {
        self.epoch_dir.join(format!("prototype-img{prototype}.png"))
    }

    /// Full source image the prototype was projected from.
    pub fn original_path(&self, prototype: usize) -> PathBuf {
        self.epoch_dir
            .join(format!("prototype-img-original{prototype}.png"))
    }

    /// Source image overlaid with the prototype's own activation.
    pub fn self_activation_path(&self, prototype: usize) -> PathBuf {
        self.epoch_dir
            .join(format!("prototype-img-original_with_self_act{prototype}.png"))
    }
}
