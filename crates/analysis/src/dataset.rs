use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{error::AnalysisError, paths::ImageLocation};

/// Class names of a class-per-directory dataset, sorted so that a class
/// index matches the position used at training time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetClasses {
    root: PathBuf,
    classes: Vec<String>,
}

impl DatasetClasses {
    pub fn discover(root: &Path) -> Result<Self> {
        let entries = fs::read_dir(root)
            .with_context(|| format!("failed to list dataset classes in {}", root.display()))?;
        let mut classes = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to read {}", root.display()))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                classes.push(name.to_string());
            }
        }
        classes.sort();
        Ok(Self {
            root: root.to_path_buf(),
            classes,
        })
    }

    pub fn for_image(image: &ImageLocation) -> Result<Self> {
        Self::discover(&image.dataset_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.classes
    }

    pub fn index_of(&self, class: &str) -> Result<usize, AnalysisError> {
        self.classes
            .iter()
            .position(|name| name == class)
            .ok_or_else(|| AnalysisError::UnknownClass {
                class: class.to_string(),
                root: self.root.clone(),
            })
    }
}
