use std::{
    io,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathParseError {
    #[error("failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("image path {0} must end in <class>/<image>")]
    ImageTooShallow(PathBuf),
    #[error("checkpoint path {0} must end in <architecture>/<experiment>/<dir>/<checkpoint>")]
    CheckpointTooShallow(PathBuf),
    #[error("path component in {0} is not valid UTF-8")]
    NonUtf8(PathBuf),
    #[error("checkpoint name `{0}` carries no epoch number")]
    MissingEpoch(String),
    #[error("epoch `{digits}` in `{name}` is out of range")]
    EpochOverflow { name: String, digits: String },
}

/// Test image split into the pieces the analysis needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    pub path: PathBuf,
    pub class_name: String,
    pub image_name: String,
}

impl ImageLocation {
    /// Root of the class-per-directory dataset holding this image.
    pub fn dataset_root(&self) -> PathBuf {
        self.path
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Checkpoint laid out as `<architecture>/<experiment>/<dir>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointLocation {
    pub path: PathBuf,
    pub architecture: String,
    pub experiment: String,
    pub model_name: String,
    pub epoch: u32,
}

impl CheckpointLocation {
    /// `img/` directory written by the push stage, a sibling of the
    /// checkpoint directory.
    pub fn prototype_img_dir(&self) -> PathBuf {
        let checkpoint_dir = self.path.parent().unwrap_or(Path::new(""));
        checkpoint_dir
            .parent()
            .unwrap_or(checkpoint_dir)
            .join("img")
    }
}

fn absolute(path: &Path) -> Result<PathBuf, PathParseError> {
    let resolved = std::path::absolute(path).map_err(|source| PathParseError::Resolve {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize(&resolved))
}

/// Lexically folds `.` and `..` so trailing components match the directory
/// layout the user pointed at.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn trailing_names(path: &Path, count: usize) -> Result<Option<Vec<String>>, PathParseError> {
    let names: Vec<_> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();
    if names.len() < count {
        return Ok(None);
    }
    names[names.len() - count..]
        .iter()
        .map(|name| {
            name.to_str()
                .map(str::to_string)
                .ok_or_else(|| PathParseError::NonUtf8(path.to_path_buf()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub fn parse_image_path(path: &Path) -> Result<ImageLocation, PathParseError> {
    let path = absolute(path)?;
    let Some(mut names) = trailing_names(&path, 2)? else {
        return Err(PathParseError::ImageTooShallow(path));
    };
    let image_name = names.pop().unwrap_or_default();
    let class_name = names.pop().unwrap_or_default();
    Ok(ImageLocation {
        path,
        class_name,
        image_name,
    })
}

pub fn parse_checkpoint_path(path: &Path) -> Result<CheckpointLocation, PathParseError> {
    let path = absolute(path)?;
    let Some(names) = trailing_names(&path, 4)? else {
        return Err(PathParseError::CheckpointTooShallow(path));
    };
    let [architecture, experiment, _, model_name]: [String; 4] = names
        .try_into()
        .map_err(|_| PathParseError::CheckpointTooShallow(path.clone()))?;
    let epoch = epoch_from_name(&model_name)?;
    Ok(CheckpointLocation {
        path,
        architecture,
        experiment,
        model_name,
        epoch,
    })
}

/// First run of ASCII digits in `name`, e.g. `10_18push0.7822.pth` -> 10.
pub fn epoch_from_name(name: &str) -> Result<u32, PathParseError> {
    let start = name
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| PathParseError::MissingEpoch(name.to_string()))?;
    let digits: String = name[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().map_err(|_| PathParseError::EpochOverflow {
        name: name.to_string(),
        digits,
    })
}

/// Directory tree of one analysis run:
/// `<out>/<arch>/<experiment>/<model>/alignment/<class>/<image>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(out: &Path, checkpoint: &CheckpointLocation, image: &ImageLocation) -> Self {
        let root = out
            .join(&checkpoint.architecture)
            .join(&checkpoint.experiment)
            .join(&checkpoint.model_name)
            .join("alignment")
            .join(&image.class_name)
            .join(&image.image_name);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("local_analysis.log")
    }

    pub fn original_image(&self) -> PathBuf {
        self.root.join("original_img.png")
    }

    /// `rank` is 1-based.
    pub fn most_activated_dir(&self, rank: usize) -> PathBuf {
        self.root
            .join("most_activated_prototypes")
            .join(format!("top-{rank}"))
    }

    pub fn class_dir(&self, class_rank: usize) -> PathBuf {
        self.root
            .join("class_prototypes")
            .join(format!("top-{class_rank}_class"))
    }

    pub fn class_prototype_dir(&self, class_rank: usize, prototype_rank: usize) -> PathBuf {
        self.class_dir(class_rank)
            .join(format!("top-{prototype_rank}_prototype"))
    }
}
