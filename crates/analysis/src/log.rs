use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Operator-facing `local_analysis.log`. Every line is mirrored into
/// `tracing` so it also reaches the console subscriber.
pub struct AnalysisLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AnalysisLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create analysis log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, message: &str) -> Result<()> {
        self.write(message)?;
        for line in message.lines().filter(|line| !line.trim().is_empty()) {
            info!(target: "ppnet_align::analysis", "{line}");
        }
        Ok(())
    }

    /// Same as [`Self::line`] but mirrored at warning level.
    pub fn warn(&mut self, message: &str) -> Result<()> {
        self.write(message)?;
        for line in message.lines().filter(|line| !line.trim().is_empty()) {
            warn!(target: "ppnet_align::analysis", "{line}");
        }
        Ok(())
    }

    /// Blank separator line, file only.
    pub fn blank(&mut self) -> Result<()> {
        self.write("")
    }

    fn write(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{message}")
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))
    }
}
