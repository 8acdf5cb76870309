use crate::core_modules::composite::CompositeLayout;
use crate::core_modules::leaf_filters::FilterSettings;
use crate::error::{LeafError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything one batch run needs. Every field has a default, so a JSON file
/// only has to name what it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Root of the `<class_label>/<image>` corpus.
    pub input_root: PathBuf,
    /// Root under which the class taxonomy is mirrored with composites.
    pub output_root: PathBuf,
    /// 1 runs serially; 0 uses one worker per CPU.
    pub workers: usize,
    pub filters: FilterSettings,
    pub layout: CompositeLayout,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("leaves"),
            output_root: PathBuf::from("processed_images"),
            workers: 1,
            filters: FilterSettings::default(),
            layout: CompositeLayout::default(),
        }
    }
}

impl BatchConfig {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| LeafError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| LeafError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}
