// THEORY:
// The corpus is a two-level tree: `<input_root>/<class_label>/<image>`. This
// module owns everything that touches that shape. It finds class folders and
// candidate images, and it maps a source image to its composite's path. That
// path rule is shared with the dataset ledger, so both always agree on where a
// processed image lives.

use crate::error::{LeafError, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions accepted as images, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];
pub const PROCESSED_SUFFIX: &str = "_processed.png";

/// One class folder directly under the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDir {
    pub label: String,
    pub path: PathBuf,
}

/// A candidate image and where its composite will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub source_path: PathBuf,
    pub class_label: String,
    pub output_path: PathBuf,
}

impl ImageJob {
    pub fn new(source_path: PathBuf, class_label: &str, output_root: &Path) -> Self {
        let output_path = output_path_for(output_root, class_label, &source_path);
        Self {
            source_path,
            class_label: class_label.to_string(),
            output_path,
        }
    }

    /// The source file name with its extension, used in the composite title.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// `<output_root>/<class_label>/<stem>_processed.png`, where the stem is the
/// source file name with its last extension removed.
pub fn output_path_for(output_root: &Path, class_label: &str, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_root
        .join(class_label)
        .join(format!("{stem}{PROCESSED_SUFFIX}"))
}

/// Immediate subdirectories of `input_root`, sorted by label. Plain files at
/// the top level are ignored.
pub fn list_class_dirs(input_root: &Path) -> Result<Vec<ClassDir>> {
    if !input_root.is_dir() {
        return Err(LeafError::CorpusNotFound(input_root.to_path_buf()));
    }

    let mut classes = Vec::new();
    for entry in fs::read_dir(input_root).map_err(|e| LeafError::io(input_root, e))? {
        let entry = entry.map_err(|e| LeafError::io(input_root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        classes.push(ClassDir {
            label: entry.file_name().to_string_lossy().into_owned(),
            path,
        });
    }
    classes.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(classes)
}

/// Supported image files directly inside `class_dir`, sorted by path.
pub fn list_images(class_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(class_dir).map_err(|e| LeafError::io(class_dir, e))? {
        let path = entry.map_err(|e| LeafError::io(class_dir, e))?.path();
        if path.is_file() && is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// A class folder and the images found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassListing {
    pub label: String,
    pub path: PathBuf,
    pub images: Vec<PathBuf>,
}

/// Every class with its images, in label order. A class folder that cannot be
/// listed is logged and comes back with no images. Only a missing root fails.
pub fn list_corpus(input_root: &Path) -> Result<Vec<ClassListing>> {
    let classes = list_class_dirs(input_root)?;
    Ok(classes
        .into_iter()
        .map(|class| {
            let images = list_images(&class.path).unwrap_or_else(|e| {
                warn!("Could not list '{}': {}", class.path.display(), e);
                Vec::new()
            });
            ClassListing {
                label: class.label,
                path: class.path,
                images,
            }
        })
        .collect())
}
