use crate::error::{LeafError, Result};
use image::{ImageEncoder, RgbImage};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Suffix of in-flight temp files. Anything carrying it is never a finished composite.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Decodes any supported raster file into 8-bit RGB.
pub fn decode(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).map_err(|source| LeafError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Encodes `image` as PNG into a uniquely named temp file next to `path` and
/// renames it into place, so a killed run never leaves a truncated file under
/// the final name and concurrent writers never share a temp file.
pub fn save_png_atomic(image: &RgbImage, path: &Path) -> Result<()> {
    let write_err = |source: image::ImageError| LeafError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|e| write_err(e.into()))?;

    let prefix = format!(
        ".{}.",
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| write_err(e.into()))?;

    {
        let mut output = BufWriter::new(temp.as_file_mut());
        let encoder = image::codecs::png::PngEncoder::new(&mut output);
        encoder
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(write_err)?;
        output.flush().map_err(|e| write_err(e.into()))?;
    }

    // An unpersisted temp file is deleted when dropped.
    temp.persist(path).map_err(|e| write_err(e.error.into()))?;
    Ok(())
}

/// Deletes leftover temp files in `dir` from an interrupted run. Returns how many were removed.
pub fn sweep_partial_files(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).map_err(|e| LeafError::io(dir, e))? {
        let path = entry.map_err(|e| LeafError::io(dir, e))?.path();
        let is_partial = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX))
            .unwrap_or(false);
        if is_partial && path.is_file() {
            fs::remove_file(&path).map_err(|e| LeafError::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}
