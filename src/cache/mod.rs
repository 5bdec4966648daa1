//! Sidecar-file caches for derived image attributes.
//!
//! Each cache stores one small file next to the source image, named by
//! appending a suffix to the full source path. Presence of the sidecar is
//! the cache-hit signal; its content is trusted without a checksum. Writes
//! go through a temp file in the same directory and a rename, so a crash
//! mid-write can never leave a partial sidecar that would then be trusted
//! on the next read.

mod features;
mod palette;

pub use features::{FeatureCache, FEATURES_SUFFIX};
pub use palette::{PaletteCache, PALETTE_SUFFIX};

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{IdentError, Result};

/// Decodes the image at `path` into RGB, sniffing the format from the
/// file content. Uploads land in extensionless scratch files, so the
/// extension alone cannot be trusted to name the format.
pub(crate) fn open_image(path: &Path) -> Result<RgbImage> {
  let reader = image::ImageReader::open(path)
    .and_then(|reader| reader.with_guessed_format())
    .map_err(|e| IdentError::Decode {
      path: path.to_path_buf(),
      source: image::ImageError::IoError(e),
    })?;
  let image = reader.decode().map_err(|source| IdentError::Decode {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(image.to_rgb8())
}

/// Builds the sidecar path for `source`: the full path plus `suffix`.
pub fn sidecar_path(source: &Path, suffix: &str) -> PathBuf {
  let mut os = source.as_os_str().to_owned();
  os.push(suffix);
  PathBuf::from(os)
}

/// Atomically replaces `target` with `bytes` (write-temp-then-rename).
fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
  let dir = target.parent().unwrap_or_else(|| Path::new("."));
  let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
  tmp.write_all(bytes)?;
  tmp.persist(target).map_err(|e| e.error)?;
  Ok(())
}
