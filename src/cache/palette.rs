//! Persistent per-image palette cache.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{sidecar_path, write_atomic};
use crate::error::{IdentError, Result};
use crate::palette::{derive_palette, ColorExtractor};
use crate::types::ColorRecord;

/// Suffix appended to a source path to name its palette sidecar.
pub const PALETTE_SUFFIX: &str = ".palette";

/// Computes-on-miss, reads-on-hit store of palette records.
///
/// Same discipline as the feature cache, keyed by a different suffix and
/// computed by a separate collaborator. Sidecars are JSON so they stay
/// readable by the frontends that consume them directly.
pub struct PaletteCache {
  extractor: Arc<dyn ColorExtractor>,
}

impl PaletteCache {
  /// Creates a cache backed by the given color extractor.
  pub fn new(extractor: Arc<dyn ColorExtractor>) -> Self {
    Self { extractor }
  }

  /// Returns the palette for the image at `path`, computing and
  /// persisting it on the first call.
  pub fn palette(&self, path: &Path) -> Result<Vec<ColorRecord>> {
    let sidecar = sidecar_path(path, PALETTE_SUFFIX);
    if sidecar.exists() {
      let bytes = fs::read(&sidecar).map_err(IdentError::cache_io(&sidecar))?;
      return serde_json::from_slice(&bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        .map_err(IdentError::cache_io(&sidecar));
    }

    debug!(path = %path.display(), "palette cache miss");
    let image = super::open_image(path)?;

    let records = derive_palette(&self.extractor.extract(&image));

    let bytes = serde_json::to_vec(&records)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
      .map_err(IdentError::cache_io(&sidecar))?;
    write_atomic(&sidecar, &bytes).map_err(IdentError::cache_io(&sidecar))?;

    Ok(records)
  }
}
