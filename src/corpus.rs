//! Registers reference images from a directory tree.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::{FeatureCache, PaletteCache};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::index::SimilarityIndex;
use crate::types::KnownFile;

/// Walks a corpus directory and registers eligible images with the index.
///
/// Loading is idempotent: a path already present in the index is skipped
/// without touching the caches. Files that fail to decode or embed are
/// logged and skipped so a single bad image cannot take the whole corpus
/// down with it.
pub struct CorpusLoader {
  features: Arc<FeatureCache>,
  palette: PaletteCache,
  config: ServiceConfig,
}

impl CorpusLoader {
  pub fn new(features: Arc<FeatureCache>, palette: PaletteCache, config: ServiceConfig) -> Self {
    Self {
      features,
      palette,
      config,
    }
  }

  /// Walks `root` and registers every file with an accepted extension.
  ///
  /// Descends into subdirectories when `recursive` is set. Returns the
  /// number of newly registered files.
  pub fn load(&self, index: &SimilarityIndex, root: &Path, recursive: bool) -> Result<usize> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if !recursive {
      walker = walker.max_depth(1);
    }

    let mut loaded = 0;
    for entry in walker {
      let entry = match entry {
        Ok(entry) => entry,
        Err(err) => {
          warn!(%err, "skipping unreadable corpus entry");
          continue;
        }
      };
      if !entry.file_type().is_file() {
        continue;
      }
      let path = entry.path();
      if !self.config.accepts_extension(path) {
        continue;
      }

      match self.register(index, path) {
        Ok(true) => loaded += 1,
        Ok(false) => {}
        Err(err) => warn!(path = %path.display(), %err, "skipping corpus file"),
      }
    }

    info!(count = loaded, root = %root.display(), "corpus load finished");
    Ok(loaded)
  }

  /// Registers a single file, computing or loading its cached attributes.
  ///
  /// Returns true when the file was newly added to the index. Safe to call
  /// concurrently for the same path; only one caller computes.
  pub fn register(&self, index: &SimilarityIndex, path: &Path) -> Result<bool> {
    let key = path.to_string_lossy().into_owned();
    index.insert_with(&key, || {
      debug!(path = %path.display(), "analyzing file");
      let features = self.features.features(path)?;
      // Palette is a secondary attribute: extraction failure downgrades
      // the entry instead of rejecting it.
      let palette = match self.palette.palette(path) {
        Ok(records) => Some(records),
        Err(err) => {
          warn!(path = %path.display(), %err, "palette extraction failed");
          None
        }
      };
      Ok(KnownFile {
        path: key.clone(),
        features,
        palette,
      })
    })
  }
}
