//! Persistent per-image feature vector cache.

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use super::{sidecar_path, write_atomic};
use crate::embeddings::ImageEmbedder;
use crate::error::{IdentError, Result};
use crate::types::FeatureVector;

/// Suffix appended to a source path to name its feature sidecar.
pub const FEATURES_SUFFIX: &str = ".features";

/// Computes-on-miss, reads-on-hit store of embedding vectors.
///
/// A sidecar hit never touches the embedder; a miss decodes the image,
/// embeds it and persists the vector before returning. A failed
/// computation leaves no sidecar behind, so the next call recomputes.
pub struct FeatureCache {
  embedder: Arc<dyn ImageEmbedder>,
}

impl FeatureCache {
  /// Creates a cache backed by the given embedding provider.
  pub fn new(embedder: Arc<dyn ImageEmbedder>) -> Self {
    Self { embedder }
  }

  /// Returns the feature vector for the image at `path`, computing and
  /// persisting it on the first call.
  pub fn features(&self, path: &Path) -> Result<FeatureVector> {
    let sidecar = sidecar_path(path, FEATURES_SUFFIX);
    if sidecar.exists() {
      let bytes = fs::read(&sidecar).map_err(IdentError::cache_io(&sidecar))?;
      return decode(&bytes).map_err(IdentError::cache_io(&sidecar));
    }

    debug!(path = %path.display(), "feature cache miss");
    let image = super::open_image(path)?;

    let vector = self.embedder.embed(&image).map_err(|reason| IdentError::Embed {
      path: path.to_path_buf(),
      reason,
    })?;

    let mut bytes = Vec::with_capacity(4 + vector.len() * 4);
    encode(&mut bytes, &vector).map_err(IdentError::cache_io(&sidecar))?;
    write_atomic(&sidecar, &bytes).map_err(IdentError::cache_io(&sidecar))?;

    Ok(vector)
  }
}

/// Sidecar wire format: u32 LE dimension, then that many f32 LE values.
fn encode(out: &mut impl io::Write, vector: &[f32]) -> io::Result<()> {
  out.write_u32::<LittleEndian>(vector.len() as u32)?;
  for value in vector {
    out.write_f32::<LittleEndian>(*value)?;
  }
  Ok(())
}

fn decode(bytes: &[u8]) -> io::Result<FeatureVector> {
  let mut cursor = Cursor::new(bytes);
  let len = cursor.read_u32::<LittleEndian>()? as usize;
  let mut vector = Vec::with_capacity(len.min(bytes.len() / 4));
  for _ in 0..len {
    vector.push(cursor.read_f32::<LittleEndian>()?);
  }
  Ok(vector)
}
