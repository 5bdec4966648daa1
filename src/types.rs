//! Core data types for the lookalike service.

use serde::{Deserialize, Serialize};

/// Type alias for the key identifying a known file.
///
/// Keys are the file paths the corpus loader registered, kept as plain
/// strings because they double as the public HTTP paths for static GETs.
pub type FileKey = String;

/// Type alias for an embedding vector.
///
/// The length is fixed by the embedder that produced it and is the same for
/// every file indexed in one process.
pub type FeatureVector = Vec<f32>;

/// A corpus member registered with the similarity index.
///
/// A `KnownFile` is created once, either during the startup directory scan
/// or lazily the first time its path is queried, and its fields are never
/// rewritten afterwards. The feature vector is the ranking signal; the
/// palette is a secondary attribute carried along for clients that want it.
#[derive(Debug, Clone)]
pub struct KnownFile {
  /// The file path, also used as the index key.
  pub path: FileKey,
  /// The embedding vector computed from the image content.
  pub features: FeatureVector,
  /// Representative colors, if palette extraction succeeded for this file.
  pub palette: Option<Vec<ColorRecord>>,
}

/// One dominant color extracted from an image, with derived display
/// variants.
///
/// The `light` and `dark` variants are brightness-normalized versions of
/// `actual`; `sum` is the R+G+B channel sum the normalization was derived
/// from. Serialized as-is into `.palette` sidecar files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRecord {
  /// The extracted color as a `#rrggbb` hex string.
  pub actual: String,
  /// A lighter variant of the color.
  pub light: String,
  /// A darker variant of the color.
  pub dark: String,
  /// The channel sum of the extracted color, in [0, 765].
  pub sum: u16,
}

/// A single entry of a ranked similarity query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
  /// Path of the matched corpus member.
  pub path: FileKey,
  /// Cosine similarity to the query, in [-1, 1].
  pub score: f32,
}

impl RankedMatch {
  /// Creates a new match entry.
  pub fn new(path: impl Into<FileKey>, score: f32) -> Self {
    Self {
      path: path.into(),
      score,
    }
  }

  /// The `[path, score]` pair form used on the wire.
  pub fn into_pair(self) -> (FileKey, f32) {
    (self.path, self.score)
  }
}
