//! Provides abstractions for generating embeddings from images.
//!
//! This module defines the `ImageEmbedder` trait, the boundary to the
//! embedding model that turns a decoded image into a fixed-length feature
//! vector. Embeddings capture visual content and are the unit of comparison
//! for similarity ranking; everything above this trait treats the model as
//! an opaque, deterministic capability.

use image::imageops::FilterType;
use image::RgbImage;

/// A trait for providers that can generate embeddings from image data.
///
/// Implementations must be deterministic: the same image must always
/// produce the same vector, because vectors cached by earlier runs are
/// compared against freshly computed ones.
///
/// The `Send` and `Sync` bounds are required to allow the embedder to be
/// used from concurrent request handlers.
pub trait ImageEmbedder: Send + Sync {
  /// The length of the vectors this embedder produces.
  fn dimension(&self) -> usize;

  /// Generates an embedding vector for a decoded RGB image.
  ///
  /// # Returns
  ///
  /// A `Result` containing the embedding as a `Vec<f32>` of length
  /// [`dimension`](Self::dimension) on success, or an error string on
  /// failure. Failures are not retried by callers.
  fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, String>;
}

/// Side length images are scaled to before the histogram is taken.
const RESIZE_EDGE: u32 = 64;

/// A model-free `ImageEmbedder` based on per-channel color histograms.
///
/// The image is scaled to a small fixed size, each RGB channel is bucketed
/// into `bins` intensity bins, and the concatenated counts are
/// L2-normalized. This is no substitute for a learned model, but it is
/// deterministic, fast, needs no weights on disk, and ranks identical or
/// near-identical images at the top, which makes it the default provider
/// and the one the tests run against.
pub struct HistogramEmbedder {
  /// Number of intensity bins per channel.
  bins: usize,
}

impl HistogramEmbedder {
  /// Creates a new `HistogramEmbedder` with the given bins per channel.
  pub fn new(bins: usize) -> Self {
    Self { bins }
  }
}

impl Default for HistogramEmbedder {
  /// Creates a `HistogramEmbedder` with 16 bins per channel (48 dims).
  fn default() -> Self {
    Self::new(16)
  }
}

impl ImageEmbedder for HistogramEmbedder {
  fn dimension(&self) -> usize {
    self.bins * 3
  }

  fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, String> {
    if self.bins == 0 || self.bins > 256 {
      return Err(format!("invalid bin count {}", self.bins));
    }

    let resized = image::imageops::resize(image, RESIZE_EDGE, RESIZE_EDGE, FilterType::Triangle);

    let mut hist = vec![0f32; self.bins * 3];
    for pixel in resized.pixels() {
      let r = (pixel[0] as usize * self.bins) / 256;
      let g = (pixel[1] as usize * self.bins) / 256;
      let b = (pixel[2] as usize * self.bins) / 256;
      hist[r] += 1.0;
      hist[self.bins + g] += 1.0;
      hist[2 * self.bins + b] += 1.0;
    }

    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
    Ok(hist.iter().map(|v| v / norm).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn solid(r: u8, g: u8, b: u8) -> RgbImage {
    RgbImage::from_pixel(8, 8, image::Rgb([r, g, b]))
  }

  #[test]
  fn embedding_is_deterministic_and_normalized() {
    let embedder = HistogramEmbedder::default();
    let img = solid(200, 40, 90);

    let a = embedder.embed(&img).unwrap();
    let b = embedder.embed(&img).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), embedder.dimension());

    let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
  }

  #[test]
  fn different_colors_produce_different_vectors() {
    let embedder = HistogramEmbedder::default();
    let red = embedder.embed(&solid(255, 0, 0)).unwrap();
    let blue = embedder.embed(&solid(0, 0, 255)).unwrap();
    assert_ne!(red, blue);
  }
}
