//! Dominant-color extraction and palette derivation.
//!
//! Colors are a secondary attribute of known files, cached independently
//! of the feature vectors. Extraction is behind the `ColorExtractor` trait
//! so a heavier quantizer can be plugged in; the variant derivation below
//! is fixed, including its thresholds, for compatibility with palettes
//! written by earlier runs.

use std::collections::HashMap;

use image::RgbImage;

use crate::types::ColorRecord;

/// A trait for collaborators that pull dominant colors out of an image.
pub trait ColorExtractor: Send + Sync {
  /// Returns the dominant colors of `image`, most frequent first.
  fn extract(&self, image: &RgbImage) -> Vec<[u8; 3]>;
}

/// Coarse histogram quantizer used as the default `ColorExtractor`.
///
/// Pixels are bucketed by their top three bits per channel, buckets are
/// ranked by pixel count, and each reported color is the average of the
/// pixels that landed in its bucket.
pub struct BucketQuantizer {
  /// Maximum number of colors to report.
  max_colors: usize,
}

impl BucketQuantizer {
  /// Creates a quantizer reporting at most `max_colors` colors.
  pub fn new(max_colors: usize) -> Self {
    Self { max_colors }
  }
}

impl Default for BucketQuantizer {
  fn default() -> Self {
    Self::new(8)
  }
}

impl ColorExtractor for BucketQuantizer {
  fn extract(&self, image: &RgbImage) -> Vec<[u8; 3]> {
    // count + per-channel sums, keyed by the coarse bucket
    let mut buckets: HashMap<(u8, u8, u8), (u64, [u64; 3])> = HashMap::new();
    for pixel in image.pixels() {
      let key = (pixel[0] >> 5, pixel[1] >> 5, pixel[2] >> 5);
      let entry = buckets.entry(key).or_insert((0, [0; 3]));
      entry.0 += 1;
      for (sum, &channel) in entry.1.iter_mut().zip(pixel.0.iter()) {
        *sum += channel as u64;
      }
    }

    let mut ranked: Vec<(u64, [u64; 3])> = buckets.into_values().collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    ranked
      .into_iter()
      .take(self.max_colors)
      .map(|(count, sums)| {
        [
          (sums[0] / count) as u8,
          (sums[1] / count) as u8,
          (sums[2] / count) as u8,
        ]
      })
      .collect()
  }
}

/// Channel sum at or below which a color counts as near-black.
const SUM_DARK_LIMIT: u16 = 200;
/// Channel sum at or above which a color counts as near-white.
const SUM_LIGHT_LIMIT: u16 = 600;
/// Denominator of the lightness factor used for the variants.
const LIGHTNESS_SCALE: f32 = 1485.0;

/// Derives palette records from extracted dominant colors.
///
/// Near-black and near-white colors are dropped as non-distinctive; the
/// survivors get brightness-normalized light and dark variants. Order is
/// preserved.
pub fn derive_palette(colors: &[[u8; 3]]) -> Vec<ColorRecord> {
  colors.iter().filter_map(|&rgb| derive_record(rgb)).collect()
}

fn derive_record(rgb: [u8; 3]) -> Option<ColorRecord> {
  let sum: u16 = rgb.iter().map(|&c| c as u16).sum();
  if sum <= SUM_DARK_LIMIT || sum >= SUM_LIGHT_LIMIT {
    return None;
  }

  let factor = sum as f32 / LIGHTNESS_SCALE;
  Some(ColorRecord {
    actual: hex(rgb),
    light: hex(scale(rgb, 1.0 + factor)),
    dark: hex(scale(rgb, factor)),
    sum,
  })
}

/// Scales each channel by `factor`, rounding and clamping to [0, 255].
fn scale(rgb: [u8; 3], factor: f32) -> [u8; 3] {
  let mut out = [0u8; 3];
  for (o, &c) in out.iter_mut().zip(rgb.iter()) {
    *o = (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
  }
  out
}

fn hex(rgb: [u8; 3]) -> String {
  format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn near_black_and_near_white_boundaries_are_exclusive() {
    // sum exactly 200 -> dropped, 201 -> kept
    assert!(derive_palette(&[[200, 0, 0]]).is_empty());
    assert_eq!(derive_palette(&[[201, 0, 0]]).len(), 1);
    // sum exactly 600 -> dropped, 599 -> kept
    assert!(derive_palette(&[[255, 255, 90]]).is_empty());
    assert_eq!(derive_palette(&[[255, 255, 89]]).len(), 1);
  }

  #[test]
  fn variants_scale_by_the_lightness_factor() {
    // sum = 300, factor = 300/1485; dark = round(100 * 0.2020..) = 20,
    // light = round(100 * 1.2020..) = 120
    let records = derive_palette(&[[100, 100, 100]]);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.actual, "#646464");
    assert_eq!(record.dark, "#141414");
    assert_eq!(record.light, "#787878");
    assert_eq!(record.sum, 300);
  }

  #[test]
  fn light_variant_clamps_at_channel_max() {
    // 255 * (1 + 510/1485) > 255, must clamp
    let records = derive_palette(&[[255, 255, 0]]);
    assert_eq!(records.len(), 1);
    assert!(records[0].light.starts_with("#ffff"));
  }

  #[test]
  fn quantizer_reports_the_dominant_color_first() {
    let mut img = RgbImage::from_pixel(16, 16, image::Rgb([250, 10, 10]));
    // a minority patch of a very different color
    for y in 0..4 {
      for x in 0..4 {
        img.put_pixel(x, y, image::Rgb([10, 10, 250]));
      }
    }

    let colors = BucketQuantizer::default().extract(&img);
    assert!(!colors.is_empty());
    assert_eq!(colors[0], [250, 10, 10]);
    assert!(colors.contains(&[10, 10, 250]));
  }
}
