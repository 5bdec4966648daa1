//! Error taxonomy for the identification pipeline.
//!
//! Every failure kind maps deterministically to an HTTP status in the
//! server layer: `NotFound` becomes 404, everything else becomes a generic
//! 500 while the detailed cause is logged server-side.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IdentError>;

/// Failures surfaced by the identification pipeline.
#[derive(Debug, Error)]
pub enum IdentError {
  /// The image could not be read or decoded.
  #[error("cannot decode image {path}: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },

  /// The embedding provider failed to produce a vector. Not retried.
  #[error("embedding failed for {path}: {reason}")]
  Embed { path: PathBuf, reason: String },

  /// A sidecar cache file could not be read or written.
  #[error("cache i/o on {path}: {source}")]
  CacheIo {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The HTTP request was malformed, e.g. an empty upload body.
  #[error("bad request: {0}")]
  Protocol(String),

  /// A static GET asked for a path that was never indexed.
  #[error("not found")]
  NotFound,

  /// The HTTP listener could not be set up.
  #[error("server error: {0}")]
  Server(String),
}

impl IdentError {
  /// Shorthand for wrapping an `io::Error` with the path it occurred on.
  pub fn cache_io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
    let path = path.into();
    move |source| IdentError::CacheIo { path, source }
  }
}
