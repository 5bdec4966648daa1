//! Lookalike - a content-based image similarity lookup service.
//!
//! Lookalike indexes a corpus of reference images and answers HTTP queries
//! with the corpus members ranked by visual similarity to an uploaded
//! image. Feature vectors and palettes are cached in sidecar files next to
//! the images, so repeated runs never recompute them; ranking is a
//! brute-force cosine scan over the in-memory index.

pub mod cache;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod palette;
pub mod server;
pub mod types;

pub mod prelude {
  //! Convenient re-exports for common types and traits.

  pub use crate::cache::*;
  pub use crate::config::*;
  pub use crate::corpus::*;
  pub use crate::embeddings::*;
  pub use crate::error::*;
  pub use crate::index::*;
  pub use crate::palette::*;
  pub use crate::server::*;
  pub use crate::types::*;
}
