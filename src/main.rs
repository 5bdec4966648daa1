//! Web service for content-based image similarity lookup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lookalike::cache::{FeatureCache, PaletteCache};
use lookalike::config::{ServiceConfig, DEFAULT_CUTOFF, DEFAULT_PORT};
use lookalike::corpus::CorpusLoader;
use lookalike::embeddings::{HistogramEmbedder, ImageEmbedder};
use lookalike::index::SimilarityIndex;
use lookalike::palette::{BucketQuantizer, ColorExtractor};
use lookalike::server::QueryService;

/// Web service for image similarity analysis.
#[derive(Parser, Debug)]
#[command(name = "lookalike", version, about)]
struct Args {
  /// Directory with the reference images.
  #[arg(short, long)]
  dir: PathBuf,

  /// Base URL prepended to result paths.
  #[arg(short, long, default_value = "")]
  baseurl: String,

  /// Root part of the directory, removed before the base URL is applied.
  #[arg(short, long)]
  root: Option<String>,

  /// Port for the server.
  #[arg(short, long, default_value_t = DEFAULT_PORT)]
  port: u16,

  /// Minimum similarity for a match to be reported.
  #[arg(long, default_value_t = DEFAULT_CUTOFF)]
  cutoff: f32,

  /// Only load the top level of the corpus directory.
  #[arg(long)]
  no_recurse: bool,
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  let corpus_dir = args
    .dir
    .canonicalize()
    .with_context(|| format!("corpus directory {}", args.dir.display()))?;

  let mut config = ServiceConfig::new(&corpus_dir)
    .base_url(args.baseurl)
    .port(args.port)
    .cutoff(args.cutoff)
    .recursive(!args.no_recurse);
  if let Some(root) = args.root {
    config = config.root_prefix(root);
  }

  let embedder: Arc<dyn ImageEmbedder> = Arc::new(HistogramEmbedder::default());
  let extractor: Arc<dyn ColorExtractor> = Arc::new(BucketQuantizer::default());
  let features = Arc::new(FeatureCache::new(embedder));
  let palette = PaletteCache::new(extractor);
  let loader = CorpusLoader::new(Arc::clone(&features), palette, config.clone());

  let index = Arc::new(SimilarityIndex::new());
  let loaded = loader
    .load(&index, &corpus_dir, config.recursive)
    .with_context(|| format!("loading corpus from {}", corpus_dir.display()))?;
  tracing::info!(loaded, dir = %corpus_dir.display(), "corpus ready");

  let service = Arc::new(
    QueryService::bind(index, features, loader, config).context("binding HTTP listener")?,
  );
  service.run();
  Ok(())
}
