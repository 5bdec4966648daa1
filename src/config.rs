//! Immutable service configuration.

use std::path::{Path, PathBuf};

/// Similarity score a corpus entry must exceed to appear in results.
pub const DEFAULT_CUTOFF: f32 = 0.4;

/// Port the HTTP front end binds when none is configured.
pub const DEFAULT_PORT: u16 = 8890;

/// Configuration shared by the corpus loader and the HTTP front end.
///
/// Built once at startup and passed by value to constructors; nothing
/// mutates it afterwards. The chainable setters exist so callers can spell
/// out only the fields they care about.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
  /// Directory holding the reference images.
  pub corpus_dir: PathBuf,
  /// Prefix prepended to public paths in query results.
  pub base_url: String,
  /// Internal path prefix removed before the base URL is applied.
  pub root_prefix: Option<String>,
  /// Listening port for the HTTP front end.
  pub port: u16,
  /// Minimum similarity for a match to be reported.
  pub cutoff: f32,
  /// Whether the corpus walk descends into subdirectories.
  pub recursive: bool,
  /// Accepted image extensions, lowercase with a leading dot.
  pub extensions: Vec<String>,
}

impl ServiceConfig {
  /// Creates a configuration for the given corpus directory with default
  /// port, cutoff and extension allow-list.
  pub fn new(corpus_dir: impl Into<PathBuf>) -> Self {
    Self {
      corpus_dir: corpus_dir.into(),
      base_url: String::new(),
      root_prefix: None,
      port: DEFAULT_PORT,
      cutoff: DEFAULT_CUTOFF,
      recursive: true,
      extensions: vec![".jpg".into(), ".jpeg".into(), ".png".into()],
    }
  }

  /// Sets the base URL prepended to result paths.
  pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    self
  }

  /// Sets the internal prefix stripped from result paths.
  pub fn root_prefix(mut self, root_prefix: impl Into<String>) -> Self {
    self.root_prefix = Some(root_prefix.into());
    self
  }

  /// Sets the listening port.
  pub fn port(mut self, port: u16) -> Self {
    self.port = port;
    self
  }

  /// Sets the similarity cutoff.
  pub fn cutoff(mut self, cutoff: f32) -> Self {
    self.cutoff = cutoff;
    self
  }

  /// Sets whether the corpus walk recurses into subdirectories.
  pub fn recursive(mut self, recursive: bool) -> Self {
    self.recursive = recursive;
    self
  }

  /// True when `path` carries an allow-listed image extension.
  ///
  /// The match is case-insensitive; files without an extension never match.
  pub fn accepts_extension(&self, path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
      return false;
    };
    let ext = format!(".{}", ext.to_ascii_lowercase());
    self.extensions.iter().any(|allowed| *allowed == ext)
  }

  /// Maps an internal corpus path to the public path reported to clients.
  pub fn public_path(&self, path: &str) -> String {
    let stripped = match &self.root_prefix {
      Some(root) => path.replace(root.as_str(), ""),
      None => path.to_string(),
    };
    format!("{}{}", self.base_url, stripped)
  }
}
