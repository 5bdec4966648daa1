//! HTTP front end serving similarity queries and known files.
//!
//! One worker thread per accepted request; all handling is blocking within
//! its own thread. The surface is deliberately small: an OPTIONS preflight
//! responder, POST for similarity queries (body is the raw image bytes),
//! and GET for files the index knows about. Every response carries
//! permissive CORS headers so browser frontends can call the service
//! directly.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, error, info, warn};

use crate::cache::FeatureCache;
use crate::config::ServiceConfig;
use crate::corpus::CorpusLoader;
use crate::error::{IdentError, Result};
use crate::index::SimilarityIndex;
use crate::types::RankedMatch;

/// The HTTP boundary of the service.
pub struct QueryService {
  server: Server,
  index: Arc<SimilarityIndex>,
  features: Arc<FeatureCache>,
  loader: CorpusLoader,
  config: ServiceConfig,
}

impl QueryService {
  /// Binds the listener on the configured port.
  pub fn bind(
    index: Arc<SimilarityIndex>,
    features: Arc<FeatureCache>,
    loader: CorpusLoader,
    config: ServiceConfig,
  ) -> Result<Self> {
    let server = Server::http(("0.0.0.0", config.port))
      .map_err(|e| IdentError::Server(format!("cannot bind port {}: {e}", config.port)))?;
    Ok(Self {
      server,
      index,
      features,
      loader,
      config,
    })
  }

  /// The port actually bound. Differs from the configured port when that
  /// was 0.
  pub fn port(&self) -> u16 {
    match self.server.server_addr().to_ip() {
      Some(addr) => addr.port(),
      None => self.config.port,
    }
  }

  /// Accept loop: spawns one worker thread per request and never blocks
  /// on request processing itself.
  pub fn run(self: Arc<Self>) {
    info!(port = self.port(), "serving similarity queries");
    loop {
      let request = match self.server.recv() {
        Ok(request) => request,
        Err(err) => {
          error!(%err, "accept failed, shutting down");
          break;
        }
      };
      let service = Arc::clone(&self);
      thread::spawn(move || service.handle(request));
    }
  }

  fn handle(&self, request: Request) {
    // The original frontends sometimes double up slashes in paths.
    let path = request.url().replace("//", "/");
    debug!(method = %request.method(), %path, "request");

    match request.method().clone() {
      Method::Options => respond_json(request, 200, &serde_json::json!({})),
      Method::Post => self.handle_post(request, &path),
      Method::Get => self.handle_get(request, &path),
      _ => respond_error(request, 405, "Method not allowed"),
    }
  }

  /// POST: rank the corpus against the uploaded image bytes.
  fn handle_post(&self, mut request: Request, path: &str) {
    let mut body = Vec::new();
    if let Err(err) = request.as_reader().read_to_end(&mut body) {
      error!(%err, "failed to read upload body");
      respond_error(request, 500, "Internal error");
      return;
    }

    match self.identify(&body, path) {
      Ok(matches) => {
        let pairs: Vec<(String, f32)> = matches.into_iter().map(RankedMatch::into_pair).collect();
        match serde_json::to_value(&pairs) {
          Ok(value) => respond_json(request, 200, &value),
          Err(err) => {
            error!(%err, "failed to encode result");
            respond_error(request, 500, "Internal error");
          }
        }
      }
      Err(IdentError::Protocol(msg)) => {
        warn!(%msg, "rejected upload");
        respond_error(request, 500, &msg);
      }
      Err(err) => {
        error!(%err, "similarity query failed");
        respond_error(request, 500, "Internal error");
      }
    }
  }

  /// The identification pipeline for one uploaded image.
  ///
  /// When the request path names an on-disk image under the corpus root
  /// that is not yet indexed, it is registered first, so the index can
  /// grow at runtime without a restart. Paths outside the corpus root are
  /// never registered, no matter what exists on disk there. The uploaded
  /// bytes go through the regular feature cache via a scratch directory,
  /// which also cleans up the query's sidecar.
  fn identify(&self, body: &[u8], path: &str) -> Result<Vec<RankedMatch>> {
    if body.is_empty() {
      return Err(IdentError::Protocol("Missing body".into()));
    }

    let target = Path::new(path);
    if target.starts_with(&self.config.corpus_dir)
      && self.config.accepts_extension(target)
      && !self.index.contains(path)
      && target.is_file()
    {
      if let Err(err) = self.loader.register(&self.index, target) {
        warn!(%path, %err, "lazy registration failed");
      }
    }

    let scratch = tempfile::tempdir().map_err(IdentError::cache_io("upload"))?;
    let upload = scratch.path().join("upload");
    fs::write(&upload, body).map_err(IdentError::cache_io(&upload))?;

    let query = self.features.features(&upload)?;
    let mut matches = self.index.rank(&query, self.config.cutoff);
    for entry in &mut matches {
      entry.path = self.config.public_path(&entry.path);
    }
    Ok(matches)
  }

  /// GET: stream a file back, but only if the index knows the path.
  fn handle_get(&self, request: Request, path: &str) {
    match self.fetch(path) {
      Ok(bytes) => {
        let mut response = Response::from_data(bytes).with_status_code(200);
        for h in base_headers() {
          response.add_header(h);
        }
        if let Some(content_type) = header("Content-Type", guess_mime(Path::new(path))) {
          response.add_header(content_type);
        }
        finish(request, response);
      }
      Err(IdentError::NotFound) => {
        debug!(%path, "unknown file requested");
        respond_error(request, 404, "Not found");
      }
      Err(err) => {
        error!(%path, %err, "failed to read indexed file");
        respond_error(request, 500, "Internal error");
      }
    }
  }

  /// Loads the bytes for a path, requiring it to be indexed.
  fn fetch(&self, path: &str) -> Result<Vec<u8>> {
    if !self.index.contains(path) {
      return Err(IdentError::NotFound);
    }
    fs::read(path).map_err(IdentError::cache_io(path))
  }
}

/// Guesses a MIME type from the file extension.
fn guess_mime(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());
  match ext.as_deref() {
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("png") => "image/png",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    _ => "application/octet-stream",
  }
}

fn header(name: &str, value: &str) -> Option<Header> {
  Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

/// Headers every response carries.
fn base_headers() -> Vec<Header> {
  [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "POST, OPTIONS, GET"),
    ("Access-Control-Allow-Headers", "Content-Type"),
    ("Accept-Ranges", "bytes"),
  ]
  .iter()
  .filter_map(|(name, value)| header(name, value))
  .collect()
}

fn respond_json(request: Request, status: u16, body: &serde_json::Value) {
  // from_data, not from_string: the latter injects its own Content-Type.
  let mut response = Response::from_data(body.to_string().into_bytes()).with_status_code(status);
  for h in base_headers() {
    response.add_header(h);
  }
  if let Some(content_type) = header("Content-Type", "text/json") {
    response.add_header(content_type);
  }
  if let Some(encoding) = header("Content-Encoding", "utf-8") {
    response.add_header(encoding);
  }
  finish(request, response);
}

fn respond_error(request: Request, status: u16, message: &str) {
  let mut response = Response::from_data(message.as_bytes().to_vec()).with_status_code(status);
  for h in base_headers() {
    response.add_header(h);
  }
  finish(request, response);
}

fn finish<R: Read>(request: Request, response: Response<R>) {
  if let Err(err) = request.respond(response) {
    debug!(%err, "client went away before the response");
  }
}
