use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use image::RgbImage;
use lookalike::cache::{FeatureCache, PaletteCache};
use lookalike::config::ServiceConfig;
use lookalike::corpus::CorpusLoader;
use lookalike::embeddings::HistogramEmbedder;
use lookalike::index::SimilarityIndex;
use lookalike::palette::BucketQuantizer;
use lookalike::server::QueryService;
use tempfile::TempDir;

const BASE_URL: &str = "http://art.test";

struct TestService {
  port: u16,
  index: Arc<SimilarityIndex>,
  dir: TempDir,
}

impl TestService {
  fn corpus_path(&self, name: &str) -> PathBuf {
    self.dir.path().join(name)
  }
}

fn write_png(path: &Path, r: u8, g: u8, b: u8) {
  RgbImage::from_pixel(16, 16, image::Rgb([r, g, b]))
    .save(path)
    .unwrap();
}

/// Corpus: a red image, a near-red one, and a blue one that falls under
/// the default cutoff for red queries.
fn start(cutoff: f32) -> TestService {
  let dir = tempfile::tempdir().unwrap();
  write_png(&dir.path().join("red.png"), 250, 10, 10);
  write_png(&dir.path().join("rose.png"), 230, 30, 30);
  write_png(&dir.path().join("blue.png"), 10, 10, 250);

  let root = dir.path().to_string_lossy().into_owned();
  let config = ServiceConfig::new(dir.path())
    .port(0)
    .cutoff(cutoff)
    .base_url(BASE_URL)
    .root_prefix(root);

  let features = Arc::new(FeatureCache::new(Arc::new(HistogramEmbedder::default())));
  let loader = CorpusLoader::new(
    Arc::clone(&features),
    PaletteCache::new(Arc::new(BucketQuantizer::default())),
    config.clone(),
  );
  let index = Arc::new(SimilarityIndex::new());
  loader.load(&index, dir.path(), true).unwrap();

  let service =
    Arc::new(QueryService::bind(Arc::clone(&index), features, loader, config).unwrap());
  let port = service.port();
  thread::spawn(move || service.run());

  TestService { port, index, dir }
}

/// Minimal blocking HTTP client; returns (status, headers, body).
fn http(port: u16, head: &str, body: &[u8]) -> (u16, String, Vec<u8>) {
  let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
  stream.write_all(head.as_bytes()).unwrap();
  stream.write_all(body).unwrap();

  let mut raw = Vec::new();
  stream.read_to_end(&mut raw).unwrap();

  let split = raw
    .windows(4)
    .position(|w| w == b"\r\n\r\n")
    .expect("malformed response");
  let headers = String::from_utf8_lossy(&raw[..split]).into_owned();
  let status: u16 = headers
    .lines()
    .next()
    .and_then(|line| line.split_whitespace().nth(1))
    .and_then(|code| code.parse().ok())
    .expect("missing status line");
  (status, headers, raw[split + 4..].to_vec())
}

fn get(port: u16, path: &str) -> (u16, String, Vec<u8>) {
  let head = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
  http(port, &head, &[])
}

fn post(port: u16, path: &str, body: &[u8]) -> (u16, String, Vec<u8>) {
  let head = format!(
    "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
    body.len()
  );
  http(port, &head, body)
}

fn ranked(body: &[u8]) -> Vec<(String, f32)> {
  serde_json::from_slice(body).unwrap()
}

#[test]
fn options_preflight_allows_everything() {
  let service = start(0.4);
  let head = "OPTIONS / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
  let (status, headers, body) = http(service.port, head, &[]);

  assert_eq!(status, 200);
  assert_eq!(body, b"{}");
  let headers = headers.to_ascii_lowercase();
  assert!(headers.contains("access-control-allow-origin: *"));
  assert!(headers.contains("access-control-allow-methods"));
}

#[test]
fn post_with_empty_body_is_rejected() {
  let service = start(0.4);
  let before = service.index.len();

  let (status, _, body) = post(service.port, "/", &[]);
  assert_eq!(status, 500);
  assert_eq!(body, b"Missing body");
  assert_eq!(service.index.len(), before, "index must stay unmodified");
}

#[test]
fn post_ranks_the_identical_image_first() {
  let service = start(0.4);
  let red_bytes = fs::read(service.corpus_path("red.png")).unwrap();

  let (status, headers, body) = post(service.port, "/", &red_bytes);
  assert_eq!(status, 200);
  assert!(headers.to_ascii_lowercase().contains("content-type: text/json"));

  let matches = ranked(&body);
  assert_eq!(matches[0].0, format!("{BASE_URL}/red.png"));
  assert!(matches[0].1 > 0.999);

  // Scores strictly descend and respect the cutoff.
  for pair in matches.windows(2) {
    assert!(pair[0].1 >= pair[1].1);
  }
  assert!(matches.iter().all(|(_, score)| *score > 0.4));
  assert!(
    matches.iter().any(|(path, _)| path.ends_with("/rose.png")),
    "near-duplicate should clear the cutoff"
  );
  assert!(
    !matches.iter().any(|(path, _)| path.ends_with("/blue.png")),
    "dissimilar image should be cut off"
  );
}

#[test]
fn lower_cutoff_admits_weaker_matches() {
  let service = start(0.1);
  let red_bytes = fs::read(service.corpus_path("red.png")).unwrap();

  let (status, _, body) = post(service.port, "/", &red_bytes);
  assert_eq!(status, 200);

  let matches = ranked(&body);
  assert!(matches.iter().any(|(path, _)| path.ends_with("/blue.png")));
  assert_eq!(matches[0].0, format!("{BASE_URL}/red.png"));
}

#[test]
fn post_results_are_deterministic() {
  let service = start(0.1);
  let red_bytes = fs::read(service.corpus_path("red.png")).unwrap();

  let (_, _, first) = post(service.port, "/", &red_bytes);
  let (_, _, second) = post(service.port, "/", &red_bytes);
  assert_eq!(ranked(&first), ranked(&second));
}

#[test]
fn get_serves_indexed_files_only() {
  let service = start(0.4);
  let red = service.corpus_path("red.png");
  let key = red.to_string_lossy();

  let (status, headers, body) = get(service.port, &key);
  assert_eq!(status, 200);
  assert!(headers.to_ascii_lowercase().contains("content-type: image/png"));
  assert!(headers.to_ascii_lowercase().contains("accept-ranges: bytes"));
  assert_eq!(body, fs::read(&red).unwrap());

  let (status, _, _) = get(service.port, "/never/indexed.png");
  assert_eq!(status, 404);
}

#[test]
fn paths_outside_the_corpus_root_are_never_registered() {
  let service = start(0.4);

  // An image that exists on disk but lives outside the corpus directory.
  let outside_dir = tempfile::tempdir().unwrap();
  let secret = outside_dir.path().join("secret.png");
  write_png(&secret, 40, 40, 40);
  let key = secret.to_string_lossy().into_owned();

  let upload = fs::read(&secret).unwrap();
  let (status, _, _) = post(service.port, &key, &upload);
  assert_eq!(status, 200, "the query itself still runs");

  assert!(!service.index.contains(&key));
  let (status, _, _) = get(service.port, &key);
  assert_eq!(status, 404, "outside paths must stay unserved");
  assert!(
    !lookalike::cache::sidecar_path(&secret, lookalike::cache::FEATURES_SUFFIX).exists(),
    "no sidecars may be written outside the corpus"
  );
  assert!(!lookalike::cache::sidecar_path(&secret, lookalike::cache::PALETTE_SUFFIX).exists());
}

#[test]
fn post_lazily_registers_a_new_on_disk_image() {
  let service = start(0.4);

  // Dropped into the corpus directory after startup.
  let late = service.corpus_path("late.png");
  write_png(&late, 10, 250, 10);
  let key = late.to_string_lossy().into_owned();

  let (status, _, _) = get(service.port, &key);
  assert_eq!(status, 404, "not indexed until a query names it");

  let upload = fs::read(&late).unwrap();
  let (status, _, body) = post(service.port, &key, &upload);
  assert_eq!(status, 200);
  let matches = ranked(&body);
  assert_eq!(matches[0].0, format!("{BASE_URL}/late.png"));

  let (status, _, bytes) = get(service.port, &key);
  assert_eq!(status, 200);
  assert_eq!(bytes, fs::read(&late).unwrap());
}
