mod cache;

pub use cache::{DEFAULT_CAPACITY, WordCountCache};

use crate::discovery;
use anyhow::Result;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const INDEX_PAGE: &str = "<html><body><h1>Capital word counter</h1>\
<p>Request <code>/&lt;file&gt;</code> to count its capitalized words.</p></body></html>";

/// Minimal file server to point a simulation at. Answers `GET /<name>` with the
/// number of capitalized words in the shallowest matching file under `root`.
pub struct TargetServer {
    root: PathBuf,
    extension: String,
    counts: Mutex<WordCountCache>,
}

enum Lookup {
    Found(usize),
    Missing,
    Failed(std::io::Error),
}

impl TargetServer {
    pub fn new(root: PathBuf, extension: impl Into<String>) -> Self {
        Self::with_capacity(root, extension, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(root: PathBuf, extension: impl Into<String>, capacity: usize) -> Self {
        Self {
            root,
            extension: extension.into(),
            counts: Mutex::new(WordCountCache::new(capacity)),
        }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        info!("Serving .{} files from {}", self.extension, self.root.display());
        info!("Word count cache capacity: {}", self.counts.lock().await.capacity());

        loop {
            match listener.accept().await {
                Ok((stream, client_addr)) => {
                    debug!("New connection from {}", client_addr);
                    let server = self.clone();

                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let server = server.clone();
                            async move {
                                Ok::<_, Infallible>(server.respond(req.method(), req.uri().path()).await)
                            }
                        });
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            error!("Error serving connection from {}: {}", client_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    pub async fn respond(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        if method != Method::GET {
            warn!("Received non-GET request: {} {}", method, path);
            return reply(StatusCode::METHOD_NOT_ALLOWED, "");
        }
        info!("New request received: GET {}", path);

        if path == "/" {
            return reply(StatusCode::OK, INDEX_PAGE);
        }
        if path == "/favicon.ico" {
            return reply(StatusCode::FORBIDDEN, "");
        }

        let Some(name) = single_segment(path) else {
            warn!("Bad request: GET {}", path);
            return reply(StatusCode::BAD_REQUEST, "");
        };
        if !discovery::has_extension(Path::new(name), &self.extension) {
            return reply(StatusCode::NOT_FOUND, "");
        }

        match self.lookup(name).await {
            Lookup::Found(count) => {
                debug!("Response sent for GET {}", path);
                reply(
                    StatusCode::OK,
                    &format!(
                        "<html><body><h1>{}</h1><p>Capitalized words: {}</p></body></html>",
                        name, count
                    ),
                )
            }
            Lookup::Missing => {
                warn!("File not found: {}", name);
                reply(StatusCode::NOT_FOUND, "")
            }
            Lookup::Failed(e) => {
                error!("Error processing GET {}: {}", path, e);
                reply(StatusCode::INTERNAL_SERVER_ERROR, "")
            }
        }
    }

    async fn lookup(&self, name: &str) -> Lookup {
        if let Some(count) = self.counts.lock().await.get(name) {
            return Lookup::Found(count);
        }

        let root = self.root.clone();
        let owned = name.to_string();
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<Option<usize>> {
            let Some(path) = find_file(&root, &owned) else {
                return Ok(None);
            };
            let text = std::fs::read_to_string(path)?;
            Ok(Some(count_capital_words(&text)))
        })
        .await;

        match result {
            Ok(Ok(Some(count))) => {
                self.counts.lock().await.insert(name.to_string(), count);
                Lookup::Found(count)
            }
            Ok(Ok(None)) => Lookup::Missing,
            Ok(Err(e)) => Lookup::Failed(e),
            Err(e) => Lookup::Failed(std::io::Error::other(e)),
        }
    }
}

fn reply(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    if !body.is_empty() {
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("text/html"),
        );
    }
    response
}

fn single_segment(path: &str) -> Option<&str> {
    let name = path.strip_prefix('/')?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name)
}

/// Finds the file called `name` closest to `root`. Among matches at the same
/// depth the walk order decides.
fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    let mut best: Option<(usize, PathBuf)> = None;
    for entry in discovery::walker(root).flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) || entry.file_name() != name {
            continue;
        }
        let depth = entry.depth();
        if best.as_ref().is_none_or(|(best_depth, _)| depth < *best_depth) {
            best = Some((depth, entry.into_path()));
        }
        if depth == 1 {
            break;
        }
    }
    best.map(|(_, path)| path)
}

/// Words longer than five characters that start with an uppercase letter.
pub fn count_capital_words(text: &str) -> usize {
    text.split(|c: char| c.is_whitespace() || matches!(c, '.' | ',' | ';' | '!' | '?'))
        .filter(|word| {
            word.chars().count() > 5 && word.chars().next().is_some_and(char::is_uppercase)
        })
        .count()
}
