use crate::config::DelayRange;
use crate::error::SimError;
use crate::stats::{Outcome, SharedTally};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

pub type HttpClient = Client<HttpConnector, Empty<Bytes>>;

pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

pub fn user_name(index: usize) -> String {
    format!("Echo{}", index + 1)
}

/// Timing knobs shared by every user of a run.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub pre_request: DelayRange,
    pub post_request: DelayRange,
    pub request_timeout: Option<Duration>,
}

/// One simulated client. Picks a random file, waits, fetches it, waits again,
/// until the stop flag is observed at the top of the loop.
pub struct User {
    name: String,
    base_url: Arc<str>,
    files: Arc<[String]>,
    pacing: Pacing,
    client: HttpClient,
    stop: Arc<AtomicBool>,
    tally: SharedTally,
    rng: StdRng,
}

impl User {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        base_url: Arc<str>,
        files: Arc<[String]>,
        pacing: Pacing,
        client: HttpClient,
        stop: Arc<AtomicBool>,
        tally: SharedTally,
        rng: StdRng,
    ) -> Self {
        Self {
            name,
            base_url,
            files,
            pacing,
            client,
            stop,
            tally,
            rng,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of requests issued. A transport failure ends the
    /// user early with that error.
    pub async fn run(mut self) -> Result<u64, SimError> {
        let mut requests = 0u64;

        while !self.stop.load(Ordering::Acquire) {
            let Some(file) = self.files.choose(&mut self.rng).cloned() else {
                warn!("User {} has no files to request", self.name);
                break;
            };

            time::sleep(self.pacing.pre_request.sample(&mut self.rng)).await;

            let url = format!("{}{}", self.base_url, file);
            info!("User {} trying to enter: {}", self.name, url);
            requests += 1;

            match self.visit(&url).await {
                Ok(status) if status == StatusCode::OK => {
                    info!("User {} accessed: {}", self.name, url);
                    self.tally.record(&file, Outcome::Accepted);
                }
                Ok(status) => {
                    error!(
                        "User {} got an error when accessing: {} ({})",
                        self.name, url, status
                    );
                    self.tally.record(&file, Outcome::Rejected);
                }
                Err(e) => {
                    self.tally.record(&file, Outcome::Failed);
                    if e.is_fatal() {
                        error!("User {} stopped: {}", self.name, e);
                        return Err(e);
                    }
                    warn!("User {} skipped a request: {}", self.name, e);
                }
            }

            time::sleep(self.pacing.post_request.sample(&mut self.rng)).await;
        }

        debug!("User {} finished after {} requests", self.name, requests);
        Ok(requests)
    }

    async fn visit(&self, url: &str) -> Result<StatusCode, SimError> {
        let request = Request::get(url)
            .body(Empty::<Bytes>::new())
            .map_err(|source| SimError::InvalidUrl {
                url: url.to_string(),
                source,
            })?;

        let exchange = async {
            let response =
                self.client
                    .request(request)
                    .await
                    .map_err(|source| SimError::Transport {
                        url: url.to_string(),
                        source,
                    })?;
            let status = response.status();
            // drain so the connection can go back to the pool
            response
                .into_body()
                .collect()
                .await
                .map_err(|source| SimError::Body {
                    url: url.to_string(),
                    source,
                })?;
            Ok(status)
        };

        match self.pacing.request_timeout {
            Some(timeout) => time::timeout(timeout, exchange)
                .await
                .map_err(|_| SimError::Timeout {
                    url: url.to_string(),
                    timeout,
                })?,
            None => exchange.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Tally;
    use hyper::Response;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use rand::SeedableRng;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    fn quick_pacing() -> Pacing {
        Pacing {
            pre_request: DelayRange::new(0, 2),
            post_request: DelayRange::new(0, 2),
            request_timeout: None,
        }
    }

    /// Serves 200 for `/ok.txt` and 404 for anything else.
    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                        let status = if req.uri().path() == "/ok.txt" {
                            StatusCode::OK
                        } else {
                            StatusCode::NOT_FOUND
                        };
                        let mut response = Response::new(http_body_util::Full::new(Bytes::from("hi")));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        addr
    }

    fn user(base_url: String, files: &[&str], stop: Arc<AtomicBool>, tally: SharedTally) -> User {
        let files: Arc<[String]> = files.iter().map(|f| f.to_string()).collect();
        User::new(
            user_name(0),
            base_url.into(),
            files,
            quick_pacing(),
            build_client(),
            stop,
            tally,
            StdRng::seed_from_u64(1),
        )
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn non_ok_status_is_logged_at_error_level() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let addr = spawn_server().await;
        let tally = Arc::new(Tally::new());
        let stop = Arc::new(AtomicBool::new(false));
        let u = user(format!("http://{}/", addr), &["missing.txt"], stop.clone(), tally);

        let stopper = stop.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            stopper.store(true, Ordering::Release);
        });
        assert_ok!(u.run().await);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|line| line.contains("got an error when accessing"))
            .expect("rejected request was logged");
        assert!(line.contains("ERROR"), "unexpected level: {}", line);
        assert!(line.contains("missing.txt"));
    }

    #[test]
    fn names_are_one_based() {
        assert_eq!(user_name(0), "Echo1");
        assert_eq!(user_name(9), "Echo10");
    }

    #[tokio::test]
    async fn preset_stop_flag_means_no_requests() {
        let tally = Arc::new(Tally::new());
        let stop = Arc::new(AtomicBool::new(true));
        let u = user("http://127.0.0.1:9/".to_string(), &["ok.txt"], stop, tally.clone());

        assert_eq!(assert_ok!(u.run().await), 0);
        assert_eq!(tally.snapshot().attempted, 0);
    }

    #[tokio::test]
    async fn classifies_ok_and_error_statuses() {
        let addr = spawn_server().await;
        let tally = Arc::new(Tally::new());
        let stop = Arc::new(AtomicBool::new(false));
        let u = user(
            format!("http://{}/", addr),
            &["ok.txt", "missing.txt"],
            stop.clone(),
            tally.clone(),
        );

        let handle = tokio::spawn(u.run());
        time::sleep(Duration::from_millis(300)).await;
        stop.store(true, Ordering::Release);
        let requests = assert_ok!(handle.await.unwrap());

        let report = tally.snapshot();
        assert!(requests > 0);
        assert_eq!(report.attempted, requests);
        assert_eq!(report.failed, 0);
        assert_eq!(report.accepted + report.rejected, requests);
        assert_eq!(report.accepted, report.per_file.get("ok.txt").copied().unwrap_or(0));
        assert_eq!(report.rejected, report.per_file.get("missing.txt").copied().unwrap_or(0));
    }

    #[tokio::test]
    async fn stops_within_one_iteration_of_the_flag() {
        let addr = spawn_server().await;
        let tally = Arc::new(Tally::new());
        let stop = Arc::new(AtomicBool::new(false));
        let u = user(format!("http://{}/", addr), &["ok.txt"], stop.clone(), tally.clone());

        let handle = tokio::spawn(u.run());
        time::sleep(Duration::from_millis(100)).await;
        stop.store(true, Ordering::Release);
        let at_stop = tally.snapshot().attempted;

        let requests = assert_ok!(handle.await.unwrap());
        assert!(requests <= at_stop + 1);
    }

    #[tokio::test]
    async fn connection_refused_ends_the_user() {
        // bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let tally = Arc::new(Tally::new());
        let stop = Arc::new(AtomicBool::new(false));
        let u = user(format!("http://{}/", addr), &["ok.txt"], stop, tally.clone());

        let err = assert_err!(u.run().await);
        assert!(matches!(err, SimError::Transport { .. }));
        let report = tally.snapshot();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn invalid_url_is_skipped_not_fatal() {
        let addr = spawn_server().await;
        let tally = Arc::new(Tally::new());
        let stop = Arc::new(AtomicBool::new(false));
        let u = user(
            format!("http://{}/", addr),
            &["has space.txt"],
            stop.clone(),
            tally.clone(),
        );

        let handle = tokio::spawn(u.run());
        time::sleep(Duration::from_millis(50)).await;
        stop.store(true, Ordering::Release);
        let requests = assert_ok!(handle.await.unwrap());

        let report = tally.snapshot();
        assert!(requests > 0);
        assert_eq!(report.failed, requests);
    }

    #[tokio::test]
    async fn hung_server_hits_the_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accept and never answer
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                held.push(stream);
            }
        });

        let tally = Arc::new(Tally::new());
        let stop = Arc::new(AtomicBool::new(false));
        let mut u = user(format!("http://{}/", addr), &["ok.txt"], stop, tally);
        u.pacing.request_timeout = Some(Duration::from_millis(100));

        let err = assert_err!(u.run().await);
        assert!(matches!(err, SimError::Timeout { .. }));
    }
}
