use crate::config::Config;
use crate::stats::{Report, SharedTally, Tally};
use crate::worker::{self, HttpClient, Pacing, User};
use anyhow::Result;
use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{error, info, warn};

/// Runs a fixed number of users against the target for a fixed window.
pub struct Swarm {
    base_url: Arc<str>,
    files: Arc<[String]>,
    pacing: Pacing,
    run_for: Duration,
    client: HttpClient,
    stop: Arc<AtomicBool>,
    tally: SharedTally,
}

impl Swarm {
    pub fn new(config: &Config, files: Vec<String>) -> Self {
        Self {
            base_url: config.base_url.as_str().into(),
            files: files.into(),
            pacing: Pacing {
                pre_request: config.pre_request_delay,
                post_request: config.post_request_delay,
                request_timeout: config.request_timeout(),
            },
            run_for: config.run_duration(),
            client: worker::build_client(),
            stop: Arc::new(AtomicBool::new(false)),
            tally: Arc::new(Tally::new()),
        }
    }

    /// Flag the users poll at the top of each iteration.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Spawns `users` workers, lets them run for the configured window, sets the
    /// stop flag and returns once every worker has finished. Consumes the swarm
    /// so the flag and the tally belong to exactly one run.
    pub async fn run(self, users: usize) -> Result<Report> {
        anyhow::ensure!(users > 0, "at least one user is required");
        anyhow::ensure!(!self.files.is_empty(), "no files to request");

        info!(
            "Starting {} users against {} for {}s ({} files)",
            users,
            self.base_url,
            self.run_for.as_secs(),
            self.files.len()
        );
        let start = Instant::now();

        let mut tasks = Vec::with_capacity(users);
        for index in 0..users {
            let user = User::new(
                worker::user_name(index),
                self.base_url.clone(),
                self.files.clone(),
                self.pacing.clone(),
                self.client.clone(),
                self.stop.clone(),
                self.tally.clone(),
                StdRng::from_os_rng(),
            );
            let name = user.name().to_string();
            tasks.push(tokio::spawn(async move { (name, user.run().await) }));
        }

        time::sleep(self.run_for).await;
        self.stop.store(true, Ordering::Release);
        info!("Stop signal sent, waiting for {} users to finish", users);

        let mut faulted = 0;
        let mut per_user = BTreeMap::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((name, Ok(requests))) => {
                    info!("User {} done after {} requests", name, requests);
                    per_user.insert(name, requests);
                }
                Ok((name, Err(e))) => {
                    warn!("User {} ended early: {}", name, e);
                    faulted += 1;
                }
                Err(e) => {
                    error!("User task failed: {}", e);
                    faulted += 1;
                }
            }
        }

        let mut report = self.tally.snapshot();
        report.workers = users;
        report.faulted_workers = faulted;
        report.per_user = per_user;
        report.elapsed = start.elapsed();
        Ok(report)
    }
}
