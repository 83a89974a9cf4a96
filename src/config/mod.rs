use anyhow::{Context, bail};
use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:18859/";
pub const DEFAULT_RUN_SECONDS: u64 = 20;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub root_dir: PathBuf,
    pub extension: String,
    pub users: Option<usize>,
    pub run_seconds: u64,
    pub pre_request_delay: DelayRange,
    pub post_request_delay: DelayRange,
    pub request_timeout_ms: Option<u64>,
}

/// Inclusive millisecond bounds for a uniformly random sleep.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            root_dir: PathBuf::from("."),
            extension: "txt".to_string(),
            users: None,
            run_seconds: DEFAULT_RUN_SECONDS,
            pre_request_delay: DelayRange::new(100, 2000),
            post_request_delay: DelayRange::new(100, 4000),
            request_timeout_ms: None,
        }
    }
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                Self::from_file(path).with_context(|| format!("loading config from {}", path))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.base_url.starts_with("http://") {
            bail!("base_url must be an http:// URL, got {}", self.base_url);
        }
        if !self.base_url.ends_with('/') {
            bail!("base_url must end with '/', got {}", self.base_url);
        }
        if self.extension.is_empty() {
            bail!("extension must not be empty");
        }
        if self.run_seconds == 0 {
            bail!("run_seconds must be at least 1");
        }
        if self.users == Some(0) {
            bail!("users must be at least 1");
        }
        for (name, range) in [
            ("pre_request_delay", self.pre_request_delay),
            ("post_request_delay", self.post_request_delay),
        ] {
            if range.min_ms > range.max_ms {
                bail!(
                    "{}: min_ms ({}) is greater than max_ms ({})",
                    name,
                    range.min_ms,
                    range.max_ms
                );
            }
        }
        Ok(())
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_seconds)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
