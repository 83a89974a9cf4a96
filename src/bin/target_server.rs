use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use usersim::target::{DEFAULT_CAPACITY, TargetServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("usersim=debug,info")
        .init();

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(18859);
    let root = std::env::args()
        .nth(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let cache_capacity: usize = std::env::args()
        .nth(3)
        .and_then(|c| c.parse().ok())
        .unwrap_or(DEFAULT_CAPACITY);

    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    Arc::new(TargetServer::with_capacity(root, "txt", cache_capacity)).serve(listener).await
}
