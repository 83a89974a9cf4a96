use anyhow::{Context, Result, bail};
use std::io::{BufRead, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;
use usersim::config::Config;
use usersim::discovery;
use usersim::error::SimError;
use usersim::swarm::Swarm;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("usersim=info,info")),
        )
        .init();

    let config_path = std::env::args().nth(1);
    if let Some(path) = &config_path {
        info!("Loading config from {}", path);
    }
    let config = Config::load(config_path.as_deref())?;
    config.validate()?;

    let files = discovery::collect_files(&config.root_dir, &config.extension)?;
    if files.is_empty() {
        return Err(SimError::NoFiles {
            root: config.root_dir.clone(),
            extension: config.extension.clone(),
        }
        .into());
    }
    info!(
        "Found {} .{} files under {}",
        files.len(),
        config.extension,
        config.root_dir.display()
    );

    let users = match config.users {
        Some(users) => users,
        None => prompt_for_users()?,
    };

    let swarm = Swarm::new(&config, files);
    let report = swarm.run(users).await?;
    report.log_summary();

    Ok(())
}

fn prompt_for_users() -> Result<usize> {
    print!("Enter the number of users: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    parse_users(&line)
}

fn parse_users(line: &str) -> Result<usize> {
    let users: usize = line
        .trim()
        .parse()
        .with_context(|| format!("not a valid number of users: {:?}", line.trim()))?;
    if users == 0 {
        bail!("number of users must be at least 1");
    }
    Ok(users)
}
