use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repost_spool::config::{Config, StateLayout};
use repost_spool::invoker::{AccessToken, HttpInvoker, OAuthSigner};
use repost_spool::persistence::Persister;
use repost_spool::stream::{StreamClient, run_session};
use repost_spool::worker::{Consumer, ConsumerConfig};

#[derive(Debug, Parser)]
#[command(name = "repost-spool", version, about = "Archive a filtered stream and repost each event once")]
struct Cli {
    /// Path to the YAML configuration file.
    config: PathBuf,

    /// Directory holding the archive, the queue and the access token.
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to the stream and persist every event.
    Save,
    /// Drain the queue, reposting each event.
    Repost,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repost_spool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(never) => match never {},
        Err(e) => {
            error!("Stopping: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Infallible> {
    let config = Config::load(&cli.config)?;
    let layout = StateLayout::new(&cli.state_dir);
    layout.ensure()?;
    let signer = signer(&config, &layout.oauth)?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("repost-spool/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;

    match cli.command {
        Command::Save => {
            let persister = Persister::new(&layout.archive, &layout.queue);
            let stream = StreamClient::new(client, &config.stream_url, signer);
            info!(url = %config.stream_url, keywords = config.keywords.len(), "Connecting");
            let reader = stream
                .connect(&config.keywords)
                .await
                .context("connecting to stream")?;
            let never = run_session(reader, &persister, config.stall_timeout())
                .await
                .context("stream session ended")?;
            Ok(never)
        }
        Command::Repost => {
            let invoker = HttpInvoker::new(client, &config.api_url, signer);
            let consumer = Consumer::new(ConsumerConfig::new(&layout.queue), invoker);
            let never = consumer.run().await.context("consumer stopped")?;
            Ok(never)
        }
    }
}

fn signer(config: &Config, oauth_path: &Path) -> Result<OAuthSigner> {
    let access = AccessToken::load(oauth_path).with_context(|| {
        format!(
            "no access token; write {{\"token\", \"token_secret\"}} to {}",
            oauth_path.display()
        )
    })?;
    Ok(OAuthSigner::new(
        &config.oauth.key,
        &config.oauth.secret,
        access,
    ))
}
