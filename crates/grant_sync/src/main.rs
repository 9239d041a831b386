use anyhow::Context;
use clap::{Parser, Subcommand};
use grant_sync::{Config, Synchronizer};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "grant-sync")]
#[command(about = "Sync grant registry records into the local cache")]
struct Cli {
    /// TOML config file; defaults to ./grant-sync.toml when present.
    #[arg(long)]
    config: Option<String>,

    /// Chain id, overriding the config file.
    #[arg(long)]
    chain: Option<String>,

    #[arg(long, env = "GRANT_SYNC_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh the cache and report what changed.
    Sync,
    /// Refresh, apply the whitelist and print grants as JSON.
    List,
    /// Print the resolved whitelist for the chain.
    Whitelist,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(chain) = cli.chain {
        config.chain_id = chain;
    }
    let sync = Synchronizer::from_config(&config)
        .with_context(|| format!("configuring sources for `{}`", config.chain_id))?;

    match cli.command {
        Command::Sync => {
            let outcome = sync.sync().await?;
            println!(
                "{} grants at ledger {} ({} changed, source: {})",
                outcome.snapshot.grants.len(),
                outcome.snapshot.last_ledger,
                outcome.changed,
                outcome.source.unwrap_or("cache"),
            );
        }
        Command::List => {
            let grants = sync.grants().await?;
            let grants: Vec<_> = grants.into_values().collect();
            println!("{}", serde_json::to_string_pretty(&grants)?);
        }
        Command::Whitelist => match sync.whitelist().await {
            Some(ids) => println!("{}", serde_json::to_string(&ids)?),
            None => tracing::warn!(chain_id = sync.chain_id(), "no whitelist available"),
        },
    }

    Ok(())
}
