//! Inspect an agency from the command line

use agency_sync::agency::state::{
    get_db_server_blocking_restart_shards, get_db_server_shards_not_in_sync,
    CollectionShardDetails, ANY_SERVER,
};
use agency_sync::agency::{http_connections, new_cache, AgencyLeaderDiscovery, Cache};
use agency_sync::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "agency-inspect")]
#[command(about = "Inspect agency health and shard safety")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $AGENCY_SYNC_CONFIG or agency-sync.toml)
    #[arg(long)]
    config: Option<String>,

    /// Extra agent as NAME=URL, may be repeated
    #[arg(long = "agent", value_parser = parse_agent)]
    agents: Vec<(String, String)>,

    /// Bearer token for agency requests
    #[arg(long, env = "AGENCY_SYNC_JWT")]
    jwt: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the leader and report agency health
    Health,

    /// List shards that block a restart of a DBServer
    RestartCheck {
        /// DBServer ID
        #[arg(long)]
        server: String,
    },

    /// List shards whose replicas are not all in sync
    NotInSync {
        /// DBServer ID, `*` for every shard
        #[arg(long, default_value = ANY_SERVER)]
        server: String,
    },
}

fn parse_agent(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .ok_or_else(|| format!("expected NAME=URL, got {}", s))
}

fn print_shards(shards: &CollectionShardDetails, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(shards)?);
        return Ok(());
    }
    for shard in shards {
        println!("  {}/{}/{}", shard.database, shard.collection, shard.shard);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.agents.extend(cli.agents.iter().cloned());
    if cli.jwt.is_some() {
        config.jwt = cli.jwt.clone();
    }

    if !config.deployment_mode.has_agents() {
        anyhow::bail!("deployment mode {} has no agency", config.deployment_mode);
    }
    if config.agents.is_empty() {
        anyhow::bail!("no agents configured");
    }

    let connections = http_connections(&config.agents, config.jwt.as_deref());
    let agency_size = config.agency_size();

    match cli.command {
        Commands::Health => {
            let discovery = AgencyLeaderDiscovery::new(
                connections,
                agency_size,
                config.cache.agent_timeout(),
            );
            let (leader, health) = discovery.discover_with_health().await?;

            println!("Agency health:");
            println!("  Leader: {} ({})", health.leader_id(), leader.endpoint());
            println!("  Agency size: {}", health.agency_size());
            println!("  Serving: {}", health.is_serving());
            match health.healthy() {
                Ok(()) => println!("  Healthy: true"),
                Err(e) => println!("  Healthy: false ({})", e),
            }
            for (agent, index) in health.commit_indexes() {
                println!("  {}: commit index {}", agent, index);
            }
        }

        Commands::RestartCheck { server } => {
            let cache = new_cache(config.deployment_mode, &config.cache);
            let index = cache.reload(agency_size, &connections).await?;
            let state = cache
                .data()
                .ok_or_else(|| anyhow::anyhow!("agency state is not available"))?;

            let blocking = get_db_server_blocking_restart_shards(&state, &server);
            if !cli.json {
                println!(
                    "Restart of {} at commit index {}: {}",
                    server,
                    index,
                    if blocking.is_empty() { "safe" } else { "blocked" }
                );
            }
            print_shards(&blocking, cli.json)?;
        }

        Commands::NotInSync { server } => {
            let cache = new_cache(config.deployment_mode, &config.cache);
            let index = cache.reload(agency_size, &connections).await?;
            let state = cache
                .data()
                .ok_or_else(|| anyhow::anyhow!("agency state is not available"))?;

            let shards = get_db_server_shards_not_in_sync(&state, &server);
            if !cli.json {
                println!(
                    "Shards not in sync for {} at commit index {}: {}",
                    server,
                    index,
                    shards.len()
                );
            }
            print_shards(&shards, cli.json)?;
        }
    }

    Ok(())
}
