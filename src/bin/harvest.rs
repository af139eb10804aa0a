//! harvest CLI: run the pipeline and inspect its state.

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use harvest_rs::capability::{
    Actuator, HookActuator, HookSearcher, HttpPublishTimeReader, NoPublishTime,
    PublishTimeReader, Searcher,
};
use harvest_rs::config::{ConfigSource, Settings, source::write_default};
use harvest_rs::engine::Supervisor;
use harvest_rs::model::Identifier;
use harvest_rs::pool::{IdentifierPool, LegacyTimestampMigrator, Migrate};
use harvest_rs::telemetry::{TelemetryConfig, init_telemetry};
use harvest_rs::template::TemplateEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt as _;
use tracing::{error, info, warn};

/// How long `run` waits for workers after a stop before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "harvest", about = "Keyword-driven discovery and action pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline until `stop` is typed or Ctrl-C is pressed
    Run {
        /// Stop on its own after this many seconds
        #[arg(long)]
        for_secs: Option<u64>,
    },
    /// Inspect or edit a pool file
    Pool {
        #[arg(value_enum)]
        pool: PoolName,
        #[command(subcommand)]
        action: PoolAction,
    },
    /// Print messages generated from the configured grammar
    Generate {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
    /// Config file operations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PoolName {
    Pending,
    Processed,
}

#[derive(Subcommand)]
enum PoolAction {
    /// List every identifier with its metadata
    List,
    /// Add an identifier
    Add { id: String },
    /// Remove an identifier
    Remove { id: String },
    /// Print the number of identifiers
    Count,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Command::Run { for_secs } => cmd_run(&settings, for_secs).await,
        Command::Pool { pool, action } => cmd_pool(&settings, pool, action),
        Command::Generate { count } => cmd_generate(&settings, count),
        Command::Config {
            action: ConfigAction::Init { force },
        } => cmd_config_init(&settings, force),
    }
}

async fn cmd_run(settings: &Settings, for_secs: Option<u64>) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: settings.otel_endpoint.clone(),
        service_name: "harvest".to_string(),
        default_level: settings.log_level.clone(),
    })?;

    let source = Arc::new(ConfigSource::open(&settings.config_path)?);
    let config = source.current();

    let pending = Arc::new(open_pool(settings, PoolName::Pending)?);
    let processed = Arc::new(open_pool(settings, PoolName::Processed)?);
    info!(
        pending = pending.len(),
        processed = processed.len(),
        "pools loaded"
    );

    let timeout = Duration::from_secs(config.hooks.timeout_secs);
    let act = config
        .hooks
        .act
        .clone()
        .context("[hooks] act is not set in the config file")?;

    let reader: Arc<dyn PublishTimeReader> = match &config.metadata.url {
        Some(url) => Arc::new(HttpPublishTimeReader::new(
            url.clone(),
            config.metadata.field.clone(),
            settings.metadata_token.clone(),
        )?),
        None => Arc::new(NoPublishTime),
    };

    let supervisor = Supervisor::new(Arc::clone(&source), pending, processed);

    if config.search.enabled {
        match config.hooks.search.clone() {
            Some(command) => {
                supervisor
                    .spawn_discovery(Box::new(move || -> Box<dyn Searcher> {
                        Box::new(HookSearcher::new(command.clone(), timeout))
                    }))
                    .await;
            }
            None => warn!("search is enabled but [hooks] search is not set, discovery disabled"),
        }
    }
    supervisor
        .spawn_action(
            Box::new(move || -> Box<dyn Actuator> {
                Box::new(HookActuator::new(act.clone(), timeout))
            }),
            reader,
        )
        .await;

    info!("pipeline running; type `stop` or press Ctrl-C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = console_stop() => info!("stop command received"),
        _ = run_for(for_secs) => info!("run duration elapsed"),
    }

    supervisor.shutdown();
    let abandoned = supervisor.join(SHUTDOWN_GRACE).await;
    if !abandoned.is_empty() {
        warn!(?abandoned, "some workers did not stop in time");
    }

    for pool in [supervisor.pending(), supervisor.processed()] {
        if let Err(e) = pool.save() {
            error!(pool = pool.name(), error = %e, "final save failed");
        }
    }

    println!("{}", serde_json::to_string_pretty(&supervisor.stats())?);
    Ok(())
}

/// Resolves when a line reading `stop` arrives on stdin. Never resolves if
/// stdin closes first.
async fn console_stop() {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().eq_ignore_ascii_case("stop") {
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn run_for(secs: Option<u64>) {
    match secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

fn open_pool(settings: &Settings, name: PoolName) -> anyhow::Result<IdentifierPool> {
    let pool = match name {
        PoolName::Pending => IdentifierPool::new("pending", settings.pending_path()),
        PoolName::Processed => IdentifierPool::new("processed", settings.processed_path()),
    };
    let migrator = match name {
        PoolName::Pending => None,
        PoolName::Processed => Some(&LegacyTimestampMigrator as &dyn Migrate),
    };
    pool.load(migrator)
        .with_context(|| format!("failed to load {}", pool.path().display()))?;
    Ok(pool)
}

fn cmd_pool(settings: &Settings, name: PoolName, action: PoolAction) -> anyhow::Result<()> {
    let pool = open_pool(settings, name)?;

    match action {
        PoolAction::List => {
            let mut entries = pool.entries();
            entries.sort();
            for (id, metadata) in &entries {
                if metadata.is_empty() {
                    println!("{id}");
                } else {
                    println!("{id}\t{metadata}");
                }
            }
            println!("\n{} identifier(s)", entries.len());
        }
        PoolAction::Add { id } => {
            let id = Identifier::new(id)?;
            let metadata = match name {
                PoolName::Pending => String::new(),
                PoolName::Processed => Utc::now().timestamp().to_string(),
            };
            if pool.add(id.clone(), metadata) {
                pool.save()?;
                println!("Added: {id}");
            } else {
                println!("Already present: {id}");
            }
        }
        PoolAction::Remove { id } => {
            let id = Identifier::new(id)?;
            if pool.remove(&id) {
                pool.save()?;
                println!("Removed: {id}");
            } else {
                println!("Not present: {id}");
            }
        }
        PoolAction::Count => println!("{}", pool.len()),
    }
    Ok(())
}

fn cmd_generate(settings: &Settings, count: usize) -> anyhow::Result<()> {
    let source = ConfigSource::open(&settings.config_path)?;
    let engine = TemplateEngine::new(&source.current().grammar);
    if engine.is_empty() {
        anyhow::bail!(
            "no templates in {}; add some under [grammar]",
            settings.config_path.display()
        );
    }
    for _ in 0..count {
        println!("{}", engine.generate());
    }
    Ok(())
}

fn cmd_config_init(settings: &Settings, force: bool) -> anyhow::Result<()> {
    let path = &settings.config_path;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_default(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
