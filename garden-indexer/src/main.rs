//! garden-indexer: replay Gardens event logs into an entity store and query it.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use garden_indexer::{ChainEvent, IndexerConfig, RecordedAccessor, Router};
use garden_store::{EntityKind, EntityQuery, EntityStore, Filter, MemoryStore, OrderDirection, SqliteStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "garden-indexer")]
#[command(about = "Event-to-state indexer for Gardens conviction-voting communities")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "GARDEN_INDEXER_CONFIG", default_value = "garden-indexer.toml")]
    config: PathBuf,

    /// SQLite database (overrides config file)
    #[arg(long, env = "GARDEN_INDEXER_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a JSON-lines event log
    Replay {
        /// One JSON event per line, in chain order
        #[arg(long)]
        events: PathBuf,

        /// Recorded contract call results
        #[arg(long)]
        calls: Option<PathBuf>,
    },

    /// Print entities of one kind as JSON
    Query {
        kind: EntityKind,

        /// Filter such as `isEnabled=true` or `stakedTokens>=100`
        #[arg(long = "where")]
        filters: Vec<Filter>,

        #[arg(long)]
        order_by: Option<String>,

        #[arg(long)]
        desc: bool,

        #[arg(long)]
        first: Option<usize>,

        #[arg(long, default_value_t = 0)]
        skip: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        IndexerConfig::load(&cli.config)
            .with_context(|| format!("reading {}", cli.config.display()))?
    } else {
        IndexerConfig::default()
    };
    if let Some(database) = cli.database {
        config.database = Some(database);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let store = open_store(config.database.as_deref())?;

    match cli.command {
        Command::Replay { events, calls } => {
            config.validate()?;
            let accessor = match calls {
                Some(path) => RecordedAccessor::from_file(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => RecordedAccessor::new(),
            };

            let log = read_events(&events)?;
            info!(events = log.len(), chains = config.chains.len(), "Starting replay");

            let mut router = Router::with_default_handlers(store.clone(), Arc::new(accessor), &config.chains)?;
            let stats = router.run(&log).await?;

            println!("{}", stats);
            println!("digest={}", store.digest()?);
        }
        Command::Query {
            kind,
            filters,
            order_by,
            desc,
            first,
            skip,
        } => {
            let mut query = EntityQuery::new(kind).skip(skip);
            for filter in filters {
                query = query.filter(filter);
            }
            if let Some(field) = order_by {
                let direction = if desc { OrderDirection::Desc } else { OrderDirection::Asc };
                query = query.order_by(field, direction);
            }
            if let Some(n) = first {
                query = query.first(n);
            }

            let rows = query.run(store.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

fn open_store(database: Option<&Path>) -> anyhow::Result<Arc<dyn EntityStore>> {
    match database {
        Some(path) => {
            info!(path = %path.display(), "Opening SQLite store");
            Ok(Arc::new(SqliteStore::open(path)?))
        }
        None => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn read_events(path: &Path) -> anyhow::Result<Vec<ChainEvent>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ChainEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", path.display(), index + 1))?;
        events.push(event);
    }
    Ok(events)
}
