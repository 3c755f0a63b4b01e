//! packetkv CLI
//!
//! Operator tool over a local data directory. Index metadata is kept in
//! `<data-dir>/manage.pkvm` and rewritten after every command.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use packetkv::store::persistent::existing_shard_files;
use packetkv::{manage, Config, DataStore, FindRange, Store, StoreError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

const MANAGE_FILENAME: &str = "manage.pkvm";

/// packetkv CLI
#[derive(Parser, Debug)]
#[command(name = "packetkv-cli")]
#[command(about = "CLI for a local packetkv data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./packetkv_data")]
    data_dir: PathBuf,

    /// Number of shards (must match an existing directory)
    #[arg(short, long, default_value = "8")]
    shards: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value under a key
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Number of stored keys
    Count,

    /// List entries in key order
    List {
        /// First key (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Last key (inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Record stored by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    key: String,
    value: String,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,packetkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> packetkv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .chunk_count(args.shards)
        .build();
    let manage_path = args.data_dir.join(MANAGE_FILENAME);

    let store = open(config, &manage_path)?;
    let outcome = execute(&store, args.command);

    // Checkpoint even when the command failed; the shards were touched.
    let manage_data = store.close()?;
    manage::save(&manage_path, &manage_data)?;

    outcome
}

fn open(config: Config, manage_path: &Path) -> packetkv::Result<DataStore<String, Entry>> {
    let key_fn = Arc::new(|entry: &Entry| entry.key.clone());
    if manage_path.exists() {
        let manage_data = manage::load(manage_path)?;
        DataStore::restore(config, key_fn, manage_data)
    } else {
        let existing = existing_shard_files(&config);
        if !existing.is_empty() {
            return Err(StoreError::Configuration(format!(
                "{} holds {} shard file(s) but no {}; refusing to overwrite them",
                config.data_dir.display(),
                existing.len(),
                MANAGE_FILENAME
            )));
        }
        tracing::info!(data_dir = %config.data_dir.display(), "Initializing data directory");
        DataStore::create(config, key_fn)
    }
}

fn execute(store: &DataStore<String, Entry>, command: Commands) -> packetkv::Result<()> {
    match command {
        Commands::Put { key, value } => {
            store.store(Entry { key, value })?;
            println!("OK");
        }
        Commands::Get { key } => match store.get(&key)? {
            Some(entry) => println!("{}", entry.value),
            None => println!("(nil)"),
        },
        Commands::Del { key } => {
            let removed = store.remove(&key)?;
            println!("(integer) {}", u8::from(removed));
        }
        Commands::Count => {
            println!("(integer) {}", store.count()?);
        }
        Commands::List { from, to, limit } => {
            let range = match (from, to) {
                (None, None) => None,
                (Some(from), None) => Some(FindRange::at_least(from)),
                (None, Some(to)) => Some(FindRange::at_most(to)),
                (Some(from), Some(to)) => {
                    if from > to {
                        return Err(StoreError::Configuration(format!(
                            "--from {:?} sorts after --to {:?}",
                            from, to
                        )));
                    }
                    Some(FindRange::between(from, to))
                }
            };
            for entry in store.find(&|_| true, range.as_ref(), limit)? {
                println!("{}\t{}", entry.key, entry.value);
            }
        }
    }
    Ok(())
}
