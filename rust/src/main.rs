//! Operator CLI over the encrypted store: import plaintext configuration,
//! inspect it and edit single values without ever writing plaintext back.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use configurator_rs::transcode::rows;
use configurator_rs::{Store, StoreConfig, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "configurator", version, about = "Encrypted hierarchical configuration store")]
struct Cli {
    /// Directory holding the encrypted config and its key (default: ~/.configurator)
    #[arg(long, env = "CONFIGURATOR_HOME", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a TOML or JSON file and save it encrypted
    Import { file: PathBuf },
    /// Print the whole configuration as JSON
    Show,
    /// Print every leaf as `dotted.key = value`, one line per sequence element
    List,
    /// Print one value by dotted key, e.g. `project.build.type`
    Get { key: String },
    /// Set one value by dotted key; the value is parsed as JSON when possible
    Set { key: String, value: String },
    /// Print the SHA-256 fingerprint of the stored configuration
    Fingerprint,
    /// Delete the encrypted config and its key
    Prune,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => StoreConfig::default_data_dir()?,
    };
    let config = StoreConfig::in_dir(&data_dir);

    match cli.command {
        Command::Import { file } => {
            let store = Store::open(config, Some(file.as_path()), false)
                .with_context(|| format!("importing {}", file.display()))?;
            store.save()?;
            println!("imported {} into {}", file.display(), store.save_path());
        }
        Command::Show => {
            let store = Store::open(config, None, true)?;
            println!("{}", store.to_json_pretty()?);
        }
        Command::List => {
            let store = Store::open(config, None, true)?;
            let encoded = store.to_json();
            for row in rows(&encoded) {
                println!("{} = {}", row.dotted(), row.value);
            }
        }
        Command::Get { key } => {
            let store = Store::open(config, None, true)?;
            match store.lookup(&key) {
                Some(value) => println!("{value}"),
                None => bail!("no value at '{key}'"),
            }
        }
        Command::Set { key, value } => {
            let mut store = Store::open(config, None, true)?;
            let parsed = serde_json::from_str::<serde_json::Value>(&value)
                .unwrap_or(serde_json::Value::String(value));
            store.insert_path(&key, Value::from(parsed));
            store.save()?;
        }
        Command::Fingerprint => {
            let store = Store::open(config, None, true)?;
            println!("{}", store.fingerprint()?);
        }
        Command::Prune => {
            let mut store = Store::new(config);
            store.prune()?;
            println!("removed {} and {}", store.save_path(), store.key_path());
        }
    }

    Ok(())
}
