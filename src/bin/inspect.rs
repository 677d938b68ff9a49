//! cfgsync Inspector Binary
//!
//! Reads and edits the entries of a log-backed store file.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use cfgsync::store::LogRecovery;
use cfgsync::{KvStore, LogStore, Scalar, StoreError};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// cfgsync store inspector
#[derive(Parser, Debug)]
#[command(name = "cfgsync-inspect")]
#[command(about = "Inspect and edit a cfgsync log store")]
#[command(version)]
struct Args {
    /// Path of the log file
    #[arg(short, long, default_value = "./cfgsync.log")]
    log: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every entry as JSON
    Dump {
        /// Only keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key; the value is read as a JSON scalar, else as a string
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Check every record without modifying the file
    Verify,

    /// Rewrite the log as a single record
    Compact,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,cfgsync=info"));

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

fn run(args: Args) -> Result<(), StoreError> {
    if let Commands::Verify = args.command {
        let result = LogRecovery::verify(&args.log)?;
        println!(
            "records: {}, corrupted: {}, last lsn: {}, torn tail: {}",
            result.records_recovered, result.records_corrupted, result.last_lsn, result.was_truncated
        );
        return Ok(());
    }

    let store = LogStore::open(&args.log)?;
    match args.command {
        Commands::Dump { prefix } => {
            let entries: serde_json::Map<String, Value> = store
                .get_all()?
                .into_iter()
                .filter(|(key, _)| prefix.as_deref().map_or(true, |p| key.starts_with(p)))
                .map(|(key, value)| (key, to_json(&value)))
                .collect();
            let text = serde_json::to_string_pretty(&entries)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            println!("{}", text);
        }
        Commands::Get { key } => {
            println!("{}", to_json(&store.get(&key)?));
        }
        Commands::Set { key, value } => {
            store.set(&key, parse_scalar(&value)?)?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(&key)?;
            println!("OK");
        }
        Commands::Compact => {
            store.compact()?;
            println!("OK ({} entries)", store.len());
        }
        Commands::Verify => {}
    }
    Ok(())
}

fn to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(i) => Value::from(*i),
        Scalar::Float(f) => Value::from(*f),
        Scalar::Str(s) => Value::String(s.clone()),
    }
}

fn parse_scalar(raw: &str) -> Result<Scalar, StoreError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Ok(Scalar::Null),
        Ok(Value::Bool(b)) => Ok(Scalar::Bool(b)),
        Ok(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Scalar::Int(i)),
            (None, Some(f)) => Ok(Scalar::Float(f)),
            (None, None) => Err(StoreError::Serialization(format!("number out of range: {}", n))),
        },
        Ok(Value::String(s)) => Ok(Scalar::Str(s)),
        Ok(_) => Err(StoreError::Serialization(format!("not a scalar: {}", raw))),
        Err(_) => Ok(Scalar::Str(raw.to_string())),
    }
}
