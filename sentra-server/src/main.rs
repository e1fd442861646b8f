// sentra-server/src/main.rs

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use sentra_core::{log_info, log_warn, CollectionManager};
use sentra_server::Server;

#[derive(Parser)]
#[command(name = "sentra-server")]
#[command(about = "Sentra document store - TCP wire server")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(long, env = "SENTRA_ADDR", default_value = "0.0.0.0:9090")]
    addr: String,

    /// Data directory; each collection lives in its own subdirectory
    #[arg(long, env = "SENTRA_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Collection that receives agent event batches
    #[arg(long, env = "SENTRA_COLLECTION", default_value = "security_events")]
    collection: String,

    /// Fields indexed on the events collection (repeatable)
    #[arg(long = "index", default_values_t = default_indexes())]
    indexes: Vec<String>,
}

fn default_indexes() -> Vec<String> {
    ["severity", "event_type", "source"]
        .map(String::from)
        .to_vec()
}

fn main() -> Result<()> {
    sentra_core::init_from_env();
    let args = Args::parse();

    log_info!("starting sentra-server");
    let manager = Arc::new(CollectionManager::new(&args.data_dir));

    let events = manager
        .get_collection(&args.collection)
        .with_context(|| format!("opening collection '{}'", args.collection))?;
    for field in &args.indexes {
        events.create_index(field)?;
    }

    seed_initial_data(&manager, &args);

    let listener = TcpListener::bind(&args.addr)
        .with_context(|| format!("binding {}", args.addr))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    Server::new(manager).serve(listener, shutdown)?;
    Ok(())
}

/// Load `<data_dir>/<collection>.json` into the events collection when
/// present. Accepts either an array of documents or an object keyed by id.
/// Failures here are logged, never fatal.
fn seed_initial_data(manager: &CollectionManager, args: &Args) {
    let path = args.data_dir.join(format!("{}.json", args.collection));
    if !path.exists() {
        return;
    }

    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) => {
            log_warn!("failed to read seed file {}: {}", path.display(), e);
            return;
        }
    };
    let parsed: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            log_warn!("failed to parse seed file {}: {}", path.display(), e);
            return;
        }
    };
    let docs: Vec<serde_json::Value> = match parsed {
        serde_json::Value::Array(docs) => docs,
        serde_json::Value::Object(map) => map.into_iter().map(|(_, doc)| doc).collect(),
        _ => {
            log_warn!("seed file {} is neither array nor object", path.display());
            return;
        }
    };
    if docs.is_empty() {
        return;
    }

    let collection = match manager.get_collection(&args.collection) {
        Ok(collection) => collection,
        Err(e) => {
            log_warn!("seed skipped: {}", e);
            return;
        }
    };

    let mut loaded = 0usize;
    for doc in docs {
        match collection.insert(doc) {
            Ok(_) => loaded += 1,
            Err(e) => log_warn!("seed insert failed: {}", e),
        }
    }
    if let Err(e) = collection.save().and_then(|_| collection.save_indexes()) {
        log_warn!("failed to persist seeded events: {}", e);
        return;
    }
    log_info!(
        "seeded {} events into '{}' from {}",
        loaded,
        args.collection,
        path.display()
    );
}
