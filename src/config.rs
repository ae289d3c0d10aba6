//! Command-line and environment configuration.

use crate::db::{Snapshot, Vemcache};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::server::DEFAULT_MAX_LINE_BYTES;
use clap::{Args, Parser, Subcommand};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "vemcache", version, about = "In-memory vector cache with similarity search")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the line protocol over TCP
    Serve(ServeArgs),
    /// Interactive session on stdin (the default)
    Repl,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "VEMCACHE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "VEMCACHE_PORT", default_value_t = 7070)]
    pub port: u16,

    /// Longest accepted request line, in bytes
    #[arg(long, env = "VEMCACHE_MAX_LINE_BYTES", default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,
}

impl ServeArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options shared by every mode.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Directory `dump` writes into; dumps are refused when unset
    #[arg(long, env = "VEMCACHE_DUMP_DIR", global = true)]
    pub dump_dir: Option<PathBuf>,

    /// Dump file (.json or bincode) loaded before serving
    #[arg(long, env = "VEMCACHE_PRELOAD", global = true)]
    pub preload: Option<PathBuf>,
}

impl StoreArgs {
    /// Builds the store, preloading it if asked, and wraps it in a dispatcher.
    pub fn open(&self) -> Result<Dispatcher> {
        let db = match &self.preload {
            Some(path) => {
                let db = Vemcache::from_snapshot(Snapshot::load(path)?)?;
                tracing::info!(path = %path.display(), entries = db.len(), "preloaded store");
                db
            }
            None => Vemcache::new(),
        };

        let dispatcher = Dispatcher::new(Arc::new(RwLock::new(db)));
        Ok(match &self.dump_dir {
            Some(dir) => dispatcher.with_dump_dir(dir.clone()),
            None => dispatcher,
        })
    }
}
