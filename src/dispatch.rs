//! Command execution and response rendering.
//!
//! The dispatcher is the only path from a connection to the store. It owns
//! the shared handle and decides which lock each command takes:
//!
//! - **Reads** (`get`, `knn`, arithmetic, `count`, `dump`): read lock, so
//!   any number of them run at once.
//! - **Writes** (`insert`, `named_insert`, `remove`): write lock. The store
//!   updates its map and its index inside that one critical section.
//!
//! Guards are dropped before a response is rendered or written, and dumps
//! copy the entries out before touching the filesystem.

use crate::arith;
use crate::command::{parse_command, Command};
use crate::db::{Upsert, Vemcache};
use crate::error::{Result, VemcacheError};
use crate::vector::Vector;
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Thread-safe store handle shared by every connection.
pub type SharedStore = Arc<RwLock<Vemcache>>;

/// Successful outcome of one command, rendered as one response line.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Pong,
    Key(String),
    Vector(Vector),
    Neighbors(Vec<(String, f64)>),
    Scalar(f64),
    Count(usize),
    Dumped(PathBuf),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("OK"),
            Response::Pong => f.write_str("PONG"),
            Response::Key(key) => f.write_str(key),
            Response::Vector(v) => write!(f, "{}", v),
            Response::Neighbors(hits) => {
                for (i, (key, score)) in hits.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}:{:?}", key, score)?;
                }
                Ok(())
            }
            Response::Scalar(x) => write!(f, "{:?}", x),
            Response::Count(n) => write!(f, "{}", n),
            Response::Dumped(path) => write!(f, "OK {}", path.display()),
        }
    }
}

/// Renders a failure as `ERR <kind>: <detail>`.
pub fn render_error(err: &VemcacheError) -> String {
    format!("ERR {}: {}", err.kind(), err)
}

#[derive(Clone)]
pub struct Dispatcher {
    store: SharedStore,
    dump_dir: Option<PathBuf>,
}

impl Dispatcher {
    pub fn new(store: SharedStore) -> Self {
        Dispatcher { store, dump_dir: None }
    }

    /// Enables `dump`, writing snapshots below `dir`.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Parses, executes and renders one request line (without the newline).
    pub fn handle_line(&self, line: &str) -> String {
        match parse_command(line).and_then(|cmd| self.execute(cmd)) {
            Ok(response) => response.to_string(),
            Err(err) => {
                if err.is_client_error() {
                    tracing::debug!(kind = err.kind(), "request failed: {}", err);
                } else {
                    tracing::error!(kind = err.kind(), "internal failure: {}", err);
                }
                render_error(&err)
            }
        }
    }

    pub fn execute(&self, command: Command) -> Result<Response> {
        match command {
            Command::Ping => Ok(Response::Pong),

            Command::Insert { vector } => {
                let key = self.store.write().insert_with_uuid(vector)?;
                Ok(Response::Key(key))
            }

            Command::NamedInsert { key, vector } => {
                let outcome: Upsert = self.store.write().insert(key, vector)?;
                tracing::trace!(?outcome, "named_insert applied");
                Ok(Response::Ok)
            }

            Command::Get { key } => {
                let vector = self.store.read().get(&key)?.clone();
                Ok(Response::Vector(vector))
            }

            Command::Remove { key } => {
                self.store.write().remove(&key)?;
                Ok(Response::Ok)
            }

            Command::Knn { key, k } => {
                let hits = self.store.read().knn(&key, k)?;
                Ok(Response::Neighbors(hits))
            }

            Command::Add { left, right } => self.binary(&left, &right, arith::add).map(Response::Vector),
            Command::Sub { left, right } => self.binary(&left, &right, arith::sub).map(Response::Vector),
            Command::Cosine { left, right } => {
                self.binary(&left, &right, arith::cosine).map(Response::Scalar)
            }

            Command::Scale { key, scalar } => {
                let db = self.store.read();
                let scaled = arith::scale(db.get(&key)?, scalar)?;
                Ok(Response::Vector(scaled))
            }

            Command::Count => Ok(Response::Count(self.store.read().len())),

            Command::Dump { name } => self.dump(&name),
        }
    }

    /// Fetches both operands under one read lock and applies `op`.
    /// A missing left key is reported before a missing right key.
    fn binary<T>(
        &self,
        left: &str,
        right: &str,
        op: impl FnOnce(&Vector, &Vector) -> Result<T>,
    ) -> Result<T> {
        let db = self.store.read();
        let a = db.get(left)?;
        let b = db.get(right)?;
        op(a, b)
    }

    fn dump(&self, name: &str) -> Result<Response> {
        let dir = self
            .dump_dir
            .as_deref()
            .ok_or_else(|| VemcacheError::invalid("dump is disabled on this server"))?;
        let path = dump_path(dir, name)?;

        let snapshot = self.store.read().snapshot();
        snapshot.save(&path)?;
        tracing::info!(path = %path.display(), entries = snapshot.len(), "dumped store");

        Ok(Response::Dumped(path))
    }
}

/// Resolves a client-supplied dump name to a file directly inside `dir`.
fn dump_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|f| f == name);
    if !plain {
        return Err(VemcacheError::invalid(format!("invalid dump name '{}'", name)));
    }
    Ok(dir.join(name))
}
