//! # vemcache - an in-memory vector cache
//!
//! vemcache keeps named `f64` vectors in memory, answers cosine-similarity
//! nearest-neighbour queries over them and performs vector arithmetic on
//! stored entries. Clients talk to it over a line-oriented TCP protocol, or
//! through the interactive REPL.
//!
//! ## Example
//!
//! ```
//! use vemcache::{arith, Vector, Vemcache};
//!
//! let mut db = Vemcache::new();
//!
//! db.insert("A".to_string(), Vector::new(vec![1.0, 0.0]).unwrap()).unwrap();
//! db.insert("B".to_string(), Vector::new(vec![0.0, 1.0]).unwrap()).unwrap();
//! db.insert("C".to_string(), Vector::new(vec![1.0, 1.0]).unwrap()).unwrap();
//!
//! // Nearest neighbours of A, best first
//! let results = db.knn("A", 2).unwrap();
//! assert_eq!(results[0].0, "C");
//! assert_eq!(results[1].0, "B");
//!
//! // Arithmetic returns new vectors and leaves the store untouched
//! let sum = arith::add(db.get("A").unwrap(), db.get("B").unwrap()).unwrap();
//! assert_eq!(sum.components(), &[1.0, 1.0]);
//! assert_eq!(db.len(), 3);
//! ```

pub mod arith;
pub mod cli;
pub mod command;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod server;
pub mod vector;

pub use db::{Snapshot, Upsert, Vemcache};
pub use dispatch::{Dispatcher, SharedStore};
pub use error::{Result, VemcacheError};
pub use server::Server;
pub use vector::Vector;
