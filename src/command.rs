//! Request parsing
//! Turns one protocol line into a typed [`Command`]

use crate::error::{Result, VemcacheError};
use crate::vector::Vector;

/// Every request the server understands, one variant per command name.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `ping`, answered with `PONG`
    Ping,
    /// `insert <v1> <v2> ...`, stored under a generated UUID key
    Insert { vector: Vector },
    /// `named_insert <key> <v1> <v2> ...`
    NamedInsert { key: String, vector: Vector },
    /// `get <key>`
    Get { key: String },
    /// `remove <key>`
    Remove { key: String },
    /// `knn <key> <k>`
    Knn { key: String, k: usize },
    /// `vadd <key1> <key2>`
    Add { left: String, right: String },
    /// `vsub <key1> <key2>`
    Sub { left: String, right: String },
    /// `vscale <key> <scalar>`
    Scale { key: String, scalar: f64 },
    /// `vcosine <key1> <key2>`
    Cosine { left: String, right: String },
    /// `count`
    Count,
    /// `dump <name>`
    Dump { name: String },
}

pub const COMMAND_NAMES: &[&str] = &[
    "ping",
    "insert",
    "named_insert",
    "get",
    "remove",
    "knn",
    "vadd",
    "vsub",
    "vscale",
    "vcosine",
    "count",
    "dump",
];

/// Parse a command from one request line.
///
/// Tokens are separated by ASCII whitespace and command names are
/// case-sensitive.
///
/// # Examples
///
/// ```
/// use vemcache::command::{parse_command, Command};
///
/// let cmd = parse_command("knn vector1 3").unwrap();
/// assert_eq!(cmd, Command::Knn { key: "vector1".to_string(), k: 3 });
///
/// assert!(parse_command("GET vector1").is_err());
/// ```
pub fn parse_command(line: &str) -> Result<Command> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();

    let Some((&name, args)) = tokens.split_first() else {
        return Err(VemcacheError::protocol("empty command"));
    };

    match name {
        "ping" => parse_nullary(name, args, Command::Ping),
        "insert" => parse_insert(args),
        "named_insert" => parse_named_insert(args),
        "get" => parse_key(name, args).map(|key| Command::Get { key }),
        "remove" => parse_key(name, args).map(|key| Command::Remove { key }),
        "knn" => parse_knn(args),
        "vadd" => parse_pair(name, args).map(|(left, right)| Command::Add { left, right }),
        "vsub" => parse_pair(name, args).map(|(left, right)| Command::Sub { left, right }),
        "vcosine" => parse_pair(name, args).map(|(left, right)| Command::Cosine { left, right }),
        "vscale" => parse_scale(args),
        "count" => parse_nullary(name, args, Command::Count),
        "dump" => parse_key(name, args).map(|name| Command::Dump { name }),
        _ => Err(VemcacheError::protocol(format!(
            "unknown command '{}'. Available: {}",
            name,
            COMMAND_NAMES.join(", ")
        ))),
    }
}

fn arity_error(name: &str, usage: &str) -> VemcacheError {
    VemcacheError::protocol(format!("wrong number of arguments for '{}'. Usage: {}", name, usage))
}

fn parse_nullary(name: &str, args: &[&str], command: Command) -> Result<Command> {
    if !args.is_empty() {
        return Err(arity_error(name, name));
    }
    Ok(command)
}

/// Usage: insert <v1> <v2> ...
fn parse_insert(args: &[&str]) -> Result<Command> {
    if args.is_empty() {
        return Err(arity_error("insert", "insert <v1> <v2> ..."));
    }
    let vector = Vector::parse(args.iter().copied())?;
    Ok(Command::Insert { vector })
}

/// Usage: named_insert <key> <v1> <v2> ...
fn parse_named_insert(args: &[&str]) -> Result<Command> {
    // args[0] = key (required)
    // args[1..] = vector (required, at least 1)
    if args.len() < 2 {
        return Err(arity_error("named_insert", "named_insert <key> <v1> <v2> ..."));
    }
    let key = args[0].to_string();
    let vector = Vector::parse(args[1..].iter().copied())?;
    Ok(Command::NamedInsert { key, vector })
}

/// Usage: <name> <key>
fn parse_key(name: &str, args: &[&str]) -> Result<String> {
    match args {
        [key] => Ok(key.to_string()),
        _ => Err(arity_error(name, &format!("{} <key>", name))),
    }
}

/// Usage: <name> <key1> <key2>
fn parse_pair(name: &str, args: &[&str]) -> Result<(String, String)> {
    match args {
        [left, right] => Ok((left.to_string(), right.to_string())),
        _ => Err(arity_error(name, &format!("{} <key1> <key2>", name))),
    }
}

/// Usage: knn <key> <k>
fn parse_knn(args: &[&str]) -> Result<Command> {
    let [key, k] = args else {
        return Err(arity_error("knn", "knn <key> <k>"));
    };
    Ok(Command::Knn { key: key.to_string(), k: parse_k(k)? })
}

/// Any decimal integer is well-formed. A non-positive `k` is an invalid
/// argument rather than a protocol error, and a `k` past `usize::MAX`
/// saturates since it already asks for every candidate.
fn parse_k(token: &str) -> Result<usize> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VemcacheError::protocol(format!("invalid k value '{}'", token)));
    }
    if negative || digits.bytes().all(|b| b == b'0') {
        return Err(VemcacheError::invalid(format!("k must be positive, got {}", token)));
    }
    Ok(digits.parse::<usize>().unwrap_or(usize::MAX))
}

/// Usage: vscale <key> <scalar>
fn parse_scale(args: &[&str]) -> Result<Command> {
    let [key, scalar] = args else {
        return Err(arity_error("vscale", "vscale <key> <scalar>"));
    };
    let scalar = scalar
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite())
        .ok_or_else(|| VemcacheError::protocol(format!("invalid scalar value '{}'", scalar)))?;
    Ok(Command::Scale { key: key.to_string(), scalar })
}
