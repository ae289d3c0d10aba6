//! TCP front end for vemcache.
//!
//! Line-oriented text protocol: each request is one line, each response is
//! one line, and a connection never has more than one request in flight.
//! Every accepted connection runs in its own task.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use vemcache::{Dispatcher, Server, Vemcache};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let dispatcher = Dispatcher::new(Arc::new(RwLock::new(Vemcache::new())));
//!     Server::bind("0.0.0.0:7070", dispatcher, 1 << 20)
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

use crate::dispatch::{render_error, Dispatcher};
use crate::error::VemcacheError;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// Default cap on a single request line, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1 << 20;

pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_line_bytes: usize,
}

impl Server {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        dispatcher: Dispatcher,
        max_line_bytes: usize,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server { listener, dispatcher, max_line_bytes })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves. Connections already
    /// accepted keep running until their clients disconnect.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("vemcache v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutting down listener on {}", addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("accept failed: {}", e);
                            continue;
                        }
                    };
                    let dispatcher = self.dispatcher.clone();
                    let max_line_bytes = self.max_line_bytes;

                    tokio::spawn(async move {
                        tracing::debug!(%peer, "client connected");
                        match handle_connection(stream, dispatcher, max_line_bytes).await {
                            Ok(()) => tracing::debug!(%peer, "client disconnected"),
                            Err(e) => tracing::warn!(%peer, "connection error: {}", e),
                        }
                    });
                }
            }
        }
    }
}

/// One framed request.
#[derive(Debug, PartialEq)]
enum Frame {
    Line(String),
    /// Line exceeded the cap; the rest of it has been discarded.
    TooLong,
    NotUtf8,
    Eof,
}

async fn handle_connection(
    stream: TcpStream,
    dispatcher: Dispatcher,
    max_line_bytes: usize,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        let mut response = match read_frame(&mut reader, &mut buf, max_line_bytes).await? {
            Frame::Eof => return Ok(()),
            Frame::TooLong => render_error(&VemcacheError::protocol(format!(
                "request line exceeds {} bytes",
                max_line_bytes
            ))),
            Frame::NotUtf8 => render_error(&VemcacheError::protocol("request is not valid UTF-8")),
            Frame::Line(line) => {
                // Lock-holding and scoring work stays off the async workers
                let dispatcher = dispatcher.clone();
                match tokio::task::spawn_blocking(move || dispatcher.handle_line(&line)).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!("request handler panicked: {}", e);
                        render_error(&VemcacheError::Internal("request handler failed".to_string()))
                    }
                }
            }
        };

        response.push('\n');
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }
}

/// Reads one `\n`-terminated line of at most `max` bytes (terminator excluded).
///
/// A final line without a terminator is still returned before `Eof`.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = max as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Frame::Eof);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > max {
        discard_line(reader).await?;
        return Ok(Frame::TooLong);
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    match std::str::from_utf8(buf) {
        Ok(line) => Ok(Frame::Line(line.to_string())),
        Err(_) => Ok(Frame::NotUtf8),
    }
}

/// Skips input up to and including the next `\n`, or to end of stream.
async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}
