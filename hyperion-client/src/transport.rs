//! TCP transport: newline-delimited frames over a split socket.
//!
//! Every transport error is session-fatal; nothing is retried at this
//! layer. The session layer decides whether a failure tears the session
//! down or is swallowed into a boolean send result.

use std::io;
use std::time::Duration;

use futures::StreamExt;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::error::Error;
use crate::messages::Message;

/// Read half of an open connection, framed into lines.
pub(crate) type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;

/// Write half of an open connection.
pub(crate) struct LineWriter {
    inner: OwnedWriteHalf,
}

impl LineWriter {
    /// Writes one line and flushes it. The terminating newline is
    /// appended here; `line` must not contain one.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await
    }

    /// Shuts the write side down. Errors are irrelevant at this point and
    /// reported only for logging.
    pub async fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

/// Opens a connection to `host:port` within `timeout`.
pub(crate) async fn connect(
    host: &str,
    port: u16,
    timeout: Duration,
) -> io::Result<(LineReader, LineWriter)> {
    let stream = tokio::time::timeout(timeout, open_stream(host, port))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    let (read, write) = stream.into_split();
    Ok((
        FramedRead::new(read, LinesCodec::new()),
        LineWriter { inner: write },
    ))
}

async fn open_stream(host: &str, port: u16) -> io::Result<TcpStream> {
    let addr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host} does not resolve to any address"),
            )
        })?;
    debug!("connecting to {addr} ({host}:{port})");
    TcpStream::connect(addr).await
}

/// Reads and decodes the next message.
///
/// A closed stream, a read failure and an unparseable line are all
/// session-fatal and classified through [`Error`].
pub(crate) async fn next_message(reader: &mut LineReader) -> Result<Message, Error> {
    let line = match reader.next().await {
        Some(Ok(line)) => line,
        Some(Err(LinesCodecError::Io(err))) => return Err(Error::Transport(err)),
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::InvalidData,
                "line too long",
            )))
        }
        None => {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )))
        }
    };
    Ok(serde_json::from_str(&line)?)
}
