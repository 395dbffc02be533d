//! Duplex byte stream the session reads frames from and writes frames to.
//!
//! A transport knows nothing about framing: it appends whatever bytes are
//! available to a buffer and writes whole encoded frames. Bindings exist for a
//! TCP socket, a unix domain socket, a spawned child's stdio, and any in-memory
//! stream (used heavily by tests).

use crate::Result;
use bytes::BytesMut;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::process::{Child, Command};
use tracing::debug;

/// A duplex byte stream to the peer.
pub struct Transport {
    reader: Box<dyn AsyncRead + Unpin>,
    writer: Box<dyn AsyncWrite + Unpin>,
    description: String,
    /// Keeps a spawned peer alive for as long as the transport exists.
    child: Option<Child>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("description", &self.description)
            .field("child", &self.child.as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Wrap any bidirectional stream.
    pub fn from_stream<S>(stream: S, description: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_halves(reader, writer, description)
    }

    /// Wrap separate read and write halves.
    pub fn from_halves<R, W>(reader: R, writer: W, description: impl Into<String>) -> Self
    where
        R: AsyncRead + Unpin + 'static,
        W: AsyncWrite + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            description: description.into(),
            child: None,
        }
    }

    /// Connect to a peer listening on TCP.
    pub async fn tcp<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let description = match stream.peer_addr() {
            Ok(peer) => format!("tcp://{}", peer),
            Err(_) => "tcp".to_string(),
        };
        stream.set_nodelay(true)?;
        debug!("Connected to {}", description);
        Ok(Self::from_stream(stream, description))
    }

    /// Connect to a peer listening on a unix domain socket.
    #[cfg(unix)]
    pub async fn unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await?;
        let description = format!("unix://{}", path.display());
        debug!("Connected to {}", description);
        Ok(Self::from_stream(stream, description))
    }

    /// Spawn a child process and talk to it over its stdin/stdout.
    ///
    /// The command's stdin and stdout are replaced with pipes; stderr is left
    /// as configured. The child is killed when the transport is dropped.
    pub fn child(command: &mut Command) -> Result<Self> {
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdin unavailable")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdout unavailable")
        })?;

        let description = format!(
            "child:{:?} (pid {})",
            command.as_std().get_program(),
            child.id().unwrap_or_default()
        );
        debug!("Spawned {}", description);

        let mut transport = Self::from_halves(stdout, stdin, description);
        transport.child = Some(child);
        Ok(transport)
    }

    /// Human-readable description of the peer, for logs and errors.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Append up to `chunk` available bytes to `buf`. Returns 0 at end of stream.
    pub async fn read(&mut self, buf: &mut BytesMut, chunk: usize) -> std::io::Result<usize> {
        buf.reserve(chunk.max(1));
        self.reader.read_buf(buf).await
    }

    /// Write a complete encoded frame and flush it.
    pub async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}
