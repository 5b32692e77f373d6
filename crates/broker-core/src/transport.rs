//! Point-to-point request/response transport over a local named pipe.
//!
//! Framing is little-endian 32-bit length prefix followed by UTF-8 bytes,
//! used identically in both directions. Every call here dials fresh, does
//! exactly one write and one read, and closes — peer connections are
//! transient, one per request/response exchange.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::TransportError;

/// Dial timeout.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Safety cap on declared frame length for control messages.
pub const CONTROL_MESSAGE_CAP: u32 = 1024 * 1024;

#[cfg(unix)]
type RawConnection = tokio::net::UnixStream;

/// Windows has distinct client/server named-pipe handle types; this enum
/// lets [`Connection`] treat dialed and accepted pipes uniformly.
#[cfg(windows)]
enum RawConnection {
    Client(tokio::net::windows::named_pipe::NamedPipeClient),
    Server(tokio::net::windows::named_pipe::NamedPipeServer),
}

#[cfg(windows)]
impl tokio::io::AsyncRead for RawConnection {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            RawConnection::Client(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            RawConnection::Server(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

#[cfg(windows)]
impl tokio::io::AsyncWrite for RawConnection {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            RawConnection::Client(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            RawConnection::Server(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            RawConnection::Client(s) => std::pin::Pin::new(s).poll_flush(cx),
            RawConnection::Server(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            RawConnection::Client(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            RawConnection::Server(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// One dialed connection to a pipe, good for exactly one request/response.
pub struct Connection {
    stream: RawConnection,
}

/// Dial the named pipe at `pipe_path`, honoring [`DIAL_TIMEOUT`].
pub async fn dial(pipe_path: &str) -> Result<Connection, TransportError> {
    let connect = connect_raw(pipe_path);

    match tokio::time::timeout(DIAL_TIMEOUT, connect).await {
        Ok(Ok(stream)) => Ok(Connection { stream }),
        Ok(Err(e)) => Err(TransportError::Unreachable(e)),
        Err(_elapsed) => Err(TransportError::Unreachable(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "dial timed out",
        ))),
    }
}

#[cfg(unix)]
async fn connect_raw(pipe_path: &str) -> std::io::Result<RawConnection> {
    tokio::net::UnixStream::connect(pipe_path).await
}

#[cfg(windows)]
async fn connect_raw(pipe_path: &str) -> std::io::Result<RawConnection> {
    let pipe_name = if pipe_path.starts_with(r"\\.\pipe\") {
        pipe_path.to_owned()
    } else {
        format!(r"\\.\pipe\{pipe_path}")
    };
    let client = tokio::net::windows::named_pipe::ClientOptions::new().open(&pipe_name)?;
    Ok(RawConnection::Client(client))
}

impl Connection {
    /// Wrap an already-accepted server-side stream (registration server).
    pub(crate) fn from_stream(stream: RawConnection) -> Self {
        Self { stream }
    }

    /// Write one length-prefixed frame and flush.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let len: u32 = payload
            .len()
            .try_into()
            .map_err(|_| TransportError::Framing("payload exceeds u32::MAX".to_owned()))?;

        self.stream
            .write_all(&len.to_le_bytes())
            .await
            .map_err(TransportError::Broken)?;
        self.stream.write_all(payload).await.map_err(TransportError::Broken)?;
        self.stream.flush().await.map_err(TransportError::Broken)?;
        Ok(())
    }

    /// Read exactly one length-prefixed frame, tolerating partial reads.
    ///
    /// `max_len`, when set, is a hard cap (`Some(CONTROL_MESSAGE_CAP)` for
    /// control messages, `None` for execution responses).
    pub async fn read_frame(&mut self, max_len: Option<u32>) -> Result<Vec<u8>, TransportError> {
        let mut len_bytes = [0u8; 4];
        self.stream
            .read_exact(&mut len_bytes)
            .await
            .map_err(TransportError::Broken)?;
        let len = u32::from_le_bytes(len_bytes);

        if len == 0 {
            return Err(TransportError::Framing("declared length is zero".to_owned()));
        }
        if let Some(cap) = max_len {
            if len > cap {
                return Err(TransportError::Framing(format!(
                    "declared length {len} exceeds cap {cap}"
                )));
            }
        }

        let mut body = vec![0u8; len as usize];
        self.stream.read_exact(&mut body).await.map_err(TransportError::Broken)?;
        Ok(body)
    }
}

/// Dial, write one frame, read one frame, close: a single request/response
/// exchange per connection.
pub async fn exchange(pipe_path: &str, payload: &[u8], max_response_len: Option<u32>) -> Result<Vec<u8>, TransportError> {
    let mut conn = dial(pipe_path).await?;
    conn.write_frame(payload).await?;
    conn.read_frame(max_response_len).await
}

/// Server side of a named pipe: binds once, accepts many connections. Used
/// by the registration server, which runs in a dedicated loop under the
/// broker's lifetime.
#[cfg(unix)]
pub struct Listener {
    inner: tokio::net::UnixListener,
    path: std::path::PathBuf,
}

#[cfg(windows)]
pub struct Listener {
    pipe_name: String,
}

impl Listener {
    #[cfg(unix)]
    pub fn bind(pipe_path: &str) -> std::io::Result<Self> {
        let path = std::path::PathBuf::from(pipe_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _ = std::fs::remove_file(&path);
        let inner = tokio::net::UnixListener::bind(&path)?;
        Ok(Self { inner, path })
    }

    #[cfg(windows)]
    pub fn bind(pipe_path: &str) -> std::io::Result<Self> {
        let pipe_name = if pipe_path.starts_with(r"\\.\pipe\") {
            pipe_path.to_owned()
        } else {
            format!(r"\\.\pipe\{pipe_path}")
        };
        Ok(Self { pipe_name })
    }

    #[cfg(unix)]
    pub async fn accept(&self) -> std::io::Result<Connection> {
        let (stream, _addr) = self.inner.accept().await?;
        Ok(Connection::from_stream(stream))
    }

    #[cfg(windows)]
    pub async fn accept(&self) -> std::io::Result<Connection> {
        let server = tokio::net::windows::named_pipe::ServerOptions::new()
            .first_pipe_instance(false)
            .create(&self.pipe_name)?;
        server.connect().await?;
        Ok(Connection::from_stream(RawConnection::Server(server)))
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn round_trips_a_frame() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("test.sock");
        let sock_path_str = sock_path.to_string_lossy().into_owned();

        let listener = tokio::net::UnixListener::bind(&sock_path).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _addr) = listener.accept().await.unwrap();
            let mut conn = Connection { stream };
            let body = conn.read_frame(None).await.unwrap();
            assert_eq!(body, b"ping");
            conn.write_frame(b"pong").await.unwrap();
        });

        let response = exchange(&sock_path_str, b"ping", None).await.unwrap();
        assert_eq!(response, b"pong");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn dial_failure_is_unreachable() {
        let err = dial("/nonexistent/path/to/a/pipe").await.unwrap_err();
        assert!(err.is_dead_pipe());
    }
}
