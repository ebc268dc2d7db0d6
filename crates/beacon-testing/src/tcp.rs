//! Raw TCP endpoint for observing connection lifetime.
//!
//! wiremock hides its sockets, so tests that need to see when the client
//! hangs up talk to this endpoint instead.

use std::{net::SocketAddr, time::Duration};

use anyhow::{ensure, Context, Result};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n";

/// Endpoint that answers one request with `200 OK` and hands back the socket.
pub struct RawEndpoint {
    listener: TcpListener,
    addr: SocketAddr,
}

impl RawEndpoint {
    /// Binds to a random local port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    /// Absolute URL for `path` on this endpoint.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Accepts one connection, reads one bodiless request and answers it.
    ///
    /// The connection is left open for the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the client disconnects before a full request head
    /// arrives.
    pub async fn serve_one(self) -> Result<TcpStream> {
        let (mut socket, _) = self.listener.accept().await?;
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];

        while !received.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await?;
            ensure!(n > 0, "client disconnected before sending a request");
            received.extend_from_slice(&buf[..n]);
        }

        socket.write_all(RESPONSE).await?;
        Ok(socket)
    }
}

/// Waits until the peer closes `socket`.
///
/// # Errors
///
/// Returns an error if the connection is still open after `timeout` or the
/// peer sends more data.
pub async fn wait_for_eof(socket: &mut TcpStream, timeout: Duration) -> Result<()> {
    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(timeout, socket.read(&mut buf))
        .await
        .with_context(|| format!("connection still open after {timeout:?}"))??;

    ensure!(n == 0, "expected EOF, got {n} bytes");
    Ok(())
}
