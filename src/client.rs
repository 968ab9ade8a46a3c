//! Client for the sandbox server.
//!
//! Each call opens a new connection, sends one request envelope, reads one
//! response envelope and closes the connection.

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::envelope::{self, EnvelopeError, Request};
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Client errors
#[derive(Debug)]
pub enum ClientError {
    /// Connecting, sending or receiving failed
    Io(io::Error),
    /// The request could not be encoded or the response decoded
    Envelope(EnvelopeError),
    /// The server closed the connection without replying
    Empty,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "IO error: {}", e),
            ClientError::Envelope(e) => write!(f, "{}", e),
            ClientError::Empty => write!(f, "Server closed the connection without a response"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            ClientError::Envelope(e) => Some(e),
            ClientError::Empty => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        ClientError::Io(error)
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(error: EnvelopeError) -> Self {
        ClientError::Envelope(error)
    }
}

/// Sandbox client
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
    buffer_size: usize,
}

impl Client {
    /// Create a client for the server at `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the size of the single response read.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Ask the server to scan `filepath` for `signature`.
    pub async fn check_local_file(
        &self,
        filepath: &str,
        signature: &str,
    ) -> Result<String, ClientError> {
        let request = Request::new("check_local_file")
            .arg("filepath", filepath)
            .arg("signature", signature);
        self.send(&request).await
    }

    /// Ask the server to move `filepath` into its quarantine directory.
    pub async fn quarantine_local_file(&self, filepath: &str) -> Result<String, ClientError> {
        let request = Request::new("quarantine_local_file").arg("filepath", filepath);
        self.send(&request).await
    }

    /// Send one request and return the server's response text.
    pub async fn send(&self, request: &Request) -> Result<String, ClientError> {
        let payload = envelope::encode_request(request)?;

        let mut stream = TcpStream::connect(&self.addr).await?;
        debug!(server = %self.addr, "Client has been connected to the server");

        info!(command = %request.command, args = ?request.args, "Sending request");
        stream.write_all(&payload).await?;

        let mut buffer = BytesMut::zeroed(self.buffer_size);
        let n = stream.read(&mut buffer[..]).await?;
        if n == 0 {
            return Err(ClientError::Empty);
        }
        buffer.truncate(n);

        let response = envelope::decode(&buffer)?;
        info!(response = %response, "Received from server");

        Ok(response)
    }
}
