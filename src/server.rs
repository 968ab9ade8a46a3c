//! TCP server for sandbox commands.
//!
//! Accepts connections, spawns one task per connection and runs exactly one
//! request/response exchange on each before closing it.
//!
//! ## Lifecycle
//!
//! - `Server::bind`: socket created and bound, not yet listening
//! - `Server::run`: listening, accept loop until the shutdown future resolves
//! - stopped: listening socket closed, in-flight handlers run to completion
//!
//! `run` consumes the server, so a stopped server cannot be started again.

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::envelope::{self, EnvelopeError};
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

/// Server instance
pub struct Server {
    socket: socket2::Socket,
    local_addr: SocketAddr,
    backlog: i32,
    buffer_size: usize,
    dispatcher: Arc<Dispatcher>,
    connection_limit: Option<Arc<Semaphore>>,
}

impl Server {
    /// Create the listening socket and bind it to the configured address.
    pub fn bind(config: &Config) -> io::Result<Self> {
        let addr = config
            .listen_addr()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address for '{}'", config.listen_addr()),
                )
            })?;

        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;

        let local_addr = socket.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "bound socket has no inet address")
        })?;

        info!(
            address = %local_addr,
            threads = config.threads,
            max_connections = ?config.max_connections,
            quarantine_dir = %config.quarantine_dir.display(),
            "Server has been initialized"
        );

        Ok(Server {
            socket,
            local_addr,
            backlog: i32::try_from(config.threads).unwrap_or(i32::MAX),
            buffer_size: config.buffer_size,
            dispatcher: Arc::new(Dispatcher::new(config.quarantine_dir.clone())),
            connection_limit: config
                .max_connections
                .map(|limit| Arc::new(Semaphore::new(limit))),
        })
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start listening and accept connections until `shutdown` resolves.
    ///
    /// Returns once the listening socket is closed and every handler that
    /// was already running has finished.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            socket,
            local_addr,
            backlog,
            buffer_size,
            dispatcher,
            connection_limit,
        } = self;

        socket.listen(backlog)?;
        socket.set_nonblocking(true)?;
        let listener = TcpListener::from_std(socket.into())?;
        info!(address = %local_addr, backlog, "The server has started listening");

        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            // Wait for a handler slot when a limit is configured
            let permit = match &connection_limit {
                Some(limit) => tokio::select! {
                    _ = &mut shutdown => break,
                    permit = Arc::clone(limit).acquire_owned() => {
                        Some(permit.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?)
                    }
                },
                None => None,
            };

            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        let dispatcher = Arc::clone(&dispatcher);

                        handlers.spawn(async move {
                            match handle_connection(stream, dispatcher, buffer_size).await {
                                Ok(()) => trace!(peer = %peer, "Connection closed"),
                                Err(ConnectionError::Envelope(e)) => {
                                    warn!(
                                        peer = %peer,
                                        error = %e,
                                        "Malformed request, dropping connection"
                                    );
                                }
                                Err(e) => debug!(peer = %peer, error = %e, "Connection error"),
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }

            // Reap finished handlers
            while let Some(result) = handlers.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "Connection handler panicked");
                }
            }
        }

        drop(listener);
        info!(in_flight = handlers.len(), "The server has been stopped");

        while let Some(result) = handlers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Connection handler panicked");
            }
        }

        Ok(())
    }
}

/// Run `server` until `interrupt` resolves, then drain in-flight handlers.
///
/// `interrupt` is called once to stop the server and again once the drain
/// has started. If the second call resolves before the drain finishes, the
/// remaining handlers are abandoned and this returns.
pub async fn run_until_interrupted<I, S>(server: Server, interrupt: I) -> io::Result<()>
where
    I: Fn() -> S,
    S: Future<Output = ()>,
{
    let interrupt = &interrupt;
    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();

    let serving = server.run(async move {
        interrupt().await;
        let _ = stopping_tx.send(());
    });

    let forced = async move {
        if stopping_rx.await.is_err() {
            return std::future::pending::<()>().await;
        }
        interrupt().await;
    };

    tokio::select! {
        result = serving => result,
        _ = forced => {
            warn!("Interrupted again, abandoning in-flight handlers");
            Ok(())
        }
    }
}

/// Errors that end a connection without a response
#[derive(Debug)]
pub enum ConnectionError {
    /// Socket read or write failed
    Io(io::Error),
    /// Request could not be decoded
    Envelope(EnvelopeError),
    /// The blocking dispatch task failed
    Task(tokio::task::JoinError),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "IO error: {}", e),
            ConnectionError::Envelope(e) => write!(f, "{}", e),
            ConnectionError::Task(e) => write!(f, "Dispatch task failed: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Io(e) => Some(e),
            ConnectionError::Envelope(e) => Some(e),
            ConnectionError::Task(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        ConnectionError::Io(error)
    }
}

impl From<EnvelopeError> for ConnectionError {
    fn from(error: EnvelopeError) -> Self {
        ConnectionError::Envelope(error)
    }
}

impl From<tokio::task::JoinError> for ConnectionError {
    fn from(error: tokio::task::JoinError) -> Self {
        ConnectionError::Task(error)
    }
}

/// Handle a single client connection.
///
/// One bounded read, one dispatch, one write. Anything beyond
/// `buffer_size` bytes in the request is not read.
pub async fn handle_connection(
    mut stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    buffer_size: usize,
) -> Result<(), ConnectionError> {
    let mut buffer = BytesMut::zeroed(buffer_size);
    let n = stream.read(&mut buffer[..]).await?;
    buffer.truncate(n);

    let request = envelope::decode_request(&buffer)?;
    info!(command = %request.command, args = ?request.args, "Received request");

    // File operations block
    let response =
        tokio::task::spawn_blocking(move || dispatcher.dispatch_request(&request)).await?;
    debug!(response = %response, "Sending response");

    stream.write_all(&envelope::encode(&response)).await?;
    stream.shutdown().await?;

    Ok(())
}
