
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::protocol::{next_request_id, Command, Document, Frame, FrameCodec};

use super::{Connection, ConnectionError, DialOptions, Dialer, Endpoint};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// Connection is open and usable
    Open,
    /// Connection is broken/closed
    Closed,
}

/// Dials plain TCP connections speaking the document frame protocol
#[derive(Debug, Default, Clone)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(
        &self,
        endpoint: &Endpoint,
        options: &DialOptions,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let conn = TcpConnection::connect(endpoint, options).await?;
        Ok(Box::new(conn))
    }
}

/// A framed TCP connection to one endpoint
pub struct TcpConnection {
    framed: Framed<TcpStream, FrameCodec>,
    state: ConnectionState,
    options: DialOptions,
}

impl TcpConnection {
    /// Open a new connection to an endpoint
    pub async fn connect(endpoint: &Endpoint, options: &DialOptions) -> Result<Self, ConnectionError> {
        let addr = endpoint.to_string();
        debug!(addr = %addr, "Connecting to endpoint");

        let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::Timeout(options.connect_timeout))?
            .map_err(|e| {
                error!(addr = %addr, error = %e, "Failed to connect to endpoint");
                ConnectionError::Connect(e.to_string())
            })?;

        stream
            .set_nodelay(true)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        Ok(Self {
            framed: Framed::new(stream, FrameCodec),
            state: ConnectionState::Open,
            options: options.clone(),
        })
    }

    /// Check if connection is usable
    pub fn is_usable(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Write every request, then read the replies in order
    async fn round_trip(&mut self, commands: &[Command]) -> Result<Vec<Document>, ConnectionError> {
        let mut request_ids = Vec::with_capacity(commands.len());
        for command in commands {
            let request_id = next_request_id();
            let frame = command.encode(request_id)?;
            self.framed
                .feed(frame)
                .await
                .map_err(|e| ConnectionError::Io(e.to_string()))?;
            request_ids.push(request_id);
        }
        self.framed
            .flush()
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut replies = Vec::with_capacity(commands.len());
        for request_id in request_ids {
            let frame = self.recv().await?;
            if frame.request_id != request_id {
                return Err(ConnectionError::Protocol(format!(
                    "Reply to request {} arrived while waiting for {}",
                    frame.request_id, request_id
                )));
            }
            replies.push(Command::decode_reply(&frame)?);
        }
        Ok(replies)
    }

    async fn recv(&mut self) -> Result<Frame, ConnectionError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            None => Err(ConnectionError::Disconnected),
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn execute(&mut self, commands: &[Command]) -> Result<Vec<Document>, ConnectionError> {
        if !self.is_usable() {
            return Err(ConnectionError::Disconnected);
        }

        let timeout = self.options.exchange_timeout;
        let result = match tokio::time::timeout(timeout, self.round_trip(commands)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        };

        // Any failure leaves the stream at an unknown position
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        if let Err(e) = self.framed.close().await {
            debug!(error = %e, "Error while closing connection");
        }
    }
}
