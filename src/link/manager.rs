//! Connection lifecycle for the controller link.
//!
//! One task owns the TCP stream, the receive buffer and the pending queue.
//! Handles talk to it over a bounded channel, so the socket only ever has a
//! single writer and no state is shared across tasks.
//!
//! ```text
//! disconnected ──► connecting ──► connected
//!      ▲               │              │
//!      │   refused     │   EOF/error  │
//!      └───────────────┴──────────────┘
//!        (wait reconnect_delay, retry forever)
//! ```
//!
//! Losing the connection fails every pending request (`socket_closed` on a
//! clean close, the error text otherwise) and discards any partial line.
//!
//! Writes are awaited inside the event loop, so reads pause while a write is
//! blocked on a full send buffer. Commands are a few dozen bytes, so this only
//! matters if the controller stops reading while it has megabytes of replies
//! queued for us.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::link::client::LinkError;
use crate::link::correlator::Correlator;
use crate::link::encoder::encode;
use crate::link::framing::LineFramer;
use crate::models::{CommandResult, Response};

/// Read chunk size for the socket.
const READ_CHUNK: usize = 4096;

/// Connection state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work submitted by a `LinkHandle`.
#[derive(Debug)]
pub(crate) enum LinkRequest {
    Send {
        command: crate::models::Command,
        reply: oneshot::Sender<CommandResult>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Whether the task keeps running.
enum Step {
    Continue,
    Stop,
}

/// Why a connected session ended.
enum SessionEnd {
    Lost(LinkError),
    Stop,
}

pub(crate) struct LinkManager {
    config: LinkConfig,
    requests: mpsc::Receiver<LinkRequest>,
    state_tx: watch::Sender<ConnectionState>,
    framer: LineFramer,
    correlator: Correlator,
    shutdown_ack: Option<oneshot::Sender<()>>,
}

impl LinkManager {
    pub(crate) fn new(
        config: LinkConfig,
        requests: mpsc::Receiver<LinkRequest>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            config,
            requests,
            state_tx,
            framer: LineFramer::new(),
            correlator: Correlator::new(),
            shutdown_ack: None,
        }
    }

    /// Connect, serve, reconnect; until shutdown or every handle is gone.
    pub(crate) async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            debug!("Connecting to controller at {}", self.config.endpoint());

            let stream = match self.connect().await {
                None => break,
                Some(Ok(stream)) => Some(stream),
                Some(Err(e)) => {
                    warn!("Failed to connect to {}: {}", self.config.endpoint(), e);
                    None
                }
            };

            if let Some(stream) = stream {
                info!("Connected to controller at {}", self.config.endpoint());
                self.set_state(ConnectionState::Connected);

                match self.serve(stream).await {
                    SessionEnd::Stop => break,
                    SessionEnd::Lost(err) => self.connection_lost(err),
                }
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = self.config.reconnect_delay;
            info!("Retrying controller connection in {:?}", delay);
            if let Step::Stop = self.wait_before_retry(delay).await {
                break;
            }
        }

        self.close();
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Open the transport. `None` means the task was asked to stop.
    async fn connect(&mut self) -> Option<io::Result<TcpStream>> {
        let connect = TcpStream::connect((self.config.host.clone(), self.config.port));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return Some(result),
                request = self.requests.recv() => {
                    if let Step::Stop = self.reject(request) {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep out the reconnect delay while refusing sends.
    async fn wait_before_retry(&mut self, delay: Duration) -> Step {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Step::Continue,
                request = self.requests.recv() => {
                    if let Step::Stop = self.reject(request) {
                        return Step::Stop;
                    }
                }
            }
        }
    }

    /// Handle a request while not connected.
    fn reject(&mut self, request: Option<LinkRequest>) -> Step {
        match request {
            None => Step::Stop,
            Some(LinkRequest::Shutdown { done }) => {
                self.shutdown_ack = Some(done);
                Step::Stop
            }
            Some(LinkRequest::Send { command, reply }) => {
                debug!("Rejecting '{}': not connected", command.name);
                let _ = reply.send(LinkError::NoSocket.into());
                Step::Continue
            }
        }
    }

    /// Pump one live connection until it drops or the task stops.
    async fn serve(&mut self, stream: TcpStream) -> SessionEnd {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (mut reader, mut writer) = stream.into_split();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("Controller closed the connection");
                        return SessionEnd::Lost(LinkError::SocketClosed);
                    }
                    Ok(n) => self.dispatch(&buf[..n]),
                    Err(e) => {
                        warn!("Controller connection error: {}", e);
                        return SessionEnd::Lost(e.into());
                    }
                },
                request = self.requests.recv() => match request {
                    None => return SessionEnd::Stop,
                    Some(LinkRequest::Shutdown { done }) => {
                        self.shutdown_ack = Some(done);
                        return SessionEnd::Stop;
                    }
                    Some(LinkRequest::Send { command, reply }) => {
                        let message = match encode(&command) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("Not sending '{}': {}", command.name, e);
                                let _ = reply.send(e.into());
                                continue;
                            }
                        };

                        self.correlator.push(reply);
                        debug!(
                            "Sending: {} ({} pending)",
                            String::from_utf8_lossy(&message).trim_end(),
                            self.correlator.len()
                        );
                        // Blocks reads until the kernel accepts the whole line.
                        if let Err(e) = writer.write_all(&message).await {
                            warn!("Failed to write to controller: {}", e);
                            return SessionEnd::Lost(e.into());
                        }
                    }
                },
            }
        }
    }

    /// Frame inbound bytes and hand each line to the oldest pending request.
    ///
    /// An oversized line still answers one request, as `line_too_long`.
    fn dispatch(&mut self, bytes: &[u8]) {
        for frame in self.framer.feed(bytes) {
            debug!("Received: {:?}", frame);
            let response = Response::from(frame);
            if let Response::Raw(ref raw) = response {
                warn!("Controller sent a non-JSON line: {}", raw);
            }
            self.correlator.resolve_next(response);
        }
    }

    fn connection_lost(&mut self, err: LinkError) {
        let failed = self.correlator.fail_all(&err.reason());
        if failed > 0 {
            warn!("Connection lost with {} requests pending: {}", failed, err);
        }
        self.framer.reset();
    }

    /// Fail everything still queued and acknowledge shutdown.
    fn close(&mut self) {
        self.set_state(ConnectionState::Closing);
        self.requests.close();

        let reason = LinkError::Shutdown.reason();
        self.correlator.fail_all(&reason);
        while let Ok(request) = self.requests.try_recv() {
            match request {
                LinkRequest::Send { reply, .. } => {
                    let _ = reply.send(CommandResult::failure(reason.clone()));
                }
                LinkRequest::Shutdown { done } => {
                    let _ = done.send(());
                }
            }
        }
        self.framer.reset();

        self.set_state(ConnectionState::Disconnected);
        info!("Controller link shut down");
        if let Some(done) = self.shutdown_ack.take() {
            let _ = done.send(());
        }
    }
}
