//! Caller-side handle to the controller link.
//!
//! `LinkHandle` is a cheap, cloneable front for the single link task. Every
//! clone talks to the same connection; none of them touch the socket.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::debug;

use crate::config::LinkConfig;
use crate::link::manager::{ConnectionState, LinkManager, LinkRequest};
use crate::models::{Command, CommandResult};

/// Link error types.
///
/// Each variant has a short wire reason (see [`LinkError::reason`]) that is
/// what callers see in `CommandResult::error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LinkError {
    /// No live connection when the command was issued.
    #[error("Not connected to the controller")]
    NoSocket,

    /// Controller closed the connection with the request in flight.
    #[error("Connection closed by the controller")]
    SocketClosed,

    /// Transport failure (reset, refused, unreachable).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out waiting for its response.
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// An option tried to use the reserved `cmd` field.
    #[error("Option name 'cmd' is reserved for the command name")]
    ReservedOption,

    /// Command could not be serialized.
    #[error("Failed to encode command: {0}")]
    Encode(String),

    /// Link task has shut down.
    #[error("Link is shut down")]
    Shutdown,
}

impl LinkError {
    /// Reason string carried in the failure result.
    pub fn reason(&self) -> String {
        match self {
            LinkError::NoSocket => "no_socket".to_string(),
            LinkError::SocketClosed => "socket_closed".to_string(),
            LinkError::Transport(text) => text.clone(),
            LinkError::Timeout(_) => "timeout".to_string(),
            LinkError::ReservedOption => "reserved_option".to_string(),
            LinkError::Encode(_) => "encode_failed".to_string(),
            LinkError::Shutdown => "link_shutdown".to_string(),
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Transport(err.to_string())
    }
}

impl From<LinkError> for CommandResult {
    fn from(err: LinkError) -> Self {
        CommandResult::failure(err.reason())
    }
}

/// Handle to the controller link.
///
/// # Example
///
/// ```ignore
/// use rover_link::{Command, LinkConfig, LinkHandle};
///
/// let link = LinkHandle::spawn(LinkConfig::new("192.168.0.134", 5555));
/// let result = link.issue_command(Command::forward(40, 0)).await;
/// if !result.ok {
///     eprintln!("forward failed: {}", result.error_text());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LinkHandle {
    request_tx: mpsc::Sender<LinkRequest>,
    state_rx: watch::Receiver<ConnectionState>,
    request_timeout: Option<Duration>,
}

impl LinkHandle {
    /// Start the link task on the current tokio runtime.
    ///
    /// Returns immediately; the first connection attempt runs in the
    /// background and is retried forever.
    pub fn spawn(config: LinkConfig) -> Self {
        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let request_timeout = config.request_timeout;

        let manager = LinkManager::new(config, request_rx, state_tx);
        tokio::spawn(manager.run());

        Self {
            request_tx,
            state_rx,
            request_timeout,
        }
    }

    /// Send a command and wait for its correlated result.
    ///
    /// Never fails: transport and protocol problems come back as
    /// `{ok: false, error: <reason>}`.
    pub async fn issue_command(&self, command: Command) -> CommandResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = LinkRequest::Send {
            command,
            reply: reply_tx,
        };
        if self.request_tx.send(request).await.is_err() {
            return LinkError::Shutdown.into();
        }

        match self.request_timeout {
            None => reply_rx.await.unwrap_or_else(|_| LinkError::Shutdown.into()),
            Some(limit) => match timeout(limit, reply_rx).await {
                Ok(reply) => reply.unwrap_or_else(|_| LinkError::Shutdown.into()),
                Err(_) => {
                    debug!("Request timed out after {:?}", limit);
                    LinkError::Timeout(millis(limit)).into()
                }
            },
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the link reaches `state`.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Shutdown` if the link task exits first.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), LinkError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| LinkError::Shutdown)
    }

    /// Stop the link task, failing anything still pending.
    ///
    /// Waits for the task to finish closing. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .request_tx
            .send(LinkRequest::Shutdown { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_reasons() {
        assert_eq!(LinkError::NoSocket.reason(), "no_socket");
        assert_eq!(LinkError::SocketClosed.reason(), "socket_closed");
        assert_eq!(
            LinkError::Transport("Connection reset by peer".to_string()).reason(),
            "Connection reset by peer"
        );
        assert_eq!(LinkError::Timeout(500).reason(), "timeout");
        assert_eq!(LinkError::ReservedOption.reason(), "reserved_option");
        assert_eq!(LinkError::Shutdown.reason(), "link_shutdown");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(LinkError::Timeout(30).to_string(), "Request timed out after 30ms");
        assert_eq!(
            LinkError::Transport("refused".to_string()).to_string(),
            "Transport error: refused"
        );
    }

    #[test]
    fn test_error_into_result() {
        let result: CommandResult = LinkError::NoSocket.into();
        assert_eq!(
            result.to_value(),
            serde_json::json!({"ok": false, "error": "no_socket"})
        );
    }

    #[tokio::test]
    async fn test_timeout_when_link_never_answers() {
        // Stand-in link task that accepts the request and never replies.
        let (request_tx, mut request_rx) = mpsc::channel(1);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let link = LinkHandle {
            request_tx,
            state_rx,
            request_timeout: Some(Duration::from_millis(20)),
        };
        let stalled = tokio::spawn(async move {
            let _request = request_rx.recv().await;
            std::future::pending::<()>().await;
        });

        let result = link.issue_command(Command::stop()).await;
        assert_eq!(result, CommandResult::failure("timeout"));
        stalled.abort();
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_io_error_keeps_text() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert_eq!(LinkError::from(io), LinkError::Transport("reset by peer".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_controller_fails_fast() {
        // Port 1 on localhost is closed; the link never reaches `connected`.
        let mut config = LinkConfig::new("127.0.0.1", 1);
        config.reconnect_delay = Duration::from_secs(60);
        let link = LinkHandle::spawn(config);

        let result = timeout(Duration::from_secs(5), link.issue_command(Command::stop()))
            .await
            .expect("disconnected send must not block");
        assert_eq!(result, CommandResult::failure("no_socket"));
        assert!(!link.is_connected());

        link.shutdown().await;
        assert_eq!(link.state(), ConnectionState::Disconnected);
        let after = link.issue_command(Command::stop()).await;
        assert_eq!(after.error_text(), "link_shutdown");
    }
}
