//! Client-specific error types

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors reported by the SSH command client
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the server failed; safe to retry with a fresh `connect`
    #[error("connection failed: {0}")]
    Connect(String),

    /// Operation attempted without an established connection
    #[error("not connected")]
    NotConnected,

    /// The exec request could not be sent before the send deadline; the
    /// connection has been torn down
    #[error("command send timed out")]
    SendTimeout,

    /// Reading the command response failed; the connection has been torn down
    #[error("response read failed: {0}")]
    Read(String),

    /// The remote command was terminated by a signal instead of exiting;
    /// the connection is still usable
    #[error("remote command killed by signal {signal}")]
    CommandSignal {
        /// Name of the signal that terminated the remote command
        signal: String,
    },

    /// The underlying protocol library reported a definitive error
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// I/O error on the transport socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unrecoverable failure; there is no retry path at this layer, the
    /// embedding application decides the recovery policy (restart, abort, ...)
    #[error("fatal {stage} failure: {message}")]
    Fatal {
        /// Connection stage where the failure occurred
        stage: FatalStage,
        /// Description of the underlying failure
        message: String,
    },
}

impl ClientError {
    /// Returns true for failures with no recovery path at this layer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Fatal { .. })
    }

    pub(crate) fn fatal(stage: FatalStage, message: impl fmt::Display) -> Self {
        ClientError::Fatal {
            stage,
            message: message.to_string(),
        }
    }
}

/// Connection stages whose definitive failure is unrecoverable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalStage {
    /// Creating the protocol session object
    SessionCreate,
    /// The transport handshake
    Handshake,
    /// User authentication
    Authentication,
    /// Opening the exec channel
    ChannelOpen,
}

impl fmt::Display for FatalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FatalStage::SessionCreate => "session create",
            FatalStage::Handshake => "handshake",
            FatalStage::Authentication => "authentication",
            FatalStage::ChannelOpen => "channel open",
        };
        f.write_str(name)
    }
}
