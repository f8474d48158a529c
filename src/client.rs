//! Client facade and authentication methods

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::exec::{CommandResult, ExecError, ExecLimits};
use crate::session::Connection;
use tracing::{info, warn};

/// Credentials for authenticating the session.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication
    Password {
        /// Remote username
        username: String,
        /// Password
        password: String,
    },
    /// Public key authentication from in-memory key material
    Key {
        /// Remote username
        username: String,
        /// Public key (PEM/OpenSSH text); derived from the private key when
        /// absent
        public_key: Option<String>,
        /// Private key (PEM/OpenSSH text)
        private_key: String,
        /// Passphrase protecting the private key, if any
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    /// Password authentication.
    pub fn with_password(username: &str, password: &str) -> Self {
        AuthMethod::Password {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Public key authentication from in-memory key material.
    pub fn with_key(
        username: &str,
        private_key: &str,
        public_key: Option<&str>,
        passphrase: Option<&str>,
    ) -> Self {
        AuthMethod::Key {
            username: username.to_string(),
            public_key: public_key.map(str::to_string),
            private_key: private_key.to_string(),
            passphrase: passphrase.map(str::to_string),
        }
    }

    /// The username this method authenticates as.
    pub fn username(&self) -> &str {
        match self {
            AuthMethod::Password { username, .. } | AuthMethod::Key { username, .. } => username,
        }
    }
}

/// Single-session SSH client executing one command at a time.
///
/// Holds at most one live connection; commands run strictly sequentially,
/// each on its own ephemeral exec channel.
pub struct SshClient {
    config: ClientConfig,
    conn: Option<Connection>,
}

impl SshClient {
    /// Create a disconnected client for the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self { config, conn: None }
    }

    /// Connect and authenticate. A no-op when already connected: no new
    /// network activity happens and the live connection is kept.
    ///
    /// Socket-level failure is a recoverable [`ClientError::Connect`];
    /// session creation, handshake, and authentication failures are
    /// [`ClientError::Fatal`] — this layer has no recovery path for them,
    /// the embedding application decides what fatal means.
    pub fn connect(&mut self, auth: &AuthMethod) -> Result<(), ClientError> {
        if self.conn.is_some() {
            info!("Already connected, ignoring connect request");
            return Ok(());
        }
        info!(
            "Connecting to {}@{}:{}",
            auth.username(),
            self.config.host,
            self.config.port
        );
        let conn = Connection::establish(&self.config, auth)?;
        self.conn = Some(conn);
        info!("Connected to SSH server");
        Ok(())
    }

    /// Close the connection, releasing the session and socket together.
    /// Idempotent: calling it while disconnected is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown();
            info!("Disconnected from SSH server");
        }
    }

    /// Whether a live, authenticated connection exists.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// SHA-1 fingerprint of the server host key, when connected.
    pub fn host_key_fingerprint(&self) -> Option<String> {
        self.conn.as_ref().and_then(Connection::host_key_fingerprint)
    }

    /// Execute one command and collect its output.
    ///
    /// Fails fast with [`ClientError::NotConnected`] when disconnected. On
    /// connection-fatal failures (send deadline overrun, definitive I/O
    /// errors) the connection is torn down before the error is returned, so
    /// a fresh `connect` is required before the next command. A receive
    /// deadline overrun is not fatal: the partial output is returned with
    /// [`crate::Completion::TimedOut`] and the connection stays up.
    pub fn send_cmd(&mut self, command: &str) -> Result<CommandResult, ClientError> {
        let conn = self.conn.as_mut().ok_or(ClientError::NotConnected)?;
        info!("Executing remote command: {}", command);
        let limits = ExecLimits {
            send_timeout: self.config.send_timeout,
            recv_timeout: self.config.recv_timeout,
            open_deadline: self.config.open_deadline,
            close_deadline: self.config.close_deadline,
        };
        match conn.run(command, &limits) {
            Ok(result) => Ok(result),
            Err(ExecError::Teardown(err)) => {
                warn!("Command failed fatally for the connection: {}", err);
                self.disconnect();
                Err(err)
            }
            Err(ExecError::Command(err)) => Err(err),
        }
    }
}

impl Drop for SshClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
