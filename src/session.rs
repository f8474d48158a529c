//! Session lifecycle: one socket, one authenticated SSH session.

use crate::buffer::ResponseBuffer;
use crate::client::AuthMethod;
use crate::config::ClientConfig;
use crate::error::{ClientError, FatalStage};
use crate::exec::{self, CommandChannel, CommandResult, ExecError, ExecLimits};
use crate::waiter::{self, drive, Pollable, Step};
use ssh2::{HashType, Session};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::{debug, info, warn};

/// libssh2's would-block error code.
const LIBSSH2_ERROR_EAGAIN: i32 = -37;

fn is_would_block(err: &ssh2::Error) -> bool {
    err.code() == ssh2::ErrorCode::Session(LIBSSH2_ERROR_EAGAIN)
}

/// An established, authenticated SSH session bound to one TCP socket.
///
/// The session and its socket live and die together: the session owns the
/// stream, and dropping the `Connection` releases both. A value of this
/// type only exists once the full connect sequence (socket, session,
/// handshake, authentication) has succeeded; the intermediate stages are
/// visible only as [`FatalStage`] tags on errors.
pub(crate) struct Connection {
    sess: Session,
    fd: RawFd,
    wait_timeout: Duration,
    response: ResponseBuffer,
}

impl Connection {
    /// Drives the full connect sequence. Socket-level failure is a
    /// recoverable [`ClientError::Connect`]; everything after the socket is
    /// [`ClientError::Fatal`] on definitive failure.
    pub(crate) fn establish(
        config: &ClientConfig,
        auth: &AuthMethod,
    ) -> Result<Connection, ClientError> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| ClientError::Connect(format!("address resolution failed: {}", e)))?
            .next()
            .ok_or_else(|| {
                ClientError::Connect(format!("no addresses found for {}", config.host))
            })?;
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|e| ClientError::Connect(format!("{}:{}: {}", config.host, config.port, e)))?;
        debug!("TCP connection established to {}", addr);

        let fd = stream.as_raw_fd();
        let mut sess = Session::new()
            .map_err(|e| ClientError::fatal(FatalStage::SessionCreate, e))?;
        sess.set_tcp_stream(stream);
        sess.set_blocking(false);

        let mut conn = Connection {
            sess,
            fd,
            wait_timeout: config.wait_timeout,
            response: ResponseBuffer::new(config.max_response_len),
        };
        conn.handshake(config.handshake_deadline)?;
        if let Some(fingerprint) = conn.host_key_fingerprint() {
            debug!("Server host key fingerprint: {}", fingerprint);
        }
        conn.authenticate(auth, config.auth_deadline)?;
        Ok(conn)
    }

    fn handshake(&mut self, deadline: Option<Duration>) -> Result<(), ClientError> {
        let done = drive(self, deadline, |c| match c.sess.handshake() {
            Ok(()) => Ok(Step::Done(())),
            Err(e) if is_would_block(&e) => Ok(Step::Again),
            Err(e) => Err(ClientError::fatal(FatalStage::Handshake, e)),
        })?;
        match done {
            Some(()) => {
                debug!("SSH handshake complete");
                Ok(())
            }
            None => Err(ClientError::fatal(
                FatalStage::Handshake,
                "handshake deadline exceeded",
            )),
        }
    }

    fn authenticate(
        &mut self,
        auth: &AuthMethod,
        deadline: Option<Duration>,
    ) -> Result<(), ClientError> {
        let done = drive(self, deadline, |c| {
            let attempt = match auth {
                AuthMethod::Password { username, password } => {
                    c.sess.userauth_password(username, password)
                }
                AuthMethod::Key {
                    username,
                    public_key,
                    private_key,
                    passphrase,
                } => c.sess.userauth_pubkey_memory(
                    username,
                    public_key.as_deref(),
                    private_key,
                    passphrase.as_deref(),
                ),
            };
            match attempt {
                Ok(()) => Ok(Step::Done(())),
                Err(e) if is_would_block(&e) => Ok(Step::Again),
                Err(e) => Err(ClientError::fatal(FatalStage::Authentication, e)),
            }
        })?;
        match done {
            Some(()) => {
                debug!("Authentication succeeded for {}", auth.username());
                Ok(())
            }
            None => Err(ClientError::fatal(
                FatalStage::Authentication,
                "authentication deadline exceeded",
            )),
        }
    }

    /// SHA-1 host key fingerprint as colon-separated hex.
    pub(crate) fn host_key_fingerprint(&self) -> Option<String> {
        self.sess
            .host_key_hash(HashType::Sha1)
            .map(hex_fingerprint)
    }

    /// Opens one exec channel, runs `command` on it, and frees the channel
    /// before returning, whatever the outcome.
    pub(crate) fn run(
        &mut self,
        command: &str,
        limits: &ExecLimits,
    ) -> Result<CommandResult, ExecError> {
        let channel = self
            .open_channel(limits.open_deadline)
            .map_err(ExecError::Teardown)?;
        let mut chan = Ssh2Channel {
            channel,
            sess: &self.sess,
            fd: self.fd,
            wait_timeout: self.wait_timeout,
        };
        // The channel is freed when `chan` drops, on every path out of here.
        exec::run_command(&mut chan, command, limits, &mut self.response)
    }

    fn open_channel(&mut self, deadline: Option<Duration>) -> Result<ssh2::Channel, ClientError> {
        let opened = drive(self, deadline, |c| match c.sess.channel_session() {
            Ok(channel) => Ok(Step::Done(channel)),
            Err(e) if is_would_block(&e) => Ok(Step::Again),
            Err(e) => Err(ClientError::fatal(FatalStage::ChannelOpen, e)),
        })?;
        opened.ok_or_else(|| {
            ClientError::fatal(FatalStage::ChannelOpen, "channel open deadline exceeded")
        })
    }

    /// Best-effort session teardown; the socket closes when the session is
    /// dropped.
    pub(crate) fn shutdown(&mut self) {
        if let Err(e) = self
            .sess
            .disconnect(None, "client disconnecting, releasing ssh resources", None)
        {
            if !is_would_block(&e) {
                warn!("Session disconnect failed: {}", e);
            }
        }
        info!("SSH session released");
    }
}

impl Pollable for Connection {
    fn wait_ready(&mut self) -> Result<(), ClientError> {
        waiter::wait_socket(self.fd, self.sess.block_directions(), self.wait_timeout)?;
        Ok(())
    }
}

/// [`CommandChannel`] over a live libssh2 exec channel.
struct Ssh2Channel<'s> {
    channel: ssh2::Channel,
    sess: &'s Session,
    fd: RawFd,
    wait_timeout: Duration,
}

impl Pollable for Ssh2Channel<'_> {
    fn wait_ready(&mut self) -> Result<(), ClientError> {
        waiter::wait_socket(self.fd, self.sess.block_directions(), self.wait_timeout)?;
        Ok(())
    }
}

impl CommandChannel for Ssh2Channel<'_> {
    fn exec(&mut self, command: &str) -> Result<Step<()>, ClientError> {
        match self.channel.exec(command) {
            Ok(()) => Ok(Step::Done(())),
            Err(e) if is_would_block(&e) => Ok(Step::Again),
            Err(e) => Err(ClientError::Protocol(format!("exec request failed: {}", e))),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Step<usize>, ClientError> {
        match self.channel.read(buf) {
            Ok(n) => Ok(Step::Done(n)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Step::Again),
            Err(e) => Err(ClientError::Read(e.to_string())),
        }
    }

    fn close(&mut self) -> Result<Step<()>, ClientError> {
        match self.channel.close() {
            Ok(()) => Ok(Step::Done(())),
            Err(e) if is_would_block(&e) => Ok(Step::Again),
            Err(e) => Err(ClientError::Protocol(format!(
                "channel close failed: {}",
                e
            ))),
        }
    }

    fn exit_status(&mut self) -> Result<i32, ClientError> {
        self.channel
            .exit_status()
            .map_err(|e| ClientError::Protocol(format!("exit status unavailable: {}", e)))
    }

    fn exit_signal(&mut self) -> Result<Option<String>, ClientError> {
        self.channel
            .exit_signal()
            .map(|s| s.exit_signal)
            .map_err(|e| ClientError::Protocol(format!("exit signal unavailable: {}", e)))
    }
}

fn hex_fingerprint(hash: &[u8]) -> String {
    hash.iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}
