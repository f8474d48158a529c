//! # sshcmd
//!
//! Minimal non-blocking SSH command execution client built on libssh2
//! (via the [`ssh2`] crate).
//!
//! The crate owns exactly one TCP socket and one SSH session at a time and
//! executes commands strictly one after another, each on its own ephemeral
//! exec channel. All protocol work (key exchange, encryption, channel
//! framing) is delegated to libssh2; this crate contributes sequencing,
//! readiness polling for the non-blocking session, deadline enforcement,
//! and bounded response buffering.
//!
//! ```no_run
//! use sshcmd::{AuthMethod, ClientConfig, SshClient};
//!
//! # fn main() -> Result<(), sshcmd::ClientError> {
//! let mut client = SshClient::new(ClientConfig {
//!     host: "10.0.0.2".into(),
//!     ..ClientConfig::default()
//! });
//! client.connect(&AuthMethod::with_password("root", "secret"))?;
//! let result = client.send_cmd("uname -a")?;
//! println!("{}", result.stdout_lossy());
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Client facade and authentication methods
pub mod client;

/// Client configuration
pub mod config;

/// Client-specific error types
pub mod error;

/// Command execution over an exec channel
pub mod exec;

/// Bounded response buffering
pub mod buffer;

/// Socket readiness waiting and non-blocking retry plumbing
pub mod waiter;

mod session;

pub use buffer::ResponseBuffer;
pub use client::{AuthMethod, SshClient};
pub use config::ClientConfig;
pub use error::{ClientError, FatalStage};
pub use exec::{CommandResult, Completion};
pub use waiter::Readiness;
