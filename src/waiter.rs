//! Socket readiness waiting and non-blocking retry plumbing

use crate::error::ClientError;
use ssh2::BlockDirections;
use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// Outcome of a single readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The socket became ready in the requested direction
    Ready,
    /// The timeout elapsed first
    TimedOut,
}

/// Outcome of one attempt at a non-blocking operation.
pub(crate) enum Step<T> {
    /// The operation completed.
    Done(T),
    /// The operation would block; poll the socket and retry.
    Again,
}

/// Types that can block until their underlying socket is ready in the
/// direction the session is currently stalled on.
pub(crate) trait Pollable {
    fn wait_ready(&mut self) -> Result<(), ClientError>;
}

/// Blocks until `fd` is ready in the direction(s) the session reported it
/// is stalled on, or until `timeout` elapses.
///
/// This is the only suspension point in the crate; every "would block"
/// condition from the protocol layer is absorbed here.
pub fn wait_socket(
    fd: RawFd,
    directions: BlockDirections,
    timeout: Duration,
) -> io::Result<Readiness> {
    let events = match directions {
        BlockDirections::Inbound => libc::POLLIN,
        BlockDirections::Outbound => libc::POLLOUT,
        _ => libc::POLLIN | libc::POLLOUT,
    };
    let mut fds = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    loop {
        let rc = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if rc > 0 {
            return Ok(Readiness::Ready);
        }
        if rc == 0 {
            return Ok(Readiness::TimedOut);
        }
        let err = io::Error::last_os_error();
        // EINTR restarts the full timeout; acceptable for the coarse bounds
        // used here.
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Drives a non-blocking operation to completion, waiting for socket
/// readiness between attempts.
///
/// `deadline` bounds the cumulative retry time; `None` retries until the
/// operation stops reporting [`Step::Again`]. Returns `Ok(None)` when the
/// deadline expires first.
pub(crate) fn drive<P, T>(
    io: &mut P,
    deadline: Option<Duration>,
    mut op: impl FnMut(&mut P) -> Result<Step<T>, ClientError>,
) -> Result<Option<T>, ClientError>
where
    P: Pollable + ?Sized,
{
    let start = Instant::now();
    loop {
        if let Step::Done(value) = op(io)? {
            return Ok(Some(value));
        }
        if let Some(limit) = deadline {
            if start.elapsed() >= limit {
                return Ok(None);
            }
        }
        io.wait_ready()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    struct CountingPoller {
        waits: usize,
    }

    impl Pollable for CountingPoller {
        fn wait_ready(&mut self) -> Result<(), ClientError> {
            self.waits += 1;
            Ok(())
        }
    }

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_wait_socket_writable_is_ready() {
        let (client, _server) = loopback_pair();
        let readiness = wait_socket(
            client.as_raw_fd(),
            BlockDirections::Outbound,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(readiness, Readiness::Ready);
    }

    #[test]
    fn test_wait_socket_silent_peer_times_out() {
        let (client, _server) = loopback_pair();
        let readiness = wait_socket(
            client.as_raw_fd(),
            BlockDirections::Inbound,
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(readiness, Readiness::TimedOut);
    }

    #[test]
    fn test_drive_retries_until_done() {
        let mut poller = CountingPoller { waits: 0 };
        let mut remaining = 3;
        let value = drive(&mut poller, None, |_| {
            if remaining == 0 {
                Ok(Step::Done(7))
            } else {
                remaining -= 1;
                Ok(Step::Again)
            }
        })
        .unwrap();
        assert_eq!(value, Some(7));
        assert_eq!(poller.waits, 3);
    }

    #[test]
    fn test_drive_deadline_expires() {
        let mut poller = CountingPoller { waits: 0 };
        let value: Option<()> = drive(&mut poller, Some(Duration::ZERO), |_| Ok(Step::Again)).unwrap();
        assert_eq!(value, None);
        assert_eq!(poller.waits, 0);
    }

    #[test]
    fn test_drive_propagates_operation_errors() {
        let mut poller = CountingPoller { waits: 0 };
        let result: Result<Option<()>, _> = drive(&mut poller, None, |_| {
            Err(ClientError::Protocol("scripted failure".to_string()))
        });
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }
}
