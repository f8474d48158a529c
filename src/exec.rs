//! Command execution over an exec channel

use crate::buffer::ResponseBuffer;
use crate::error::ClientError;
use crate::waiter::{drive, Pollable, Step};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How the receive phase of a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The remote closed the stream; the full output was captured
    Complete,
    /// The response buffer reached capacity; trailing output was discarded
    Truncated,
    /// The receive deadline elapsed; the output captured so far is returned
    TimedOut,
}

/// Result of a successfully executed remote command
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Captured command output, at most the configured maximum length
    pub stdout: Vec<u8>,
    /// Numeric exit status reported by the remote
    pub exit_status: i32,
    /// How the receive phase ended
    pub completion: Completion,
}

impl CommandResult {
    /// Captured output as a string, with invalid UTF-8 replaced.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Deadlines governing one command execution.
pub(crate) struct ExecLimits {
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
    pub open_deadline: Option<Duration>,
    pub close_deadline: Option<Duration>,
}

/// Executor-level failure, split by whether the connection survives.
#[derive(Debug)]
pub(crate) enum ExecError {
    /// The connection is no longer usable and must be torn down by the caller.
    Teardown(ClientError),
    /// The command failed but the connection stays up.
    Command(ClientError),
}

/// The seam over the protocol library's exec channel.
///
/// Every operation reports [`Step::Again`] when the underlying non-blocking
/// session would block, and a definitive error otherwise. `read` reports
/// `Step::Done(0)` on clean end-of-stream.
pub(crate) trait CommandChannel: Pollable {
    fn exec(&mut self, command: &str) -> Result<Step<()>, ClientError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<Step<usize>, ClientError>;
    fn close(&mut self) -> Result<Step<()>, ClientError>;
    fn exit_status(&mut self) -> Result<i32, ClientError>;
    fn exit_signal(&mut self) -> Result<Option<String>, ClientError>;
}

/// Runs one command on an already-open exec channel: send the exec request
/// under the send deadline, drain output into `response` under the receive
/// deadline, close the channel, and report exit status or signal.
///
/// A send deadline overrun or a definitive I/O error is connection-fatal
/// ([`ExecError::Teardown`]); a receive deadline overrun is a partial
/// success and still goes through the channel-close step.
pub(crate) fn run_command<C: CommandChannel>(
    chan: &mut C,
    command: &str,
    limits: &ExecLimits,
    response: &mut ResponseBuffer,
) -> Result<CommandResult, ExecError> {
    match drive(chan, Some(limits.send_timeout), |c| c.exec(command)).map_err(ExecError::Teardown)? {
        Some(()) => {}
        None => {
            warn!("Command send deadline exceeded, tearing connection down");
            return Err(ExecError::Teardown(ClientError::SendTimeout));
        }
    }

    response.clear();
    let mut completion = Completion::Complete;
    let started = Instant::now();
    let mut chunk = [0u8; 4096];
    'recv: loop {
        // Drain until the session would block, checking the cumulative
        // receive deadline after every attempt. Waiting for readiness does
        // not reset the deadline clock.
        loop {
            if response.is_full() {
                completion = Completion::Truncated;
                break 'recv;
            }
            match chan.read(&mut chunk).map_err(ExecError::Teardown)? {
                Step::Done(0) => break 'recv,
                Step::Done(n) => {
                    response.write_up_to(&chunk[..n]);
                }
                Step::Again => break,
            }
            if started.elapsed() >= limits.recv_timeout {
                completion = Completion::TimedOut;
                break 'recv;
            }
        }
        if started.elapsed() >= limits.recv_timeout {
            completion = Completion::TimedOut;
            break 'recv;
        }
        chan.wait_ready().map_err(ExecError::Teardown)?;
    }
    debug!(
        "Command response drained: {} bytes ({:?})",
        response.len(),
        completion
    );

    match drive(chan, limits.close_deadline, |c| c.close()).map_err(ExecError::Teardown)? {
        Some(()) => {}
        None => {
            return Err(ExecError::Teardown(ClientError::Protocol(
                "channel close deadline exceeded".to_string(),
            )))
        }
    }

    // An exit signal means abnormal termination and overrides the exit
    // status entirely.
    if let Some(signal) = chan.exit_signal().map_err(ExecError::Teardown)? {
        return Err(ExecError::Command(ClientError::CommandSignal { signal }));
    }
    let exit_status = chan.exit_status().map_err(ExecError::Teardown)?;

    Ok(CommandResult {
        stdout: response.as_bytes().to_vec(),
        exit_status,
        completion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::thread;

    enum ExecStep {
        Done,
        Again,
    }

    enum ReadStep {
        Data(&'static [u8]),
        Again,
        Fail,
    }

    /// Scripted stand-in for a real exec channel. Empty scripts fall back to
    /// immediate success (exec), end-of-stream (read), or stall forever when
    /// the corresponding `stall_*` flag is set.
    struct ScriptedChannel {
        exec_steps: VecDeque<ExecStep>,
        stall_exec: bool,
        reads: VecDeque<ReadStep>,
        stall_reads: bool,
        close_calls: usize,
        exit_status: i32,
        exit_signal: Option<String>,
        wait_sleep: Duration,
        waits: usize,
    }

    impl ScriptedChannel {
        fn new() -> Self {
            Self {
                exec_steps: VecDeque::new(),
                stall_exec: false,
                reads: VecDeque::new(),
                stall_reads: false,
                close_calls: 0,
                exit_status: 0,
                exit_signal: None,
                wait_sleep: Duration::ZERO,
                waits: 0,
            }
        }
    }

    impl Pollable for ScriptedChannel {
        fn wait_ready(&mut self) -> Result<(), ClientError> {
            self.waits += 1;
            if !self.wait_sleep.is_zero() {
                thread::sleep(self.wait_sleep);
            }
            Ok(())
        }
    }

    impl CommandChannel for ScriptedChannel {
        fn exec(&mut self, _command: &str) -> Result<Step<()>, ClientError> {
            if self.stall_exec {
                return Ok(Step::Again);
            }
            match self.exec_steps.pop_front() {
                Some(ExecStep::Again) => Ok(Step::Again),
                Some(ExecStep::Done) | None => Ok(Step::Done(())),
            }
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<Step<usize>, ClientError> {
            match self.reads.pop_front() {
                Some(ReadStep::Data(data)) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(Step::Done(data.len()))
                }
                Some(ReadStep::Again) => Ok(Step::Again),
                Some(ReadStep::Fail) => Err(ClientError::Read("scripted read failure".to_string())),
                None if self.stall_reads => Ok(Step::Again),
                None => Ok(Step::Done(0)),
            }
        }

        fn close(&mut self) -> Result<Step<()>, ClientError> {
            self.close_calls += 1;
            Ok(Step::Done(()))
        }

        fn exit_status(&mut self) -> Result<i32, ClientError> {
            Ok(self.exit_status)
        }

        fn exit_signal(&mut self) -> Result<Option<String>, ClientError> {
            Ok(self.exit_signal.clone())
        }
    }

    fn limits(send_ms: u64, recv_ms: u64) -> ExecLimits {
        ExecLimits {
            send_timeout: Duration::from_millis(send_ms),
            recv_timeout: Duration::from_millis(recv_ms),
            open_deadline: None,
            close_deadline: None,
        }
    }

    #[test]
    fn test_command_output_and_exit_status() {
        let mut chan = ScriptedChannel::new();
        chan.exec_steps.push_back(ExecStep::Again);
        chan.exec_steps.push_back(ExecStep::Done);
        chan.reads.push_back(ReadStep::Data(b"hello\n"));
        let mut response = ResponseBuffer::new(64);

        let result = run_command(&mut chan, "echo hello", &limits(1000, 1000), &mut response)
            .unwrap();

        assert_eq!(result.stdout, b"hello\n");
        assert_eq!(result.exit_status, 0);
        assert_eq!(result.completion, Completion::Complete);
        assert_eq!(chan.close_calls, 1);
        // The Again exec step must have gone through the waiter once.
        assert_eq!(chan.waits, 1);
    }

    #[test]
    fn test_nonzero_exit_status_is_not_an_error() {
        let mut chan = ScriptedChannel::new();
        chan.exit_status = 3;
        let mut response = ResponseBuffer::new(64);

        let result = run_command(&mut chan, "false", &limits(1000, 1000), &mut response)
            .unwrap();
        assert_eq!(result.exit_status, 3);
    }

    #[test]
    fn test_response_truncated_at_capacity() {
        let mut chan = ScriptedChannel::new();
        chan.reads.push_back(ReadStep::Data(b"0123456789"));
        let mut response = ResponseBuffer::new(8);

        let result = run_command(&mut chan, "seq 10", &limits(1000, 1000), &mut response)
            .unwrap();

        assert_eq!(result.stdout, b"01234567");
        assert_eq!(result.completion, Completion::Truncated);
        // Truncation is not an error: the channel is still closed cleanly.
        assert_eq!(chan.close_calls, 1);
    }

    #[test]
    fn test_send_timeout_is_connection_fatal() {
        let mut chan = ScriptedChannel::new();
        chan.stall_exec = true;
        chan.wait_sleep = Duration::from_millis(2);
        let mut response = ResponseBuffer::new(64);

        let err = run_command(&mut chan, "true", &limits(20, 1000), &mut response)
            .unwrap_err();

        assert!(matches!(err, ExecError::Teardown(ClientError::SendTimeout)));
        // The connection is being torn down; no channel-close handshake.
        assert_eq!(chan.close_calls, 0);
    }

    #[test]
    fn test_recv_timeout_returns_partial_output() {
        let mut chan = ScriptedChannel::new();
        chan.reads.push_back(ReadStep::Data(b"partial"));
        chan.stall_reads = true;
        chan.wait_sleep = Duration::from_millis(2);
        let mut response = ResponseBuffer::new(64);

        let result = run_command(&mut chan, "sleep 60", &limits(1000, 30), &mut response)
            .unwrap();

        assert_eq!(result.stdout, b"partial");
        assert_eq!(result.completion, Completion::TimedOut);
        assert_eq!(chan.close_calls, 1);
    }

    #[test]
    fn test_read_error_is_connection_fatal() {
        let mut chan = ScriptedChannel::new();
        chan.reads.push_back(ReadStep::Data(b"some"));
        chan.reads.push_back(ReadStep::Fail);
        let mut response = ResponseBuffer::new(64);

        let err = run_command(&mut chan, "cat /dev/urandom", &limits(1000, 1000), &mut response)
            .unwrap_err();

        assert!(matches!(err, ExecError::Teardown(ClientError::Read(_))));
        assert_eq!(chan.close_calls, 0);
    }

    #[test]
    fn test_exit_signal_overrides_exit_status() {
        let mut chan = ScriptedChannel::new();
        chan.exit_status = 0;
        chan.exit_signal = Some("KILL".to_string());
        let mut response = ResponseBuffer::new(64);

        let err = run_command(&mut chan, "sleep 600", &limits(1000, 1000), &mut response)
            .unwrap_err();

        match err {
            ExecError::Command(ClientError::CommandSignal { signal }) => {
                assert_eq!(signal, "KILL")
            }
            _ => panic!("expected a command-level signal failure"),
        }
        // The close handshake itself succeeded; the connection survives.
        assert_eq!(chan.close_calls, 1);
    }

    #[test]
    fn test_response_buffer_reused_across_commands() {
        let mut response = ResponseBuffer::new(64);

        let mut first = ScriptedChannel::new();
        first.reads.push_back(ReadStep::Data(b"first output"));
        run_command(&mut first, "one", &limits(1000, 1000), &mut response)
            .unwrap();

        let mut second = ScriptedChannel::new();
        second.reads.push_back(ReadStep::Data(b"two"));
        let result = run_command(&mut second, "two", &limits(1000, 1000), &mut response)
            .unwrap();

        assert_eq!(result.stdout, b"two");
        assert_eq!(response.as_bytes(), b"two");
    }

    #[test]
    fn test_interleaved_reads_and_waits() {
        let mut chan = ScriptedChannel::new();
        chan.reads.push_back(ReadStep::Data(b"chunk one "));
        chan.reads.push_back(ReadStep::Again);
        chan.reads.push_back(ReadStep::Data(b"chunk two"));
        let mut response = ResponseBuffer::new(64);

        let result = run_command(&mut chan, "slowcat", &limits(1000, 1000), &mut response)
            .unwrap();

        assert_eq!(result.stdout, b"chunk one chunk two");
        assert_eq!(result.completion, Completion::Complete);
        assert!(chan.waits >= 1);
    }
}
