//! Byte transport between the client and an interactive console.

use async_trait::async_trait;
use nix::sys::termios::{self, LocalFlags, SetArg};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use roster_core::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Output arrived.
    Data(String),
    /// Nothing arrived before the deadline.
    Idle,
    /// The console closed its output.
    Closed,
}

/// Line-oriented access to a console child process.
#[async_trait]
pub trait ConsoleTransport: Send {
    /// Writes each line followed by a newline, in one batch.
    async fn write_lines(&mut self, lines: &[&str]) -> Result<()>;

    /// Waits at most `wait` for output. A zero wait only returns output already buffered.
    async fn read_chunk(&mut self, wait: Duration) -> Result<ReadOutcome>;

    /// Exit status of the child, if it has exited.
    fn exit_status(&mut self) -> Result<Option<i32>>;

    /// Ends the child process.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Console child attached to a pseudo-terminal with echo disabled.
pub struct PtyTransport {
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    undecoded: Vec<u8>,
    // Keeps the pty open for the lifetime of the transport.
    _master: Box<dyn MasterPty + Send>,
}

impl PtyTransport {
    /// Spawns `executable` with `args` on a fresh pty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConsoleError`] if the pty cannot be allocated or the child cannot be
    /// spawned.
    pub fn spawn(executable: &Path, args: &[String]) -> Result<Self> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 512,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| console_error("failed to allocate pty", &err))?;

        if let Some(fd) = pair.master.as_raw_fd() {
            disable_echo(fd)?;
        }

        let mut command = CommandBuilder::new(executable);
        command.args(args);
        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|err| console_error("failed to spawn console", &err))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| console_error("failed to open console output", &err))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| console_error("failed to open console input", &err))?;

        let (sender, output) = mpsc::unbounded_channel();
        std::thread::spawn(move || pump_output(reader, &sender));

        debug!(executable = %executable.display(), "console spawned");
        Ok(Self {
            child,
            writer,
            output,
            undecoded: Vec::new(),
            _master: pair.master,
        })
    }

    fn decode(&mut self, bytes: Vec<u8>) -> String {
        self.undecoded.extend(bytes);
        let valid = match std::str::from_utf8(&self.undecoded) {
            Ok(_) => self.undecoded.len(),
            // An incomplete sequence at the end waits for the next chunk.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => self.undecoded.len(),
        };
        let complete = self.undecoded.drain(..valid).collect::<Vec<_>>();
        String::from_utf8_lossy(&complete).into_owned()
    }
}

#[async_trait]
impl ConsoleTransport for PtyTransport {
    async fn write_lines(&mut self, lines: &[&str]) -> Result<()> {
        let mut batch = String::new();
        for line in lines {
            batch.push_str(line);
            batch.push('\n');
        }
        self.writer.write_all(batch.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<ReadOutcome> {
        let received = if wait.is_zero() {
            match self.output.try_recv() {
                Ok(bytes) => Some(bytes),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(ReadOutcome::Idle),
                Err(mpsc::error::TryRecvError::Disconnected) => None,
            }
        } else {
            match timeout(wait, self.output.recv()).await {
                Ok(received) => received,
                Err(_) => return Ok(ReadOutcome::Idle),
            }
        };

        Ok(match received {
            Some(bytes) => ReadOutcome::Data(self.decode(bytes)),
            None => ReadOutcome::Closed,
        })
    }

    fn exit_status(&mut self) -> Result<Option<i32>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| i32::try_from(status.exit_code()).unwrap_or(i32::MAX)))
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.exit_status()?.is_some() {
            return Ok(());
        }

        // Ignore write errors; the child may already be gone.
        let _ = self.write_lines(&["quit"]).await;
        for _ in 0..20 {
            if self.exit_status()?.is_some() {
                return Ok(());
            }
            sleep(Duration::from_millis(50)).await;
        }

        debug!("console did not exit after quit; killing it");
        self.child.kill()?;
        Ok(())
    }
}

fn pump_output(mut reader: Box<dyn Read + Send>, sender: &mpsc::UnboundedSender<Vec<u8>>) {
    let mut buffer = [0_u8; 4096];
    loop {
        // EIO on the master means the child side closed.
        match reader.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                if sender.send(buffer[..read].to_vec()).is_err() {
                    break;
                }
            }
        }
    }
}

fn disable_echo(fd: std::os::unix::io::RawFd) -> Result<()> {
    let mut attributes = termios::tcgetattr(fd)
        .map_err(|err| Error::ConsoleError(format!("failed to read pty attributes: {err}")))?;
    attributes
        .local_flags
        .remove(LocalFlags::ECHO | LocalFlags::ECHONL);
    termios::tcsetattr(fd, SetArg::TCSANOW, &attributes)
        .map_err(|err| Error::ConsoleError(format!("failed to disable pty echo: {err}")))
}

fn console_error(context: &str, err: &dyn std::fmt::Display) -> Error {
    Error::ConsoleError(format!("{context}: {err}"))
}
