//! Request/response framing over an interactive console.
//!
//! A response is every line the console prints after a command, up to the point where the
//! unterminated trailing fragment equals the prompt. Reads are bounded: each silent read grows
//! the wait with [`ReadBackoff`], and a silent read at the maximum wait ends the exchange with
//! either [`Error::ConsoleTerminated`] (the child exited) or [`Error::ResponseTimeout`].

use crate::config::ReadBackoff;
use crate::transport::{ConsoleTransport, PtyTransport, ReadOutcome};
use roster_core::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One console child and its framing state.
pub struct ConsoleSession<T: ConsoleTransport = PtyTransport> {
    transport: T,
    prompt: String,
    backoff: ReadBackoff,
}

impl ConsoleSession<PtyTransport> {
    /// Spawns the console on a pty.
    ///
    /// The caller reads the welcome banner with [`ConsoleSession::read_response`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConsoleError`] if the child cannot be started.
    pub fn connect(
        executable: &Path,
        args: &[String],
        prompt: impl Into<String>,
        backoff: ReadBackoff,
    ) -> Result<Self> {
        let transport = PtyTransport::spawn(executable, args)?;
        Ok(Self::new(transport, prompt, backoff))
    }
}

impl<T: ConsoleTransport> ConsoleSession<T> {
    /// Wraps an already running transport.
    pub fn new(transport: T, prompt: impl Into<String>, backoff: ReadBackoff) -> Self {
        Self {
            transport,
            prompt: prompt.into(),
            backoff,
        }
    }

    /// Sends one command and returns its output lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if output from an earlier exchange is still pending,
    /// plus the framing errors of [`ConsoleSession::read_response`].
    pub async fn execute(&mut self, command: &str) -> Result<Vec<String>> {
        self.execute_with_input(command, &[]).await
    }

    /// Sends a command followed by answers to the prompts it will raise.
    ///
    /// Only the command verb is logged; `input` never is.
    ///
    /// # Errors
    ///
    /// Same as [`ConsoleSession::execute`].
    pub async fn execute_with_input(
        &mut self,
        command: &str,
        input: &[&str],
    ) -> Result<Vec<String>> {
        self.ensure_quiet().await?;

        debug!(verb = command_verb(command), "console command");
        let mut lines = Vec::with_capacity(input.len() + 1);
        lines.push(command);
        lines.extend_from_slice(input);
        self.transport.write_lines(&lines).await?;

        self.read_response().await
    }

    /// Reads lines until the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConsoleTerminated`] with the partial output if the child went away, and
    /// [`Error::ResponseTimeout`] if it is alive but silent.
    pub async fn read_response(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut fragment = String::new();
        let mut wait = self.backoff.initial();

        loop {
            match self.transport.read_chunk(wait).await? {
                ReadOutcome::Data(text) => {
                    fragment.push_str(&text);
                    while let Some(end) = fragment.find('\n') {
                        let line = fragment.drain(..=end).collect::<String>();
                        lines.push(line.trim().to_string());
                    }
                    if fragment.trim() == self.prompt {
                        return Ok(lines);
                    }
                    wait = self.backoff.initial();
                }
                ReadOutcome::Idle if wait < self.backoff.maximum() => {
                    wait = self.backoff.grow(wait);
                }
                ReadOutcome::Idle => {
                    if self.transport.exit_status()?.is_some() {
                        return Err(terminated(lines, &fragment));
                    }
                    return Err(Error::ResponseTimeout(format!(
                        "no `{}` prompt within {:?} of silence",
                        self.prompt,
                        self.backoff.maximum()
                    )));
                }
                ReadOutcome::Closed => return Err(terminated(lines, &fragment)),
            }
        }
    }

    /// Stops the console.
    ///
    /// # Errors
    ///
    /// Returns transport errors raised while stopping the child.
    pub async fn close(mut self) -> Result<()> {
        self.transport.shutdown().await
    }

    async fn ensure_quiet(&mut self) -> Result<()> {
        match self.transport.read_chunk(Duration::ZERO).await? {
            ReadOutcome::Data(stale) if !stale.trim().is_empty() => {
                Err(Error::ProtocolViolation(format!(
                    "unexpected console output before command: {}",
                    stale.trim()
                )))
            }
            ReadOutcome::Closed => Err(terminated(Vec::new(), "")),
            ReadOutcome::Data(_) | ReadOutcome::Idle => Ok(()),
        }
    }
}

fn terminated(mut output: Vec<String>, fragment: &str) -> Error {
    let fragment = fragment.trim();
    if !fragment.is_empty() {
        output.push(fragment.to_string());
    }
    Error::ConsoleTerminated { output }
}

fn command_verb(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or_default()
}

/// Maps a console error line to a typed error.
///
/// Error lines start with `<verb>:` or `kadmin:`; any other line yields `None`.
#[must_use]
pub fn classify_error_line(verb: &str, line: &str) -> Option<Error> {
    let is_error = line
        .strip_prefix(verb)
        .is_some_and(|rest| rest.starts_with(':'))
        || line.starts_with("kadmin:");
    if !is_error {
        return None;
    }

    Some(if line.contains("already exists") {
        Error::PrincipalExists(line.to_string())
    } else if line.contains("does not exist") {
        Error::PrincipalNotFound(line.to_string())
    } else {
        Error::ConsoleError(line.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::{data, ScriptedTransport};

    fn backoff() -> ReadBackoff {
        ReadBackoff::new(Duration::from_millis(1), Duration::from_millis(8), 2).unwrap()
    }

    fn session(transport: ScriptedTransport) -> ConsoleSession<ScriptedTransport> {
        ConsoleSession::new(transport, "kadmin:", backoff())
    }

    #[tokio::test]
    async fn response_spanning_chunks_ends_at_prompt() {
        let transport = ScriptedTransport::new().respond(vec![
            data("NOTICE: no policy specified\r\nPrincipal \"jdoe@EX"),
            data("AMPLE.ORG\" created.\r\nkad"),
            data("min: "),
        ]);
        let mut session = session(transport);

        let lines = session.execute("add_principal jdoe").await.unwrap();
        assert_eq!(
            lines,
            vec![
                "NOTICE: no policy specified",
                "Principal \"jdoe@EXAMPLE.ORG\" created."
            ]
        );
    }

    #[tokio::test]
    async fn silent_reads_grow_the_wait_and_data_resets_it() {
        let transport = ScriptedTransport::new().respond(vec![
            ReadOutcome::Idle,
            ReadOutcome::Idle,
            data("partial "),
            ReadOutcome::Idle,
            data("line\nkadmin: "),
        ]);
        let waits = transport.waits.clone();
        let mut session = session(transport);

        let lines = session.execute("get_privs").await.unwrap();
        assert_eq!(lines, vec!["partial line"]);

        let ms = Duration::from_millis;
        assert_eq!(
            *waits.lock().unwrap(),
            vec![Duration::ZERO, ms(1), ms(2), ms(4), ms(1), ms(2)]
        );
    }

    #[tokio::test]
    async fn silence_from_a_live_console_is_a_response_timeout() {
        let transport = ScriptedTransport::new();
        let waits = transport.waits.clone();
        let mut session = session(transport);

        let err = session.execute("list_principals").await.unwrap_err();
        assert!(matches!(err, Error::ResponseTimeout(_)));
        assert_eq!(waits.lock().unwrap().last(), Some(&Duration::from_millis(8)));
    }

    #[tokio::test]
    async fn silence_from_an_exited_console_carries_partial_output() {
        let transport = ScriptedTransport::new()
            .respond(vec![data("kadmin: GSS-API error\npartial")])
            .exited(1);
        let mut session = session(transport);

        let err = session.execute("list_principals").await.unwrap_err();
        assert_eq!(
            err,
            Error::ConsoleTerminated {
                output: vec!["kadmin: GSS-API error".to_string(), "partial".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn closed_output_is_a_terminated_console() {
        let transport =
            ScriptedTransport::new().respond(vec![data("line\n"), ReadOutcome::Closed]);
        let mut session = session(transport);

        let err = session.execute("list_principals").await.unwrap_err();
        assert_eq!(
            err,
            Error::ConsoleTerminated {
                output: vec!["line".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn stale_output_is_a_protocol_violation() {
        let transport = ScriptedTransport::new().pending(vec![data("leftover\n")]);
        let written = transport.written.clone();
        let mut session = session(transport);

        let err = session.execute("get_privs").await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn input_lines_follow_the_command() {
        let transport = ScriptedTransport::new().respond(vec![data("done\nkadmin: ")]);
        let written = transport.written.clone();
        let mut session = session(transport);

        session
            .execute_with_input("add_principal \"jdoe\"", &["pw", "pw"])
            .await
            .unwrap();
        assert_eq!(
            *written.lock().unwrap(),
            vec![vec!["add_principal \"jdoe\"", "pw", "pw"]]
        );
    }

    #[test]
    fn error_lines_are_classified() {
        assert!(matches!(
            classify_error_line(
                "add_principal",
                "add_principal: Principal or policy already exists while creating \"x@R\"."
            ),
            Some(Error::PrincipalExists(_))
        ));
        assert!(matches!(
            classify_error_line(
                "delete_principal",
                "delete_principal: Principal does not exist while deleting principal \"x@R\""
            ),
            Some(Error::PrincipalNotFound(_))
        ));
        assert!(matches!(
            classify_error_line("get_privs", "kadmin: Communication failure"),
            Some(Error::ConsoleError(_))
        ));
        assert!(classify_error_line("add_principal", "Principal \"x@R\" created.").is_none());
        assert!(classify_error_line("add_principal", "add_principals: nope").is_none());
    }
}
