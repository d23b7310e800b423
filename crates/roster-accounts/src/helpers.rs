//! Account creation through the privileged `addmember` and `addclub` helpers.
//!
//! The helpers are opaque setuid programs with a fixed argument list. Passwords travel on stdin,
//! never in argv.

use crate::accounts::AccountManager;
use roster_core::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

impl AccountManager {
    /// Creates a member account with the `addmember` helper and returns its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for a bad username or short password,
    /// [`Error::ChildFailed`] if the helper exits non-zero and [`Error::Io`] if it cannot run.
    pub async fn create_member_via_helper(
        &self,
        username: &str,
        password: &SecretString,
        name: &str,
        program: &str,
    ) -> Result<String> {
        self.policy().check_username(username)?;
        self.check_password(password)?;

        let output = run_helper(
            &self.config().helpers.addmember,
            &["--stdin", username, name, program],
            Some(password),
        )
        .await?;
        info!(username = %username, "member created by helper");
        Ok(output)
    }

    /// Creates a club account with the `addclub` helper and returns its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for a bad username, [`Error::ChildFailed`] if the
    /// helper exits non-zero and [`Error::Io`] if it cannot run.
    pub async fn create_club_via_helper(&self, username: &str, name: &str) -> Result<String> {
        self.policy().check_username(username)?;

        let output = run_helper(&self.config().helpers.addclub, &[username, name], None).await?;
        info!(username = %username, "club created by helper");
        Ok(output)
    }
}

async fn run_helper(
    program: &Path,
    args: &[&str],
    password: Option<&SecretString>,
) -> Result<String> {
    let name = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |name| name.to_string_lossy().into_owned());
    debug!(program = %name, "running helper");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| Error::Io(format!("cannot run {}: {err}", program.display())))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Some(password) = password {
            // A helper that rejects the request may exit before reading its input; its status
            // and output are still collected below.
            match stdin.write_all(password.expose_secret().as_bytes()).await {
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    debug!(program = %name, "helper closed stdin early");
                }
                other => other?,
            }
        }
        // Dropping stdin sends EOF.
    }

    let output = child.wait_with_output().await?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        return Ok(text);
    }
    Err(Error::ChildFailed {
        program: name,
        status: output.status.code().unwrap_or(-1),
        output: text,
    })
}
