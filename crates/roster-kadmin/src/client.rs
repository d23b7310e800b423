//! Credential principal operations on top of a console session.

use crate::config::KadminConfig;
use crate::session::{classify_error_line, ConsoleSession};
use crate::transport::{ConsoleTransport, PtyTransport};
use roster_core::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use tracing::{debug, info};

const SERVICE: &str = "kadmin";

/// Client for the kadmin administration console.
pub struct KadminClient<T: ConsoleTransport = PtyTransport> {
    session: ConsoleSession<T>,
    realm: Option<String>,
}

impl KadminClient<PtyTransport> {
    /// Starts kadmin as the configured administrative principal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the keytab is unreadable, [`Error::ConsoleError`] if
    /// the console cannot be started and [`Error::ProtocolViolation`] for an unexpected banner.
    pub async fn connect(config: &KadminConfig) -> Result<Self> {
        tokio::fs::File::open(config.keytab())
            .await
            .map_err(|err| {
                Error::ConfigError(format!(
                    "cannot access keytab {}: {err}",
                    config.keytab().display()
                ))
            })?;

        let session = ConsoleSession::connect(
            config.executable(),
            &config.args(),
            config.prompt(),
            config.backoff(),
        )?;
        let client = Self::from_session(session, config.realm().map(str::to_string)).await?;
        info!(principal = config.principal(), "kadmin console ready");
        Ok(client)
    }
}

impl<T: ConsoleTransport> KadminClient<T> {
    /// Reads and checks the welcome banner of a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if the banner has anything besides the
    /// authentication notice and log file messages.
    pub async fn from_session(
        mut session: ConsoleSession<T>,
        realm: Option<String>,
    ) -> Result<Self> {
        let banner = session.read_response().await?;
        for line in &banner {
            if line.is_empty()
                || line.starts_with("Authenticating")
                || line.contains("kadmin.log")
            {
                continue;
            }
            return Err(Error::ProtocolViolation(format!(
                "unexpected kadmin banner: {line}"
            )));
        }
        Ok(Self { session, realm })
    }

    /// Appends the configured realm to names without one.
    #[must_use]
    pub fn qualify(&self, name: &str) -> String {
        match &self.realm {
            Some(realm) if !name.contains('@') => format!("{name}@{realm}"),
            _ => name.to_string(),
        }
    }

    /// Creates a principal with an initial password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrincipalExists`] if the name is taken and
    /// [`Error::MalformedResponse`] if kadmin does not confirm the creation.
    pub async fn add_principal(&mut self, name: &str, password: &SecretString) -> Result<()> {
        let principal = self.principal_argument(name)?;
        let output = self
            .with_password("add_principal", &principal, password)
            .await?;
        expect_ack(
            "add_principal",
            &output,
            |line| line.starts_with("Principal") && line.contains("created."),
        )?;
        info!(principal = %principal, "principal created");
        Ok(())
    }

    /// Deletes a principal without confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrincipalNotFound`] if it does not exist.
    pub async fn delete_principal(&mut self, name: &str) -> Result<()> {
        let principal = self.principal_argument(name)?;
        let output = self
            .session
            .execute(&format!("delete_principal -force \"{principal}\""))
            .await?;
        expect_ack(
            "delete_principal",
            &output,
            |line| line.starts_with("Principal") && line.contains("deleted."),
        )?;
        info!(principal = %principal, "principal deleted");
        Ok(())
    }

    /// Sets a new password on an existing principal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrincipalNotFound`] if it does not exist.
    pub async fn change_password(&mut self, name: &str, password: &SecretString) -> Result<()> {
        let principal = self.principal_argument(name)?;
        let output = self
            .with_password("change_password", &principal, password)
            .await?;
        expect_ack(
            "change_password",
            &output,
            |line| line.starts_with("Password for") && line.contains("changed."),
        )?;
        info!(principal = %principal, "principal password changed");
        Ok(())
    }

    /// Fetches principal details as `field -> value`, skipping key material.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] for lines that are not `field: value`.
    pub async fn get_principal(&mut self, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        let principal = self.principal_argument(name)?;
        let output = self
            .session
            .execute(&format!("get_principal \"{principal}\""))
            .await?;

        let mut details = BTreeMap::new();
        for line in output.iter().filter(|line| !line.is_empty()) {
            match classify_error_line("get_principal", line) {
                Some(Error::PrincipalNotFound(_)) => return Ok(None),
                Some(err) => return Err(err),
                None => {}
            }

            let (field, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("unexpected get_principal output: {line}")))?;
            if field == "Key" {
                continue;
            }
            details.insert(field.trim().to_string(), value.trim().to_string());
        }

        if details.is_empty() {
            return Err(malformed(format!("empty get_principal output for `{principal}`")));
        }
        Ok(Some(details))
    }

    /// Lists every principal name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if the list is empty or a name has no realm.
    pub async fn list_principals(&mut self) -> Result<Vec<String>> {
        let output = self.session.execute("list_principals").await?;
        let mut principals = Vec::with_capacity(output.len());
        for line in output.into_iter().filter(|line| !line.is_empty()) {
            if let Some(err) = classify_error_line("list_principals", &line) {
                return Err(err);
            }
            if !line.contains('@') {
                return Err(malformed(format!("malformed principal `{line}`")));
            }
            principals.push(line);
        }

        if principals.is_empty() {
            return Err(malformed("no principals listed".to_string()));
        }
        debug!(count = principals.len(), "listed principals");
        Ok(principals)
    }

    /// Privileges held by the administrative principal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] unless kadmin prints exactly one
    /// `current privileges:` line.
    pub async fn get_privs(&mut self) -> Result<Vec<String>> {
        let output = self.session.execute("get_privs").await?;
        let lines = output
            .iter()
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        let [line] = lines.as_slice() else {
            return Err(malformed(format!(
                "expected one line of get_privs output, got {}",
                lines.len()
            )));
        };
        if let Some(err) = classify_error_line("get_privs", line) {
            return Err(err);
        }

        let privileges = line
            .strip_prefix("current privileges:")
            .ok_or_else(|| malformed(format!("malformed get_privs output: {line}")))?;
        Ok(privileges.split_whitespace().map(str::to_string).collect())
    }

    /// Stops the console.
    ///
    /// # Errors
    ///
    /// Returns transport errors raised while stopping the child.
    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }

    fn principal_argument(&self, name: &str) -> Result<String> {
        if name.is_empty() || name.contains('"') || name.contains(char::is_control) {
            return Err(Error::ValidationError(format!(
                "invalid principal name `{}`",
                name.escape_debug()
            )));
        }
        Ok(self.qualify(name))
    }

    /// Runs a password-setting command.
    ///
    /// kadmin has no quoting escape, so a password containing `"` is typed at the interactive
    /// prompts instead of passed with `-pw`.
    async fn with_password(
        &mut self,
        verb: &str,
        principal: &str,
        password: &SecretString,
    ) -> Result<Vec<String>> {
        let password = password.expose_secret();
        if password.contains('\n') || password.contains('\r') {
            return Err(Error::ValidationError(
                "password cannot contain line breaks".to_string(),
            ));
        }

        if password.contains('"') {
            self.session
                .execute_with_input(&format!("{verb} \"{principal}\""), &[password, password])
                .await
        } else {
            self.session
                .execute(&format!("{verb} -pw \"{password}\" \"{principal}\""))
                .await
        }
    }
}

/// Checks command output: tolerated lines are skipped, error lines become typed errors, and one
/// line must satisfy `acknowledged`.
fn expect_ack(verb: &str, output: &[String], acknowledged: impl Fn(&str) -> bool) -> Result<()> {
    let mut confirmed = false;
    for line in output {
        if line.is_empty()
            || line.starts_with("NOTICE:")
            || line.starts_with("WARNING:")
            || line.starts_with("Enter password")
            || line.starts_with("Re-enter password")
            || line.starts_with("Make sure that")
        {
            continue;
        }
        if let Some(err) = classify_error_line(verb, line) {
            return Err(err);
        }
        if acknowledged(line) {
            confirmed = true;
            continue;
        }
        return Err(malformed(format!("unexpected {verb} output: {line}")));
    }

    if confirmed {
        Ok(())
    } else {
        Err(malformed(format!("kadmin did not acknowledge {verb}")))
    }
}

fn malformed(message: String) -> Error {
    Error::MalformedResponse {
        service: SERVICE.to_string(),
        message,
    }
}
