//! Settings for the kadmin console.

use roster_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default kadmin executable.
pub const DEFAULT_EXECUTABLE: &str = "/usr/sbin/kadmin";
/// Prompt printed by kadmin when it is ready for a command.
pub const DEFAULT_PROMPT: &str = "kadmin:";

/// Growth of the read timeout while the console is silent.
///
/// Each silent read multiplies the wait by `factor`, capped at `maximum`. A silent read at
/// `maximum` ends the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBackoff {
    initial: Duration,
    maximum: Duration,
    factor: u32,
}

impl Default for ReadBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            maximum: Duration::from_secs(1),
            factor: 2,
        }
    }
}

impl ReadBackoff {
    /// Creates a backoff schedule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if `initial` is zero or exceeds `maximum`, or if `factor`
    /// is below 2.
    pub fn new(initial: Duration, maximum: Duration, factor: u32) -> Result<Self> {
        if initial.is_zero() || initial > maximum {
            return Err(Error::ConfigError(format!(
                "read backoff needs 0 < initial <= maximum (got {initial:?} and {maximum:?})"
            )));
        }
        if factor < 2 {
            return Err(Error::ConfigError(format!(
                "read backoff factor must be at least 2 (got {factor})"
            )));
        }
        Ok(Self {
            initial,
            maximum,
            factor,
        })
    }

    /// First read timeout.
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// Largest read timeout.
    #[must_use]
    pub const fn maximum(&self) -> Duration {
        self.maximum
    }

    /// Timeout that follows `current`.
    #[must_use]
    pub fn grow(&self, current: Duration) -> Duration {
        current
            .checked_mul(self.factor)
            .map_or(self.maximum, |next| next.min(self.maximum))
    }
}

/// Configuration for [`crate::KadminClient`].
#[derive(Debug, Clone)]
pub struct KadminConfig {
    executable: PathBuf,
    principal: String,
    keytab: PathBuf,
    realm: Option<String>,
    prompt: String,
    backoff: ReadBackoff,
}

impl KadminConfig {
    /// Creates a configuration that authenticates as `principal` using `keytab`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the principal is blank.
    pub fn new(principal: impl Into<String>, keytab: impl Into<PathBuf>) -> Result<Self> {
        let principal = principal.into();
        if principal.trim().is_empty() {
            return Err(Error::ConfigError(
                "kadmin principal cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            principal,
            keytab: keytab.into(),
            realm: None,
            prompt: DEFAULT_PROMPT.to_string(),
            backoff: ReadBackoff::default(),
        })
    }

    /// Console executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Administrative principal.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Keytab holding the administrative principal's key.
    #[must_use]
    pub fn keytab(&self) -> &Path {
        &self.keytab
    }

    /// Realm appended to unqualified principal names.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Prompt that terminates every response.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Read timeout schedule.
    #[must_use]
    pub const fn backoff(&self) -> ReadBackoff {
        self.backoff
    }

    /// Arguments passed to the executable.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![
            "-p".to_string(),
            self.principal.clone(),
            "-kt".to_string(),
            self.keytab.display().to_string(),
        ]
    }

    /// Overrides the executable.
    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Sets the realm for unqualified names.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Overrides the prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Overrides the read timeout schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: ReadBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_to_the_cap() {
        let backoff = ReadBackoff::default();
        let mut wait = backoff.initial();
        let mut schedule = vec![wait];
        while wait < backoff.maximum() {
            wait = backoff.grow(wait);
            schedule.push(wait);
        }
        assert_eq!(schedule[1], Duration::from_millis(20));
        assert_eq!(schedule[6], Duration::from_millis(640));
        assert_eq!(schedule.last(), Some(&Duration::from_secs(1)));
        assert_eq!(schedule.len(), 8);
    }

    #[test]
    fn backoff_rejects_degenerate_schedules() {
        assert!(ReadBackoff::new(Duration::ZERO, Duration::from_secs(1), 2).is_err());
        assert!(ReadBackoff::new(Duration::from_secs(2), Duration::from_secs(1), 2).is_err());
        assert!(ReadBackoff::new(Duration::from_millis(5), Duration::from_secs(1), 1).is_err());
    }

    #[test]
    fn builder_overrides() {
        let config = KadminConfig::new("ceo/admin", "/etc/ceo.keytab")
            .unwrap()
            .with_executable("/usr/local/sbin/kadmin")
            .with_realm("CSCLUB.UWATERLOO.CA")
            .with_prompt("kadmin.local:");

        assert_eq!(config.executable(), Path::new("/usr/local/sbin/kadmin"));
        assert_eq!(config.realm(), Some("CSCLUB.UWATERLOO.CA"));
        assert_eq!(config.prompt(), "kadmin.local:");
        assert_eq!(config.args(), vec!["-p", "ceo/admin", "-kt", "/etc/ceo.keytab"]);
        assert!(KadminConfig::new(" ", "/etc/ceo.keytab").is_err());
    }
}
