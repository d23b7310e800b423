//! Connection settings and entry layout for the identity directory.

use crate::dn::DistinguishedName;
use roster_core::{Error, Result};
use secrecy::SecretString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// How the client authenticates after connecting.
pub enum BindMethod {
    /// No bind; the server's anonymous access rules apply.
    Anonymous,
    /// Simple bind with a DN and password.
    Simple {
        /// Bind DN.
        dn: DistinguishedName,
        /// Bind password.
        password: SecretString,
    },
    /// SASL EXTERNAL, typically over `ldapi://` with peer credentials.
    SaslExternal,
}

impl fmt::Debug for BindMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Simple { dn, .. } => f
                .debug_struct("Simple")
                .field("dn", &dn.as_str())
                .field("password", &"[REDACTED]")
                .finish(),
            Self::SaslExternal => f.write_str("SaslExternal"),
        }
    }
}

/// Where user and group entries live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    users_base: DistinguishedName,
    groups_base: DistinguishedName,
}

impl DirectoryLayout {
    /// Creates a layout from the two subtree bases.
    #[must_use]
    pub fn new(users_base: DistinguishedName, groups_base: DistinguishedName) -> Self {
        Self {
            users_base,
            groups_base,
        }
    }

    /// Parses both bases from strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if either base is not a valid distinguished name.
    pub fn parse(users_base: &str, groups_base: &str) -> Result<Self> {
        Ok(Self::new(
            DistinguishedName::parse(users_base)?,
            DistinguishedName::parse(groups_base)?,
        ))
    }

    /// Base of the user subtree.
    #[must_use]
    pub const fn users_base(&self) -> &DistinguishedName {
        &self.users_base
    }

    /// Base of the group subtree.
    #[must_use]
    pub const fn groups_base(&self) -> &DistinguishedName {
        &self.groups_base
    }

    /// `uid=<name>` under the user base.
    #[must_use]
    pub fn user_dn(&self, username: &str) -> DistinguishedName {
        self.users_base.child("uid", username)
    }

    /// `cn=<name>` under the group base.
    #[must_use]
    pub fn group_dn(&self, group: &str) -> DistinguishedName {
        self.groups_base.child("cn", group)
    }
}

/// Configuration for connecting to the directory.
#[derive(Debug)]
pub struct LdapConfig {
    url: String,
    bind: BindMethod,
    layout: DirectoryLayout,
    starttls: bool,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl LdapConfig {
    /// Creates a configuration with default timeouts and TLS verification enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the URL is invalid or uses a scheme other than
    /// `ldap`, `ldaps` or `ldapi`.
    pub fn new(url: impl Into<String>, bind: BindMethod, layout: DirectoryLayout) -> Result<Self> {
        let url = url.into();
        let parsed = Url::parse(&url)
            .map_err(|err| Error::ConfigError(format!("invalid directory URL `{url}`: {err}")))?;
        if !matches!(parsed.scheme(), "ldap" | "ldaps" | "ldapi") {
            return Err(Error::ConfigError(format!(
                "unsupported directory URL scheme `{}`",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url,
            bind,
            layout,
            starttls: false,
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        })
    }

    /// Directory URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bind method used for every session.
    #[must_use]
    pub const fn bind(&self) -> &BindMethod {
        &self.bind
    }

    /// User and group subtree layout.
    #[must_use]
    pub const fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Whether to upgrade plain `ldap://` connections with StartTLS.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
    }

    /// Whether TLS certificates are verified.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Connection timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Per-operation timeout.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}
