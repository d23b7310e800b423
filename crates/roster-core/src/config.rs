//! Accounts configuration.
//!
//! Naming patterns, id ranges and the per-kind account presets are supplied by the caller (usually
//! deserialized from whatever configuration source the deployment uses) and validated once. The
//! provisioning code treats the validated values as opaque constants.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use validator::{Validate, ValidationError};

/// The kinds of account that can be provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// A club member's personal account.
    Member,
    /// A non-interactive account owned by a club.
    Club,
    /// An administrative account.
    Admin,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Member => "member",
            Self::Club => "club",
            Self::Admin => "admin",
        })
    }
}

/// How a new account's primary group is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "gid")]
pub enum GroupPolicy {
    /// Create a group with the account's name and numeric id.
    #[default]
    OwnGroup,
    /// Use an existing shared group.
    Shared(u32),
}

/// Account attributes applied to every account of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_preset_range"))]
pub struct KindPreset {
    /// Directory under which home directories are created
    #[validate(length(min = 1))]
    pub home_base: String,

    /// Login shell
    #[validate(length(min = 1))]
    pub shell: String,

    /// Optional `description` attribute for new entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Smallest numeric id handed out to this kind
    #[validate(range(min = 1))]
    pub min_id: u32,

    /// Largest numeric id handed out to this kind
    pub max_id: u32,

    /// Whether accounts of this kind log in (and so need a password)
    #[serde(default = "default_login")]
    pub login: bool,

    /// Primary group policy
    #[serde(default)]
    pub group_policy: GroupPolicy,
}

const fn default_login() -> bool {
    true
}

fn validate_preset_range(preset: &KindPreset) -> std::result::Result<(), ValidationError> {
    if preset.min_id > preset.max_id {
        return Err(ValidationError::new("min_id_exceeds_max_id"));
    }
    Ok(())
}

impl KindPreset {
    /// Creates a preset with the given home base, shell and id range.
    #[must_use]
    pub fn new(
        home_base: impl Into<String>,
        shell: impl Into<String>,
        min_id: u32,
        max_id: u32,
    ) -> Self {
        Self {
            home_base: home_base.into(),
            shell: shell.into(),
            description: None,
            min_id,
            max_id,
            login: default_login(),
            group_policy: GroupPolicy::default(),
        }
    }

    /// Sets the entry description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets whether accounts of this kind log in.
    #[must_use]
    pub const fn with_login(mut self, login: bool) -> Self {
        self.login = login;
        self
    }

    /// Sets the primary group policy.
    #[must_use]
    pub const fn with_group_policy(mut self, policy: GroupPolicy) -> Self {
        self.group_policy = policy;
        self
    }

    /// Home directory for the given username.
    #[must_use]
    pub fn home_for(&self, username: &str) -> String {
        format!("{}/{username}", self.home_base.trim_end_matches('/'))
    }
}

/// Paths to the privileged account-creation helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperPaths {
    /// Member account helper
    #[serde(default = "default_addmember")]
    pub addmember: PathBuf,
    /// Club account helper
    #[serde(default = "default_addclub")]
    pub addclub: PathBuf,
}

fn default_addmember() -> PathBuf {
    PathBuf::from("/usr/bin/addmember")
}

fn default_addclub() -> PathBuf {
    PathBuf::from("/usr/bin/addclub")
}

impl Default for HelperPaths {
    fn default() -> Self {
        Self {
            addmember: default_addmember(),
            addclub: default_addclub(),
        }
    }
}

/// Configuration for account provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_group_range"))]
pub struct AccountsConfig {
    /// Pattern every username must match in full
    #[validate(length(min = 1))]
    pub username_pattern: String,

    /// Minimum password length for login accounts
    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// File listing permitted login shells
    #[serde(default = "default_shells_file")]
    pub shells_file: PathBuf,

    /// Member account preset
    #[validate(nested)]
    pub member: KindPreset,

    /// Club account preset
    #[validate(nested)]
    pub club: KindPreset,

    /// Administrative account preset
    #[validate(nested)]
    pub admin: KindPreset,

    /// Smallest gid for standalone groups
    #[validate(range(min = 1))]
    pub group_min_id: u32,

    /// Largest gid for standalone groups
    pub group_max_id: u32,

    /// Privileged helper locations
    #[serde(default)]
    pub helpers: HelperPaths,
}

const fn default_min_password_length() -> usize {
    4
}

fn default_shells_file() -> PathBuf {
    PathBuf::from("/etc/shells")
}

fn validate_group_range(config: &AccountsConfig) -> std::result::Result<(), ValidationError> {
    if config.group_min_id > config.group_max_id {
        return Err(ValidationError::new("group_min_id_exceeds_group_max_id"));
    }
    Ok(())
}

impl AccountsConfig {
    /// Creates a configuration from its required parts and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if validation fails or the username pattern does not compile.
    pub fn new(
        username_pattern: impl Into<String>,
        member: KindPreset,
        club: KindPreset,
        admin: KindPreset,
        group_range: (u32, u32),
    ) -> Result<Self> {
        Self {
            username_pattern: username_pattern.into(),
            min_password_length: default_min_password_length(),
            shells_file: default_shells_file(),
            member,
            club,
            admin,
            group_min_id: group_range.0,
            group_max_id: group_range.1,
            helpers: HelperPaths::default(),
        }
        .validated()
    }

    /// Parses a JSON document and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] on malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str::<Self>(json)?.validated()
    }

    /// Runs field validation and checks that the username pattern compiles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first problem found.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        self.naming_policy()?;
        Ok(self)
    }

    /// Returns the preset for an account kind.
    #[must_use]
    pub const fn preset(&self, kind: AccountKind) -> &KindPreset {
        match kind {
            AccountKind::Member => &self.member,
            AccountKind::Club => &self.club,
            AccountKind::Admin => &self.admin,
        }
    }

    /// Sets the minimum password length.
    #[must_use]
    pub const fn with_min_password_length(mut self, length: usize) -> Self {
        self.min_password_length = length;
        self
    }

    /// Sets the shells file.
    #[must_use]
    pub fn with_shells_file(mut self, path: PathBuf) -> Self {
        self.shells_file = path;
        self
    }

    /// Sets the helper locations.
    #[must_use]
    pub fn with_helpers(mut self, helpers: HelperPaths) -> Self {
        self.helpers = helpers;
        self
    }

    /// Compiles the naming policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the username pattern is not a valid regular expression.
    pub fn naming_policy(&self) -> Result<NamingPolicy> {
        NamingPolicy::new(&self.username_pattern, self.min_password_length)
    }
}

/// Compiled username and password rules.
#[derive(Debug, Clone)]
pub struct NamingPolicy {
    username: Regex,
    min_password_length: usize,
}

impl NamingPolicy {
    /// Compiles a policy. The pattern must match the whole username.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the pattern does not compile.
    pub fn new(pattern: &str, min_password_length: usize) -> Result<Self> {
        Ok(Self {
            username: Regex::new(&format!("^(?:{pattern})$"))?,
            min_password_length,
        })
    }

    /// Checks a username against the pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the username is empty or does not match.
    pub fn check_username(&self, username: &str) -> Result<()> {
        if username.is_empty() || !self.username.is_match(username) {
            return Err(Error::ValidationError(format!(
                "invalid username `{username}`: expected format {}",
                self.username.as_str()
            )));
        }
        Ok(())
    }

    /// Checks a password length. The password itself is never echoed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the password is too short.
    pub fn check_password_length(&self, length: usize) -> Result<()> {
        if length < self.min_password_length {
            return Err(Error::ValidationError(format!(
                "password too short (minimum {} characters)",
                self.min_password_length
            )));
        }
        Ok(())
    }

    /// Minimum accepted password length.
    #[must_use]
    pub const fn min_password_length(&self) -> usize {
        self.min_password_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> AccountsConfig {
        AccountsConfig::new(
            "[a-z][-a-z0-9]*",
            KindPreset::new("/users", "/bin/bash", 20000, 29999).with_description("member"),
            KindPreset::new("/users", "/bin/false", 30000, 39999)
                .with_login(false)
                .with_description("club"),
            KindPreset::new("/users", "/bin/bash", 10000, 10999)
                .with_group_policy(GroupPolicy::Shared(100)),
            (40000, 49999),
        )
        .unwrap()
    }

    #[test]
    fn test_presets_by_kind() {
        let config = sample_config();
        assert!(config.preset(AccountKind::Member).login);
        assert!(!config.preset(AccountKind::Club).login);
        assert_eq!(
            config.preset(AccountKind::Admin).group_policy,
            GroupPolicy::Shared(100)
        );
        assert_eq!(config.preset(AccountKind::Club).min_id, 30000);
    }

    #[test]
    fn test_home_for_trims_trailing_slash() {
        let preset = KindPreset::new("/users/", "/bin/bash", 1, 2);
        assert_eq!(preset.home_for("jdoe"), "/users/jdoe");
    }

    #[test]
    fn test_inverted_preset_range_is_rejected() {
        let result = AccountsConfig::new(
            "[a-z]+",
            KindPreset::new("/users", "/bin/bash", 200, 100),
            KindPreset::new("/users", "/bin/false", 1, 2),
            KindPreset::new("/users", "/bin/bash", 1, 2),
            (1, 2),
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_inverted_group_range_is_rejected() {
        let result = AccountsConfig::new(
            "[a-z]+",
            KindPreset::new("/users", "/bin/bash", 1, 2),
            KindPreset::new("/users", "/bin/false", 1, 2),
            KindPreset::new("/users", "/bin/bash", 1, 2),
            (10, 5),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let result = AccountsConfig::new(
            "[a-z",
            KindPreset::new("/users", "/bin/bash", 1, 2),
            KindPreset::new("/users", "/bin/false", 1, 2),
            KindPreset::new("/users", "/bin/bash", 1, 2),
            (1, 2),
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_min_password_length_range() {
        let mut config = sample_config();
        config.min_password_length = 0;
        assert!(config.validate().is_err());

        config.min_password_length = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_naming_policy_matches_whole_name() {
        let policy = sample_config().naming_policy().unwrap();
        assert!(policy.check_username("jdoe").is_ok());
        assert!(policy.check_username("j-doe2").is_ok());
        assert!(policy.check_username("").is_err());
        assert!(policy.check_username("Jdoe").is_err());
        assert!(policy.check_username("jdoe;rm").is_err());
    }

    #[test]
    fn test_password_length_error_hides_password() {
        let policy = NamingPolicy::new("[a-z]+", 6).unwrap();
        assert!(policy.check_password_length(6).is_ok());
        let err = policy.check_password_length(3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: password too short (minimum 6 characters)"
        );
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "username_pattern": "[a-z]+",
            "min_password_length": 6,
            "member": { "home_base": "/users", "shell": "/bin/bash", "min_id": 20000, "max_id": 29999 },
            "club": { "home_base": "/users", "shell": "/bin/false", "min_id": 30000, "max_id": 39999,
                      "login": false },
            "admin": { "home_base": "/users", "shell": "/bin/bash", "min_id": 10000, "max_id": 10999,
                       "group_policy": { "type": "shared", "gid": 100 } },
            "group_min_id": 40000,
            "group_max_id": 49999
        }"#;

        let config = AccountsConfig::from_json(json).unwrap();
        assert_eq!(config.min_password_length, 6);
        assert_eq!(config.shells_file, PathBuf::from("/etc/shells"));
        assert_eq!(config.member.group_policy, GroupPolicy::OwnGroup);
        assert_eq!(config.admin.group_policy, GroupPolicy::Shared(100));
        assert_eq!(config.helpers.addclub, PathBuf::from("/usr/bin/addclub"));
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = sample_config();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized = AccountsConfig::from_json(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
