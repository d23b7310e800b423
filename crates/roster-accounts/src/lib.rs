//! UNIX account provisioning.
//!
//! [`AccountManager`] coordinates the identity directory, the credential store and the host's
//! own passwd and group databases. The stores are reached through the [`DirectoryStore`],
//! [`CredentialStore`] and [`LocalAccounts`] traits and passed in explicitly on every call, so
//! one manager can serve any number of connections.
//!
//! ```no_run
//! use roster_accounts::{AccountManager, Backends, NewAccount, NixLocalAccounts};
//! use roster_core::{AccountKind, AccountsConfig};
//! use roster_kadmin::{KadminClient, KadminConfig};
//! use roster_ldap::{BindMethod, DirectoryClient, DirectoryLayout, LdapConfig};
//! use secrecy::SecretString;
//!
//! # async fn provision(config: AccountsConfig) -> roster_core::Result<()> {
//! let layout = DirectoryLayout::parse(
//!     "ou=People,dc=csclub,dc=uwaterloo,dc=ca",
//!     "ou=Group,dc=csclub,dc=uwaterloo,dc=ca",
//! )?;
//! let directory = DirectoryClient::new(LdapConfig::new(
//!     "ldapi:///",
//!     BindMethod::SaslExternal,
//!     layout.clone(),
//! )?);
//! let mut kadmin = KadminClient::connect(&KadminConfig::new("ceo/admin", "/etc/ceo.keytab")?)
//!     .await?;
//! let manager = AccountManager::new(config, layout)?;
//!
//! let mut backends = Backends {
//!     directory: &directory,
//!     credentials: &mut kadmin,
//!     local: &NixLocalAccounts::new(),
//! };
//! let request = NewAccount::new("jdoe", AccountKind::Member)
//!     .with_attribute("cn", ["Jane Doe"])
//!     .with_password(SecretString::from("correct horse".to_string()));
//! let uid = manager.create(&mut backends, request).await?;
//! # let _ = uid;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod accounts;
mod allocator;
mod backend;
mod helpers;
mod local;
mod members;

pub use accounts::{AccountManager, Backends, NewAccount};
pub use allocator::{first_available, used_ids};
pub use backend::{CredentialStore, DirectoryStore, LocalAccounts};
pub use local::NixLocalAccounts;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = roster_core::Result<T>;
