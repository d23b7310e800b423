//! Store seams used by the orchestrator.
//!
//! The orchestrator never talks to `ldap3` or the console directly. It goes through these traits,
//! which are implemented for [`DirectoryClient`] and [`KadminClient`] and mocked in tests.

use async_trait::async_trait;
use roster_core::{AttributeMap, Modification, Result};
use roster_kadmin::{ConsoleTransport, KadminClient};
use roster_ldap::{DirectoryClient, DistinguishedName};
use secrecy::SecretString;
use std::collections::BTreeMap;

/// Entry-level access to the identity directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Fetches an entry; `None` when it does not exist.
    async fn lookup(&self, dn: &DistinguishedName) -> Result<Option<AttributeMap>>;

    /// Adds an entry; an existing DN is [`roster_core::Error::AlreadyExists`].
    async fn add(&self, dn: &DistinguishedName, attributes: &AttributeMap) -> Result<()>;

    /// Moves an entry from `old` to `new` and returns the operations sent.
    async fn modify(
        &self,
        dn: &DistinguishedName,
        old: &AttributeMap,
        new: &AttributeMap,
    ) -> Result<Vec<Modification>>;

    /// Deletes an entry.
    async fn delete(&self, dn: &DistinguishedName) -> Result<()>;

    /// Subtree search with a `{}` filter template.
    async fn search(
        &self,
        base: &DistinguishedName,
        filter: &str,
        params: &[String],
        attributes: &[&'static str],
    ) -> Result<BTreeMap<String, AttributeMap>>;
}

/// Principal management in the credential store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send {
    /// Creates a principal with a password.
    async fn add_principal(&mut self, name: &str, password: &SecretString) -> Result<()>;

    /// Removes a principal.
    async fn delete_principal(&mut self, name: &str) -> Result<()>;

    /// Reads a principal's attributes; `None` when it does not exist.
    async fn get_principal(&mut self, name: &str) -> Result<Option<BTreeMap<String, String>>>;

    /// Replaces a principal's password.
    async fn change_password(&mut self, name: &str, password: &SecretString) -> Result<()>;
}

/// Read-only view of the host's passwd and group databases.
#[cfg_attr(test, mockall::automock)]
pub trait LocalAccounts: Send + Sync {
    /// Whether a local user has this name.
    fn user_exists(&self, name: &str) -> Result<bool>;

    /// Whether a local group has this name.
    fn group_exists(&self, name: &str) -> Result<bool>;

    /// Whether a local user has this uid.
    fn uid_in_use(&self, uid: u32) -> Result<bool>;

    /// Whether a local group has this gid.
    fn gid_in_use(&self, gid: u32) -> Result<bool>;
}

#[async_trait]
impl DirectoryStore for DirectoryClient {
    async fn lookup(&self, dn: &DistinguishedName) -> Result<Option<AttributeMap>> {
        Self::lookup(self, dn).await
    }

    async fn add(&self, dn: &DistinguishedName, attributes: &AttributeMap) -> Result<()> {
        Self::add(self, dn, attributes).await
    }

    async fn modify(
        &self,
        dn: &DistinguishedName,
        old: &AttributeMap,
        new: &AttributeMap,
    ) -> Result<Vec<Modification>> {
        Self::modify(self, dn, old, new).await
    }

    async fn delete(&self, dn: &DistinguishedName) -> Result<()> {
        Self::delete(self, dn).await
    }

    async fn search(
        &self,
        base: &DistinguishedName,
        filter: &str,
        params: &[String],
        attributes: &[&'static str],
    ) -> Result<BTreeMap<String, AttributeMap>> {
        Self::search(self, base, filter, params, attributes).await
    }
}

#[async_trait]
impl<T: ConsoleTransport> CredentialStore for KadminClient<T> {
    async fn add_principal(&mut self, name: &str, password: &SecretString) -> Result<()> {
        Self::add_principal(self, name, password).await
    }

    async fn delete_principal(&mut self, name: &str) -> Result<()> {
        Self::delete_principal(self, name).await
    }

    async fn get_principal(&mut self, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        Self::get_principal(self, name).await
    }

    async fn change_password(&mut self, name: &str, password: &SecretString) -> Result<()> {
        Self::change_password(self, name, password).await
    }
}
