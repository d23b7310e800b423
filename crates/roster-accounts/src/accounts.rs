//! Account orchestration across the directory, the credential store and the host.
//!
//! Creating an account touches up to three resources (directory entry, own-name group,
//! principal). They are created in that order; when a later step fails the earlier ones are
//! removed again and every removal is reported in [`Error::CreateFailed`]. Deletion removes
//! whatever exists and reports the leftovers through [`Error::DeleteIncomplete`].

use crate::allocator::first_available;
use crate::backend::{CredentialStore, DirectoryStore, LocalAccounts};
use roster_core::{
    AccountKind, AccountsConfig, AttributeMap, CompensationOutcome, Error, GroupPolicy,
    Modification, NameSource, NamingPolicy, Resource, ResourceFailure, Result,
};
use roster_ldap::{
    numeric_attribute, DirectoryLayout, DistinguishedName, PosixAccount, PosixGroup,
    RESERVED_ACCOUNT_ATTRIBUTES,
};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use tracing::{info, warn};

/// The stores one orchestrator call works against.
pub struct Backends<'a> {
    /// Identity directory.
    pub directory: &'a dyn DirectoryStore,
    /// Credential store.
    pub credentials: &'a mut dyn CredentialStore,
    /// Host passwd and group databases.
    pub local: &'a dyn LocalAccounts,
}

/// Parameters for [`AccountManager::create`].
#[derive(Debug)]
pub struct NewAccount {
    /// Login name.
    pub username: String,
    /// Preset the account is built from.
    pub kind: AccountKind,
    /// Extra entry attributes, e.g. `cn`, `gecos` or `program`.
    pub attributes: AttributeMap,
    /// Initial password; without one no principal is created.
    pub password: Option<SecretString>,
    /// Primary gid overriding the preset's group policy.
    pub group: Option<u32>,
}

impl NewAccount {
    /// Starts a request with no extra attributes and no password.
    #[must_use]
    pub fn new(username: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            username: username.into(),
            kind,
            attributes: AttributeMap::new(),
            password: None,
            group: None,
        }
    }

    /// Sets an extra attribute.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes.set(attribute, values);
        self
    }

    /// Sets the initial password.
    #[must_use]
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// Uses an existing group as the primary group.
    #[must_use]
    pub const fn with_group(mut self, gid: u32) -> Self {
        self.group = Some(gid);
        self
    }
}

/// Creates, updates and retires accounts.
#[derive(Debug, Clone)]
pub struct AccountManager {
    config: AccountsConfig,
    policy: NamingPolicy,
    layout: DirectoryLayout,
}

impl AccountManager {
    /// Creates a manager for one directory layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configuration does not validate.
    pub fn new(config: AccountsConfig, layout: DirectoryLayout) -> Result<Self> {
        let config = config.validated()?;
        let policy = config.naming_policy()?;
        Ok(Self {
            config,
            policy,
            layout,
        })
    }

    /// Provisioning configuration.
    #[must_use]
    pub const fn config(&self) -> &AccountsConfig {
        &self.config
    }

    /// Compiled naming rules.
    #[must_use]
    pub const fn policy(&self) -> &NamingPolicy {
        &self.policy
    }

    /// Directory layout.
    #[must_use]
    pub const fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Creates an account and returns its numeric id.
    ///
    /// # Errors
    ///
    /// * [`Error::ValidationError`] for a bad username, a short password, a password for a kind
    ///   that does not log in, or caller attributes that override builder-owned ones.
    /// * [`Error::NameConflict`] if any store already knows the name.
    /// * [`Error::NoAvailableIds`] if the preset's range is full.
    /// * [`Error::CreateFailed`] if the group or principal step failed; the earlier steps have
    ///   been compensated as reported.
    pub async fn create(&self, backends: &mut Backends<'_>, request: NewAccount) -> Result<u32> {
        let NewAccount {
            username,
            kind,
            attributes,
            password,
            group,
        } = request;
        let preset = self.config.preset(kind);

        self.policy.check_username(&username)?;
        if let Some(password) = &password {
            if !preset.login {
                return Err(Error::ValidationError(format!(
                    "{kind} accounts do not log in and take no password"
                )));
            }
            self.check_password(password)?;
        }
        check_caller_attributes(&attributes)?;

        self.ensure_name_free(backends, &username).await?;

        let uid = first_available(
            backends.directory,
            backends.local,
            &self.layout,
            preset.min_id,
            preset.max_id,
        )
        .await?
        .ok_or(Error::NoAvailableIds {
            min: preset.min_id,
            max: preset.max_id,
        })?;
        let (gid, own_group) = match (group, preset.group_policy) {
            (Some(gid), _) | (None, GroupPolicy::Shared(gid)) => (gid, false),
            (None, GroupPolicy::OwnGroup) => (uid, true),
        };

        let user_dn = self.layout.user_dn(&username);
        let entry = self.account_entry(&username, kind, uid, gid, &attributes);
        match backends.directory.add(&user_dn, &entry).await {
            Ok(()) => {}
            Err(Error::AlreadyExists(_)) => {
                return Err(Error::NameConflict {
                    name: username,
                    found_in: NameSource::DirectoryUser,
                })
            }
            Err(err) => return Err(err),
        }
        info!(username = %username, uid, kind = %kind, "directory entry added");
        let mut created = vec![(Resource::DirectoryEntry, user_dn)];

        if own_group {
            let group_dn = self.layout.group_dn(&username);
            let group_entry = PosixGroup::new(username.as_str(), uid).to_attributes();
            if let Err(cause) = backends.directory.add(&group_dn, &group_entry).await {
                return Err(compensate(backends.directory, Resource::Group, cause, &created).await);
            }
            info!(group = %username, gid = uid, "group added");
            created.push((Resource::Group, group_dn));
        }

        if let Some(password) = &password {
            if let Err(cause) = backends.credentials.add_principal(&username, password).await {
                return Err(
                    compensate(backends.directory, Resource::Principal, cause, &created).await,
                );
            }
            info!(username = %username, "principal created");
        }

        Ok(uid)
    }

    /// Deletes an account's entry, own-name group and principal, whichever exist.
    ///
    /// The group is removed only when its gid equals the account's uid. Returns what was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAccount`] if neither entry nor principal exists and
    /// [`Error::DeleteIncomplete`] if some removals failed.
    pub async fn delete(
        &self,
        backends: &mut Backends<'_>,
        username: &str,
    ) -> Result<Vec<Resource>> {
        let user_dn = self.layout.user_dn(username);
        let group_dn = self.layout.group_dn(username);

        let entry = backends.directory.lookup(&user_dn).await?;
        let principal = backends.credentials.get_principal(username).await?;
        let group = backends.directory.lookup(&group_dn).await?;

        let own_group = match (&entry, &group) {
            (Some(entry), Some(group)) => {
                let uid = numeric_attribute(entry, "uidNumber")?;
                uid.is_some() && uid == numeric_attribute(group, "gidNumber")?
            }
            _ => false,
        };
        if entry.is_none() && principal.is_none() {
            return Err(Error::NoSuchAccount(username.to_string()));
        }

        let mut removed = Vec::new();
        let mut failed = Vec::new();
        let mut record = |resource: Resource, outcome: Result<()>| match outcome {
            Ok(()) => {
                info!(username = %username, resource = %resource, "removed");
                removed.push(resource);
            }
            Err(err) => {
                warn!(username = %username, resource = %resource, error = %err, "removal failed");
                failed.push(ResourceFailure {
                    resource,
                    message: err.to_string(),
                });
            }
        };

        if entry.is_some() {
            record(Resource::DirectoryEntry, backends.directory.delete(&user_dn).await);
        }
        if own_group {
            record(Resource::Group, backends.directory.delete(&group_dn).await);
        }
        if principal.is_some() {
            record(
                Resource::Principal,
                backends.credentials.delete_principal(username).await,
            );
        }

        if failed.is_empty() {
            Ok(removed)
        } else {
            Err(Error::DeleteIncomplete {
                username: username.to_string(),
                removed,
                failed,
            })
        }
    }

    /// Creates the missing principal of an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAccount`] without a directory entry and [`Error::PrincipalExists`]
    /// if the account already has a principal.
    pub async fn add_password(
        &self,
        backends: &mut Backends<'_>,
        username: &str,
        password: &SecretString,
    ) -> Result<()> {
        self.check_password(password)?;
        self.account(backends.directory, username).await?;
        if backends.credentials.get_principal(username).await?.is_some() {
            return Err(Error::PrincipalExists(username.to_string()));
        }

        backends.credentials.add_principal(username, password).await?;
        info!(username = %username, "principal created for existing account");
        Ok(())
    }

    /// Changes an account's password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for a short password and
    /// [`Error::PrincipalNotFound`] if the account has no principal.
    pub async fn change_password(
        &self,
        credentials: &mut dyn CredentialStore,
        username: &str,
        password: &SecretString,
    ) -> Result<()> {
        self.check_password(password)?;
        credentials.change_password(username, password).await?;
        info!(username = %username, "password changed");
        Ok(())
    }

    /// Current directory entry of an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAccount`] if there is no entry.
    pub async fn account(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
    ) -> Result<AttributeMap> {
        directory
            .lookup(&self.layout.user_dn(username))
            .await?
            .ok_or_else(|| Error::NoSuchAccount(username.to_string()))
    }

    /// Replaces an account's entry with `new_attributes` using the minimal modification.
    ///
    /// Returns the operations sent; an unchanged entry sends none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAccount`] without an entry and [`Error::ValidationError`] if the
    /// new attributes rename the account.
    pub async fn modify(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
        new_attributes: &AttributeMap,
    ) -> Result<Vec<Modification>> {
        let current = self.account(directory, username).await?;
        if current.get("uid") != new_attributes.get("uid") {
            return Err(Error::ValidationError(format!(
                "cannot change the uid of `{username}`"
            )));
        }

        let modifications = directory
            .modify(&self.layout.user_dn(username), &current, new_attributes)
            .await?;
        if !modifications.is_empty() {
            info!(username = %username, operations = modifications.len(), "entry modified");
        }
        Ok(modifications)
    }

    /// An account's login shell, if one is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAccount`] if there is no entry.
    pub async fn get_shell(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
    ) -> Result<Option<String>> {
        let entry = self.account(directory, username).await?;
        Ok(entry.first("loginShell").map(str::to_string))
    }

    /// Changes an account's login shell to one listed in the shells file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for an unlisted shell, [`Error::Io`] if the shells
    /// file cannot be read and [`Error::NoSuchAccount`] without an entry.
    pub async fn set_shell(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
        shell: &str,
    ) -> Result<Vec<Modification>> {
        let shells = permitted_shells(&self.config.shells_file).await?;
        if !shells.iter().any(|permitted| permitted == shell) {
            return Err(Error::ValidationError(format!(
                "`{shell}` is not listed in {}",
                self.config.shells_file.display()
            )));
        }

        let mut updated = self.account(directory, username).await?;
        updated.set("loginShell", [shell]);
        self.modify(directory, username, &updated).await
    }

    /// Adds `username` to a group's `memberUid` list. Adding a member twice sends nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown group and [`Error::NoSuchAccount`] for an
    /// unknown user.
    pub async fn add_group_member(
        &self,
        directory: &dyn DirectoryStore,
        group: &str,
        username: &str,
    ) -> Result<Vec<Modification>> {
        self.account(directory, username).await?;
        let (group_dn, current) = self.group(directory, group).await?;

        let mut updated = current.clone();
        updated.insert_value("memberUid", username);
        let modifications = directory.modify(&group_dn, &current, &updated).await?;
        if !modifications.is_empty() {
            info!(group, username = %username, "group member added");
        }
        Ok(modifications)
    }

    /// Removes `username` from a group's `memberUid` list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown group.
    pub async fn remove_group_member(
        &self,
        directory: &dyn DirectoryStore,
        group: &str,
        username: &str,
    ) -> Result<Vec<Modification>> {
        let (group_dn, current) = self.group(directory, group).await?;

        let mut updated = current.clone();
        updated.remove_value("memberUid", username);
        let modifications = directory.modify(&group_dn, &current, &updated).await?;
        if !modifications.is_empty() {
            info!(group, username = %username, "group member removed");
        }
        Ok(modifications)
    }

    pub(crate) fn check_password(&self, password: &SecretString) -> Result<()> {
        self.policy
            .check_password_length(password.expose_secret().chars().count())
    }

    async fn group(
        &self,
        directory: &dyn DirectoryStore,
        group: &str,
    ) -> Result<(DistinguishedName, AttributeMap)> {
        let dn = self.layout.group_dn(group);
        let attributes = directory
            .lookup(&dn)
            .await?
            .ok_or_else(|| Error::NotFound(format!("group `{group}`")))?;
        Ok((dn, attributes))
    }

    async fn ensure_name_free(&self, backends: &mut Backends<'_>, username: &str) -> Result<()> {
        let conflict = |found_in| {
            Err(Error::NameConflict {
                name: username.to_string(),
                found_in,
            })
        };

        if backends
            .directory
            .lookup(&self.layout.user_dn(username))
            .await?
            .is_some()
        {
            return conflict(NameSource::DirectoryUser);
        }
        if backends
            .directory
            .lookup(&self.layout.group_dn(username))
            .await?
            .is_some()
        {
            return conflict(NameSource::DirectoryGroup);
        }
        if backends.credentials.get_principal(username).await?.is_some() {
            return conflict(NameSource::CredentialPrincipal);
        }
        if backends.local.user_exists(username)? {
            return conflict(NameSource::LocalPasswd);
        }
        if backends.local.group_exists(username)? {
            return conflict(NameSource::LocalGroup);
        }
        Ok(())
    }

    fn account_entry(
        &self,
        username: &str,
        kind: AccountKind,
        uid: u32,
        gid: u32,
        attributes: &AttributeMap,
    ) -> AttributeMap {
        let preset = self.config.preset(kind);
        let mut builder = PosixAccount::builder(username, uid, gid)
            .home_directory(preset.home_for(username))
            .login_shell(preset.shell.as_str());
        if let Some(description) = &preset.description {
            builder = builder.description(description.as_str());
        }
        builder = match kind {
            AccountKind::Member => builder.object_class("member"),
            AccountKind::Club => builder.object_class("club"),
            AccountKind::Admin => builder,
        };

        let mut entry = builder.build().to_attributes();
        for (attribute, values) in attributes.iter() {
            entry.set(attribute.as_str(), values.iter().map(String::as_str));
        }
        entry
    }
}

fn check_caller_attributes(attributes: &AttributeMap) -> Result<()> {
    match RESERVED_ACCOUNT_ATTRIBUTES
        .iter()
        .find(|reserved| attributes.contains(reserved))
    {
        Some(reserved) => Err(Error::ValidationError(format!(
            "attribute `{reserved}` is assigned by the provisioning code"
        ))),
        None => Ok(()),
    }
}

/// Undoes the `created` steps in reverse order after `step` failed.
async fn compensate(
    directory: &dyn DirectoryStore,
    step: Resource,
    cause: Error,
    created: &[(Resource, DistinguishedName)],
) -> Error {
    warn!(step = %step, error = %cause, "create step failed; compensating");

    let mut compensation = Vec::with_capacity(created.len());
    for (resource, dn) in created.iter().rev() {
        let outcome = match directory.delete(dn).await {
            Ok(()) => {
                warn!(resource = %resource, dn = %dn, "compensation removed resource");
                CompensationOutcome::removed(*resource)
            }
            Err(err) => {
                warn!(resource = %resource, dn = %dn, error = %err, "compensation failed");
                CompensationOutcome::failed(*resource, &err)
            }
        };
        compensation.push(outcome);
    }

    Error::CreateFailed {
        step,
        cause: Box::new(cause),
        compensation,
    }
}

/// Absolute shell paths from a shells file; comments and blank lines are skipped.
async fn permitted_shells(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::Io(format!("cannot read {}: {err}", path.display())))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('/') && !line.contains('#'))
        .map(str::to_string)
        .collect())
}
