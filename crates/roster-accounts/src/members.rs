//! Membership records stored on account entries.
//!
//! Paid terms live in the multi-valued `term` attribute and complimentary ones in
//! `nonMemberTerm`. A term is never recorded in both: paying for a term clears its
//! complimentary record. Officer positions are values of the `position` attribute.

use crate::accounts::AccountManager;
use crate::backend::DirectoryStore;
use roster_core::{AttributeMap, Error, Modification, Result, Term};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const MEMBER_TERMS: &str = "term";
const NON_MEMBER_TERMS: &str = "nonMemberTerm";
const POSITION: &str = "position";
const EXPIRED_FILTER: &str = "(&(objectClass=member)(!(|(term={})(nonMemberTerm={}))))";
const TERM_FILTER: &str = "(&(objectClass=member)(term={}))";
const NAME_FILTER: &str = "(&(objectClass=member)(cn~={}))";
const ALL_FILTER: &str = "(objectClass=member)";
const HOLDERS_FILTER: &str = "(&(objectClass=member)(position={}))";
const ANY_POSITION_FILTER: &str = "(position=*)";

impl AccountManager {
    /// Records paid terms for a member and drops them from the complimentary list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] for a malformed term and [`Error::NoSuchAccount`] without
    /// an entry.
    pub async fn register<S: AsRef<str> + Sync>(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
        terms: &[S],
    ) -> Result<Vec<Modification>> {
        let terms = parse_terms(terms)?;
        let current = self.account(directory, username).await?;

        let mut updated = current.clone();
        for term in terms.iter().map(ToString::to_string) {
            updated.remove_value(NON_MEMBER_TERMS, &term);
            updated.insert_value(MEMBER_TERMS, term);
        }
        self.store_terms(directory, username, &current, &updated)
            .await
    }

    /// Records complimentary terms; terms already paid for are skipped.
    ///
    /// # Errors
    ///
    /// Same as [`AccountManager::register`].
    pub async fn register_nonmember<S: AsRef<str> + Sync>(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
        terms: &[S],
    ) -> Result<Vec<Modification>> {
        let terms = parse_terms(terms)?;
        let current = self.account(directory, username).await?;

        let mut updated = current.clone();
        for term in terms.iter().map(ToString::to_string) {
            if !current.contains_value(MEMBER_TERMS, &term) {
                updated.insert_value(NON_MEMBER_TERMS, term);
            }
        }
        self.store_terms(directory, username, &current, &updated)
            .await
    }

    /// Whether `username` paid for `term`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] and [`Error::NoSuchAccount`].
    pub async fn registered(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
        term: &str,
    ) -> Result<bool> {
        let term = Term::parse(term)?;
        let entry = self.account(directory, username).await?;
        Ok(entry.contains_value(MEMBER_TERMS, &term.to_string()))
    }

    /// Paid terms of a member, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAccount`] and [`Error::MalformedResponse`] for a stored term that
    /// does not parse.
    pub async fn member_terms(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
    ) -> Result<Vec<Term>> {
        let entry = self.account(directory, username).await?;
        let mut terms = entry
            .get(MEMBER_TERMS)
            .into_iter()
            .flatten()
            .map(|term| {
                Term::parse(term).map_err(|_| Error::MalformedResponse {
                    service: "ldap".to_string(),
                    message: format!("account `{username}` has malformed term `{term}`"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        terms.sort();
        Ok(terms)
    }

    /// Members registered for neither kind of term in the current term.
    ///
    /// # Errors
    ///
    /// Returns directory errors.
    pub async fn expired_accounts(
        &self,
        directory: &dyn DirectoryStore,
    ) -> Result<BTreeMap<String, AttributeMap>> {
        self.expired_accounts_in(directory, Term::current()).await
    }

    /// Members registered for neither kind of term in `term`.
    ///
    /// # Errors
    ///
    /// Returns directory errors.
    pub async fn expired_accounts_in(
        &self,
        directory: &dyn DirectoryStore,
        term: Term,
    ) -> Result<BTreeMap<String, AttributeMap>> {
        let term = term.to_string();
        directory
            .search(
                self.layout().users_base(),
                EXPIRED_FILTER,
                &[term.clone(), term],
                &[],
            )
            .await
    }

    /// Members who paid for `term`, keyed by DN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] and directory errors.
    pub async fn list_term(
        &self,
        directory: &dyn DirectoryStore,
        term: &str,
    ) -> Result<BTreeMap<String, AttributeMap>> {
        let term = Term::parse(term)?;
        self.search_members(directory, TERM_FILTER, &[term.to_string()])
            .await
    }

    /// Members whose common name approximately matches `name`, keyed by DN.
    ///
    /// # Errors
    ///
    /// Returns directory errors.
    pub async fn list_name(
        &self,
        directory: &dyn DirectoryStore,
        name: &str,
    ) -> Result<BTreeMap<String, AttributeMap>> {
        self.search_members(directory, NAME_FILTER, &[name.to_string()])
            .await
    }

    /// Every member entry, keyed by DN.
    ///
    /// # Errors
    ///
    /// Returns directory errors.
    pub async fn list_all(
        &self,
        directory: &dyn DirectoryStore,
    ) -> Result<BTreeMap<String, AttributeMap>> {
        self.search_members(directory, ALL_FILTER, &[]).await
    }

    /// Usernames listed in a group's `memberUid`; an unknown group has none.
    ///
    /// # Errors
    ///
    /// Returns directory errors.
    pub async fn group_members(
        &self,
        directory: &dyn DirectoryStore,
        group: &str,
    ) -> Result<Vec<String>> {
        Ok(directory
            .lookup(&self.layout().group_dn(group))
            .await?
            .and_then(|mut entry| entry.remove("memberUid"))
            .map(|members| members.into_iter().collect())
            .unwrap_or_default())
    }

    /// Entries of a group's members, keyed by DN. Members without an entry are skipped.
    ///
    /// # Errors
    ///
    /// Returns directory errors.
    pub async fn list_group(
        &self,
        directory: &dyn DirectoryStore,
        group: &str,
    ) -> Result<BTreeMap<String, AttributeMap>> {
        let mut entries = BTreeMap::new();
        for username in self.group_members(directory, group).await? {
            let dn = self.layout().user_dn(&username);
            match directory.lookup(&dn).await? {
                Some(entry) => {
                    entries.insert(dn.to_string(), entry);
                }
                None => debug!(group, username = %username, "group member has no entry"),
            }
        }
        Ok(entries)
    }

    /// Officer positions mapped to their holders' entries, keyed by username.
    ///
    /// # Errors
    ///
    /// Returns directory errors.
    pub async fn list_positions(
        &self,
        directory: &dyn DirectoryStore,
    ) -> Result<BTreeMap<String, BTreeMap<String, AttributeMap>>> {
        let holders = directory
            .search(self.layout().users_base(), ANY_POSITION_FILTER, &[], &[])
            .await?;

        let mut positions = BTreeMap::<String, BTreeMap<String, AttributeMap>>::new();
        for entry in holders.into_values() {
            let Some(username) = entry.first("uid").map(str::to_string) else {
                continue;
            };
            for position in entry.get(POSITION).into_iter().flatten() {
                positions
                    .entry(position.clone())
                    .or_default()
                    .insert(username.clone(), entry.clone());
            }
        }
        Ok(positions)
    }

    /// Makes exactly `usernames` hold `position`.
    ///
    /// Current holders not listed lose the position and listed members gain it. Returns the
    /// operations sent per username; nothing is sent when the holders already match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for an empty position name and
    /// [`Error::NoSuchAccount`] if a new holder has no entry; both are detected before any
    /// entry changes.
    pub async fn set_position<S: AsRef<str> + Sync>(
        &self,
        directory: &dyn DirectoryStore,
        position: &str,
        usernames: &[S],
    ) -> Result<BTreeMap<String, Vec<Modification>>> {
        if position.trim().is_empty() {
            return Err(Error::ValidationError(
                "position name must not be empty".to_string(),
            ));
        }

        let current = directory
            .search(
                self.layout().users_base(),
                HOLDERS_FILTER,
                &[position.to_string()],
                &["uid"],
            )
            .await?
            .into_values()
            .filter_map(|entry| entry.first("uid").map(str::to_string))
            .collect::<BTreeSet<_>>();
        let wanted = usernames
            .iter()
            .map(|username| username.as_ref().to_string())
            .collect::<BTreeSet<_>>();

        let mut pending = Vec::new();
        for username in wanted.difference(&current) {
            let entry = self.account(directory, username).await?;
            let mut updated = entry.clone();
            updated.insert_value(POSITION, position);
            pending.push((username.clone(), entry, updated));
        }
        for username in current.difference(&wanted) {
            let entry = self.account(directory, username).await?;
            let mut updated = entry.clone();
            updated.remove_value(POSITION, position);
            pending.push((username.clone(), entry, updated));
        }

        let mut changes = BTreeMap::new();
        for (username, entry, updated) in pending {
            let modifications = directory
                .modify(&self.layout().user_dn(&username), &entry, &updated)
                .await?;
            if !modifications.is_empty() {
                let held = updated.contains_value(POSITION, position);
                info!(username = %username, position, held, "position updated");
                changes.insert(username, modifications);
            }
        }
        Ok(changes)
    }

    async fn search_members(
        &self,
        directory: &dyn DirectoryStore,
        filter: &str,
        params: &[String],
    ) -> Result<BTreeMap<String, AttributeMap>> {
        directory
            .search(self.layout().users_base(), filter, params, &[])
            .await
    }

    async fn store_terms(
        &self,
        directory: &dyn DirectoryStore,
        username: &str,
        current: &AttributeMap,
        updated: &AttributeMap,
    ) -> Result<Vec<Modification>> {
        let modifications = directory
            .modify(&self.layout().user_dn(username), current, updated)
            .await?;
        if !modifications.is_empty() {
            info!(username = %username, operations = modifications.len(), "terms registered");
        }
        Ok(modifications)
    }
}

fn parse_terms<S: AsRef<str>>(terms: &[S]) -> Result<Vec<Term>> {
    terms.iter().map(|term| Term::parse(term.as_ref())).collect()
}
