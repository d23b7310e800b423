//! Numeric id allocation.
//!
//! An id is free when no directory user carries it as `uidNumber` or `gidNumber`, no directory
//! group carries it as `gidNumber`, and the host knows no user or group with it. The answer is
//! only a hint: two concurrent allocations can pick the same id, and the directory add is what
//! finally rejects the loser.

use crate::backend::{DirectoryStore, LocalAccounts};
use roster_core::{Error, Result};
use roster_ldap::{numeric_attribute, DirectoryLayout};
use std::collections::BTreeSet;
use tracing::debug;

const USER_ID_FILTER: &str =
    "(|(&(uidNumber>={})(uidNumber<={}))(&(gidNumber>={})(gidNumber<={})))";
const GROUP_ID_FILTER: &str = "(&(gidNumber>={})(gidNumber<={}))";

/// Ids in `[min, max]` used by directory users or groups.
///
/// # Errors
///
/// Returns directory errors and [`Error::MalformedResponse`] for non-numeric ids.
pub async fn used_ids(
    directory: &dyn DirectoryStore,
    layout: &DirectoryLayout,
    min: u32,
    max: u32,
) -> Result<BTreeSet<u32>> {
    let bounds = [min.to_string(), max.to_string()];
    let user_params = [bounds.clone(), bounds.clone()].concat();

    let users = directory
        .search(
            layout.users_base(),
            USER_ID_FILTER,
            &user_params,
            &["uidNumber", "gidNumber"],
        )
        .await?;
    let groups = directory
        .search(layout.groups_base(), GROUP_ID_FILTER, &bounds, &["gidNumber"])
        .await?;

    let mut used = BTreeSet::new();
    for attributes in users.values() {
        used.extend(numeric_attribute(attributes, "uidNumber")?);
        used.extend(numeric_attribute(attributes, "gidNumber")?);
    }
    for attributes in groups.values() {
        used.extend(numeric_attribute(attributes, "gidNumber")?);
    }
    used.retain(|id| (min..=max).contains(id));
    Ok(used)
}

/// First id in `[min, max]` free in the directory and on the host, or `None`.
///
/// # Errors
///
/// Returns [`Error::ValidationError`] if `min > max`, plus directory and local lookup errors.
pub async fn first_available(
    directory: &dyn DirectoryStore,
    local: &dyn LocalAccounts,
    layout: &DirectoryLayout,
    min: u32,
    max: u32,
) -> Result<Option<u32>> {
    if min > max {
        return Err(Error::ValidationError(format!(
            "empty id range [{min}, {max}]"
        )));
    }

    let used = used_ids(directory, layout, min, max).await?;
    debug!(min, max, used = used.len(), "scanning id range");

    for id in min..=max {
        if used.contains(&id) || local.uid_in_use(id)? || local.gid_in_use(id)? {
            continue;
        }
        debug!(id, "allocated id");
        return Ok(Some(id));
    }

    debug!(min, max, "id range exhausted");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::{FakeDirectory, FakeLocal};
    use crate::backend::{MockDirectoryStore, MockLocalAccounts};
    use roster_core::AttributeMap;
    use std::collections::BTreeMap;

    fn layout() -> DirectoryLayout {
        DirectoryLayout::parse(
            "ou=People,dc=csclub,dc=uwaterloo,dc=ca",
            "ou=Group,dc=csclub,dc=uwaterloo,dc=ca",
        )
        .unwrap()
    }

    fn user(uid: u32, gid: u32) -> AttributeMap {
        AttributeMap::new()
            .with("uidNumber", [uid.to_string()])
            .with("gidNumber", [gid.to_string()])
    }

    #[tokio::test]
    async fn skips_directory_and_local_ids() {
        let directory = FakeDirectory::default().with_entry(
            "uid=taken,ou=People,dc=csclub,dc=uwaterloo,dc=ca",
            user(20000, 20000),
        );
        let local = FakeLocal::default().with_group("localgrp", 20001);

        let id = first_available(&directory, &local, &layout(), 20000, 20002)
            .await
            .unwrap();
        assert_eq!(id, Some(20002));
    }

    #[tokio::test]
    async fn directory_group_ids_count_as_used() {
        let directory = FakeDirectory::default().with_entry(
            "cn=office,ou=Group,dc=csclub,dc=uwaterloo,dc=ca",
            AttributeMap::new().with("gidNumber", ["20000"]),
        );

        let id = first_available(&directory, &FakeLocal::default(), &layout(), 20000, 20001)
            .await
            .unwrap();
        assert_eq!(id, Some(20001));
    }

    #[tokio::test]
    async fn exhausted_range_is_none() {
        let directory = FakeDirectory::default()
            .with_entry("uid=a,ou=People,dc=csclub,dc=uwaterloo,dc=ca", user(30000, 30000))
            .with_entry("uid=b,ou=People,dc=csclub,dc=uwaterloo,dc=ca", user(30001, 100));
        let local = FakeLocal::default().with_user("c", 30002);

        let id = first_available(&directory, &local, &layout(), 30000, 30002)
            .await
            .unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn searches_both_subtrees_with_the_range() {
        let mut directory = MockDirectoryStore::new();
        directory
            .expect_search()
            .withf(|base, filter, params, attributes| {
                base.as_str().starts_with("ou=People")
                    && filter == USER_ID_FILTER
                    && params.iter().map(String::as_str).eq(["10", "12", "10", "12"])
                    && *attributes == ["uidNumber", "gidNumber"]
            })
            .times(1)
            .returning(|_, _, _, _| Ok(BTreeMap::new()));
        directory
            .expect_search()
            .withf(|base, filter, params, _| {
                base.as_str().starts_with("ou=Group")
                    && filter == GROUP_ID_FILTER
                    && params.iter().map(String::as_str).eq(["10", "12"])
            })
            .times(1)
            .returning(|_, _, _, _| Ok(BTreeMap::new()));

        let mut local = MockLocalAccounts::new();
        local.expect_uid_in_use().returning(|uid| Ok(uid == 10));
        local.expect_gid_in_use().returning(|_| Ok(false));

        let id = first_available(&directory, &local, &layout(), 10, 12)
            .await
            .unwrap();
        assert_eq!(id, Some(11));
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let err = first_available(
            &FakeDirectory::default(),
            &FakeLocal::default(),
            &layout(),
            5,
            4,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }
}
