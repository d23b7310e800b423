//! Host passwd and group databases through NSS.

use crate::backend::LocalAccounts;
use nix::unistd::{Gid, Group, Uid, User};
use roster_core::{Error, Result};

/// [`LocalAccounts`] backed by `getpwnam(3)` and friends.
#[derive(Debug, Clone, Copy, Default)]
pub struct NixLocalAccounts;

impl NixLocalAccounts {
    /// Creates the view.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LocalAccounts for NixLocalAccounts {
    fn user_exists(&self, name: &str) -> Result<bool> {
        User::from_name(name)
            .map(|user| user.is_some())
            .map_err(|err| lookup_failed("user", name, err))
    }

    fn group_exists(&self, name: &str) -> Result<bool> {
        Group::from_name(name)
            .map(|group| group.is_some())
            .map_err(|err| lookup_failed("group", name, err))
    }

    fn uid_in_use(&self, uid: u32) -> Result<bool> {
        User::from_uid(Uid::from_raw(uid))
            .map(|user| user.is_some())
            .map_err(|err| lookup_failed("uid", &uid.to_string(), err))
    }

    fn gid_in_use(&self, gid: u32) -> Result<bool> {
        Group::from_gid(Gid::from_raw(gid))
            .map(|group| group.is_some())
            .map_err(|err| lookup_failed("gid", &gid.to_string(), err))
    }
}

fn lookup_failed(kind: &str, key: &str, err: nix::Error) -> Error {
    Error::Io(format!("local {kind} lookup for `{key}` failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_always_present() {
        let local = NixLocalAccounts::new();
        assert!(local.user_exists("root").unwrap());
        assert!(local.uid_in_use(0).unwrap());
        assert!(local.gid_in_use(0).unwrap());
    }

    #[test]
    fn unknown_names_are_absent() {
        let local = NixLocalAccounts::new();
        assert!(!local.user_exists("no-such-user-roster").unwrap());
        assert!(!local.group_exists("no-such-group-roster").unwrap());
    }
}
