//! Identity directory client for POSIX accounts and groups.
//!
//! This crate wraps an LDAP directory behind a small, strongly-typed client: entries are read
//! and written as [`roster_core::AttributeMap`]s, updates are always computed with
//! [`roster_core::diff`], and result codes are mapped onto [`roster_core::Error`] once, at the
//! protocol boundary.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod dn;
mod filter;
mod posix;

pub use client::{DirectoryClient, LdapEntry, SearchScope};
pub use config::{
    BindMethod, DirectoryLayout, LdapConfig, DEFAULT_CONNECTION_TIMEOUT_SECS,
    DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use filter::{escape_filter_value, render_filter};
pub use posix::{
    numeric_attribute, PosixAccount, PosixAccountBuilder, PosixGroup, ACCOUNT_OBJECT_CLASSES,
    GROUP_OBJECT_CLASSES, RESERVED_ACCOUNT_ATTRIBUTES,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = roster_core::Result<T>;
