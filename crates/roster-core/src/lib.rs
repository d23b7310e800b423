//! # roster-core
//!
//! Core types shared by the account provisioning crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy, partial-failure reports and machine-readable error codes
//! - [`config`] - Accounts configuration, account kind presets and naming policy
//! - [`attrs`] - Multi-valued attribute maps and the minimal diff between two of them
//! - [`term`] - Membership term arithmetic (`f2006`, `w2007`, ...)

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attrs;
pub mod config;
pub mod error;
pub mod term;

// Re-export commonly used types
pub use attrs::{diff, outstanding, AttributeMap, Modification};
pub use config::{AccountKind, AccountsConfig, GroupPolicy, HelperPaths, KindPreset, NamingPolicy};
pub use error::{CompensationOutcome, Error, NameSource, Resource, ResourceFailure, Result};
pub use term::{Season, Term};
