//! # vifbind-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire vifbind workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the VIF data model and error taxonomy that
//! the namespace primitives, the binding runtime and the CLI build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
