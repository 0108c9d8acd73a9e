//! # vifbind-core
//!
//! Low-level Linux primitives for binding a VIF into a network namespace.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: opening a namespace handle, path normalization, and
//!   the save/enter/restore switch used to toggle per-namespace sysctls.
//! - **Capabilities**: inspecting the effective capability set before any
//!   privileged mutation is attempted.
//! - **Commands**: running `ip(8)` inside a namespace through `nsenter(1)`
//!   and classifying its failures.
//! - **L3 configuration**: addresses, routes, default gateway and IPv6
//!   enablement, written against the [`netconf::NamespaceOps`] seam.
//!
//! No `unsafe` code is used; `setns(2)` goes through `nix`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod capability;
pub mod command;
pub mod l3;
pub mod namespace;
pub mod netconf;
