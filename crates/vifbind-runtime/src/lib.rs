//! VIF binding orchestration for the vifbind runtime.
//!
//! [`orchestrator::Binder`] is the entry point: it plugs the VIF on the
//! host, hands it to the binding driver registered for its kind, and, when
//! the [`policy::L3Policy`] requires it, has the privileged worker program
//! addresses and routes inside the target namespace.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod driver;
pub mod orchestrator;
pub mod plug;
pub mod policy;
pub mod privileged;
pub mod registry;
