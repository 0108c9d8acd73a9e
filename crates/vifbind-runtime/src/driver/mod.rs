//! Built-in binding drivers.

pub mod veth;
