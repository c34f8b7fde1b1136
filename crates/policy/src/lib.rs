//! Capability policy for tool-server transports.
//!
//! Core principle: **a tool server is only launched or contacted when the
//! policy grants the matching capability.** Local processes need an `exec`
//! grant for their command, HTTP transports need a `net_http` grant for
//! their host.

mod capability;
mod error;
mod policy;

pub use capability::{CapabilityKind, CapabilityRequest};
pub use error::{Error, Result};
pub use policy::{AllowRules, DEFAULT_COMMANDS, Decision, DenyRules, Policy};
