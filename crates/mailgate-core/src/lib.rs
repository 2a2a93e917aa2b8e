//! Mailgate Core - check adapter and fail-action policy
//!
//! This crate hosts message checks for the filtering pipeline: the check
//! module interfaces, the stateless check adapter, the fail-action policy,
//! the DNS resolver seam and the registry that instantiates checks from
//! configuration.

pub mod check;
pub mod dns;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use check::{
    Check, CheckContext, CheckFunctions, CheckLogger, CheckState, Diagnostic, FailAction, Module,
    Stage, StageSet, StatelessCheck, Verdict,
};
pub use dns::{DnsResolver, MxRecord, ResolveError, Resolver};
pub use registry::{CheckRegistry, CheckSet, RegistryBuilder};
