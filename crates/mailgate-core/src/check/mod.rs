//! Check modules
//!
//! A check inspects a message at one or more stages and reports a
//! [`Verdict`]. Checks built from plain stage functions go through
//! [`StatelessCheck`], which applies the instance's configured
//! [`FailAction`] to every verdict before the pipeline sees it.

mod action;
mod context;
mod directives;
mod module;
mod stateless;
mod verdict;

pub use action::FailAction;
pub use context::{CheckContext, CheckLogger};
pub use directives::DirectiveMap;
pub use module::{Check, CheckState, Module, Stage, StageSet};
pub use stateless::{CheckFunctions, StageFuture, StatelessCheck};
pub use verdict::{Diagnostic, Verdict};
