//! Mailgate Common - Shared types and utilities
//!
//! This crate provides the error type, configuration model, message
//! metadata types and logging setup shared across all Mailgate components.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{CheckDeclaration, Config};
pub use error::{Error, Result};
pub use types::{Body, ConnInfo, EmailAddress, Header, MessageId, MsgMetadata};
