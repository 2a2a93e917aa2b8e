//! Mailgate - check host entry point
//!
//! Loads the configuration, registers the built-in checks and instantiates
//! every declared check instance. Any configuration error aborts startup.

use anyhow::{Context, Result};
use mailgate_common::config::Config;
use mailgate_core::{Check, DnsResolver, Module, RegistryBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load()?,
    };

    // Initialize logging
    mailgate_common::logging::init(&config.logging)?;

    info!("Starting Mailgate...");

    let resolver = Arc::new(DnsResolver::from_config(&config.dns)?);

    let mut builder = RegistryBuilder::new(resolver);
    mailgate_checks::register_all(&mut builder)?;
    let registry = builder.build();
    info!(
        modules = %registry.names().collect::<Vec<_>>().join(","),
        "Check registry ready"
    );

    let checks = registry
        .load(&config.checks)
        .context("check configuration rejected")?;

    if checks.is_empty() {
        warn!("No checks declared, messages will pass unchecked");
    }

    for check in checks.iter() {
        info!(
            module = check.name(),
            instance = check.instance_name(),
            stages = %check.stages(),
            "Check active"
        );
    }

    info!("{} check instance(s) active", checks.len());
    Ok(())
}
