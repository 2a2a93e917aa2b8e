//! Mailgate Checks - built-in stateless checks
//!
//! Each check is a set of stage functions registered through the stateless
//! check adapter, so deployments choose its fail action in configuration.

pub mod require_mx;
pub mod require_rdns;

use mailgate_common::Result;
use mailgate_core::{FailAction, RegistryBuilder};
use tracing::debug;

/// Register every built-in check
pub fn register_all(builder: &mut RegistryBuilder) -> Result<()> {
    builder.register_stateless(require_mx::NAME, FailAction::Reject, require_mx::functions())?;
    builder.register_stateless(
        require_rdns::NAME,
        FailAction::Reject,
        require_rdns::functions(),
    )?;
    debug!("Registered built-in checks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailgate_core::testing::SpyResolver;
    use mailgate_core::{Check, Stage};
    use std::sync::Arc;

    #[test]
    fn test_register_all() {
        let mut builder = RegistryBuilder::new(Arc::new(SpyResolver::new()));
        register_all(&mut builder).unwrap();
        let registry = builder.build();

        let mx = registry.default_instance(require_mx::NAME).unwrap();
        assert!(mx.stages().contains(Stage::Sender));
        let rdns = registry.default_instance(require_rdns::NAME).unwrap();
        assert!(rdns.stages().contains(Stage::Connection));
    }

    #[test]
    fn test_register_twice_fails() {
        let mut builder = RegistryBuilder::new(Arc::new(SpyResolver::new()));
        register_all(&mut builder).unwrap();
        assert!(register_all(&mut builder).is_err());
    }
}
