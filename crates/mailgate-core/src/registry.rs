//! Check registry
//!
//! Modules are registered on a [`RegistryBuilder`] during startup. The frozen
//! [`CheckRegistry`] is then handed to configuration loading, which creates
//! one instance per `[[checks]]` declaration. Nothing is registered after
//! [`RegistryBuilder::build`].

use crate::check::{Check, CheckFunctions, CheckState, FailAction, StatelessCheck};
use crate::dns::Resolver;
use mailgate_common::config::CheckDeclaration;
use mailgate_common::types::MsgMetadata;
use mailgate_common::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Creates an uninitialized module instance from `(module name, instance name)`
pub type CheckFactory = Arc<dyn Fn(&str, &str) -> Box<dyn Check> + Send + Sync>;

/// Collects module factories during startup
pub struct RegistryBuilder {
    resolver: Arc<dyn Resolver>,
    factories: BTreeMap<String, CheckFactory>,
}

impl RegistryBuilder {
    /// `resolver` is handed to every stateless check instance
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            factories: BTreeMap::new(),
        }
    }

    /// Register an arbitrary check module
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&str, &str) -> Box<dyn Check> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(Error::DuplicateModule(name.to_string()));
        }
        debug!(module = name, "Registered check module");
        self.factories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Register a check made of stage functions.
    ///
    /// `default_fail_action` applies to instances whose configuration has no
    /// `fail_action` directive.
    pub fn register_stateless(
        &mut self,
        name: &str,
        default_fail_action: FailAction,
        functions: CheckFunctions,
    ) -> Result<()> {
        let resolver = self.resolver.clone();
        self.register(name, move |module, instance| {
            Box::new(StatelessCheck::new(
                module,
                instance,
                default_fail_action,
                functions.clone(),
                resolver.clone(),
            )) as Box<dyn Check>
        })
    }

    /// Freeze the registry
    pub fn build(self) -> CheckRegistry {
        CheckRegistry {
            factories: self.factories,
        }
    }
}

/// Read-only name to factory table
pub struct CheckRegistry {
    factories: BTreeMap<String, CheckFactory>,
}

impl CheckRegistry {
    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }

    /// Registered module names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create and initialize one instance of `module`
    pub fn instantiate(
        &self,
        module: &str,
        instance: &str,
        directives: &toml::Table,
    ) -> Result<Arc<dyn Check>> {
        let factory = self
            .factories
            .get(module)
            .ok_or_else(|| Error::UnknownModule(module.to_string()))?;

        let mut check = factory(module, instance);
        check.init(directives)?;
        Ok(Arc::from(check))
    }

    /// Instance named after the module itself, with no directives
    pub fn default_instance(&self, module: &str) -> Result<Arc<dyn Check>> {
        self.instantiate(module, module, &toml::Table::new())
    }

    /// Instantiate every declaration in order.
    ///
    /// The first failure aborts loading; no partially configured set is
    /// returned.
    pub fn load(&self, declarations: &[CheckDeclaration]) -> Result<CheckSet> {
        let mut set = CheckSet::default();

        for decl in declarations {
            let instance = decl.instance_name();
            if set.by_instance.contains_key(instance) {
                return Err(Error::DuplicateInstance(instance.to_string()));
            }

            let check = self.instantiate(&decl.module, instance, &decl.directives)?;
            info!(
                module = %decl.module,
                instance = %instance,
                stages = %check.stages(),
                "Check instance loaded"
            );

            set.by_instance.insert(instance.to_string(), set.checks.len());
            set.checks.push(check);
        }

        Ok(set)
    }
}

/// Loaded check instances, in declaration order
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<Arc<dyn Check>>,
    by_instance: HashMap<String, usize>,
}

impl CheckSet {
    pub fn get(&self, instance: &str) -> Option<&Arc<dyn Check>> {
        self.by_instance.get(instance).map(|&i| &self.checks[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Check>> {
        self.checks.iter()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Per-message states for every check, in declaration order
    pub fn new_message(&self, meta: Arc<MsgMetadata>) -> Result<Vec<Box<dyn CheckState>>> {
        self.checks
            .iter()
            .map(|check| check.new_message(meta.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Module, Stage, Verdict};
    use crate::testing::SpyResolver;
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    fn registry() -> CheckRegistry {
        let mut builder = RegistryBuilder::new(Arc::new(SpyResolver::new()));
        builder
            .register_stateless(
                "spf",
                FailAction::Reject,
                CheckFunctions::new().sender(|_ctx, from: String| async move {
                    if from == "bad@example.com" {
                        Verdict::reject("spf-fail")
                    } else {
                        Verdict::neutral()
                    }
                }),
            )
            .unwrap();
        builder
            .register_stateless(
                "rbl",
                FailAction::ScoreAdjust(2),
                CheckFunctions::new().connection(|_ctx| async { Verdict::reject("listed") }),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_duplicate_registration() {
        let mut builder = RegistryBuilder::new(Arc::new(SpyResolver::new()));
        builder
            .register_stateless("spf", FailAction::Reject, CheckFunctions::new())
            .unwrap();
        let err = builder
            .register_stateless("spf", FailAction::Ignore, CheckFunctions::new())
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_MODULE");
    }

    #[test]
    fn test_names_sorted() {
        let registry = registry();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["rbl", "spf"]);
        assert!(registry.contains("spf"));
        assert!(!registry.contains("dkim"));
    }

    #[test]
    fn test_unknown_module() {
        let err = registry().default_instance("dkim").err().unwrap();
        assert_eq!(err.code(), "UNKNOWN_MODULE");
    }

    #[tokio::test]
    async fn test_default_instance_uses_registered_action() {
        let check = registry().default_instance("rbl").unwrap();
        assert_eq!(check.name(), "rbl");
        assert_eq!(check.instance_name(), "rbl");
        assert!(check.stages().contains(Stage::Connection));

        let mut state = check.new_message(Arc::new(MsgMetadata::new())).unwrap();
        assert_eq!(
            state.check_connection(&CancellationToken::new()).await,
            Verdict::score(2)
        );
    }

    #[tokio::test]
    async fn test_load_declarations() {
        let registry = registry();
        let declarations = vec![
            CheckDeclaration::new("spf"),
            CheckDeclaration::new("spf")
                .with_instance("spf_soft")
                .with_directive("fail_action", "quarantine"),
        ];
        let set = registry.load(&declarations).unwrap();
        assert_eq!(set.len(), 2);

        let strict = set.get("spf").unwrap();
        let soft = set.get("spf_soft").unwrap();
        assert_eq!(soft.name(), "spf");
        assert_eq!(soft.instance_name(), "spf_soft");

        let cancel = CancellationToken::new();
        let meta = Arc::new(MsgMetadata::new());
        let mut strict_state = strict.new_message(meta.clone()).unwrap();
        let mut soft_state = soft.new_message(meta.clone()).unwrap();
        assert!(strict_state
            .check_sender(&cancel, "bad@example.com")
            .await
            .is_reject());
        assert_eq!(
            soft_state.check_sender(&cancel, "bad@example.com").await,
            Verdict::quarantine()
        );

        let states = set.new_message(meta).unwrap();
        assert_eq!(states.len(), 2);
    }

    #[test]
    fn test_load_aborts_on_bad_directive() {
        let declarations = vec![
            CheckDeclaration::new("spf"),
            CheckDeclaration::new("rbl").with_directive("fail_action", "bounce"),
        ];
        let err = registry().load(&declarations).err().unwrap();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.is_fatal_at_startup());
    }

    #[test]
    fn test_load_rejects_duplicate_instance() {
        let declarations = vec![CheckDeclaration::new("spf"), CheckDeclaration::new("spf")];
        let err = registry().load(&declarations).err().unwrap();
        assert_eq!(err.code(), "DUPLICATE_INSTANCE");
    }

    #[test]
    fn test_register_custom_module() {
        let mut builder = RegistryBuilder::new(Arc::new(SpyResolver::new()));
        let resolver: Arc<dyn Resolver> = Arc::new(SpyResolver::new());
        builder
            .register("custom", move |module, instance| {
                Box::new(StatelessCheck::new(
                    module,
                    instance,
                    FailAction::Quarantine,
                    CheckFunctions::new(),
                    resolver.clone(),
                )) as Box<dyn Check>
            })
            .unwrap();
        let registry = builder.build();
        let check = registry
            .instantiate("custom", "custom_1", &toml::Table::new())
            .unwrap();
        assert_eq!(check.instance_name(), "custom_1");
        assert!(check.stages().is_empty());
    }
}
