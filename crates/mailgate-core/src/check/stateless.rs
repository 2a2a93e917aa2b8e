//! Stateless checks
//!
//! Lets a check be written as a handful of async functions, one per stage,
//! and turns them into a full [`Check`] module. Stage functions always
//! report failures as if the configured action were `reject`; the instance's
//! [`FailAction`] decides what actually happens.

use super::action::FailAction;
use super::context::{CheckContext, CheckLogger};
use super::directives::DirectiveMap;
use super::module::{Check, CheckState, Module, Stage, StageSet};
use super::verdict::Verdict;
use crate::dns::Resolver;
use async_trait::async_trait;
use mailgate_common::types::{Body, Header, MsgMetadata};
use mailgate_common::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Boxed future returned by stage functions
pub type StageFuture = Pin<Box<dyn Future<Output = Verdict> + Send>>;

type ConnectionFn = Arc<dyn Fn(CheckContext) -> StageFuture + Send + Sync>;
type AddressFn = Arc<dyn Fn(CheckContext, String) -> StageFuture + Send + Sync>;
type BodyFn = Arc<dyn Fn(CheckContext, Header, Body) -> StageFuture + Send + Sync>;

/// The stage functions and tunables making up one stateless check.
///
/// Any subset of stages may be left out; those stages always yield the
/// neutral verdict.
#[derive(Clone, Default)]
pub struct CheckFunctions {
    connection: Option<ConnectionFn>,
    sender: Option<AddressFn>,
    rcpt: Option<AddressFn>,
    body: Option<BodyFn>,
    tunables: Vec<(String, i64)>,
}

impl CheckFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once the connection is established
    pub fn connection<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Verdict> + Send + 'static,
    {
        self.connection = Some(Arc::new(move |ctx: CheckContext| {
            Box::pin(f(ctx)) as StageFuture
        }));
        self
    }

    /// Run `f` with the MAIL FROM address
    pub fn sender<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CheckContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Verdict> + Send + 'static,
    {
        self.sender = Some(Arc::new(move |ctx: CheckContext, addr: String| {
            Box::pin(f(ctx, addr)) as StageFuture
        }));
        self
    }

    /// Run `f` with each RCPT TO address
    pub fn rcpt<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CheckContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Verdict> + Send + 'static,
    {
        self.rcpt = Some(Arc::new(move |ctx: CheckContext, addr: String| {
            Box::pin(f(ctx, addr)) as StageFuture
        }));
        self
    }

    /// Run `f` once the message body is received
    pub fn body<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CheckContext, Header, Body) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Verdict> + Send + 'static,
    {
        self.body = Some(Arc::new(move |ctx: CheckContext, header: Header, body: Body| {
            Box::pin(f(ctx, header, body)) as StageFuture
        }));
        self
    }

    /// Declare an integer directive readable through [`CheckContext::tunable`]
    pub fn tunable(mut self, name: &str, default: i64) -> Self {
        self.tunables.push((name.to_string(), default));
        self
    }

    /// Stages that have a function attached
    pub fn stages(&self) -> StageSet {
        let mut set = StageSet::empty();
        if self.connection.is_some() {
            set.insert(Stage::Connection);
        }
        if self.sender.is_some() {
            set.insert(Stage::Sender);
        }
        if self.rcpt.is_some() {
            set.insert(Stage::Rcpt);
        }
        if self.body.is_some() {
            set.insert(Stage::Body);
        }
        set
    }
}

/// Read-only after init, shared with every per-message state
#[derive(Clone)]
struct Shared {
    module: String,
    instance: String,
    resolver: Arc<dyn Resolver>,
    logger: CheckLogger,
    fail_action: FailAction,
    tunables: Arc<BTreeMap<String, i64>>,
    functions: CheckFunctions,
}

/// Check module wrapping a set of stage functions
pub struct StatelessCheck {
    default_fail_action: FailAction,
    shared: Arc<Shared>,
}

impl StatelessCheck {
    pub fn new(
        module: &str,
        instance: &str,
        default_fail_action: FailAction,
        functions: CheckFunctions,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let tunables = functions.tunables.iter().cloned().collect();
        Self {
            default_fail_action,
            shared: Arc::new(Shared {
                module: module.to_string(),
                instance: instance.to_string(),
                resolver,
                logger: CheckLogger::new(module, instance),
                fail_action: default_fail_action,
                tunables: Arc::new(tunables),
                functions,
            }),
        }
    }

    /// Action applied to failing verdicts
    pub fn fail_action(&self) -> FailAction {
        self.shared.fail_action
    }

    pub fn is_debug(&self) -> bool {
        self.shared.logger.is_debug()
    }
}

impl Module for StatelessCheck {
    fn name(&self) -> &str {
        &self.shared.module
    }

    fn instance_name(&self) -> &str {
        &self.shared.instance
    }
}

impl Check for StatelessCheck {
    fn init(&mut self, directives: &toml::Table) -> Result<()> {
        let instance = self.shared.instance.clone();
        let declared = self.shared.functions.tunables.clone();
        let default_fail_action = self.default_fail_action;

        let mut map = DirectiveMap::new(&instance, directives);
        let debug = map.bool("debug", true)?;
        let fail_action = map.custom("fail_action", || default_fail_action, FailAction::from_directive)?;
        let mut tunables = BTreeMap::new();
        for (name, default) in &declared {
            tunables.insert(name.clone(), map.int(name, *default)?);
        }
        map.finish()?;

        let shared = Arc::make_mut(&mut self.shared);
        shared.logger.set_debug(debug);
        shared.fail_action = fail_action;
        shared.tunables = Arc::new(tunables);

        debug!(
            check = %shared.module,
            instance = %shared.instance,
            fail_action = %fail_action,
            stages = %shared.functions.stages(),
            "Check instance initialized"
        );
        Ok(())
    }

    fn stages(&self) -> StageSet {
        self.shared.functions.stages()
    }

    fn new_message(&self, meta: Arc<MsgMetadata>) -> Result<Box<dyn CheckState>> {
        Ok(Box::new(StatelessCheckState {
            check: self.shared.clone(),
            msg_meta: meta,
        }))
    }
}

/// Per-message state of a [`StatelessCheck`]
struct StatelessCheckState {
    check: Arc<Shared>,
    msg_meta: Arc<MsgMetadata>,
}

impl StatelessCheckState {
    fn context(&self, cancel: &CancellationToken) -> CheckContext {
        CheckContext::new(
            self.check.resolver.clone(),
            self.msg_meta.clone(),
            cancel.clone(),
            self.check.logger.for_message(&self.msg_meta),
            self.check.tunables.clone(),
        )
    }

    fn apply(&self, stage: Stage, raw: Verdict) -> Verdict {
        let action = self.check.fail_action;
        if let Some(diagnostic) = &raw.diagnostic {
            if action != FailAction::Reject {
                self.check.logger.for_message(&self.msg_meta).debug(format_args!(
                    "{} check failed ({}), applying fail action '{}'",
                    stage, diagnostic, action
                ));
            }
        }
        action.apply(raw)
    }
}

#[async_trait]
impl CheckState for StatelessCheckState {
    async fn check_connection(&mut self, cancel: &CancellationToken) -> Verdict {
        let Some(f) = self.check.functions.connection.clone() else {
            return Verdict::neutral();
        };
        let raw = f(self.context(cancel)).await;
        self.apply(Stage::Connection, raw)
    }

    async fn check_sender(&mut self, cancel: &CancellationToken, mail_from: &str) -> Verdict {
        let Some(f) = self.check.functions.sender.clone() else {
            return Verdict::neutral();
        };
        let raw = f(self.context(cancel), mail_from.to_string()).await;
        self.apply(Stage::Sender, raw)
    }

    async fn check_rcpt(&mut self, cancel: &CancellationToken, rcpt_to: &str) -> Verdict {
        let Some(f) = self.check.functions.rcpt.clone() else {
            return Verdict::neutral();
        };
        let raw = f(self.context(cancel), rcpt_to.to_string()).await;
        self.apply(Stage::Rcpt, raw)
    }

    async fn check_body(
        &mut self,
        cancel: &CancellationToken,
        header: &Header,
        body: &Body,
    ) -> Verdict {
        let Some(f) = self.check.functions.body.clone() else {
            return Verdict::neutral();
        };
        let raw = f(self.context(cancel), header.clone(), body.clone()).await;
        self.apply(Stage::Body, raw)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
