//! Invocation context handed to stage functions

use crate::dns::Resolver;
use mailgate_common::types::{MessageId, MsgMetadata};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

macro_rules! emit {
    ($level:ident, $logger:expr, $msg:expr) => {
        match $logger.msg_id {
            Some(msg_id) => tracing::$level!(
                check = %$logger.module,
                instance = %$logger.instance,
                msg_id = %msg_id,
                "{}",
                $msg
            ),
            None => tracing::$level!(
                check = %$logger.module,
                instance = %$logger.instance,
                "{}",
                $msg
            ),
        }
    };
}

/// Logger scoped to one check instance, optionally bound to a message.
///
/// Debug output is dropped unless the instance has `debug` enabled.
#[derive(Debug, Clone)]
pub struct CheckLogger {
    module: Arc<str>,
    instance: Arc<str>,
    debug: bool,
    msg_id: Option<MessageId>,
}

impl CheckLogger {
    pub fn new(module: &str, instance: &str) -> Self {
        Self {
            module: module.into(),
            instance: instance.into(),
            debug: true,
            msg_id: None,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Copy of this logger that tags every event with the message id
    pub fn for_message(&self, meta: &MsgMetadata) -> Self {
        Self {
            msg_id: Some(meta.id),
            ..self.clone()
        }
    }

    pub fn msg_id(&self) -> Option<MessageId> {
        self.msg_id
    }

    pub fn debug(&self, msg: impl Display) {
        if self.debug {
            emit!(debug, self, msg);
        }
    }

    pub fn info(&self, msg: impl Display) {
        emit!(info, self, msg);
    }

    pub fn warn(&self, msg: impl Display) {
        emit!(warn, self, msg);
    }

    pub fn error(&self, msg: impl Display) {
        emit!(error, self, msg);
    }
}

/// Everything a stage function may use while judging one message.
///
/// Built fresh for every stage invocation. The cancellation token belongs to
/// the caller: a stage function must stop waiting on lookups once it fires
/// and return promptly, usually with a neutral verdict. [`CheckContext::cancellable`]
/// does this for a single future.
pub struct CheckContext {
    /// Resolver for DNS queries
    pub resolver: Arc<dyn Resolver>,
    /// Metadata of the message being checked
    pub msg_meta: Arc<MsgMetadata>,
    /// Fires when the result is no longer needed
    pub cancel: CancellationToken,
    /// Already tagged with the message id, do not add it again
    pub logger: CheckLogger,
    tunables: Arc<BTreeMap<String, i64>>,
}

impl CheckContext {
    pub(crate) fn new(
        resolver: Arc<dyn Resolver>,
        msg_meta: Arc<MsgMetadata>,
        cancel: CancellationToken,
        logger: CheckLogger,
        tunables: Arc<BTreeMap<String, i64>>,
    ) -> Self {
        Self {
            resolver,
            msg_meta,
            cancel,
            logger,
            tunables,
        }
    }

    /// Check-specific tunable resolved at init time
    pub fn tunable(&self, name: &str) -> Option<i64> {
        self.tunables.get(name).copied()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` until it completes or the invocation is cancelled.
    ///
    /// Returns `None` on cancellation.
    pub async fn cancellable<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}
