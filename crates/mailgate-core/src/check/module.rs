//! Interfaces between the pipeline and check modules

use super::verdict::Verdict;
use async_trait::async_trait;
use mailgate_common::types::{Body, Header, MsgMetadata};
use mailgate_common::Result;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Message-processing point a check can inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Connection,
    Sender,
    Rcpt,
    Body,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Connection, Stage::Sender, Stage::Rcpt, Stage::Body];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connection => "connection",
            Stage::Sender => "sender",
            Stage::Rcpt => "rcpt",
            Stage::Body => "body",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Stage::Connection => 1,
            Stage::Sender => 1 << 1,
            Stage::Rcpt => 1 << 2,
            Stage::Body => 1 << 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of stages a check implements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSet(u8);

impl StageSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, stage: Stage) {
        self.0 |= stage.bit();
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        let mut set = StageSet::empty();
        for stage in iter {
            set.insert(stage);
        }
        set
    }
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|s| s.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// Identity shared by every configurable module
pub trait Module: Send + Sync {
    /// Registered module name
    fn name(&self) -> &str;

    /// Name of this configured instance
    fn instance_name(&self) -> &str;
}

/// A configured check, shared by all messages in flight.
///
/// `init` runs once, before the instance is shared; everything else takes
/// `&self` and must be safe to call concurrently.
pub trait Check: Module {
    /// Bind the instance's configuration block
    fn init(&mut self, directives: &toml::Table) -> Result<()>;

    /// Stages this check actually inspects
    fn stages(&self) -> StageSet;

    /// Start checking a new message
    fn new_message(&self, meta: Arc<MsgMetadata>) -> Result<Box<dyn CheckState>>;
}

/// Per-message handle the pipeline drives stage by stage.
///
/// The pipeline calls at most one method at a time and always calls
/// [`CheckState::close`], including on error paths.
#[async_trait]
pub trait CheckState: Send {
    async fn check_connection(&mut self, cancel: &CancellationToken) -> Verdict;

    async fn check_sender(&mut self, cancel: &CancellationToken, mail_from: &str) -> Verdict;

    async fn check_rcpt(&mut self, cancel: &CancellationToken, rcpt_to: &str) -> Verdict;

    async fn check_body(
        &mut self,
        cancel: &CancellationToken,
        header: &Header,
        body: &Body,
    ) -> Verdict;

    async fn close(&mut self) -> Result<()>;
}
