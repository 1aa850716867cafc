//! Handler traits for reading and writing configuration subtrees.
//!
//! A handler is described by the capabilities it supports — enumerate keys,
//! read a single object, write — not by an inheritance chain. Leaf handlers
//! talk to the device through the session in their context; composite
//! handlers (see [`crate::composite`]) delegate to ordered children of the
//! same capability.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::TransactionCache;
use crate::dialect::Dialect;
use crate::error::TranslateError;
use crate::model::{ModelBuilder, ModelObject};
use crate::path::NodeKey;
use crate::session::CliSession;
use std::sync::Arc;

/// What a registered handler can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Enumerates the keys of a list node.
    Enumerate,
    /// Populates one model object.
    ReadSingle,
    /// Creates, updates and deletes one model object.
    Write,
}

/// Result of one reader child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The child recognized the data and populated builder fields.
    Populated,
    /// The child does not apply here (wrong sub-mode, foreign config shape).
    /// Not an error; the pipeline simply moves on.
    NotApplicable,
}

/// Result of one writer child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The child claimed responsibility and performed the write.
    Handled,
    /// The child declines this model; the pipeline asks the next child.
    NotHandled,
}

/// Context shared by all reads of one read transaction.
///
/// Carries the device session and the transaction-scoped cache. Dropping the
/// context ends the transaction and destroys the cache.
#[derive(Clone)]
pub struct ReadContext {
    session: CliSession,
    cache: TransactionCache,
}

impl ReadContext {
    /// Starts a fresh read transaction on the session.
    pub fn new(session: CliSession) -> Self {
        ReadContext {
            session,
            cache: TransactionCache::new(),
        }
    }

    pub fn session(&self) -> &CliSession {
        &self.session
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        self.session.dialect()
    }

    /// The transaction-scoped read cache. Caching is an explicit opt-in for
    /// identified expensive scrapes; recomputing is the default.
    pub fn cache(&self) -> &TransactionCache {
        &self.cache
    }
}

/// Context for one write transaction.
#[derive(Clone)]
pub struct WriteContext {
    session: CliSession,
}

impl WriteContext {
    pub fn new(session: CliSession) -> Self {
        WriteContext { session }
    }

    pub fn session(&self) -> &CliSession {
        &self.session
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        self.session.dialect()
    }
}

/// Enumerates the keys of a list node.
#[async_trait]
pub trait KeyReader: Send + Sync {
    async fn read_keys(&self, ctx: &ReadContext) -> Result<Vec<NodeKey>, TranslateError>;
}

/// Populates one model object for a node (optionally one list entry of it).
#[async_trait]
pub trait ConfigReader: Send + Sync {
    async fn read_into(
        &self,
        key: Option<&NodeKey>,
        builder: &mut ModelBuilder,
        ctx: &ReadContext,
    ) -> Result<ReadOutcome, TranslateError>;
}

/// Writes one model object to the device.
///
/// `update` defaults to delete-then-recreate: most device CLIs have no
/// incremental form, and replacing the object is the conservative behavior.
/// Writers whose device verifiably supports in-place modification override it.
#[async_trait]
pub trait ConfigWriter: Send + Sync {
    async fn create(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError>;

    async fn delete(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError>;

    async fn update(
        &self,
        before: &ModelObject,
        after: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        match self.delete(before, ctx).await? {
            WriteOutcome::NotHandled => Ok(WriteOutcome::NotHandled),
            WriteOutcome::Handled => self.create(after, ctx).await,
        }
    }
}
