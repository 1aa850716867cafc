//! Translation unit registration and the translation engine.
//!
//! A [`TranslationUnit`] is the only surface a vendor unit implements: it
//! registers its readers and writers against the registries handed to it.
//! Several units may contribute handlers for the same node; the registries
//! fold them into composite pipelines in registration order.
//!
//! The [`Translator`] composes all units once, resolves the write order once
//! (a dependency cycle fails construction, never a transaction), and then
//! serves read and commit transactions against device sessions.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::composite::{CompositeConfigReader, CompositeKeyReader};
use crate::error::TranslateError;
use crate::handler::{
    Capability, ConfigReader, KeyReader, ReadContext, ReadOutcome, WriteContext, WriteOutcome,
};
use crate::model::{ModelBuilder, ModelObject};
use crate::path::{NodeKey, NodePath};
use crate::schedule::{WriteOrder, WriteOrderBuilder};
use crate::session::CliSession;

/// Registry collecting reader registrations from translation units.
///
/// Registering twice for one node appends to that node's composite pipeline.
#[derive(Default)]
pub struct ReaderRegistry {
    key_readers: HashMap<NodePath, CompositeKeyReader>,
    config_readers: HashMap<NodePath, CompositeConfigReader>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry::default()
    }

    /// Registers a key enumerator for a list node.
    pub fn add_key_reader(&mut self, node: NodePath, reader: Arc<dyn KeyReader>) {
        self.key_readers.entry(node).or_default().push(reader);
    }

    /// Registers a config reader for a node.
    pub fn add_config_reader(&mut self, node: NodePath, reader: Arc<dyn ConfigReader>) {
        self.config_readers.entry(node).or_default().push(reader);
    }
}

/// One translation unit: a coherent set of handlers for a vendor feature.
pub trait TranslationUnit: Send + Sync {
    fn unit_name(&self) -> &str;

    fn provide_readers(&self, registry: &mut ReaderRegistry) -> Result<(), TranslateError>;

    fn provide_writers(&self, registry: &mut WriteOrderBuilder) -> Result<(), TranslateError>;
}

/// A requested configuration change for one node.
#[derive(Debug, Clone)]
pub enum ConfigChange {
    Create {
        path: NodePath,
        data: ModelObject,
    },
    Update {
        path: NodePath,
        before: ModelObject,
        after: ModelObject,
    },
    Delete {
        path: NodePath,
        before: ModelObject,
    },
}

impl ConfigChange {
    pub fn path(&self) -> &NodePath {
        match self {
            ConfigChange::Create { path, .. }
            | ConfigChange::Update { path, .. }
            | ConfigChange::Delete { path, .. } => path,
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, ConfigChange::Delete { .. })
    }

    fn action(&self) -> ChangeAction {
        match self {
            ConfigChange::Create { .. } => ChangeAction::Create,
            ConfigChange::Update { .. } => ChangeAction::Update,
            ConfigChange::Delete { .. } => ChangeAction::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// One applied change in a commit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AppliedChange {
    pub node: String,
    pub action: ChangeAction,
    /// True when the node is a structural noop slot and nothing was sent.
    pub noop: bool,
}

/// Result of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommitReport {
    pub applied: Vec<AppliedChange>,
}

/// The composed translation engine for one dialect's units.
pub struct Translator {
    key_readers: HashMap<NodePath, Arc<CompositeKeyReader>>,
    config_readers: HashMap<NodePath, Arc<CompositeConfigReader>>,
    write_order: WriteOrder,
    unit_names: Vec<String>,
}

impl Translator {
    /// Registers all units and resolves the write order.
    ///
    /// Ordering cycles and conflicting registrations fail here, at startup.
    pub fn new(units: &[Arc<dyn TranslationUnit>]) -> Result<Self, TranslateError> {
        let mut readers = ReaderRegistry::new();
        let mut writers = WriteOrderBuilder::new();
        let mut unit_names = Vec::with_capacity(units.len());
        for unit in units {
            debug!("registering translation unit '{}'", unit.unit_name());
            unit.provide_readers(&mut readers)?;
            unit.provide_writers(&mut writers)?;
            unit_names.push(unit.unit_name().to_string());
        }
        let write_order = writers.build()?;
        Ok(Translator {
            key_readers: readers
                .key_readers
                .into_iter()
                .map(|(node, composite)| (node, Arc::new(composite)))
                .collect(),
            config_readers: readers
                .config_readers
                .into_iter()
                .map(|(node, composite)| (node, Arc::new(composite)))
                .collect(),
            write_order,
            unit_names,
        })
    }

    pub fn unit_names(&self) -> &[String] {
        &self.unit_names
    }

    pub fn write_order(&self) -> &WriteOrder {
        &self.write_order
    }

    /// The capability set registered for a (keyless) node path.
    pub fn capabilities(&self, node: &NodePath) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.key_readers.contains_key(node) {
            caps.push(Capability::Enumerate);
        }
        if self.config_readers.contains_key(node) {
            caps.push(Capability::ReadSingle);
        }
        if self
            .write_order
            .slot_for(node)
            .is_some_and(|(_, slot)| !slot.is_noop())
        {
            caps.push(Capability::Write);
        }
        caps
    }

    /// Starts a read transaction; all reads through it share one cache.
    pub fn begin_read(&self, session: &CliSession) -> ReadTransaction<'_> {
        ReadTransaction {
            translator: self,
            ctx: ReadContext::new(session.clone()),
        }
    }

    /// Enumerates keys of a list node in its own read transaction.
    pub async fn read_keys(
        &self,
        node: &NodePath,
        session: &CliSession,
    ) -> Result<Vec<NodeKey>, TranslateError> {
        self.begin_read(session).read_keys(node).await
    }

    /// Reads one node in its own read transaction.
    pub async fn read_node(
        &self,
        node: &NodePath,
        session: &CliSession,
    ) -> Result<Option<ModelObject>, TranslateError> {
        self.begin_read(session).read_node(node).await
    }

    /// Applies a set of changes in the resolved write order.
    ///
    /// Deletes run first, in reverse resolved order; creates and updates
    /// follow in forward resolved order. The first failure aborts the commit
    /// and the device state must be re-read before further action — no
    /// partial application is assumed.
    pub async fn commit(
        &self,
        changes: Vec<ConfigChange>,
        session: &CliSession,
    ) -> Result<CommitReport, TranslateError> {
        let ctx = WriteContext::new(session.clone());

        // Route every change to its slot up-front so an unknown node fails
        // before anything is sent to the device.
        let mut planned = Vec::with_capacity(changes.len());
        for change in changes {
            let schema = change.path().schema();
            let position = self.write_order.position(&schema).ok_or_else(|| {
                TranslateError::write_failed(
                    change.path().to_string(),
                    TranslateError::UnknownNode(schema.to_string()),
                )
            })?;
            planned.push((position, change));
        }

        let (mut deletes, mut writes): (Vec<_>, Vec<_>) =
            planned.into_iter().partition(|(_, change)| change.is_delete());
        deletes.sort_by(|a, b| b.0.cmp(&a.0));
        writes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = CommitReport::default();
        for (position, change) in deletes.into_iter().chain(writes) {
            let slot = self
                .write_order
                .slot_at(position)
                .ok_or_else(|| TranslateError::InternalError("slot index out of range".into()))?;
            let node = change.path().to_string();

            let Some(writer) = slot.writer() else {
                debug!("noop slot {}: nothing to send for {node}", slot.node());
                report.applied.push(AppliedChange {
                    node,
                    action: change.action(),
                    noop: true,
                });
                continue;
            };

            let action = change.action();
            let outcome = match &change {
                ConfigChange::Create { data, .. } => writer.create(data, &ctx).await,
                ConfigChange::Update { before, after, .. } => {
                    writer.update(before, after, &ctx).await
                }
                ConfigChange::Delete { before, .. } => writer.delete(before, &ctx).await,
            }
            .map_err(|err| TranslateError::write_failed(node.clone(), err))?;

            match outcome {
                WriteOutcome::Handled => report.applied.push(AppliedChange {
                    node,
                    action,
                    noop: false,
                }),
                WriteOutcome::NotHandled => {
                    return Err(TranslateError::write_failed(
                        node.clone(),
                        TranslateError::WriteNotHandled(node),
                    ));
                }
            }
        }
        Ok(report)
    }
}

/// A read transaction: reads through it share one transaction cache.
pub struct ReadTransaction<'a> {
    translator: &'a Translator,
    ctx: ReadContext,
}

impl ReadTransaction<'_> {
    pub fn context(&self) -> &ReadContext {
        &self.ctx
    }

    /// Enumerates the keys of a list node.
    pub async fn read_keys(&self, node: &NodePath) -> Result<Vec<NodeKey>, TranslateError> {
        let schema = node.schema();
        let reader = self
            .translator
            .key_readers
            .get(&schema)
            .ok_or_else(|| TranslateError::UnknownNode(schema.to_string()))?;
        reader
            .read_keys(&self.ctx)
            .await
            .map_err(|err| TranslateError::read_failed(node.to_string(), err))
    }

    /// Reads the model object at `node`; the node's deepest list key selects
    /// the entry. Returns `None` when no registered reader recognized data.
    pub async fn read_node(&self, node: &NodePath) -> Result<Option<ModelObject>, TranslateError> {
        let schema = node.schema();
        let reader = self
            .translator
            .config_readers
            .get(&schema)
            .ok_or_else(|| TranslateError::UnknownNode(schema.to_string()))?;
        let mut builder = ModelBuilder::new();
        let outcome = reader
            .read_into(node.last_key(), &mut builder, &self.ctx)
            .await
            .map_err(|err| TranslateError::read_failed(node.to_string(), err))?;
        Ok(match outcome {
            ReadOutcome::Populated => Some(builder.build()),
            ReadOutcome::NotApplicable => None,
        })
    }
}
