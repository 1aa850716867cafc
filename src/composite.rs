//! Composite reader/writer pipelines.
//!
//! A composite holds an ordered list of children of the same capability and
//! implements that capability itself, so composites nest. Composition rules:
//!
//! - key readers: union of children's keys, first-seen order, distinct;
//! - config readers: every child runs, in order, against the shared builder —
//!   merge is field-level, a later child overwrites only fields it sets;
//! - writers: the FIRST child that claims the model wins, later children are
//!   never called.
//!
//! A composite swallows only a child's "not applicable"/"not handled" signal.
//! Genuine errors propagate unmodified.

use std::sync::Arc;

use async_trait::async_trait;
use log::trace;

use crate::error::TranslateError;
use crate::handler::{
    ConfigReader, ConfigWriter, KeyReader, ReadContext, ReadOutcome, WriteContext, WriteOutcome,
};
use crate::model::{ModelBuilder, ModelObject};
use crate::path::NodeKey;

/// Unions keys from an ordered list of child key readers.
#[derive(Default)]
pub struct CompositeKeyReader {
    children: Vec<Arc<dyn KeyReader>>,
}

impl CompositeKeyReader {
    pub fn new(children: Vec<Arc<dyn KeyReader>>) -> Self {
        CompositeKeyReader { children }
    }

    pub fn push(&mut self, child: Arc<dyn KeyReader>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl KeyReader for CompositeKeyReader {
    async fn read_keys(&self, ctx: &ReadContext) -> Result<Vec<NodeKey>, TranslateError> {
        let mut keys: Vec<NodeKey> = Vec::new();
        for child in &self.children {
            for key in child.read_keys(ctx).await? {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        trace!("composite key reader produced {} keys", keys.len());
        Ok(keys)
    }
}

/// Runs an ordered list of config readers against one shared builder.
#[derive(Default)]
pub struct CompositeConfigReader {
    children: Vec<Arc<dyn ConfigReader>>,
}

impl CompositeConfigReader {
    pub fn new(children: Vec<Arc<dyn ConfigReader>>) -> Self {
        CompositeConfigReader { children }
    }

    pub fn push(&mut self, child: Arc<dyn ConfigReader>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl ConfigReader for CompositeConfigReader {
    async fn read_into(
        &self,
        key: Option<&NodeKey>,
        builder: &mut ModelBuilder,
        ctx: &ReadContext,
    ) -> Result<ReadOutcome, TranslateError> {
        let mut populated = false;
        for child in &self.children {
            match child.read_into(key, builder, ctx).await? {
                ReadOutcome::Populated => populated = true,
                ReadOutcome::NotApplicable => {}
            }
        }
        Ok(if populated {
            ReadOutcome::Populated
        } else {
            ReadOutcome::NotApplicable
        })
    }
}

/// Dispatches a write to the first child that claims it.
#[derive(Default)]
pub struct CompositeConfigWriter {
    children: Vec<Arc<dyn ConfigWriter>>,
}

impl CompositeConfigWriter {
    pub fn new(children: Vec<Arc<dyn ConfigWriter>>) -> Self {
        CompositeConfigWriter { children }
    }

    pub fn push(&mut self, child: Arc<dyn ConfigWriter>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Folds a child list into a single writer, avoiding a composite wrapper
    /// for the common single-child case.
    pub fn fold(mut children: Vec<Arc<dyn ConfigWriter>>) -> Option<Arc<dyn ConfigWriter>> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Arc::new(CompositeConfigWriter::new(children))),
        }
    }
}

#[async_trait]
impl ConfigWriter for CompositeConfigWriter {
    async fn create(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        for child in &self.children {
            if child.create(model, ctx).await? == WriteOutcome::Handled {
                return Ok(WriteOutcome::Handled);
            }
        }
        Ok(WriteOutcome::NotHandled)
    }

    async fn delete(
        &self,
        model: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        for child in &self.children {
            if child.delete(model, ctx).await? == WriteOutcome::Handled {
                return Ok(WriteOutcome::Handled);
            }
        }
        Ok(WriteOutcome::NotHandled)
    }

    async fn update(
        &self,
        before: &ModelObject,
        after: &ModelObject,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome, TranslateError> {
        for child in &self.children {
            if child.update(before, after, ctx).await? == WriteOutcome::Handled {
                return Ok(WriteOutcome::Handled);
            }
        }
        Ok(WriteOutcome::NotHandled)
    }
}
