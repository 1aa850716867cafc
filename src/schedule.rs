//! Write-order scheduling for configuration writers.
//!
//! Device configuration has real ordering constraints: a VRF must exist
//! before BGP address-families reference it, an interface before its VLAN
//! membership. Writers declare these constraints as data — "this node's
//! writer runs after those nodes" — and the scheduler resolves one legal
//! total order per translation unit at registration time.
//!
//! The resolved order is immutable and shared by every transaction; cycles
//! are rejected when the order is built, never at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::composite::CompositeConfigWriter;
use crate::error::TranslateError;
use crate::handler::ConfigWriter;
use crate::path::NodePath;

struct SlotSpec {
    node: NodePath,
    writers: Vec<Arc<dyn ConfigWriter>>,
    noop: bool,
    covered: Vec<NodePath>,
    after: Vec<NodePath>,
}

/// Collects writer registrations and ordering edges, then resolves them into
/// a [`WriteOrder`].
///
/// Registering several writers at one node composes them in registration
/// order (first-handled-wins at runtime).
#[derive(Default)]
pub struct WriteOrderBuilder {
    slots: Vec<SlotSpec>,
    index: HashMap<NodePath, usize>,
    covered_index: HashMap<NodePath, usize>,
}

impl WriteOrderBuilder {
    pub fn new() -> Self {
        WriteOrderBuilder::default()
    }

    /// Registers a writer with no ordering constraints of its own.
    pub fn add_writer(
        &mut self,
        node: NodePath,
        writer: Arc<dyn ConfigWriter>,
    ) -> Result<(), TranslateError> {
        self.add_writer_after(node, writer, [])
    }

    /// Registers a writer that must run after the given prerequisite nodes.
    pub fn add_writer_after(
        &mut self,
        node: NodePath,
        writer: Arc<dyn ConfigWriter>,
        after: impl IntoIterator<Item = NodePath>,
    ) -> Result<(), TranslateError> {
        if self.covered_index.contains_key(&node) {
            return Err(TranslateError::ConflictingRegistration(node.to_string()));
        }
        match self.index.get(&node) {
            Some(&slot) => {
                let spec = &mut self.slots[slot];
                if spec.noop {
                    return Err(TranslateError::ConflictingRegistration(node.to_string()));
                }
                spec.writers.push(writer);
                spec.after.extend(after);
            }
            None => {
                let slot = self.slots.len();
                self.index.insert(node.clone(), slot);
                self.slots.push(SlotSpec {
                    node,
                    writers: vec![writer],
                    noop: false,
                    covered: Vec::new(),
                    after: after.into_iter().collect(),
                });
            }
        }
        Ok(())
    }

    /// Registers a structural node requiring no device action. Noop nodes are
    /// still valid ordering anchors for other writers' `after` edges.
    pub fn add_noop(&mut self, node: NodePath) -> Result<(), TranslateError> {
        if self.index.contains_key(&node) || self.covered_index.contains_key(&node) {
            return Err(TranslateError::ConflictingRegistration(node.to_string()));
        }
        let slot = self.slots.len();
        self.index.insert(node.clone(), slot);
        self.slots.push(SlotSpec {
            node,
            writers: Vec::new(),
            noop: true,
            covered: Vec::new(),
            after: Vec::new(),
        });
        Ok(())
    }

    /// Registers one writer responsible for a node and several nested
    /// sub-nodes atomically. Writes addressed at any covered node route to
    /// this writer, and the whole group occupies one slot in the order.
    pub fn add_subtree_writer(
        &mut self,
        node: NodePath,
        writer: Arc<dyn ConfigWriter>,
        covered: impl IntoIterator<Item = NodePath>,
        after: impl IntoIterator<Item = NodePath>,
    ) -> Result<(), TranslateError> {
        if self.index.contains_key(&node) || self.covered_index.contains_key(&node) {
            return Err(TranslateError::ConflictingRegistration(node.to_string()));
        }
        let slot = self.slots.len();
        let covered: Vec<NodePath> = covered.into_iter().collect();
        for sub in &covered {
            if self.index.contains_key(sub) || self.covered_index.contains_key(sub) {
                return Err(TranslateError::ConflictingRegistration(sub.to_string()));
            }
            self.covered_index.insert(sub.clone(), slot);
        }
        self.index.insert(node.clone(), slot);
        self.slots.push(SlotSpec {
            node,
            writers: vec![writer],
            noop: false,
            covered,
            after: after.into_iter().collect(),
        });
        Ok(())
    }

    fn slot_of(&self, node: &NodePath) -> Option<usize> {
        self.index
            .get(node)
            .or_else(|| self.covered_index.get(node))
            .copied()
    }

    /// Resolves a total order consistent with every declared edge.
    ///
    /// Among nodes whose prerequisites are satisfied, registration order is
    /// kept, so resolution is deterministic. Any cycle is rejected here,
    /// before any order is produced.
    pub fn build(self) -> Result<WriteOrder, TranslateError> {
        let count = self.slots.len();

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut indegree: Vec<usize> = vec![0; count];
        for (slot, spec) in self.slots.iter().enumerate() {
            for prerequisite in &spec.after {
                let dep = self.slot_of(prerequisite).ok_or_else(|| {
                    TranslateError::UnknownNode(format!(
                        "{prerequisite} (prerequisite of {})",
                        spec.node
                    ))
                })?;
                if dep == slot {
                    return Err(TranslateError::OrderingCycle(spec.node.to_string()));
                }
                successors[dep].push(slot);
                indegree[slot] += 1;
            }
        }

        let mut resolved: Vec<usize> = Vec::with_capacity(count);
        let mut placed = vec![false; count];
        loop {
            // Lowest registration index among ready slots keeps the order stable.
            let next = (0..count).find(|&slot| !placed[slot] && indegree[slot] == 0);
            let Some(slot) = next else { break };
            placed[slot] = true;
            resolved.push(slot);
            for &succ in &successors[slot] {
                indegree[succ] -= 1;
            }
        }

        if resolved.len() != count {
            let stuck = (0..count)
                .find(|&slot| !placed[slot])
                .map(|slot| self.slots[slot].node.to_string())
                .unwrap_or_default();
            return Err(TranslateError::OrderingCycle(stuck));
        }

        let mut slots = Vec::with_capacity(count);
        let mut route = HashMap::new();
        for (position, &spec_idx) in resolved.iter().enumerate() {
            let spec = &self.slots[spec_idx];
            route.insert(spec.node.clone(), position);
            for sub in &spec.covered {
                route.insert(sub.clone(), position);
            }
            slots.push(Slot {
                node: spec.node.clone(),
                writer: CompositeConfigWriter::fold(spec.writers.clone()),
                covered: spec.covered.clone(),
            });
        }
        debug!(
            "write order resolved: {}",
            slots
                .iter()
                .map(|s| s.node.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(WriteOrder { slots, route })
    }
}

/// One position of the resolved order.
pub struct Slot {
    node: NodePath,
    writer: Option<Arc<dyn ConfigWriter>>,
    covered: Vec<NodePath>,
}

impl Slot {
    pub fn node(&self) -> &NodePath {
        &self.node
    }

    pub fn writer(&self) -> Option<&Arc<dyn ConfigWriter>> {
        self.writer.as_ref()
    }

    pub fn is_noop(&self) -> bool {
        self.writer.is_none()
    }

    pub fn covered(&self) -> &[NodePath] {
        &self.covered
    }
}

/// The resolved, immutable total order over all registered writers.
pub struct WriteOrder {
    slots: Vec<Slot>,
    route: HashMap<NodePath, usize>,
}

impl WriteOrder {
    /// Slots in execution order.
    pub fn sequence(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Position and slot responsible for `node`, resolving covered sub-nodes
    /// to their group's slot.
    pub fn slot_for(&self, node: &NodePath) -> Option<(usize, &Slot)> {
        let position = *self.route.get(node)?;
        Some((position, &self.slots[position]))
    }

    pub fn position(&self, node: &NodePath) -> Option<usize> {
        self.route.get(node).copied()
    }

    pub fn slot_at(&self, position: usize) -> Option<&Slot> {
        self.slots.get(position)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Node paths in execution order (diagnostics, logs).
    pub fn report(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.node.to_string()).collect()
    }
}
