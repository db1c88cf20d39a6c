use indexmap::IndexMap;

use crate::{Condition, Variable};

/// The abstract state on entry to a block: local bindings, the path
/// condition that reaches the block, and the operand stack carried in from
/// the predecessors.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockState<V> {
    locals: IndexMap<String, Variable<V>>,
    condition: Condition,
    stack: Vec<Variable<V>>,
}

impl<V> Default for BlockState<V> {
    fn default() -> Self {
        Self {
            locals: IndexMap::new(),
            condition: Condition::True,
            stack: Vec::new(),
        }
    }
}

impl<V: Clone + PartialEq> BlockState<V> {
    pub fn new(
        locals: IndexMap<String, Variable<V>>,
        condition: Condition,
        stack: Vec<Variable<V>>,
    ) -> Self {
        Self {
            locals,
            condition,
            stack,
        }
    }

    pub fn locals(&self) -> &IndexMap<String, Variable<V>> {
        &self.locals
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn stack(&self) -> &[Variable<V>] {
        &self.stack
    }

    pub fn get(&self, name: &str) -> Option<&Variable<V>> {
        self.locals.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Variable<V>) {
        let name = name.into();
        let value = value.named(name.clone());
        self.locals.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable<V>> {
        self.locals.shift_remove(name)
    }

    pub(crate) fn take_stack(&mut self) -> Vec<Variable<V>> {
        std::mem::take(&mut self.stack)
    }

    /// The same state on a path further restricted by `condition`.
    pub fn restrict(&self, condition: &Condition, stack: Vec<Variable<V>>) -> Self {
        Self {
            locals: self.locals.clone(),
            condition: Condition::and2(self.condition.clone(), condition.clone()),
            stack,
        }
    }

    /// A state with no locals and a `TRUE` condition, i.e. a plain
    /// unconditional continuation.
    pub fn is_trivial(&self) -> bool {
        self.locals.is_empty() && self.condition.is_true()
    }

    /// Combines this incoming state with the state already recorded for the
    /// target block.
    ///
    /// With no recorded state the incoming one is used as is. An incoming
    /// state equal to the recorded one leaves it unchanged. Otherwise every
    /// name's bindings from both sides are re-conditioned by their side's
    /// path condition and unioned; a name missing on one side is simply
    /// absent on that path. The merged condition is the disjunction of both
    /// conditions. Operand stacks are merged slot by slot over their common
    /// depth.
    pub fn merge_into(self, existing: Option<BlockState<V>>) -> BlockState<V> {
        let Some(existing) = existing else {
            return self;
        };
        if self == existing {
            return existing;
        }

        let mut locals: IndexMap<String, Variable<V>> = IndexMap::new();
        for (name, var) in &existing.locals {
            locals.insert(name.clone(), var.with_condition(&existing.condition));
        }
        for (name, var) in &self.locals {
            let incoming = var.with_condition(&self.condition);
            let merged = match locals.get(name) {
                Some(current) => current.union(&incoming),
                None => incoming,
            };
            locals.insert(name.clone(), merged);
        }

        let stack = existing
            .stack
            .iter()
            .zip(&self.stack)
            .map(|(old, new)| {
                old.with_condition(&existing.condition)
                    .union(&new.with_condition(&self.condition))
            })
            .collect();

        let condition = Condition::or2(existing.condition, self.condition);
        tracing::trace!(%condition, names = locals.len(), "merged block states");
        BlockState {
            locals,
            condition,
            stack,
        }
    }
}
