use std::fmt;

use indexmap::IndexSet;

use crate::Instruction;

/// Identity of a basic block: the index of its first instruction.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockId(pub usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A maximal run of instructions with a single entry and a single exit.
///
/// Edges are stored as [`BlockId`]s of sibling blocks in the same
/// [`OrderedCode`](crate::OrderedCode); the graph owns every block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    id: BlockId,
    code: Vec<Instruction>,
    pub(crate) incoming: IndexSet<BlockId>,
    pub(crate) outgoing: IndexSet<BlockId>,
}

impl Block {
    /// `code` must be non-empty; the splitter never produces empty blocks.
    pub(crate) fn new(code: Vec<Instruction>) -> Self {
        debug_assert!(!code.is_empty(), "blocks hold at least one instruction");
        Self {
            id: BlockId(code[0].index),
            code,
            incoming: IndexSet::new(),
            outgoing: IndexSet::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn first(&self) -> &Instruction {
        &self.code[0]
    }

    pub fn last(&self) -> &Instruction {
        &self.code[self.code.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Index one past the last instruction of the block.
    pub fn end(&self) -> usize {
        self.last().index + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.id.0..self.end()).contains(&index)
    }

    pub fn incoming(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.incoming.iter().copied()
    }

    pub fn outgoing(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.outgoing.iter().copied()
    }

    pub fn has_incoming(&self, id: BlockId) -> bool {
        self.incoming.contains(&id)
    }

    pub fn has_outgoing(&self, id: BlockId) -> bool {
        self.outgoing.contains(&id)
    }
}

impl<'a> IntoIterator for &'a Block {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.code.iter()
    }
}

fn write_ids(f: &mut fmt::Formatter<'_>, ids: &IndexSet<BlockId>) -> fmt::Result {
    f.write_str("[")?;
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{id}")?;
    }
    f.write_str("]")
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}: preds ", self.id)?;
        write_ids(f, &self.incoming)?;
        f.write_str(" succs ")?;
        write_ids(f, &self.outgoing)?;
        for inst in &self.code {
            write!(f, "\n  {inst}")?;
        }
        Ok(())
    }
}
