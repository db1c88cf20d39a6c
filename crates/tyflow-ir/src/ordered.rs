use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{Block, BlockId, CodeFlags, CodeInfo, CodeObject, Constant, Instruction};

/// Constant-pool entry of an ordered code body; nested code objects have
/// already been turned into graphs.
pub type CodeConstant = Constant<Rc<OrderedCode>>;

/// The control-flow graph of one code body.
///
/// Blocks live in an arena in lexical order and refer to each other by
/// [`BlockId`]. `order` lists every block reachable from the entry so that
/// each block comes after all of its predecessors except those reaching it
/// through a loop back edge. Unreachable blocks stay in the arena, without
/// edges, and are listed in `dead_blocks`.
#[derive(Debug)]
pub struct OrderedCode {
    info: CodeInfo,
    consts: Vec<CodeConstant>,
    blocks: Vec<Block>,
    positions: FxHashMap<BlockId, usize>,
    owners: Vec<usize>,
    order: Vec<BlockId>,
    dead: Vec<BlockId>,
}

impl OrderedCode {
    pub(crate) fn new(
        info: CodeInfo,
        consts: Vec<CodeConstant>,
        blocks: Vec<Block>,
        order: Vec<BlockId>,
        dead: Vec<BlockId>,
    ) -> Self {
        let positions = blocks
            .iter()
            .enumerate()
            .map(|(pos, block)| (block.id(), pos))
            .collect();
        let mut owners = Vec::new();
        for (pos, block) in blocks.iter().enumerate() {
            owners.extend(std::iter::repeat_n(pos, block.len()));
        }
        Self {
            info,
            consts,
            blocks,
            positions,
            owners,
            order,
            dead,
        }
    }

    pub fn info(&self) -> &CodeInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn flags(&self) -> CodeFlags {
        self.info.flags
    }

    pub fn is_generator(&self) -> bool {
        self.info.flags.is_generator()
    }

    pub fn consts(&self) -> &[CodeConstant] {
        &self.consts
    }

    pub fn const_at(&self, arg: u32) -> Option<&CodeConstant> {
        self.consts.get(arg as usize)
    }

    pub fn name_at(&self, arg: u32) -> Option<&str> {
        self.info.names.get(arg as usize).map(String::as_str)
    }

    pub fn varname_at(&self, arg: u32) -> Option<&str> {
        self.info.varnames.get(arg as usize).map(String::as_str)
    }

    pub fn param_names(&self) -> &[String] {
        self.info.param_names()
    }

    pub fn cell_name(&self, arg: u32) -> Option<&str> {
        self.info.cell_name(arg)
    }

    pub fn freevars(&self) -> &[String] {
        &self.info.freevars
    }

    /// Every block, in lexical order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn entry(&self) -> BlockId {
        self.blocks[0].id()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.positions.get(&id).map(|&pos| &self.blocks[pos])
    }

    /// Looks up a block by an id obtained from this graph.
    ///
    /// # Panics
    ///
    /// Panics if no block starts at `id`.
    pub fn expect_block(&self, id: BlockId) -> &Block {
        self.block(id)
            .unwrap_or_else(|| panic!("no block starts at instruction {id} in {}", self.info.name))
    }

    pub fn block_starting_at(&self, index: usize) -> Option<&Block> {
        self.block(BlockId(index))
    }

    /// The block containing instruction `index`.
    pub fn block_of(&self, index: usize) -> Option<BlockId> {
        self.owners.get(index).map(|&pos| self.blocks[pos].id())
    }

    /// The block lexically following `id`, if any.
    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        let pos = *self.positions.get(&id)?;
        self.blocks.get(pos + 1).map(Block::id)
    }

    /// Reachable blocks, ancestors first.
    pub fn order(&self) -> &[BlockId] {
        &self.order
    }

    pub fn ordered_blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.order.iter().map(|&id| self.expect_block(id))
    }

    pub fn dead_blocks(&self) -> &[BlockId] {
        &self.dead
    }

    pub fn instruction_count(&self) -> usize {
        self.owners.len()
    }

    /// The instruction list in lexical order, including unreachable code.
    pub fn flatten(&self) -> Vec<Instruction> {
        self.blocks
            .iter()
            .flat_map(|block| block.code().iter().cloned())
            .collect()
    }

    /// Rebuilds a decoder-level code object, recursively flattening nested
    /// code constants.
    pub fn to_code(&self) -> CodeObject {
        let consts = self
            .consts
            .iter()
            .cloned()
            .map(|c| {
                let flattened: Result<_, Infallible> =
                    c.try_map_code(&mut |nested: Rc<OrderedCode>| Ok(Box::new(nested.to_code())));
                match flattened {
                    Ok(c) => c,
                    Err(never) => match never {},
                }
            })
            .collect();
        CodeObject::from_parts(self.info.clone(), consts, self.flatten())
    }
}

impl fmt::Display for OrderedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}", self.info.name)?;
        for block in self.ordered_blocks() {
            write!(f, "\n{block}")?;
        }
        for &id in &self.dead {
            write!(f, "\ndead {}", self.expect_block(id))?;
        }
        Ok(())
    }
}
