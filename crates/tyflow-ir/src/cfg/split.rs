use rustc_hash::FxHashSet;

use super::PreSplit;
use crate::{Block, Instruction};

/// Cuts the annotated instruction list into basic blocks.
///
/// A block ends after an instruction that has no successor, jumps, or pops
/// a structured block, and before every jump or block target.
pub(crate) fn split(code: Vec<Instruction>, rule: &dyn PreSplit) -> Vec<Block> {
    let targets: FxHashSet<usize> = code
        .iter()
        .flat_map(|inst| inst.target.into_iter().chain(inst.block_target))
        .collect();

    let cuts: Vec<bool> = code
        .iter()
        .enumerate()
        .map(|(i, inst)| {
            let Some(next) = code.get(i + 1) else {
                return true;
            };
            inst.op.no_next()
                || inst.op.pops_block()
                || targets.contains(&next.index)
                || (inst.op.has_target() && !(inst.op.pushes_block() && rule.joins(inst, next)))
        })
        .collect();

    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for (inst, cut) in code.into_iter().zip(cuts) {
        current.push(inst);
        if cut {
            blocks.push(Block::new(std::mem::take(&mut current)));
        }
    }
    blocks
}
