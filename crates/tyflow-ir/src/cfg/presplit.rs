use rustc_hash::FxHashMap;

use crate::{Instruction, Opcode};

/// Bytecode-version specific adjustments applied around block splitting.
///
/// Some instruction sequences must end up in a block shape the generic
/// splitter would not produce on its own. A rule may rewrite jump targets
/// before annotation and may keep a block opener together with its
/// successor instead of cutting after it.
pub trait PreSplit {
    /// Rewrites the validated instruction list before annotation.
    fn prepare(&self, code: &mut [Instruction]) {
        let _ = code;
    }

    /// Whether the splitter should keep `next` in the same block as the
    /// block opener `current`.
    fn joins(&self, current: &Instruction, next: &Instruction) -> bool {
        let _ = (current, next);
        false
    }
}

/// Splits purely by the generic rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPreSplit;

impl PreSplit for NoPreSplit {}

/// Keeps the head of an asynchronous `for` loop in one micro-block.
///
/// The loop head is a handler setup immediately followed by `GET_ANEXT`.
/// Jumps into the middle of the head are redirected to the setup, and the
/// setup is not cut from the `GET_ANEXT` that follows it. The orderer links
/// such a block to the handler through its first instruction's target.
#[derive(Clone, Copy, Debug, Default)]
pub struct AsyncIterationPreSplit;

impl PreSplit for AsyncIterationPreSplit {
    fn prepare(&self, code: &mut [Instruction]) {
        let heads: FxHashMap<usize, usize> = code
            .windows(2)
            .filter(|pair| pair[0].op.pushes_block() && pair[1].op == Opcode::GetAnext)
            .map(|pair| (pair[1].index, pair[0].index))
            .collect();
        if heads.is_empty() {
            return;
        }
        for inst in code.iter_mut() {
            if let Some(setup) = inst.target.and_then(|target| heads.get(&target)) {
                tracing::trace!(index = inst.index, setup, "redirecting jump to async loop head");
                inst.target = Some(*setup);
            }
        }
    }

    fn joins(&self, current: &Instruction, next: &Instruction) -> bool {
        current.op.pushes_block() && next.op == Opcode::GetAnext
    }
}
