use smallvec::SmallVec;

use crate::{CfgError, HandlerKind, Instruction};

/// Indices of the currently open block openers, innermost last.
type BlockStack = SmallVec<[usize; 4]>;

/// Stamps `block_target` on every instruction that leaves a structured
/// block.
///
/// Walks the code depth first from the entry, carrying the stack of open
/// blocks. Each instruction is processed once, with the first stack that
/// reaches it.
pub(crate) fn annotate(code: &mut [Instruction]) -> Result<(), CfgError> {
    for inst in code.iter_mut() {
        inst.block_target = None;
    }

    let mut seen = vec![false; code.len()];
    let mut todo: Vec<(usize, BlockStack)> = vec![(0, BlockStack::new())];
    while let Some((index, mut stack)) = todo.pop() {
        if index >= code.len() || seen[index] {
            continue;
        }
        seen[index] = true;

        let op = code[index].op;
        if op.pops_block() {
            let opener = stack
                .pop()
                .ok_or(CfgError::BlockPopWithoutBlock { index })?;
            code[index].block_target = code[opener].target;
        } else if op.is_reraise() {
            let handler = stack
                .iter()
                .rev()
                .find(|&&opener| {
                    code[opener]
                        .op
                        .handler_kind()
                        .is_some_and(HandlerKind::catches_exceptions)
                })
                .and_then(|&opener| code[opener].target);
            code[index].block_target = handler;
        } else if op.is_loop_exit() {
            let found = stack
                .iter()
                .rposition(|&opener| code[opener].op.handler_kind() == Some(HandlerKind::Loop));
            if let Some(depth) = found {
                let exit = code[stack[depth]].target;
                code[index].block_target = exit;
                if let Some(exit) = exit {
                    stack.truncate(depth);
                    todo.push((exit, stack));
                }
            }
            continue;
        } else if op.pushes_block() {
            // the handler runs after the block has been popped
            if let Some(target) = code[index].target {
                todo.push((target, stack.clone()));
            }
            stack.push(index);
            todo.push((index + 1, stack));
            continue;
        }

        if op.has_target() {
            if let Some(target) = code[index].target {
                todo.push((target, stack.clone()));
            }
        }
        if op.carries_on() {
            todo.push((index + 1, stack));
        }
    }
    Ok(())
}
