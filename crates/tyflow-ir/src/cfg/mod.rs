//! Control-flow graph construction.
//!
//! [`order_code`] turns a decoded [`CodeObject`] into an [`OrderedCode`] in
//! four passes: the pre-split rule rewrites version-specific sequences, the
//! annotator stamps structured-block exits, the splitter cuts basic blocks
//! and the orderer links them and computes the visiting order. Nested code
//! constants are ordered recursively.

mod annotate;
mod order;
mod presplit;
mod split;

use std::rc::Rc;

pub use presplit::{AsyncIterationPreSplit, NoPreSplit, PreSplit};

use crate::{CfgError, CodeObject, Instruction, OrderedCode};

/// Builds the control-flow graph with the default pre-split rule.
pub fn order_code(code: CodeObject) -> Result<OrderedCode, CfgError> {
    order_code_with(code, &AsyncIterationPreSplit)
}

pub fn order_code_with(code: CodeObject, rule: &dyn PreSplit) -> Result<OrderedCode, CfgError> {
    let (info, consts, mut instructions) = code.into_parts();
    let consts = consts
        .into_iter()
        .map(|constant| {
            constant.try_map_code(&mut |nested: Box<CodeObject>| {
                order_code_with(*nested, rule).map(Rc::new)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate(&instructions)?;
    rule.prepare(&mut instructions);
    annotate::annotate(&mut instructions)?;
    let blocks = split::split(instructions, rule);
    order::order(info, consts, blocks)
}

fn validate(code: &[Instruction]) -> Result<(), CfgError> {
    if code.is_empty() {
        return Err(CfgError::EmptyCode);
    }
    for (position, inst) in code.iter().enumerate() {
        if inst.index != position {
            return Err(CfgError::MisnumberedInstruction {
                position,
                index: inst.index,
            });
        }
        match inst.target {
            None if inst.op.has_target() => {
                return Err(CfgError::MissingJumpTarget {
                    index: inst.index,
                    op: inst.op,
                });
            }
            Some(target) if target >= code.len() => {
                return Err(CfgError::TargetOutOfRange {
                    index: inst.index,
                    target,
                });
            }
            _ => {}
        }
    }
    Ok(())
}
