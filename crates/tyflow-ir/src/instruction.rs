use std::fmt;

use crate::Opcode;

/// One decoded instruction of a code body.
///
/// `index` is the position of the instruction in its code list; the lexical
/// neighbours are `index - 1` and `index + 1`. `target` is the decoded jump
/// destination and `block_target` is stamped by the CFG annotator on
/// instructions that leave a structured block (block pops, raises, loop
/// exits).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    pub index: usize,
    pub line: u32,
    pub op: Opcode,
    pub arg: Option<u32>,
    pub target: Option<usize>,
    pub block_target: Option<usize>,
}

impl Instruction {
    pub fn new(index: usize, line: u32, op: Opcode) -> Self {
        Self {
            index,
            line,
            op,
            arg: None,
            target: None,
            block_target: None,
        }
    }

    pub fn with_arg(mut self, arg: u32) -> Self {
        self.arg = Some(arg);
        self
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target = Some(target);
        self
    }

    /// The immediate argument, or zero for argument-less instructions.
    pub fn arg_or_zero(&self) -> u32 {
        self.arg.unwrap_or(0)
    }

    /// Index of the lexically following instruction.
    pub fn next_index(&self) -> usize {
        self.index + 1
    }

    /// Index of the lexically preceding instruction, if any.
    pub fn prev_index(&self) -> Option<usize> {
        self.index.checked_sub(1)
    }

    /// Whether control can reach the next instruction from here.
    pub fn falls_through(&self) -> bool {
        self.op.carries_on()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.index, self.op)?;
        if let Some(arg) = self.arg {
            write!(f, " {arg}")?;
        }
        if let Some(target) = self.target {
            write!(f, " -> {target}")?;
        }
        if let Some(block_target) = self.block_target {
            write!(f, " ~> {block_target}")?;
        }
        Ok(())
    }
}
