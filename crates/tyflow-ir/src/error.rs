use crate::Opcode;

/// Malformed input detected while building a control-flow graph.
///
/// These are contract violations between the decoder and the CFG builder:
/// the graph for the affected code body cannot be trusted and is not built.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CfgError {
    /// The code body has no instructions.
    #[error("code body has no instructions")]
    EmptyCode,
    /// An instruction's `index` disagrees with its position in the list.
    #[error("instruction at position {position} carries index {index}")]
    MisnumberedInstruction { position: usize, index: usize },
    /// A jump instruction was decoded without a destination.
    #[error("instruction {index} ({op}) has no jump target")]
    MissingJumpTarget { index: usize, op: Opcode },
    /// A jump destination lies outside the instruction list.
    #[error("instruction {index} jumps to {target}, past the end of the code")]
    TargetOutOfRange { index: usize, target: usize },
    /// A block-pop instruction was reached with no open block.
    #[error("instruction {index} pops a block but none is open")]
    BlockPopWithoutBlock { index: usize },
    /// An edge references an instruction that does not start a block.
    #[error("block edge from instruction {index} references {target}, which starts no block")]
    MissingTarget { index: usize, target: usize },
}

/// Errors raised by [`CodeBuilder::finish`](crate::CodeBuilder::finish).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("label {label} used by instruction {index} was never bound")]
    UnboundLabel { label: usize, index: usize },
    #[error("instruction {index} references cell '{name}', which is neither a cell nor a free variable")]
    UnknownCell { name: String, index: usize },
}
