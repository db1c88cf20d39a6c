use tyflow_ir::{CfgError, Opcode};

/// Internal-contract violations raised while interpreting a code body.
///
/// Analysis gaps such as unresolved names are not errors; they flow on as
/// the value system's unknown value. An error aborts the run of the frame
/// that raised it.
#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    /// An instruction popped more operands than the stack holds.
    #[error("operand stack underflow: needed {needed}, depth {depth}")]
    StackUnderflow { needed: usize, depth: usize },
    #[error("instruction {index} ({op}) requires an argument")]
    MissingArgument { index: usize, op: Opcode },
    #[error("instruction {index} ({op}) has invalid argument {arg}")]
    InvalidArgument { index: usize, op: Opcode, arg: u32 },
    #[error("instruction {index} refers to missing constant {arg}")]
    MissingConstant { index: usize, arg: u32 },
    #[error("instruction {index} refers to missing name {arg}")]
    MissingName { index: usize, arg: u32 },
    /// A handler ended its block early with a control action other than
    /// `Continue`.
    #[error("unexpected control flow at instruction {index}: {control}")]
    UnexpectedControl { index: usize, control: String },
    /// `run` was called on a frame that has already run.
    #[error("frame '{name}' has already been run")]
    FrameConsumed { name: String },
    /// `MAKE_FUNCTION` found something other than a loaded code body.
    #[error("instruction {index} expected a code object on the stack")]
    UnknownCode { index: usize },
    #[error(transparent)]
    Cfg(#[from] CfgError),
}
