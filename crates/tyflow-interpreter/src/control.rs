/// What the frame does after executing one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    /// Continue with the next instruction, or fall through to the next block
    /// at the end of the current one.
    Continue,
    /// Transfer the current state to the block starting at this instruction.
    Jump(usize),
    /// The instruction already merged its own successor states.
    Forked,
    /// The frame returned on this path.
    Return,
    /// The path ends here, e.g. after a raise.
    Halt,
}
