pub mod condition;
mod toy;

pub use toy::{ToyValue, ToyValues};

use indexmap::IndexMap;
use tyflow_interpreter::{Context, Frame, InterpreterError};
use tyflow_ir::CodeObject;

/// Builds the graph of a module body and runs it against [`ToyValues`].
pub fn run_module(
    code: CodeObject,
) -> Result<(Frame<ToyValue>, Context<ToyValues>), InterpreterError> {
    let mut ctx = Context::new(ToyValues::default());
    let mut frame = Frame::from_code(code, IndexMap::new())?;
    frame.run(&mut ctx)?;
    Ok((frame, ctx))
}
