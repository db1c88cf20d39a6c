//! Abstract interpreter over [`tyflow_ir::OrderedCode`] graphs.
//!
//! A [`Frame`] walks the blocks of one code body in ancestors-first order,
//! carrying every name's possible values as a [`Variable`] of conditioned
//! bindings. What the values are is left to a [`ValueSystem`]; the
//! [`Context`] ties the value system to the arenas of functions, classes
//! and code bodies discovered during the run.

mod condition;
mod context;
mod control;
mod data_stack;
mod error;
mod frame;
mod function;
mod id;
mod state;
mod value;
mod variable;

pub use condition::Condition;
pub use context::{Context, InterpreterConfig};
pub use data_stack::DataStack;
pub use error::InterpreterError;
pub use frame::{Frame, FrameKind};
pub use function::{FrameFunction, InterpreterClass};
pub use id::{AtomId, ClassId, CodeId, FrameToken, FunctionId};
pub use state::BlockState;
pub use value::{Args, BuildKind, Handle, ValueSystem};
pub use variable::{Binding, Variable, VariableError};

pub use smallvec::{self, SmallVec};
