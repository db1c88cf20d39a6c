pub use tyflow_ir as ir;

#[cfg(feature = "interpret")]
pub use tyflow_interpreter as interpreter;

pub mod prelude {
    pub use tyflow_ir::{
        BlockId, CodeBuilder, CodeFlags, CodeObject, Constant, Opcode, OrderedCode, order_code,
    };

    #[cfg(feature = "interpret")]
    pub use tyflow_interpreter::{
        Args, Binding, BuildKind, Condition, Context, Frame, FrameKind, Handle,
        InterpreterConfig, InterpreterError, ValueSystem, Variable,
    };
}
