//! Code representation for the tyflow abstract interpreter.
//!
//! Decoded code bodies ([`CodeObject`]) are turned into control-flow graphs
//! ([`OrderedCode`]) by [`order_code`].

mod block;
mod builder;
mod code;
mod error;
mod instruction;
mod intern;
mod opcode;
mod ordered;

pub mod cfg;

pub use block::{Block, BlockId};
pub use builder::{CodeBuilder, Label};
pub use cfg::{AsyncIterationPreSplit, NoPreSplit, PreSplit, order_code, order_code_with};
pub use code::{CodeFlags, CodeInfo, CodeObject, Constant};
pub use error::{BuildError, CfgError};
pub use instruction::Instruction;
pub use intern::{InternKey, InternTable};
pub use opcode::{BinaryOperator, CompareKind, HandlerKind, Opcode, UnaryOperator};
pub use ordered::{CodeConstant, OrderedCode};
