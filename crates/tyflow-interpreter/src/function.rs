use std::rc::Rc;

use indexmap::IndexMap;
use tyflow_ir::OrderedCode;

use crate::{FrameToken, FunctionId, Variable};

/// A function created by `MAKE_FUNCTION`.
///
/// The closure holds the captured value of every free variable of `code`,
/// keyed by name. `globals` is the global scope as the defining frame saw
/// it at creation. `owner` is the frame run that created the function; only
/// calls from that frame refresh the closure and receive nonlocal writes
/// back.
#[derive(Clone, Debug)]
pub struct FrameFunction<V> {
    pub name: String,
    pub code: Rc<OrderedCode>,
    /// Positional defaults, aligned with the last positional parameters.
    pub defaults: Vec<Variable<V>>,
    pub kwdefaults: IndexMap<String, Variable<V>>,
    pub closure: IndexMap<String, Variable<V>>,
    pub globals: IndexMap<String, Variable<V>>,
    pub owner: FrameToken,
}

impl<V> FrameFunction<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &Rc<OrderedCode> {
        &self.code
    }
}

/// A class whose body the interpreter ran.
#[derive(Clone, Debug)]
pub struct InterpreterClass<V> {
    pub name: String,
    pub bases: Vec<V>,
    /// Final locals of the class body.
    pub members: IndexMap<String, Variable<V>>,
    /// Functions defined directly in the body, i.e. the methods.
    pub functions: Vec<FunctionId>,
    pub code: Rc<OrderedCode>,
}

impl<V> InterpreterClass<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self, name: &str) -> Option<&Variable<V>> {
        self.members.get(name)
    }
}
