use std::fmt::Debug;

use indexmap::IndexMap;
use tyflow_ir::{BinaryOperator, CodeConstant, CompareKind, Constant, UnaryOperator};

use crate::{ClassId, CodeId, FunctionId, InterpreterClass};

/// Objects owned by the interpreter that the value system carries around
/// without looking inside.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Handle {
    Function(FunctionId),
    Class(ClassId),
    Code(CodeId),
    /// The class-building builtin pushed by `LOAD_BUILD_CLASS`.
    BuildClass,
}

/// Aggregates produced by the `BUILD_*` family and by calls of generator
/// and coroutine functions.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum BuildKind {
    Tuple,
    List,
    Set,
    /// Items alternate key, value.
    Dict,
    String,
    /// Items are every value the generator body may yield.
    Generator,
    /// Items are every value the coroutine body may return.
    Coroutine,
}

/// Call arguments, positional then keyword.
#[derive(Clone, Debug, PartialEq)]
pub struct Args<T> {
    pub positional: Vec<T>,
    pub keyword: IndexMap<String, T>,
}

impl<T> Default for Args<T> {
    fn default() -> Self {
        Self {
            positional: Vec::new(),
            keyword: IndexMap::new(),
        }
    }
}

impl<T> Args<T> {
    pub fn positional(positional: Vec<T>) -> Self {
        Self {
            positional,
            keyword: IndexMap::new(),
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: T) -> Self {
        self.keyword.insert(name.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Args<U> {
        Args {
            positional: self.positional.into_iter().map(&mut f).collect(),
            keyword: self
                .keyword
                .into_iter()
                .map(|(name, value)| (name, f(value)))
                .collect(),
        }
    }
}

/// The value domain the interpreter computes over.
///
/// The interpreter owns control flow, scopes and path conditions; every
/// question about what a value *is* goes through this trait. Values are
/// opaque to the core and only stored, compared and passed back.
///
/// Required methods cover construction and the operations the core cannot
/// express on its own. Provided methods describe operators and protocols in
/// terms of attribute lookup and calls, and can be overridden by systems
/// that know better.
pub trait ValueSystem {
    type Value: Clone + PartialEq + Debug;

    /// The value of a literal. Code constants never reach this method; they
    /// are registered with the context and wrapped as [`Handle::Code`].
    fn constant(&mut self, constant: &CodeConstant) -> Self::Value;

    /// The value of anything the analysis cannot determine.
    fn unknown(&mut self) -> Self::Value;

    /// A single value standing for all of `values`.
    fn join(&mut self, values: &[Self::Value]) -> Self::Value;

    fn wrap(&mut self, handle: Handle) -> Self::Value;

    fn unwrap(&self, value: &Self::Value) -> Option<Handle>;

    /// Calls something that is not an interpreter-owned function.
    fn call(&mut self, callee: &Self::Value, args: &Args<Self::Value>) -> Self::Value;

    fn get_attribute(&mut self, value: &Self::Value, name: &str) -> Option<Self::Value>;

    fn set_attribute(&mut self, target: &Self::Value, name: &str, value: &Self::Value);

    /// The class object for a class body the interpreter has run.
    fn construct_class(
        &mut self,
        id: ClassId,
        class: &InterpreterClass<Self::Value>,
    ) -> Self::Value;

    fn build(&mut self, kind: BuildKind, items: Vec<Self::Value>) -> Self::Value;

    /// Resolves a name no scope defines.
    fn builtin(&mut self, name: &str) -> Option<Self::Value> {
        let _ = name;
        None
    }

    /// The truth value of `value`, when it is decided.
    fn truthiness(&self, value: &Self::Value) -> Option<bool> {
        let _ = value;
        None
    }

    /// Value for a named placeholder such as the exception pushed on handler
    /// entry. Cached per name by the context.
    fn singleton(&mut self, name: &str) -> Self::Value {
        let _ = name;
        self.unknown()
    }

    fn binary_operator(
        &mut self,
        op: BinaryOperator,
        inplace: bool,
        left: &Self::Value,
        right: &Self::Value,
    ) -> Self::Value {
        let args = Args::positional(vec![right.clone()]);
        if inplace {
            if let Some(method) = self.get_attribute(left, op.inplace_dunder()) {
                return self.call(&method, &args);
            }
        }
        match self.get_attribute(left, op.dunder()) {
            Some(method) => self.call(&method, &args),
            None => self.unknown(),
        }
    }

    fn unary_operator(&mut self, op: UnaryOperator, operand: &Self::Value) -> Self::Value {
        match op.dunder() {
            Some(dunder) => match self.get_attribute(operand, dunder) {
                Some(method) => self.call(&method, &Args::default()),
                None => self.unknown(),
            },
            None => match self.truthiness(operand) {
                Some(truth) => self.constant(&Constant::Bool(!truth)),
                None => self.unknown(),
            },
        }
    }

    fn compare(
        &mut self,
        kind: CompareKind,
        left: &Self::Value,
        right: &Self::Value,
    ) -> Self::Value {
        let method = kind
            .dunder()
            .and_then(|dunder| self.get_attribute(left, dunder));
        match method {
            Some(method) => self.call(&method, &Args::positional(vec![right.clone()])),
            None => self.unknown(),
        }
    }

    fn subscript(&mut self, container: &Self::Value, index: &Self::Value) -> Self::Value {
        match self.get_attribute(container, "__getitem__") {
            Some(method) => self.call(&method, &Args::positional(vec![index.clone()])),
            None => self.unknown(),
        }
    }

    /// The iterator over `value`.
    fn iterate(&mut self, value: &Self::Value) -> Self::Value {
        match self.get_attribute(value, "__iter__") {
            Some(method) => self.call(&method, &Args::default()),
            None => self.unknown(),
        }
    }

    /// An item produced by `iterator`.
    fn next_item(&mut self, iterator: &Self::Value) -> Self::Value {
        match self.get_attribute(iterator, "__next__") {
            Some(method) => self.call(&method, &Args::default()),
            None => self.unknown(),
        }
    }

    /// The result of awaiting or delegating to `value`.
    fn await_result(&mut self, value: &Self::Value) -> Self::Value {
        let _ = value;
        self.unknown()
    }

    /// The items of a fixed-size sequence; `expected` is the count the
    /// unpacking site needs, if any.
    fn unpack(&mut self, value: &Self::Value, expected: Option<usize>) -> Option<Vec<Self::Value>> {
        let _ = (value, expected);
        None
    }

    /// The entries of a mapping with string keys, used for keyword
    /// defaults and `**kwargs` call arguments.
    fn keyword_items(&mut self, value: &Self::Value) -> Option<Vec<(String, Self::Value)>> {
        let _ = value;
        None
    }

    /// The strings of a tuple of strings, such as the keyword names of
    /// `CALL_FUNCTION_KW`.
    fn string_items(&self, value: &Self::Value) -> Option<Vec<String>> {
        let _ = value;
        None
    }

    fn import_module(&mut self, name: &str) -> Self::Value {
        let _ = name;
        self.unknown()
    }
}
