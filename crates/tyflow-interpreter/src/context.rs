use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tyflow_ir::{InternTable, OrderedCode};

use crate::{
    AtomId, ClassId, CodeId, Frame, FrameFunction, FrameToken, FunctionId, Handle,
    InterpreterClass, InterpreterError, ValueSystem, Variable,
};

const UNKNOWN: &str = "<unknown>";

/// Limits applied while interpreting.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct InterpreterConfig {
    /// Calls nested deeper than this are not followed; they produce the
    /// unknown value.
    #[builder(default = 32)]
    pub max_depth: usize,
    /// Variables with more bindings than this are collapsed into one joined
    /// binding.
    #[builder(default = 64)]
    pub max_bindings: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything shared by the frames of one analysis run: the value system,
/// the arenas of functions, classes and nested code bodies, the singleton
/// cache and the counters for condition atoms and frame runs.
pub struct Context<S: ValueSystem> {
    pub(crate) values: S,
    config: InterpreterConfig,
    functions: Vec<FrameFunction<S::Value>>,
    classes: Vec<InterpreterClass<S::Value>>,
    codes: Vec<Rc<OrderedCode>>,
    code_ids: FxHashMap<*const OrderedCode, CodeId>,
    singleton_names: InternTable<String>,
    singletons: Vec<S::Value>,
    atoms: Vec<(String, usize)>,
    frames: usize,
    /// Functions whose bodies are running, outermost first.
    active: Vec<FunctionId>,
}

impl<S: ValueSystem + fmt::Debug> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values)
            .field("config", &self.config)
            .field("functions", &self.functions.len())
            .field("classes", &self.classes.len())
            .field("codes", &self.codes.len())
            .field("atoms", &self.atoms.len())
            .finish_non_exhaustive()
    }
}

impl<S: ValueSystem> Context<S> {
    pub fn new(values: S) -> Self {
        Self {
            values,
            config: InterpreterConfig::default(),
            functions: Vec::new(),
            classes: Vec::new(),
            codes: Vec::new(),
            code_ids: FxHashMap::default(),
            singleton_names: InternTable::new(),
            singletons: Vec::new(),
            atoms: Vec::new(),
            frames: 0,
            active: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn values(&self) -> &S {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut S {
        &mut self.values
    }

    pub fn into_values(self) -> S {
        self.values
    }

    /// The value for `name`, computed once per context.
    pub fn singleton(&mut self, name: &str) -> S::Value {
        let (key, fresh) = self.singleton_names.intern_full(name.to_owned());
        if fresh {
            let value = if name == UNKNOWN {
                self.values.unknown()
            } else {
                self.values.singleton(name)
            };
            self.singletons.push(value);
        }
        self.singletons[key].clone()
    }

    pub fn unknown(&mut self) -> S::Value {
        self.singleton(UNKNOWN)
    }

    pub fn unknown_variable(&mut self) -> Variable<S::Value> {
        Variable::from_value(self.unknown())
    }

    pub(crate) fn builtin(&mut self, name: &str) -> Option<S::Value> {
        self.values.builtin(name)
    }

    /// Mints a new branch atom for the undecided branch at instruction
    /// `index` of `code`.
    pub fn fresh_atom(&mut self, code: &str, index: usize) -> AtomId {
        self.atoms.push((code.to_owned(), index));
        AtomId::from(self.atoms.len() - 1)
    }

    /// The code body and instruction that minted `atom`.
    pub fn atom_site(&self, atom: AtomId) -> Option<(&str, usize)> {
        self.atoms
            .get(atom.index())
            .map(|(code, index)| (code.as_str(), *index))
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub(crate) fn next_token(&mut self) -> FrameToken {
        self.frames += 1;
        FrameToken::from(self.frames - 1)
    }

    /// Whether a body of `id` is already running further up the call chain.
    pub fn is_active(&self, id: FunctionId) -> bool {
        self.active.contains(&id)
    }

    pub(crate) fn enter_function(&mut self, id: FunctionId) {
        self.active.push(id);
    }

    pub(crate) fn leave_function(&mut self, id: FunctionId) {
        debug_assert_eq!(self.active.last(), Some(&id));
        self.active.pop();
    }

    /// Registers a nested code body, returning the same id for the same
    /// body on every call.
    pub fn register_code(&mut self, code: &Rc<OrderedCode>) -> CodeId {
        let key = Rc::as_ptr(code);
        if let Some(&id) = self.code_ids.get(&key) {
            return id;
        }
        let id = CodeId::from(self.codes.len());
        self.codes.push(Rc::clone(code));
        self.code_ids.insert(key, id);
        id
    }

    pub fn code(&self, id: CodeId) -> Option<&Rc<OrderedCode>> {
        self.codes.get(id.index())
    }

    pub fn add_function(&mut self, function: FrameFunction<S::Value>) -> FunctionId {
        self.functions.push(function);
        FunctionId::from(self.functions.len() - 1)
    }

    pub fn function(&self, id: FunctionId) -> Option<&FrameFunction<S::Value>> {
        self.functions.get(id.index())
    }

    /// # Panics
    ///
    /// Panics if `id` was not minted by this context.
    pub fn expect_function(&self, id: FunctionId) -> &FrameFunction<S::Value> {
        self.function(id)
            .unwrap_or_else(|| panic!("Expected to find function {id} in context, but none was found."))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &FrameFunction<S::Value>)> + '_ {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, function)| (FunctionId::from(i), function))
    }

    pub fn add_class(&mut self, class: InterpreterClass<S::Value>) -> ClassId {
        self.classes.push(class);
        ClassId::from(self.classes.len() - 1)
    }

    pub fn class(&self, id: ClassId) -> Option<&InterpreterClass<S::Value>> {
        self.classes.get(id.index())
    }

    /// # Panics
    ///
    /// Panics if `id` was not minted by this context.
    pub fn expect_class(&self, id: ClassId) -> &InterpreterClass<S::Value> {
        self.class(id)
            .unwrap_or_else(|| panic!("Expected to find class {id} in context, but none was found."))
    }

    pub(crate) fn construct_class(&mut self, id: ClassId) -> S::Value {
        let Self {
            values, classes, ..
        } = self;
        values.construct_class(id, &classes[id.index()])
    }

    pub(crate) fn wrap(&mut self, handle: Handle) -> S::Value {
        self.values.wrap(handle)
    }

    /// A single value standing for every binding of `var`.
    pub fn join_variable(&mut self, var: &Variable<S::Value>) -> S::Value {
        match var.bindings() {
            [] => self.unknown(),
            [binding] => binding.value().clone(),
            bindings => {
                let values: Vec<S::Value> = bindings.iter().map(|b| b.value().clone()).collect();
                self.values.join(&values)
            }
        }
    }

    /// Collapses `var` into one unconditional binding once it exceeds the
    /// configured binding limit.
    pub fn limit(&mut self, var: Variable<S::Value>) -> Variable<S::Value> {
        if var.len() <= self.config.max_bindings {
            return var;
        }
        tracing::debug!(
            bindings = var.len(),
            limit = self.config.max_bindings,
            "joining oversized variable"
        );
        let name = var.name().map(str::to_owned);
        let joined = Variable::from_value(self.join_variable(&var));
        match name {
            Some(name) => joined.named(name),
            None => joined,
        }
    }

    /// Runs a collected function on its own, every parameter bound to the
    /// unknown value. Used for bodies that are defined but never called.
    /// Global reads see the scope captured when the function was created.
    pub fn analyze_function(
        &mut self,
        id: FunctionId,
    ) -> Result<Frame<S::Value>, InterpreterError> {
        let globals = self.expect_function(id).globals.clone();
        self.analyze_function_with_globals(id, globals)
    }

    /// Like [`Context::analyze_function`], with `globals` as the global
    /// scope. Drivers pass the module's final locals here so that names
    /// bound after the definition are visible too.
    pub fn analyze_function_with_globals(
        &mut self,
        id: FunctionId,
        globals: IndexMap<String, Variable<S::Value>>,
    ) -> Result<Frame<S::Value>, InterpreterError> {
        let function = self.expect_function(id).clone();
        let mut locals = IndexMap::new();
        for name in function.code.param_names() {
            let value = self.unknown_variable();
            locals.insert(name.clone(), value.named(name.clone()));
        }
        let mut frame = Frame::for_function(id, &function, globals, locals, 1);
        self.enter_function(id);
        let outcome = frame.run(self);
        self.leave_function(id);
        outcome?;
        Ok(frame)
    }
}
