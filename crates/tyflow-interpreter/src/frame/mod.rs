//! One activation of the abstract interpreter.
//!
//! A frame walks the blocks of its code body once, in ancestors-first
//! order. Every block is either pending (no state has reached it), ready
//! (a merged [`BlockState`] is waiting) or done (it has executed and pushed
//! its successor states). Pending blocks are unreachable on every path the
//! analysis found and are skipped. States arriving over a loop back edge
//! find their target already done and are dropped, so loop bodies are
//! analyzed once.

mod call;
mod scope;
mod step;

use std::fmt::Debug;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};
use tyflow_ir::{Block, BlockId, CodeObject, HandlerKind, OrderedCode, order_code};

use crate::control::Control;
use crate::{
    BlockState, ClassId, Condition, Context, DataStack, FrameFunction, FrameToken, FunctionId,
    InterpreterError, ValueSystem, Variable,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Module body; its locals are the global scope.
    Module,
    Function,
    /// Class body; its final locals become the class members.
    Class,
}

#[derive(Debug)]
pub struct Frame<V> {
    kind: FrameKind,
    code: Rc<OrderedCode>,
    token: Option<FrameToken>,
    depth: usize,
    function: Option<FunctionId>,
    /// The global scope as seen when the frame was created.
    globals: IndexMap<String, Variable<V>>,
    closure: IndexMap<String, Variable<V>>,
    initial: IndexMap<String, Variable<V>>,

    states: FxHashMap<BlockId, BlockState<V>>,
    done: FxHashSet<BlockId>,
    current: BlockState<V>,
    stack: DataStack<V>,
    /// Operand-stack depth and kind of every set-up handler, keyed by the
    /// handler's first instruction.
    handler_levels: FxHashMap<usize, (usize, HandlerKind)>,

    global_shadows: IndexSet<String>,
    nonlocal_shadows: IndexSet<String>,

    final_locals: IndexMap<String, Variable<V>>,
    shadowed_globals: IndexMap<String, Variable<V>>,
    shadowed_nonlocals: IndexMap<String, Variable<V>>,
    return_variable: Variable<V>,
    yield_variable: Variable<V>,
    functions: Vec<FunctionId>,
    classes: Vec<ClassId>,
    consumed: bool,
}

impl<V: Clone + PartialEq + Debug> Frame<V> {
    fn new(
        kind: FrameKind,
        code: Rc<OrderedCode>,
        depth: usize,
        globals: IndexMap<String, Variable<V>>,
        closure: IndexMap<String, Variable<V>>,
        initial: IndexMap<String, Variable<V>>,
    ) -> Self {
        Self {
            kind,
            code,
            token: None,
            depth,
            function: None,
            globals,
            closure,
            initial,
            states: FxHashMap::default(),
            done: FxHashSet::default(),
            current: BlockState::default(),
            stack: DataStack::new(),
            handler_levels: FxHashMap::default(),
            global_shadows: IndexSet::new(),
            nonlocal_shadows: IndexSet::new(),
            final_locals: IndexMap::new(),
            shadowed_globals: IndexMap::new(),
            shadowed_nonlocals: IndexMap::new(),
            return_variable: Variable::empty(),
            yield_variable: Variable::empty(),
            functions: Vec::new(),
            classes: Vec::new(),
            consumed: false,
        }
    }

    /// A frame for a module body. The module's locals are its globals, so
    /// `initial_globals` seeds the entry block.
    pub fn make_module_frame(
        code: Rc<OrderedCode>,
        initial_globals: IndexMap<String, Variable<V>>,
    ) -> Self {
        Self::new(
            FrameKind::Module,
            code,
            0,
            IndexMap::new(),
            IndexMap::new(),
            initial_globals,
        )
    }

    /// Builds the control-flow graph of a decoded module body and wraps it
    /// in a module frame.
    pub fn from_code(
        code: CodeObject,
        initial_globals: IndexMap<String, Variable<V>>,
    ) -> Result<Self, InterpreterError> {
        let ordered = order_code(code)?;
        Ok(Self::make_module_frame(Rc::new(ordered), initial_globals))
    }

    pub(crate) fn for_function(
        id: FunctionId,
        function: &FrameFunction<V>,
        globals: IndexMap<String, Variable<V>>,
        locals: IndexMap<String, Variable<V>>,
        depth: usize,
    ) -> Self {
        let mut frame = Self::new(
            FrameKind::Function,
            Rc::clone(&function.code),
            depth,
            globals,
            function.closure.clone(),
            locals,
        );
        frame.function = Some(id);
        frame
    }

    pub(crate) fn for_class(
        function: &FrameFunction<V>,
        globals: IndexMap<String, Variable<V>>,
        closure: IndexMap<String, Variable<V>>,
        depth: usize,
    ) -> Self {
        Self::new(
            FrameKind::Class,
            Rc::clone(&function.code),
            depth,
            globals,
            closure,
            IndexMap::new(),
        )
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.code.name()
    }

    pub fn code(&self) -> &Rc<OrderedCode> {
        &self.code
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The function this frame runs, if it is a function frame.
    pub fn function(&self) -> Option<FunctionId> {
        self.function
    }

    pub fn token(&self) -> Option<FrameToken> {
        self.token
    }

    /// Every name the body left behind on a returning path, with the
    /// bindings of all such paths. Names the body declared global or
    /// nonlocal are not included.
    pub fn final_locals(&self) -> &IndexMap<String, Variable<V>> {
        &self.final_locals
    }

    /// The joined value of `name` across every binding in the final locals.
    pub fn final_value<S: ValueSystem<Value = V>>(
        &self,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Option<V> {
        let var = self.final_locals.get(name)?;
        Some(ctx.join_variable(var))
    }

    pub fn return_variable(&self) -> &Variable<V> {
        &self.return_variable
    }

    pub fn yield_variable(&self) -> &Variable<V> {
        &self.yield_variable
    }

    /// Functions created while running the body.
    pub fn functions(&self) -> &[FunctionId] {
        &self.functions
    }

    /// Classes built while running the body.
    pub fn classes(&self) -> &[ClassId] {
        &self.classes
    }

    /// The merged entry state of a block, once some path reached it.
    pub fn block_state(&self, id: BlockId) -> Option<&BlockState<V>> {
        self.states.get(&id)
    }

    pub fn is_done(&self, id: BlockId) -> bool {
        self.done.contains(&id)
    }

    /// Global-scope writes made by the body, to be applied by the caller.
    pub fn shadowed_globals(&self) -> &IndexMap<String, Variable<V>> {
        &self.shadowed_globals
    }

    /// Enclosing-scope writes made by the body, to be applied by the frame
    /// that defined the function.
    pub fn shadowed_nonlocals(&self) -> &IndexMap<String, Variable<V>> {
        &self.shadowed_nonlocals
    }

    /// Runs the body to completion. A frame runs once; a second call fails
    /// with [`InterpreterError::FrameConsumed`].
    pub fn run<S: ValueSystem<Value = V>>(
        &mut self,
        ctx: &mut Context<S>,
    ) -> Result<(), InterpreterError> {
        if self.consumed {
            return Err(InterpreterError::FrameConsumed {
                name: self.name().to_owned(),
            });
        }
        self.consumed = true;
        self.token = Some(ctx.next_token());
        tracing::debug!(frame = self.name(), depth = self.depth, kind = ?self.kind, "running frame");

        let code = Rc::clone(&self.code);
        let initial = std::mem::take(&mut self.initial);
        self.states.insert(
            code.entry(),
            BlockState::new(initial, Condition::True, Vec::new()),
        );

        for block in code.ordered_blocks() {
            let Some(state) = self.states.get(&block.id()).cloned() else {
                tracing::trace!(block = %block.id(), "no state reached block");
                continue;
            };
            self.done.insert(block.id());
            self.enter(state);
            self.run_block(&code, block, ctx)?;
        }

        tracing::debug!(
            frame = self.name(),
            locals = self.final_locals.len(),
            functions = self.functions.len(),
            classes = self.classes.len(),
            "frame finished"
        );
        Ok(())
    }

    fn enter(&mut self, mut state: BlockState<V>) {
        self.stack.replace(state.take_stack());
        self.current = state;
    }

    fn run_block<S: ValueSystem<Value = V>>(
        &mut self,
        code: &OrderedCode,
        block: &Block,
        ctx: &mut Context<S>,
    ) -> Result<(), InterpreterError> {
        let count = block.len();
        for (position, inst) in block.code().iter().enumerate() {
            tracing::trace!(index = inst.index, op = %inst.op, depth = self.stack.len(), "step");
            let control = self.step(inst, ctx)?;
            let last = position + 1 == count;
            match control {
                Control::Continue if !last => {}
                Control::Continue => {
                    if inst.falls_through() {
                        if let Some(next) = code.next_block(block.id()) {
                            let state = self.snapshot(&Condition::True);
                            self.merge_state(next, state);
                        }
                    }
                }
                other if !last => {
                    return Err(InterpreterError::UnexpectedControl {
                        index: inst.index,
                        control: format!("{other:?}"),
                    });
                }
                Control::Jump(target) => {
                    let state = self.snapshot(&Condition::True);
                    self.merge_state(BlockId(target), state);
                }
                Control::Forked | Control::Return | Control::Halt => {}
            }
        }
        Ok(())
    }

    /// The current state, further restricted by `condition`, with the
    /// current operand stack.
    fn snapshot(&self, condition: &Condition) -> BlockState<V> {
        self.current.restrict(condition, self.stack.snapshot())
    }

    fn snapshot_with(&self, condition: &Condition, stack: Vec<Variable<V>>) -> BlockState<V> {
        self.current.restrict(condition, stack)
    }

    fn merge_state(&mut self, target: BlockId, state: BlockState<V>) {
        if state.condition().is_false() {
            tracing::trace!(block = %target, "dropping infeasible state");
            return;
        }
        if self.done.contains(&target) {
            tracing::trace!(block = %target, "dropping state on back edge");
            return;
        }
        let existing = self.states.remove(&target);
        self.states.insert(target, state.merge_into(existing));
    }

    /// Records the current locals as one returning path.
    fn record_exit(&mut self) {
        let condition = self.current.condition().clone();
        for (name, var) in self.current.locals() {
            let var = var.with_condition(&condition);
            let sink = if self.global_shadows.contains(name) {
                &mut self.shadowed_globals
            } else if self.nonlocal_shadows.contains(name) {
                &mut self.shadowed_nonlocals
            } else {
                &mut self.final_locals
            };
            let merged = match sink.get(name) {
                Some(existing) => existing.union(&var),
                None => var,
            };
            sink.insert(name.clone(), merged);
        }
    }
}
