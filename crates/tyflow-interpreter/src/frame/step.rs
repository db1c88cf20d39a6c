use std::fmt::Debug;
use std::rc::Rc;

use tyflow_ir::{BlockId, CompareKind, Constant, HandlerKind, Instruction, Opcode};

use super::Frame;
use crate::control::Control;
use crate::{
    Args, Binding, BlockState, BuildKind, Condition, Context, Handle, InterpreterError,
    ValueSystem, Variable,
};

const EXCEPTION: &str = "<exception>";
/// Upper bound on the targets of one `UNPACK_SEQUENCE`.
const MAX_UNPACK: u32 = 1 << 16;

impl<V: Clone + PartialEq + Debug> Frame<V> {
    pub(super) fn step<S: ValueSystem<Value = V>>(
        &mut self,
        inst: &Instruction,
        ctx: &mut Context<S>,
    ) -> Result<Control, InterpreterError> {
        let index = inst.index;
        match inst.op {
            Opcode::Nop | Opcode::ExtendedArg | Opcode::GetAwaitable | Opcode::GetYieldFromIter => {}
            Opcode::PopTop | Opcode::PrintExpr | Opcode::EndFinally | Opcode::DeleteAttr => {
                self.stack.pop()?;
            }
            Opcode::RotTwo => self.stack.rotate(2)?,
            Opcode::RotThree => self.stack.rotate(3)?,
            Opcode::RotFour => self.stack.rotate(4)?,
            Opcode::DupTop => {
                let top = self.stack.top()?.clone();
                self.stack.push(top);
            }
            Opcode::DupTopTwo => {
                let second = self.stack.peek(2)?.clone();
                let top = self.stack.peek(1)?.clone();
                self.stack.push(second);
                self.stack.push(top);
            }

            Opcode::LoadConst => {
                let arg = self.arg(inst)?;
                let code = Rc::clone(&self.code);
                let value = match code.const_at(arg) {
                    Some(Constant::Code(nested)) => {
                        let id = ctx.register_code(nested);
                        ctx.wrap(Handle::Code(id))
                    }
                    Some(constant) => ctx.values.constant(constant),
                    None => return Err(InterpreterError::MissingConstant { index, arg }),
                };
                self.stack.push(Variable::from_value(value));
            }
            Opcode::LoadName => {
                let name = self.name_arg(inst)?;
                let var = self.read_name(&name, ctx);
                self.stack.push(var);
            }
            Opcode::StoreName | Opcode::StoreFast => {
                let name = match inst.op {
                    Opcode::StoreFast => self.varname_arg(inst)?,
                    _ => self.name_arg(inst)?,
                };
                let value = self.stack.pop()?;
                self.store_local(&name, value);
            }
            Opcode::DeleteName | Opcode::DeleteGlobal => {
                let name = self.name_arg(inst)?;
                self.delete_local(&name);
            }
            Opcode::LoadFast => {
                let name = self.varname_arg(inst)?;
                let var = self.read_fast(&name, ctx);
                self.stack.push(var);
            }
            Opcode::DeleteFast => {
                let name = self.varname_arg(inst)?;
                self.delete_local(&name);
            }
            Opcode::LoadGlobal => {
                let name = self.name_arg(inst)?;
                let var = self.read_global(&name, ctx);
                self.stack.push(var);
            }
            Opcode::StoreGlobal => {
                let name = self.name_arg(inst)?;
                let value = self.stack.pop()?;
                self.store_global(&name, value);
            }
            Opcode::LoadDeref | Opcode::LoadClosure => {
                let name = self.cell_arg(inst)?;
                let var = self.read_deref(&name, ctx);
                self.stack.push(var);
            }
            Opcode::LoadClassderef => {
                let name = self.cell_arg(inst)?;
                let var = self.read_classderef(&name, ctx);
                self.stack.push(var);
            }
            Opcode::StoreDeref => {
                let name = self.cell_arg(inst)?;
                let value = self.stack.pop()?;
                self.store_deref(&name, value);
            }
            Opcode::DeleteDeref => {
                let name = self.cell_arg(inst)?;
                self.delete_local(&name);
            }

            Opcode::LoadAttr => {
                let name = self.name_arg(inst)?;
                let object = self.stack.pop()?;
                let attr = self.attribute(&object, &name, ctx);
                self.stack.push(attr);
            }
            Opcode::StoreAttr => {
                let name = self.name_arg(inst)?;
                let object = self.stack.pop()?;
                let value = self.stack.pop()?;
                let value = ctx.join_variable(&value);
                for target in object.values() {
                    ctx.values.set_attribute(target, &name, &value);
                }
            }
            Opcode::LoadMethod => {
                let name = self.name_arg(inst)?;
                let object = self.stack.pop()?;
                let method = self.attribute(&object, &name, ctx);
                self.stack.push(method);
                self.stack.push(object);
            }

            Opcode::CallFunction => {
                let count = self.arg(inst)? as usize;
                let args = self.stack.pop_n(count)?;
                let callee = self.stack.pop()?;
                let result = self.call_variable(&callee, Args::positional(args), None, ctx)?;
                self.stack.push(result);
            }
            Opcode::CallFunctionKw => {
                let names = self.stack.pop()?;
                let count = self.arg(inst)? as usize;
                let values = self.stack.pop_n(count)?;
                let callee = self.stack.pop()?;
                let args = keyword_args(&names, values, ctx);
                let result = self.call_variable(&callee, args, None, ctx)?;
                self.stack.push(result);
            }
            Opcode::CallFunctionEx => {
                let kwargs = if inst.arg_or_zero() & 0x01 != 0 {
                    Some(self.stack.pop()?)
                } else {
                    None
                };
                let star = self.stack.pop()?;
                let callee = self.stack.pop()?;
                let args = unpacked_args(&star, kwargs.as_ref(), ctx);
                let result = self.call_variable(&callee, args, None, ctx)?;
                self.stack.push(result);
            }
            Opcode::CallMethod => {
                let count = self.arg(inst)? as usize;
                let args = self.stack.pop_n(count)?;
                let receiver = self.stack.pop()?;
                let method = self.stack.pop()?;
                let result =
                    self.call_variable(&method, Args::positional(args), Some(receiver), ctx)?;
                self.stack.push(result);
            }
            Opcode::MakeFunction => {
                let function = self.make_function(index, inst.arg_or_zero(), ctx)?;
                self.stack.push(function);
            }
            Opcode::LoadBuildClass => {
                let builder = ctx.wrap(Handle::BuildClass);
                self.stack.push(Variable::from_value(builder));
            }

            Opcode::BuildTuple | Opcode::BuildList | Opcode::BuildSet | Opcode::BuildString => {
                let kind = match inst.op {
                    Opcode::BuildTuple => BuildKind::Tuple,
                    Opcode::BuildList => BuildKind::List,
                    Opcode::BuildSet => BuildKind::Set,
                    _ => BuildKind::String,
                };
                let count = self.arg(inst)? as usize;
                let items = self.stack.pop_n(count)?;
                self.build(kind, items, ctx);
            }
            Opcode::BuildMap => {
                let count = self.arg(inst)? as usize;
                let items = self.stack.pop_n(2 * count)?;
                self.build(BuildKind::Dict, items, ctx);
            }
            Opcode::BuildConstKeyMap => {
                let keys = self.stack.pop()?;
                let count = self.arg(inst)? as usize;
                let values = self.stack.pop_n(count)?;
                let keys = keys
                    .get_atomic_value()
                    .ok()
                    .and_then(|keys| ctx.values.unpack(keys, Some(values.len())));
                let mut items = Vec::with_capacity(values.len() * 2);
                for (i, value) in values.into_iter().enumerate() {
                    let key = match keys.as_ref().and_then(|keys| keys.get(i)) {
                        Some(key) => Variable::from_value(key.clone()),
                        None => ctx.unknown_variable(),
                    };
                    items.push(key);
                    items.push(value);
                }
                self.build(BuildKind::Dict, items, ctx);
            }
            Opcode::ListAppend | Opcode::SetAdd => {
                self.stack.pop()?;
            }
            Opcode::MapAdd | Opcode::DeleteSubscr => {
                self.stack.pop_n(2)?;
            }
            Opcode::UnpackSequence => {
                let arg = self.arg(inst)?;
                if arg > MAX_UNPACK {
                    return Err(InterpreterError::InvalidArgument {
                        index,
                        op: inst.op,
                        arg,
                    });
                }
                let count = arg as usize;
                let sequence = self.stack.pop()?;
                let items = self.unpack(&sequence, count, ctx);
                for item in items.into_iter().rev() {
                    self.stack.push(item);
                }
            }
            Opcode::FormatValue => {
                if inst.arg_or_zero() & 0x04 != 0 {
                    self.stack.pop()?;
                }
                let value = self.stack.pop()?;
                let formatted =
                    self.map_values(&value, ctx, |values, v| values.build(BuildKind::String, vec![v.clone()]));
                self.stack.push(formatted);
            }

            Opcode::UnaryOp(op) => {
                let operand = self.stack.pop()?;
                let result = self.map_values(&operand, ctx, |values, v| values.unary_operator(op, v));
                self.stack.push(result);
            }
            Opcode::BinaryOp(op) | Opcode::InplaceOp(op) => {
                let inplace = matches!(inst.op, Opcode::InplaceOp(_));
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                let result = self.combine(&left, &right, ctx, |values, l, r| {
                    values.binary_operator(op, inplace, l, r)
                });
                self.stack.push(result);
            }
            Opcode::CompareOp => {
                let arg = self.arg(inst)?;
                let kind = CompareKind::from_arg(arg).ok_or(InterpreterError::InvalidArgument {
                    index,
                    op: inst.op,
                    arg,
                })?;
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                let result = self.combine(&left, &right, ctx, |values, l, r| values.compare(kind, l, r));
                self.stack.push(result);
            }
            Opcode::BinarySubscr => {
                let key = self.stack.pop()?;
                let container = self.stack.pop()?;
                let result = self.combine(&container, &key, ctx, |values, c, k| values.subscript(c, k));
                self.stack.push(result);
            }
            Opcode::StoreSubscr => {
                let key = self.stack.pop()?;
                let container = self.stack.pop()?;
                let value = self.stack.pop()?;
                let args = Args::positional(vec![ctx.join_variable(&key), ctx.join_variable(&value)]);
                for target in container.values() {
                    if let Some(method) = ctx.values.get_attribute(target, "__setitem__") {
                        ctx.values.call(&method, &args);
                    }
                }
            }

            Opcode::PopJumpIfFalse
            | Opcode::PopJumpIfTrue
            | Opcode::JumpIfFalseOrPop
            | Opcode::JumpIfTrueOrPop => return self.branch(inst, ctx),
            Opcode::JumpForward | Opcode::JumpAbsolute | Opcode::ContinueLoop => {
                return Ok(Control::Jump(self.target(inst)?));
            }
            Opcode::GetIter | Opcode::GetAiter => {
                let iterable = self.stack.pop()?;
                let iterator = self.map_values(&iterable, ctx, |values, v| values.iterate(v));
                self.stack.push(iterator);
            }
            Opcode::ForIter => return self.for_iter(inst, ctx),
            Opcode::SetupLoop => {
                let target = self.target(inst)?;
                self.handler_levels
                    .insert(target, (self.stack.len(), HandlerKind::Loop));
            }
            Opcode::BreakLoop => {
                let Some(exit) = inst.block_target else {
                    return Err(InterpreterError::MissingArgument { index, op: inst.op });
                };
                if let Some(&(level, _)) = self.handler_levels.get(&exit) {
                    self.stack.truncate(level);
                }
                return Ok(Control::Jump(exit));
            }
            Opcode::ReturnValue => {
                let value = self.stack.pop()?;
                let value = value.with_condition(self.current.condition());
                self.return_variable = self.return_variable.union(&value);
                self.record_exit();
                return Ok(Control::Return);
            }

            Opcode::SetupExcept | Opcode::SetupFinally => {
                let target = self.target(inst)?;
                let kind = match inst.op {
                    Opcode::SetupExcept => HandlerKind::Except,
                    _ => HandlerKind::Finally,
                };
                self.setup_handler(target, kind, ctx);
            }
            Opcode::SetupWith => {
                let target = self.target(inst)?;
                let manager = self.stack.pop()?;
                let exit = self.attribute(&manager, "__exit__", ctx);
                self.stack.push(exit);
                self.setup_handler(target, HandlerKind::With, ctx);
                let enter = self.attribute(&manager, "__enter__", ctx);
                let entered = self.call_variable(&enter, Args::default(), None, ctx)?;
                self.stack.push(entered);
            }
            Opcode::SetupAsyncWith => {
                let target = self.target(inst)?;
                let entered = self.stack.pop()?;
                self.setup_handler(target, HandlerKind::With, ctx);
                self.stack.push(entered);
            }
            Opcode::BeforeAsyncWith => {
                let manager = self.stack.pop()?;
                let exit = self.attribute(&manager, "__aexit__", ctx);
                self.stack.push(exit);
                let enter = self.attribute(&manager, "__aenter__", ctx);
                let entered = self.call_variable(&enter, Args::default(), None, ctx)?;
                self.stack.push(entered);
            }
            Opcode::PopBlock => {
                let level = inst
                    .block_target
                    .and_then(|opener| self.handler_levels.get(&opener));
                if let Some(&(level, _)) = level {
                    self.stack.truncate(level);
                }
            }
            Opcode::PopExcept => {
                self.stack.pop_n(3)?;
            }
            Opcode::Reraise => {
                self.raise(inst, ctx);
                return Ok(Control::Halt);
            }
            Opcode::RaiseVarargs => {
                self.stack.pop_n(inst.arg_or_zero() as usize)?;
                self.raise(inst, ctx);
                return Ok(Control::Halt);
            }
            Opcode::WithCleanupStart => {
                let exception = self.stack.pop()?;
                let exit = self.stack.pop()?;
                let unknown = ctx.unknown_variable();
                let args = Args::positional(vec![unknown.clone(), unknown.clone(), unknown]);
                let result = self.call_variable(&exit, args, None, ctx)?;
                self.stack.push(exception.clone());
                self.stack.push(exception);
                self.stack.push(result);
            }
            Opcode::WithCleanupFinish => {
                self.stack.pop_n(2)?;
            }
            Opcode::EndAsyncFor => {
                if let Some(&(level, _)) = self.handler_levels.get(&index) {
                    self.stack.truncate(level);
                }
                self.stack.pop()?;
            }

            Opcode::YieldValue => {
                let value = self.stack.pop()?;
                let value = value.with_condition(self.current.condition());
                self.yield_variable = self.yield_variable.union(&value);
                let sent = ctx.unknown_variable();
                self.stack.push(sent);
            }
            Opcode::YieldFrom => {
                self.stack.pop()?;
                let delegate = self.stack.pop()?;
                let result = self.map_values(&delegate, ctx, |values, v| values.await_result(v));
                self.stack.push(result);
            }
            Opcode::GetAnext => {
                let iterator = self.stack.top()?.clone();
                let next = self.map_values(&iterator, ctx, |values, v| values.next_item(v));
                self.stack.push(next);
            }

            Opcode::ImportName => {
                let name = self.name_arg(inst)?;
                self.stack.pop_n(2)?;
                let module = ctx.values.import_module(&name);
                self.stack.push(Variable::from_value(module));
            }
            Opcode::ImportFrom => {
                let name = self.name_arg(inst)?;
                let module = self.stack.top()?.clone();
                let attr = self.attribute(&module, &name, ctx);
                self.stack.push(attr);
            }
            Opcode::ImportStar => {
                self.stack.pop()?;
                tracing::debug!(frame = self.name(), index, "star import not followed");
            }
            Opcode::SetupAnnotations => {
                let annotations = ctx.values.build(BuildKind::Dict, Vec::new());
                self.store_local("__annotations__", Variable::from_value(annotations));
            }
        }
        Ok(Control::Continue)
    }

    fn arg(&self, inst: &Instruction) -> Result<u32, InterpreterError> {
        inst.arg.ok_or(InterpreterError::MissingArgument {
            index: inst.index,
            op: inst.op,
        })
    }

    fn target(&self, inst: &Instruction) -> Result<usize, InterpreterError> {
        inst.target.ok_or(InterpreterError::MissingArgument {
            index: inst.index,
            op: inst.op,
        })
    }

    fn name_arg(&self, inst: &Instruction) -> Result<String, InterpreterError> {
        let arg = self.arg(inst)?;
        self.code
            .name_at(arg)
            .map(str::to_owned)
            .ok_or(InterpreterError::MissingName { index: inst.index, arg })
    }

    fn varname_arg(&self, inst: &Instruction) -> Result<String, InterpreterError> {
        let arg = self.arg(inst)?;
        self.code
            .varname_at(arg)
            .map(str::to_owned)
            .ok_or(InterpreterError::MissingName { index: inst.index, arg })
    }

    fn cell_arg(&self, inst: &Instruction) -> Result<String, InterpreterError> {
        let arg = self.arg(inst)?;
        self.code
            .cell_name(arg)
            .map(str::to_owned)
            .ok_or(InterpreterError::MissingName { index: inst.index, arg })
    }

    /// Applies `f` to every binding, keeping each binding's condition.
    fn map_values<S: ValueSystem<Value = V>>(
        &self,
        var: &Variable<V>,
        ctx: &mut Context<S>,
        mut f: impl FnMut(&mut S, &V) -> V,
    ) -> Variable<V> {
        let mut out = Variable::empty();
        for binding in var.bindings() {
            let value = f(&mut ctx.values, binding.value());
            out.push(Binding::new(value, binding.condition().clone()));
        }
        if out.is_empty() {
            return ctx.unknown_variable();
        }
        ctx.limit(out)
    }

    /// Applies `f` to every pair of bindings whose conditions can hold
    /// together.
    fn combine<S: ValueSystem<Value = V>>(
        &self,
        left: &Variable<V>,
        right: &Variable<V>,
        ctx: &mut Context<S>,
        mut f: impl FnMut(&mut S, &V, &V) -> V,
    ) -> Variable<V> {
        let mut out = Variable::empty();
        for l in left.bindings() {
            for r in right.bindings() {
                let condition = Condition::and2(l.condition().clone(), r.condition().clone());
                if condition.is_false() {
                    continue;
                }
                let value = f(&mut ctx.values, l.value(), r.value());
                out.push(Binding::new(value, condition));
            }
        }
        if out.is_empty() {
            return ctx.unknown_variable();
        }
        ctx.limit(out)
    }

    fn attribute<S: ValueSystem<Value = V>>(
        &self,
        object: &Variable<V>,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Variable<V> {
        self.map_values(object, ctx, |values, v| match values.get_attribute(v, name) {
            Some(attr) => attr,
            None => values.unknown(),
        })
    }

    fn build<S: ValueSystem<Value = V>>(
        &mut self,
        kind: BuildKind,
        items: Vec<Variable<V>>,
        ctx: &mut Context<S>,
    ) {
        let items = items.iter().map(|item| ctx.join_variable(item)).collect();
        let built = ctx.values.build(kind, items);
        self.stack.push(Variable::from_value(built));
    }

    /// Splits every binding of `sequence` into `count` items. Bindings the
    /// value system cannot unpack contribute unknown items.
    fn unpack<S: ValueSystem<Value = V>>(
        &self,
        sequence: &Variable<V>,
        count: usize,
        ctx: &mut Context<S>,
    ) -> Vec<Variable<V>> {
        let mut items: Vec<Variable<V>> = (0..count).map(|_| Variable::empty()).collect();
        for binding in sequence.bindings() {
            let values = match ctx.values.unpack(binding.value(), Some(count)) {
                Some(values) if values.len() == count => values,
                _ => vec![ctx.unknown(); count],
            };
            for (slot, value) in items.iter_mut().zip(values) {
                slot.push(Binding::new(value, binding.condition().clone()));
            }
        }
        items
            .into_iter()
            .map(|item| {
                if item.is_empty() {
                    ctx.unknown_variable()
                } else {
                    ctx.limit(item)
                }
            })
            .collect()
    }

    /// The conditions under which `value` is truthy and falsy. When some
    /// binding's truth is undecided a fresh atom stands for the branch.
    fn branch_conditions<S: ValueSystem<Value = V>>(
        &self,
        value: &Variable<V>,
        index: usize,
        ctx: &mut Context<S>,
    ) -> (Condition, Condition) {
        let mut truthy = Vec::new();
        let mut falsy = Vec::new();
        let decided = !value.is_empty()
            && value.bindings().iter().all(|binding| {
                match ctx.values.truthiness(binding.value()) {
                    Some(true) => truthy.push(binding.condition().clone()),
                    Some(false) => falsy.push(binding.condition().clone()),
                    None => return false,
                }
                true
            });
        if decided {
            return (Condition::or(truthy), Condition::or(falsy));
        }
        let atom = Condition::atom(ctx.fresh_atom(self.name(), index));
        (atom.clone(), Condition::not(atom))
    }

    fn fallthrough(&self, inst: &Instruction) -> Option<BlockId> {
        self.code
            .block_starting_at(inst.next_index())
            .map(|block| block.id())
    }

    fn branch<S: ValueSystem<Value = V>>(
        &mut self,
        inst: &Instruction,
        ctx: &mut Context<S>,
    ) -> Result<Control, InterpreterError> {
        let target = self.target(inst)?;
        let value = self.stack.pop()?;
        let (truthy, falsy) = self.branch_conditions(&value, inst.index, ctx);
        let (jump_when, stay_when) = match inst.op {
            Opcode::PopJumpIfFalse | Opcode::JumpIfFalseOrPop => (falsy, truthy),
            _ => (truthy, falsy),
        };
        let keeps_value = matches!(inst.op, Opcode::JumpIfFalseOrPop | Opcode::JumpIfTrueOrPop);

        let mut jump_stack = self.stack.snapshot();
        if keeps_value {
            jump_stack.push(value);
        }
        let jump = self.snapshot_with(&jump_when, jump_stack);
        let stay = self.snapshot(&stay_when);
        if let Some(next) = self.fallthrough(inst) {
            self.merge_state(next, stay);
        }
        self.merge_state(BlockId(target), jump);
        Ok(Control::Forked)
    }

    /// `FOR_ITER`: the body runs under a fresh atom with the next item
    /// pushed; the exit pops the exhausted iterator under its negation.
    fn for_iter<S: ValueSystem<Value = V>>(
        &mut self,
        inst: &Instruction,
        ctx: &mut Context<S>,
    ) -> Result<Control, InterpreterError> {
        let target = self.target(inst)?;
        let iterator = self.stack.top()?.clone();
        let item = self.map_values(&iterator, ctx, |values, v| values.next_item(v));
        let atom = Condition::atom(ctx.fresh_atom(self.name(), inst.index));

        let mut body_stack = self.stack.snapshot();
        body_stack.push(item);
        let mut exit_stack = self.stack.snapshot();
        exit_stack.pop();

        let body = self.snapshot_with(&atom, body_stack);
        let exit = self.snapshot_with(&Condition::not(atom), exit_stack);
        if let Some(next) = self.fallthrough(inst) {
            self.merge_state(next, body);
        }
        self.merge_state(BlockId(target), exit);
        Ok(Control::Forked)
    }

    /// Entry state of a handler reached by an exception: the stack unwound
    /// to the handler's level plus the exception placeholders.
    fn handler_state<S: ValueSystem<Value = V>>(
        &self,
        level: usize,
        kind: HandlerKind,
        ctx: &mut Context<S>,
    ) -> BlockState<V> {
        let mut stack = self.stack.snapshot();
        stack.truncate(level);
        let exception = Variable::from_value(ctx.singleton(EXCEPTION));
        stack.extend(std::iter::repeat_n(exception, kind.exception_slots()));
        self.snapshot_with(&Condition::True, stack)
    }

    fn setup_handler<S: ValueSystem<Value = V>>(
        &mut self,
        target: usize,
        kind: HandlerKind,
        ctx: &mut Context<S>,
    ) {
        let level = self.stack.len();
        self.handler_levels.insert(target, (level, kind));
        let state = self.handler_state(level, kind, ctx);
        self.merge_state(BlockId(target), state);
    }

    fn raise<S: ValueSystem<Value = V>>(&mut self, inst: &Instruction, ctx: &mut Context<S>) {
        let Some(handler) = inst.block_target else {
            return;
        };
        let (level, kind) = self
            .handler_levels
            .get(&handler)
            .copied()
            .unwrap_or((self.stack.len(), HandlerKind::Except));
        let state = self.handler_state(level, kind, ctx);
        self.merge_state(BlockId(handler), state);
    }
}

/// Splits the values of `CALL_FUNCTION_KW`: the last `names.len()` values
/// are keyword arguments.
fn keyword_args<S: ValueSystem>(
    names: &Variable<S::Value>,
    mut values: Vec<Variable<S::Value>>,
    ctx: &mut Context<S>,
) -> Args<Variable<S::Value>> {
    let names = names
        .get_atomic_value()
        .ok()
        .and_then(|names| ctx.values.string_items(names))
        .filter(|names| names.len() <= values.len());
    let Some(names) = names else {
        tracing::debug!("keyword names unknown; passing all arguments positionally");
        return Args::positional(values);
    };
    let keyword_values = values.split_off(values.len() - names.len());
    Args {
        positional: values,
        keyword: names.into_iter().zip(keyword_values).collect(),
    }
}

/// Arguments of `CALL_FUNCTION_EX`. Unknown shapes contribute nothing, so
/// the callee's parameters fall back to the unknown value.
fn unpacked_args<S: ValueSystem>(
    star: &Variable<S::Value>,
    kwargs: Option<&Variable<S::Value>>,
    ctx: &mut Context<S>,
) -> Args<Variable<S::Value>> {
    let positional = star
        .get_atomic_value()
        .ok()
        .and_then(|star| ctx.values.unpack(star, None))
        .unwrap_or_default();
    let keyword = kwargs
        .and_then(|kwargs| kwargs.get_atomic_value().ok())
        .and_then(|kwargs| ctx.values.keyword_items(kwargs))
        .unwrap_or_default();
    Args {
        positional: positional.into_iter().map(Variable::from_value).collect(),
        keyword: keyword
            .into_iter()
            .map(|(name, value)| (name, Variable::from_value(value)))
            .collect(),
    }
}
