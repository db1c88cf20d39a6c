use std::fmt::Debug;

use indexmap::IndexMap;
use tyflow_ir::Constant;

use super::Frame;
use crate::{
    Args, BuildKind, Context, FrameFunction, FrameToken, FunctionId, Handle,
    InterpreterClass, InterpreterError, ValueSystem, Variable,
};

impl<V: Clone + PartialEq + Debug> Frame<V> {
    /// Calls every binding of `callee`, unioning the results under the
    /// bindings' conditions. A method receiver is prepended to the
    /// arguments of interpreter-owned functions only; bound methods built by
    /// the value system already carry it.
    pub(super) fn call_variable<S: ValueSystem<Value = V>>(
        &mut self,
        callee: &Variable<V>,
        args: Args<Variable<V>>,
        receiver: Option<Variable<V>>,
        ctx: &mut Context<S>,
    ) -> Result<Variable<V>, InterpreterError> {
        let mut result = Variable::empty();
        for binding in callee.bindings() {
            let returned = match ctx.values.unwrap(binding.value()) {
                Some(Handle::Function(id)) => {
                    let mut args = args.clone();
                    if let Some(receiver) = &receiver {
                        args.positional.insert(0, receiver.clone());
                    }
                    self.call_function(id, args, ctx)?
                }
                Some(Handle::BuildClass) => self.build_class(args.clone(), ctx)?,
                _ => {
                    let joined = args.clone().map(|arg| ctx.join_variable(&arg));
                    Variable::from_value(ctx.values.call(binding.value(), &joined))
                }
            };
            result = result.union(&returned.with_condition(binding.condition()));
        }
        if result.is_empty() {
            result = ctx.unknown_variable();
        }
        Ok(ctx.limit(result))
    }

    /// The closure of `function` as seen by a call from this frame: the
    /// defining frame passes its current cell values, everyone else the
    /// values captured at creation.
    fn closure_for(
        &mut self,
        function: &FrameFunction<V>,
        ctx: &mut Context<impl ValueSystem<Value = V>>,
    ) -> IndexMap<String, Variable<V>> {
        if Some(function.owner) == self.token {
            let names: Vec<String> = function.closure.keys().cloned().collect();
            self.capture(&names, ctx)
        } else {
            function.closure.clone()
        }
    }

    fn call_function<S: ValueSystem<Value = V>>(
        &mut self,
        id: FunctionId,
        args: Args<Variable<V>>,
        ctx: &mut Context<S>,
    ) -> Result<Variable<V>, InterpreterError> {
        if self.depth + 1 > ctx.config().max_depth {
            tracing::debug!(
                frame = self.name(),
                callee = %id,
                depth = self.depth,
                "call depth limit reached"
            );
            return Ok(ctx.unknown_variable());
        }
        if ctx.is_active(id) {
            tracing::debug!(frame = self.name(), callee = %id, "recursive call not followed");
            return Ok(ctx.unknown_variable());
        }
        let mut function = ctx.expect_function(id).clone();
        function.closure = self.closure_for(&function, ctx);
        let locals = bind_arguments(&function, args, ctx);
        let mut child = Frame::for_function(id, &function, self.global_view(), locals, self.depth + 1);
        ctx.enter_function(id);
        let outcome = child.run(ctx);
        ctx.leave_function(id);
        if let Err(error) = outcome {
            tracing::warn!(callee = function.name(), %error, "function body aborted");
            return Ok(ctx.unknown_variable());
        }
        self.absorb_child(&child, function.owner);

        let flags = function.code.flags();
        let result = if flags.is_generator() || flags.is_async_generator() {
            let yields = child.yield_variable().values().cloned().collect();
            Variable::from_value(ctx.values.build(BuildKind::Generator, yields))
        } else if flags.is_coroutine() {
            let returns = child.return_variable().values().cloned().collect();
            Variable::from_value(ctx.values.build(BuildKind::Coroutine, returns))
        } else if child.return_variable().is_empty() {
            ctx.unknown_variable()
        } else {
            child.return_variable().clone()
        };
        Ok(result)
    }

    /// `__build_class__(body, name, *bases)`: runs the class body and hands
    /// the result to the value system.
    fn build_class<S: ValueSystem<Value = V>>(
        &mut self,
        args: Args<Variable<V>>,
        ctx: &mut Context<S>,
    ) -> Result<Variable<V>, InterpreterError> {
        let mut positional = args.positional.into_iter();
        let body = positional
            .next()
            .and_then(|body| body.get_atomic_value().ok().cloned())
            .and_then(|body| match ctx.values.unwrap(&body) {
                Some(Handle::Function(id)) => Some(id),
                _ => None,
            });
        let Some(body) = body else {
            tracing::debug!(frame = self.name(), "class body is not a known function");
            return Ok(ctx.unknown_variable());
        };
        // The name argument duplicates the body's code name.
        positional.next();
        let bases: Vec<V> = positional.map(|base| ctx.join_variable(&base)).collect();

        let function = ctx.expect_function(body).clone();
        let closure = self.closure_for(&function, ctx);
        let mut child = Frame::for_class(&function, self.global_view(), closure, self.depth + 1);
        if let Err(error) = child.run(ctx) {
            tracing::warn!(class = function.name(), %error, "class body aborted");
            return Ok(ctx.unknown_variable());
        }
        self.absorb_child(&child, function.owner);

        let class = InterpreterClass {
            name: function.name.clone(),
            bases,
            members: child.final_locals().clone(),
            functions: child.functions().to_vec(),
            code: function.code.clone(),
        };
        let id = ctx.add_class(class);
        self.classes.push(id);
        Ok(Variable::from_value(ctx.construct_class(id)))
    }

    /// Applies the scope writes of a finished child frame. Global writes
    /// bubble up one frame at a time; nonlocal writes only apply to the
    /// frame that defined the child's function.
    fn absorb_child(&mut self, child: &Frame<V>, owner: FrameToken) {
        for (name, var) in child.shadowed_globals() {
            self.store_global(name, var.clone());
        }
        if child.shadowed_nonlocals().is_empty() {
            return;
        }
        if Some(owner) != self.token {
            tracing::debug!(
                frame = self.name(),
                child = child.name(),
                "dropping nonlocal writes of a function defined elsewhere"
            );
            return;
        }
        for (name, var) in child.shadowed_nonlocals() {
            self.store_deref(name, var.clone());
        }
    }

    pub(super) fn make_function<S: ValueSystem<Value = V>>(
        &mut self,
        index: usize,
        flags: u32,
        ctx: &mut Context<S>,
    ) -> Result<Variable<V>, InterpreterError> {
        // The qualified name; functions are known by their code name.
        self.stack.pop()?;
        let code = self.stack.pop()?;
        let code = code
            .get_atomic_value()
            .ok()
            .and_then(|value| match ctx.values.unwrap(value) {
                Some(Handle::Code(id)) => ctx.code(id).cloned(),
                _ => None,
            })
            .ok_or(InterpreterError::UnknownCode { index })?;

        if flags & 0x08 != 0 {
            self.stack.pop()?;
        }
        if flags & 0x04 != 0 {
            self.stack.pop()?;
        }
        let kwdefaults = if flags & 0x02 != 0 {
            let mapping = self.stack.pop()?;
            keyword_defaults(&mapping, ctx)
        } else {
            IndexMap::new()
        };
        let defaults = if flags & 0x01 != 0 {
            let tuple = self.stack.pop()?;
            positional_defaults(&tuple, ctx)
        } else {
            Vec::new()
        };

        let name = code.name().to_owned();
        let closure = self.capture(code.freevars(), ctx);
        let Some(owner) = self.token else {
            return Ok(ctx.unknown_variable());
        };
        let id = ctx.add_function(FrameFunction {
            name,
            code,
            defaults,
            kwdefaults,
            closure,
            globals: self.global_view(),
            owner,
        });
        self.functions.push(id);
        Ok(Variable::from_value(ctx.wrap(Handle::Function(id))))
    }
}

fn positional_defaults<S: ValueSystem>(
    tuple: &Variable<S::Value>,
    ctx: &mut Context<S>,
) -> Vec<Variable<S::Value>> {
    let Ok(value) = tuple.get_atomic_value() else {
        return Vec::new();
    };
    match ctx.values.unpack(value, None) {
        Some(items) => items.into_iter().map(Variable::from_value).collect(),
        None => Vec::new(),
    }
}

fn keyword_defaults<S: ValueSystem>(
    mapping: &Variable<S::Value>,
    ctx: &mut Context<S>,
) -> IndexMap<String, Variable<S::Value>> {
    let Ok(value) = mapping.get_atomic_value() else {
        return IndexMap::new();
    };
    ctx.values
        .keyword_items(value)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name, Variable::from_value(value)))
        .collect()
}

/// Binds call arguments to the parameters of `function`. Missing
/// arguments without a default are bound to the unknown value; surplus
/// positional and keyword arguments go to the `*args` and `**kwargs`
/// collectors when the code has them.
fn bind_arguments<S: ValueSystem>(
    function: &FrameFunction<S::Value>,
    args: Args<Variable<S::Value>>,
    ctx: &mut Context<S>,
) -> IndexMap<String, Variable<S::Value>> {
    let info = function.code.info();
    let params = function.code.param_names();
    let positional_count = info.argcount.min(params.len());
    let named_count = (info.argcount + info.kwonly_argcount).min(params.len());
    let (positional_names, rest) = params.split_at(positional_count);
    let kwonly_names = &rest[..named_count - positional_count];

    let mut locals: IndexMap<String, Variable<S::Value>> = IndexMap::new();
    let mut surplus = Vec::new();
    for (i, arg) in args.positional.into_iter().enumerate() {
        match positional_names.get(i) {
            Some(name) => {
                locals.insert(name.clone(), arg);
            }
            None => surplus.push(arg),
        }
    }
    let mut surplus_keywords = IndexMap::new();
    for (name, arg) in args.keyword {
        let is_param = params[..named_count].contains(&name);
        if is_param && !locals.contains_key(&name) {
            locals.insert(name, arg);
        } else {
            surplus_keywords.insert(name, arg);
        }
    }

    let first_default = positional_count.saturating_sub(function.defaults.len());
    for (i, name) in positional_names.iter().enumerate() {
        if locals.contains_key(name) {
            continue;
        }
        let default = match i.checked_sub(first_default) {
            Some(offset) => function.defaults.get(offset).cloned(),
            None => None,
        };
        let value = match default {
            Some(default) => default,
            None => {
                tracing::debug!(function = function.name(), param = name.as_str(), "missing argument");
                ctx.unknown_variable()
            }
        };
        locals.insert(name.clone(), value);
    }
    for name in kwonly_names {
        if locals.contains_key(name) {
            continue;
        }
        let value = match function.kwdefaults.get(name) {
            Some(default) => default.clone(),
            None => ctx.unknown_variable(),
        };
        locals.insert(name.clone(), value);
    }

    let mut collectors = params[named_count..].iter();
    if info.flags.has_varargs() {
        if let Some(name) = collectors.next() {
            let items = surplus.iter().map(|arg| ctx.join_variable(arg)).collect();
            let tuple = ctx.values.build(BuildKind::Tuple, items);
            locals.insert(name.clone(), Variable::from_value(tuple));
        }
    }
    if info.flags.has_varkeywords() {
        if let Some(name) = collectors.next() {
            let mut items = Vec::with_capacity(surplus_keywords.len() * 2);
            for (key, arg) in &surplus_keywords {
                items.push(ctx.values.constant(&Constant::Str(key.clone())));
                items.push(ctx.join_variable(arg));
            }
            let dict = ctx.values.build(BuildKind::Dict, items);
            locals.insert(name.clone(), Variable::from_value(dict));
        }
    }

    locals
        .into_iter()
        .map(|(name, var)| {
            let var = var.named(name.clone());
            (name, var)
        })
        .collect()
}
