//! Name resolution.
//!
//! Every write lands in the frame's own locals. Writes that belong to the
//! global scope or to an enclosing function are remembered in a shadow set
//! so that reads prefer the local copy and the value can be handed back
//! when the frame finishes. The module frame is the global scope and never
//! shadows.

use std::fmt::Debug;

use indexmap::IndexMap;

use super::{Frame, FrameKind};
use crate::{Context, ValueSystem, Variable};

impl<V: Clone + PartialEq + Debug> Frame<V> {
    pub(super) fn store_local(&mut self, name: &str, value: Variable<V>) {
        self.current.set(name, value);
    }

    pub(super) fn store_global(&mut self, name: &str, value: Variable<V>) {
        if self.kind != FrameKind::Module {
            self.global_shadows.insert(name.to_owned());
        }
        self.current.set(name, value);
    }

    pub(super) fn store_deref(&mut self, name: &str, value: Variable<V>) {
        if self.code.info().is_freevar(name) {
            self.nonlocal_shadows.insert(name.to_owned());
        }
        self.current.set(name, value);
    }

    pub(super) fn delete_local(&mut self, name: &str) {
        self.current.remove(name);
    }

    fn unresolved<S: ValueSystem<Value = V>>(
        &mut self,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Variable<V> {
        match ctx.builtin(name) {
            Some(value) => Variable::from_value(value),
            None => {
                tracing::debug!(frame = self.name(), variable = name, "unresolved name");
                ctx.unknown_variable()
            }
        }
    }

    /// `LOAD_FAST`: a function local, or unknown before its first write.
    pub(super) fn read_fast<S: ValueSystem<Value = V>>(
        &mut self,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Variable<V> {
        match self.current.get(name) {
            Some(var) => var.clone(),
            None => {
                tracing::debug!(frame = self.name(), variable = name, "local read before assignment");
                ctx.unknown_variable()
            }
        }
    }

    /// `LOAD_NAME`: locals, then the global scope.
    pub(super) fn read_name<S: ValueSystem<Value = V>>(
        &mut self,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Variable<V> {
        match self.current.get(name) {
            Some(var) => var.clone(),
            None => self.read_global(name, ctx),
        }
    }

    /// `LOAD_GLOBAL`: a shadowed global, the global scope captured at
    /// creation, then builtins.
    pub(super) fn read_global<S: ValueSystem<Value = V>>(
        &mut self,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Variable<V> {
        if self.kind == FrameKind::Module || self.global_shadows.contains(name) {
            if let Some(var) = self.current.get(name) {
                return var.clone();
            }
        }
        if self.kind != FrameKind::Module {
            if let Some(var) = self.globals.get(name) {
                return var.clone();
            }
        }
        self.unresolved(name, ctx)
    }

    /// `LOAD_DEREF`: own cells and written free variables from the locals,
    /// otherwise the captured closure.
    pub(super) fn read_deref<S: ValueSystem<Value = V>>(
        &mut self,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Variable<V> {
        let own = !self.code.info().is_freevar(name) || self.nonlocal_shadows.contains(name);
        if own {
            if let Some(var) = self.current.get(name) {
                return var.clone();
            }
        }
        match self.closure.get(name) {
            Some(var) => var.clone(),
            None => {
                tracing::debug!(frame = self.name(), variable = name, "unbound cell");
                ctx.unknown_variable()
            }
        }
    }

    /// `LOAD_CLASSDEREF`: class-body locals first, then the closure.
    pub(super) fn read_classderef<S: ValueSystem<Value = V>>(
        &mut self,
        name: &str,
        ctx: &mut Context<S>,
    ) -> Variable<V> {
        match self.current.get(name) {
            Some(var) => var.clone(),
            None => self.read_deref(name, ctx),
        }
    }

    /// The global scope a frame created from here would see.
    pub(super) fn global_view(&self) -> IndexMap<String, Variable<V>> {
        if self.kind == FrameKind::Module {
            return self.current.locals().clone();
        }
        let mut view = self.globals.clone();
        for name in &self.global_shadows {
            if let Some(var) = self.current.get(name) {
                view.insert(name.clone(), var.clone());
            }
        }
        view
    }

    /// Current values of `names` as seen through this frame's cells.
    pub(super) fn capture<S: ValueSystem<Value = V>>(
        &mut self,
        names: &[String],
        ctx: &mut Context<S>,
    ) -> IndexMap<String, Variable<V>> {
        let mut captured = IndexMap::new();
        for name in names {
            let var = self.read_deref(name, ctx);
            captured.insert(name.clone(), var);
        }
        captured
    }
}
