use indexmap::IndexSet;

use crate::{BuildError, CodeFlags, CodeObject, Constant, Instruction, Opcode};

/// A forward-declarable jump destination inside a [`CodeBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Assembles a [`CodeObject`] instruction by instruction.
///
/// Jumps name their destination through a [`Label`] that may be bound before
/// or after the jump is emitted; [`finish`](Self::finish) resolves every label
/// to an instruction index. Name, constant and cell operands are interned so
/// that repeated references share one slot.
#[derive(Debug)]
pub struct CodeBuilder {
    name: String,
    argcount: usize,
    kwonly_argcount: usize,
    flags: CodeFlags,
    line: u32,
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    jumps: Vec<(usize, Label)>,
    derefs: Vec<(usize, String)>,
    consts: Vec<Constant<Box<CodeObject>>>,
    names: IndexSet<String>,
    varnames: IndexSet<String>,
    cellvars: IndexSet<String>,
    freevars: IndexSet<String>,
}

impl CodeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argcount: 0,
            kwonly_argcount: 0,
            flags: CodeFlags::empty(),
            line: 1,
            instructions: Vec::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            derefs: Vec::new(),
            consts: Vec::new(),
            names: IndexSet::new(),
            varnames: IndexSet::new(),
            cellvars: IndexSet::new(),
            freevars: IndexSet::new(),
        }
    }

    /// Declares positional parameters; they occupy the first local slots.
    pub fn params<S: AsRef<str>>(&mut self, params: &[S]) -> &mut Self {
        for param in params {
            self.varnames.insert(param.as_ref().to_string());
        }
        self.argcount = params.len();
        self
    }

    pub fn kwonly_params<S: AsRef<str>>(&mut self, params: &[S]) -> &mut Self {
        for param in params {
            self.varnames.insert(param.as_ref().to_string());
        }
        self.kwonly_argcount = params.len();
        self
    }

    pub fn flags(&mut self, flags: CodeFlags) -> &mut Self {
        self.flags = self.flags | flags;
        self
    }

    /// Sets the source line attached to subsequently emitted instructions.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next instruction to be emitted.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.instructions.len());
        self
    }

    /// Index the next emitted instruction will receive.
    pub fn position(&self) -> usize {
        self.instructions.len()
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        let index = self.instructions.len();
        self.instructions.push(Instruction::new(index, self.line, op));
        self
    }

    pub fn op_arg(&mut self, op: Opcode, arg: u32) -> &mut Self {
        let index = self.instructions.len();
        self.instructions
            .push(Instruction::new(index, self.line, op).with_arg(arg));
        self
    }

    /// Emits a jump-carrying instruction whose target is resolved at
    /// [`finish`](Self::finish).
    pub fn jump(&mut self, op: Opcode, label: Label) -> &mut Self {
        self.jumps.push((self.instructions.len(), label));
        self.op(op)
    }

    pub fn constant(&mut self, constant: Constant<Box<CodeObject>>) -> u32 {
        if !matches!(constant, Constant::Code(_)) {
            if let Some(pos) = self.consts.iter().position(|c| *c == constant) {
                return pos as u32;
            }
        }
        self.consts.push(constant);
        (self.consts.len() - 1) as u32
    }

    pub fn name(&mut self, name: &str) -> u32 {
        self.names.insert_full(name.to_string()).0 as u32
    }

    pub fn varname(&mut self, name: &str) -> u32 {
        self.varnames.insert_full(name.to_string()).0 as u32
    }

    pub fn cellvar(&mut self, name: &str) -> &mut Self {
        self.cellvars.insert(name.to_string());
        self
    }

    pub fn freevar(&mut self, name: &str) -> &mut Self {
        self.freevars.insert(name.to_string());
        self.flags = self.flags | CodeFlags::NESTED;
        self
    }

    pub fn load_const(&mut self, constant: Constant<Box<CodeObject>>) -> &mut Self {
        let arg = self.constant(constant);
        self.op_arg(Opcode::LoadConst, arg)
    }

    pub fn load_int(&mut self, value: i64) -> &mut Self {
        self.load_const(Constant::Int(value))
    }

    pub fn load_str(&mut self, value: &str) -> &mut Self {
        self.load_const(Constant::Str(value.to_string()))
    }

    pub fn load_none(&mut self) -> &mut Self {
        self.load_const(Constant::None)
    }

    pub fn load_code(&mut self, code: CodeObject) -> &mut Self {
        self.load_const(Constant::Code(Box::new(code)))
    }

    pub fn name_op(&mut self, op: Opcode, name: &str) -> &mut Self {
        let arg = self.name(name);
        self.op_arg(op, arg)
    }

    pub fn load_name(&mut self, name: &str) -> &mut Self {
        self.name_op(Opcode::LoadName, name)
    }

    pub fn store_name(&mut self, name: &str) -> &mut Self {
        self.name_op(Opcode::StoreName, name)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        self.name_op(Opcode::LoadGlobal, name)
    }

    pub fn store_global(&mut self, name: &str) -> &mut Self {
        self.name_op(Opcode::StoreGlobal, name)
    }

    pub fn load_attr(&mut self, name: &str) -> &mut Self {
        self.name_op(Opcode::LoadAttr, name)
    }

    pub fn store_attr(&mut self, name: &str) -> &mut Self {
        self.name_op(Opcode::StoreAttr, name)
    }

    pub fn load_method(&mut self, name: &str) -> &mut Self {
        self.name_op(Opcode::LoadMethod, name)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let arg = self.varname(name);
        self.op_arg(Opcode::LoadFast, arg)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let arg = self.varname(name);
        self.op_arg(Opcode::StoreFast, arg)
    }

    /// Emits a closure-cell instruction; the cell index is resolved once all
    /// cell and free variables are known.
    pub fn deref_op(&mut self, op: Opcode, name: &str) -> &mut Self {
        self.derefs.push((self.instructions.len(), name.to_string()));
        self.op_arg(op, 0)
    }

    pub fn load_deref(&mut self, name: &str) -> &mut Self {
        self.deref_op(Opcode::LoadDeref, name)
    }

    pub fn store_deref(&mut self, name: &str) -> &mut Self {
        self.deref_op(Opcode::StoreDeref, name)
    }

    pub fn load_closure(&mut self, name: &str) -> &mut Self {
        self.deref_op(Opcode::LoadClosure, name)
    }

    pub fn call(&mut self, argc: u32) -> &mut Self {
        self.op_arg(Opcode::CallFunction, argc)
    }

    pub fn pop_top(&mut self) -> &mut Self {
        self.op(Opcode::PopTop)
    }

    pub fn return_value(&mut self) -> &mut Self {
        self.op(Opcode::ReturnValue)
    }

    /// `MAKE_FUNCTION` preceded by the code constant and qualified name.
    pub fn make_function(&mut self, code: CodeObject, flags: u32) -> &mut Self {
        let qualname = code.name.clone();
        self.load_code(code);
        self.load_str(&qualname);
        self.op_arg(Opcode::MakeFunction, flags)
    }

    pub fn finish(&mut self) -> Result<CodeObject, BuildError> {
        let mut instructions = std::mem::take(&mut self.instructions);
        for (index, label) in self.jumps.drain(..) {
            let target = self.labels[label.0].ok_or(BuildError::UnboundLabel {
                label: label.0,
                index,
            })?;
            instructions[index].target = Some(target);
        }
        for (index, name) in self.derefs.drain(..) {
            let arg = match self.cellvars.get_index_of(&name) {
                Some(cell) => cell,
                None => self
                    .freevars
                    .get_index_of(&name)
                    .map(|free| self.cellvars.len() + free)
                    .ok_or(BuildError::UnknownCell {
                        name: name.clone(),
                        index,
                    })?,
            };
            instructions[index].arg = Some(arg as u32);
        }
        let mut flags = self.flags;
        if self.freevars.is_empty() && self.cellvars.is_empty() {
            flags = flags | CodeFlags::NOFREE;
        }
        Ok(CodeObject::builder()
            .name(self.name.clone())
            .argcount(self.argcount)
            .kwonly_argcount(self.kwonly_argcount)
            .flags(flags)
            .consts(std::mem::take(&mut self.consts))
            .names(self.names.drain(..).collect())
            .varnames(self.varnames.drain(..).collect())
            .cellvars(self.cellvars.drain(..).collect())
            .freevars(self.freevars.drain(..).collect())
            .instructions(instructions)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_resolve_forward_and_backward() {
        let mut b = CodeBuilder::new("loop");
        let top = b.label();
        let exit = b.label();
        b.bind(top);
        b.load_name("x").jump(Opcode::PopJumpIfFalse, exit);
        b.jump(Opcode::JumpAbsolute, top);
        b.bind(exit);
        b.load_none().return_value();
        let code = b.finish().unwrap();
        assert_eq!(code.instructions[1].target, Some(3));
        assert_eq!(code.instructions[2].target, Some(0));
        assert_eq!(code.names, ["x"]);
    }

    #[test]
    fn unbound_label_is_reported() {
        let mut b = CodeBuilder::new("bad");
        let nowhere = b.label();
        b.jump(Opcode::JumpForward, nowhere);
        assert_eq!(
            b.finish().unwrap_err(),
            BuildError::UnboundLabel { label: 0, index: 0 }
        );
    }

    #[test]
    fn constants_and_cells_are_interned() {
        let mut b = CodeBuilder::new("f");
        b.cellvar("c").freevar("x");
        b.load_int(1).load_int(1).load_deref("x").load_deref("c");
        let code = b.finish().unwrap();
        assert_eq!(code.consts.len(), 1);
        assert_eq!(code.instructions[2].arg, Some(1));
        assert_eq!(code.instructions[3].arg, Some(0));
        assert!(code.flags.contains(CodeFlags::NESTED));
    }
}
