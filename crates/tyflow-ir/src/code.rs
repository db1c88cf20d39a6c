use std::fmt;
use std::ops::BitOr;

use crate::Instruction;

/// Code-object flag bits as emitted by the analyzed language's compiler.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodeFlags(pub u32);

impl CodeFlags {
    pub const OPTIMIZED: CodeFlags = CodeFlags(0x0001);
    pub const NEWLOCALS: CodeFlags = CodeFlags(0x0002);
    pub const VARARGS: CodeFlags = CodeFlags(0x0004);
    pub const VARKEYWORDS: CodeFlags = CodeFlags(0x0008);
    pub const NESTED: CodeFlags = CodeFlags(0x0010);
    pub const GENERATOR: CodeFlags = CodeFlags(0x0020);
    pub const NOFREE: CodeFlags = CodeFlags(0x0040);
    pub const COROUTINE: CodeFlags = CodeFlags(0x0080);
    pub const ITERABLE_COROUTINE: CodeFlags = CodeFlags(0x0100);
    pub const ASYNC_GENERATOR: CodeFlags = CodeFlags(0x0200);

    pub const fn empty() -> Self {
        CodeFlags(0)
    }

    pub const fn contains(self, other: CodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn has_varargs(self) -> bool {
        self.contains(Self::VARARGS)
    }

    pub fn has_varkeywords(self) -> bool {
        self.contains(Self::VARKEYWORDS)
    }

    pub fn is_generator(self) -> bool {
        self.contains(Self::GENERATOR)
    }

    pub fn is_coroutine(self) -> bool {
        self.contains(Self::COROUTINE) || self.contains(Self::ITERABLE_COROUTINE)
    }

    pub fn is_async_generator(self) -> bool {
        self.contains(Self::ASYNC_GENERATOR)
    }
}

impl BitOr for CodeFlags {
    type Output = CodeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        CodeFlags(self.0 | rhs.0)
    }
}

/// A literal from a code object's constant pool.
///
/// `C` is the representation of nested code objects: raw [`CodeObject`]s as
/// produced by the decoder, ordered graphs after CFG construction.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant<C> {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
    Tuple(Vec<Constant<C>>),
    Code(C),
}

impl<C> Constant<C> {
    /// Rebuilds the constant with every nested code object converted by `f`.
    pub fn try_map_code<D, E>(
        self,
        f: &mut impl FnMut(C) -> Result<D, E>,
    ) -> Result<Constant<D>, E> {
        Ok(match self {
            Constant::None => Constant::None,
            Constant::Bool(b) => Constant::Bool(b),
            Constant::Int(i) => Constant::Int(i),
            Constant::Float(x) => Constant::Float(x),
            Constant::Str(s) => Constant::Str(s),
            Constant::Bytes(b) => Constant::Bytes(b),
            Constant::Ellipsis => Constant::Ellipsis,
            Constant::Tuple(items) => Constant::Tuple(
                items
                    .into_iter()
                    .map(|item| item.try_map_code(f))
                    .collect::<Result<_, _>>()?,
            ),
            Constant::Code(code) => Constant::Code(f(code)?),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&C> {
        match self {
            Constant::Code(code) => Some(code),
            _ => None,
        }
    }
}

impl<C> fmt::Display for Constant<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
            Constant::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Constant::Ellipsis => f.write_str("..."),
            Constant::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Constant::Code(_) => f.write_str("<code>"),
        }
    }
}

/// A decoded code body: the instruction list plus the static metadata the
/// decoder reads from the binary code object.
#[derive(Clone, Debug, PartialEq, bon::Builder)]
#[builder(on(String, into))]
pub struct CodeObject {
    pub name: String,
    #[builder(default = String::from("<unknown>"))]
    pub filename: String,
    #[builder(default = 1)]
    pub first_line: u32,
    #[builder(default)]
    pub argcount: usize,
    #[builder(default)]
    pub posonly_argcount: usize,
    #[builder(default)]
    pub kwonly_argcount: usize,
    #[builder(default)]
    pub flags: CodeFlags,
    #[builder(default)]
    pub consts: Vec<Constant<Box<CodeObject>>>,
    #[builder(default)]
    pub names: Vec<String>,
    #[builder(default)]
    pub varnames: Vec<String>,
    #[builder(default)]
    pub cellvars: Vec<String>,
    #[builder(default)]
    pub freevars: Vec<String>,
    #[builder(default)]
    pub instructions: Vec<Instruction>,
}

/// Static metadata shared by [`CodeObject`] and the ordered graph built from
/// it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeInfo {
    pub name: String,
    pub filename: String,
    pub first_line: u32,
    pub argcount: usize,
    pub posonly_argcount: usize,
    pub kwonly_argcount: usize,
    pub flags: CodeFlags,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
}

impl CodeInfo {
    /// Parameter names in declaration order: positional, keyword-only, then
    /// the `*args` and `**kwargs` collectors when present.
    pub fn param_names(&self) -> &[String] {
        let mut count = self.argcount + self.kwonly_argcount;
        if self.flags.has_varargs() {
            count += 1;
        }
        if self.flags.has_varkeywords() {
            count += 1;
        }
        &self.varnames[..count.min(self.varnames.len())]
    }

    /// Resolves a closure-cell argument: cell variables first, then free
    /// variables.
    pub fn cell_name(&self, arg: u32) -> Option<&str> {
        let arg = arg as usize;
        if arg < self.cellvars.len() {
            Some(&self.cellvars[arg])
        } else {
            self.freevars
                .get(arg - self.cellvars.len())
                .map(String::as_str)
        }
    }

    pub fn is_freevar(&self, name: &str) -> bool {
        self.freevars.iter().any(|free| free == name)
    }
}

impl CodeObject {
    /// Splits the code object into its metadata, constant pool and
    /// instruction list.
    pub fn into_parts(self) -> (CodeInfo, Vec<Constant<Box<CodeObject>>>, Vec<Instruction>) {
        let info = CodeInfo {
            name: self.name,
            filename: self.filename,
            first_line: self.first_line,
            argcount: self.argcount,
            posonly_argcount: self.posonly_argcount,
            kwonly_argcount: self.kwonly_argcount,
            flags: self.flags,
            names: self.names,
            varnames: self.varnames,
            cellvars: self.cellvars,
            freevars: self.freevars,
        };
        (info, self.consts, self.instructions)
    }

    pub fn from_parts(
        info: CodeInfo,
        consts: Vec<Constant<Box<CodeObject>>>,
        instructions: Vec<Instruction>,
    ) -> Self {
        CodeObject {
            name: info.name,
            filename: info.filename,
            first_line: info.first_line,
            argcount: info.argcount,
            posonly_argcount: info.posonly_argcount,
            kwonly_argcount: info.kwonly_argcount,
            flags: info.flags,
            consts,
            names: info.names,
            varnames: info.varnames,
            cellvars: info.cellvars,
            freevars: info.freevars,
            instructions,
        }
    }
}
