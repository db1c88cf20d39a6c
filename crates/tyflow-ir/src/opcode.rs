use std::fmt;

/// Binary arithmetic and bitwise operators shared by the `BINARY_*` and
/// `INPLACE_*` instruction families.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOperator {
    Power,
    Multiply,
    MatrixMultiply,
    FloorDivide,
    TrueDivide,
    Modulo,
    Add,
    Subtract,
    Lshift,
    Rshift,
    And,
    Xor,
    Or,
}

impl BinaryOperator {
    pub const ALL: [BinaryOperator; 13] = [
        BinaryOperator::Power,
        BinaryOperator::Multiply,
        BinaryOperator::MatrixMultiply,
        BinaryOperator::FloorDivide,
        BinaryOperator::TrueDivide,
        BinaryOperator::Modulo,
        BinaryOperator::Add,
        BinaryOperator::Subtract,
        BinaryOperator::Lshift,
        BinaryOperator::Rshift,
        BinaryOperator::And,
        BinaryOperator::Xor,
        BinaryOperator::Or,
    ];

    /// Suffix used in the symbolic instruction name (`BINARY_<suffix>`).
    pub fn suffix(self) -> &'static str {
        match self {
            BinaryOperator::Power => "POWER",
            BinaryOperator::Multiply => "MULTIPLY",
            BinaryOperator::MatrixMultiply => "MATRIX_MULTIPLY",
            BinaryOperator::FloorDivide => "FLOOR_DIVIDE",
            BinaryOperator::TrueDivide => "TRUE_DIVIDE",
            BinaryOperator::Modulo => "MODULO",
            BinaryOperator::Add => "ADD",
            BinaryOperator::Subtract => "SUBTRACT",
            BinaryOperator::Lshift => "LSHIFT",
            BinaryOperator::Rshift => "RSHIFT",
            BinaryOperator::And => "AND",
            BinaryOperator::Xor => "XOR",
            BinaryOperator::Or => "OR",
        }
    }

    /// The special method the analyzed language dispatches this operator to.
    pub fn dunder(self) -> &'static str {
        match self {
            BinaryOperator::Power => "__pow__",
            BinaryOperator::Multiply => "__mul__",
            BinaryOperator::MatrixMultiply => "__matmul__",
            BinaryOperator::FloorDivide => "__floordiv__",
            BinaryOperator::TrueDivide => "__truediv__",
            BinaryOperator::Modulo => "__mod__",
            BinaryOperator::Add => "__add__",
            BinaryOperator::Subtract => "__sub__",
            BinaryOperator::Lshift => "__lshift__",
            BinaryOperator::Rshift => "__rshift__",
            BinaryOperator::And => "__and__",
            BinaryOperator::Xor => "__xor__",
            BinaryOperator::Or => "__or__",
        }
    }

    /// The in-place variant of [`dunder`](Self::dunder), e.g. `__iadd__`.
    pub fn inplace_dunder(self) -> &'static str {
        match self {
            BinaryOperator::Power => "__ipow__",
            BinaryOperator::Multiply => "__imul__",
            BinaryOperator::MatrixMultiply => "__imatmul__",
            BinaryOperator::FloorDivide => "__ifloordiv__",
            BinaryOperator::TrueDivide => "__itruediv__",
            BinaryOperator::Modulo => "__imod__",
            BinaryOperator::Add => "__iadd__",
            BinaryOperator::Subtract => "__isub__",
            BinaryOperator::Lshift => "__ilshift__",
            BinaryOperator::Rshift => "__irshift__",
            BinaryOperator::And => "__iand__",
            BinaryOperator::Xor => "__ixor__",
            BinaryOperator::Or => "__ior__",
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOperator {
    Positive,
    Negative,
    Not,
    Invert,
}

impl UnaryOperator {
    pub fn suffix(self) -> &'static str {
        match self {
            UnaryOperator::Positive => "POSITIVE",
            UnaryOperator::Negative => "NEGATIVE",
            UnaryOperator::Not => "NOT",
            UnaryOperator::Invert => "INVERT",
        }
    }

    /// `None` for `not`, which is decided by truthiness rather than a method.
    pub fn dunder(self) -> Option<&'static str> {
        match self {
            UnaryOperator::Positive => Some("__pos__"),
            UnaryOperator::Negative => Some("__neg__"),
            UnaryOperator::Not => None,
            UnaryOperator::Invert => Some("__invert__"),
        }
    }
}

/// Comparison selected by the argument of `COMPARE_OP`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareKind {
    Less,
    LessEqual,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    In,
    NotIn,
    Is,
    IsNot,
    ExceptionMatch,
}

impl CompareKind {
    pub fn from_arg(arg: u32) -> Option<Self> {
        Some(match arg {
            0 => CompareKind::Less,
            1 => CompareKind::LessEqual,
            2 => CompareKind::Equal,
            3 => CompareKind::NotEqual,
            4 => CompareKind::Greater,
            5 => CompareKind::GreaterEqual,
            6 => CompareKind::In,
            7 => CompareKind::NotIn,
            8 => CompareKind::Is,
            9 => CompareKind::IsNot,
            10 => CompareKind::ExceptionMatch,
            _ => return None,
        })
    }

    /// Rich-comparison method, if the comparison dispatches to one.
    pub fn dunder(self) -> Option<&'static str> {
        match self {
            CompareKind::Less => Some("__lt__"),
            CompareKind::LessEqual => Some("__le__"),
            CompareKind::Equal => Some("__eq__"),
            CompareKind::NotEqual => Some("__ne__"),
            CompareKind::Greater => Some("__gt__"),
            CompareKind::GreaterEqual => Some("__ge__"),
            CompareKind::In
            | CompareKind::NotIn
            | CompareKind::Is
            | CompareKind::IsNot
            | CompareKind::ExceptionMatch => None,
        }
    }
}

/// What a block-opening instruction sets up.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HandlerKind {
    Loop,
    Except,
    Finally,
    With,
}

impl HandlerKind {
    /// Whether a raise inside this block transfers control to its target.
    pub fn catches_exceptions(self) -> bool {
        !matches!(self, HandlerKind::Loop)
    }

    /// Number of exception placeholders found on the operand stack when the
    /// handler is entered through an exception.
    pub fn exception_slots(self) -> usize {
        match self {
            HandlerKind::Loop => 0,
            HandlerKind::Except => 6,
            HandlerKind::Finally | HandlerKind::With => 1,
        }
    }
}

/// Instruction kinds of the analyzed stack machine.
///
/// The set is exhaustive: every decoded instruction maps onto one variant and
/// the interpreter matches on all of them.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    // stack manipulation
    Nop,
    PopTop,
    RotTwo,
    RotThree,
    RotFour,
    DupTop,
    DupTopTwo,
    ExtendedArg,

    // names
    LoadConst,
    LoadName,
    StoreName,
    DeleteName,
    LoadFast,
    StoreFast,
    DeleteFast,
    LoadGlobal,
    StoreGlobal,
    DeleteGlobal,
    LoadDeref,
    StoreDeref,
    DeleteDeref,
    LoadClosure,
    LoadClassderef,

    // attributes
    LoadAttr,
    StoreAttr,
    DeleteAttr,
    LoadMethod,

    // calls and definitions
    CallFunction,
    CallFunctionKw,
    CallFunctionEx,
    CallMethod,
    MakeFunction,
    LoadBuildClass,

    // builders
    BuildTuple,
    BuildList,
    BuildSet,
    BuildMap,
    BuildConstKeyMap,
    BuildString,
    ListAppend,
    SetAdd,
    MapAdd,
    UnpackSequence,
    FormatValue,

    // operators
    UnaryOp(UnaryOperator),
    BinaryOp(BinaryOperator),
    InplaceOp(BinaryOperator),
    CompareOp,
    BinarySubscr,
    StoreSubscr,
    DeleteSubscr,

    // control flow
    PopJumpIfFalse,
    PopJumpIfTrue,
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,
    JumpForward,
    JumpAbsolute,
    GetIter,
    ForIter,
    SetupLoop,
    BreakLoop,
    ContinueLoop,
    ReturnValue,

    // exceptions and context managers
    SetupExcept,
    SetupFinally,
    SetupWith,
    SetupAsyncWith,
    PopBlock,
    PopExcept,
    EndFinally,
    Reraise,
    RaiseVarargs,
    WithCleanupStart,
    WithCleanupFinish,

    // generators and coroutines
    YieldValue,
    YieldFrom,
    GetYieldFromIter,
    GetAwaitable,
    GetAiter,
    GetAnext,
    BeforeAsyncWith,
    EndAsyncFor,

    // imports
    ImportName,
    ImportFrom,
    ImportStar,

    SetupAnnotations,
    PrintExpr,
}

impl Opcode {
    /// Whether the instruction carries a jump destination in `target`.
    pub fn has_target(self) -> bool {
        matches!(
            self,
            Opcode::PopJumpIfFalse
                | Opcode::PopJumpIfTrue
                | Opcode::JumpIfFalseOrPop
                | Opcode::JumpIfTrueOrPop
                | Opcode::JumpForward
                | Opcode::JumpAbsolute
                | Opcode::ForIter
                | Opcode::SetupLoop
                | Opcode::ContinueLoop
                | Opcode::SetupExcept
                | Opcode::SetupFinally
                | Opcode::SetupWith
                | Opcode::SetupAsyncWith
        )
    }

    /// Whether execution never continues with the lexically next instruction.
    pub fn no_next(self) -> bool {
        matches!(
            self,
            Opcode::JumpForward
                | Opcode::JumpAbsolute
                | Opcode::ContinueLoop
                | Opcode::BreakLoop
                | Opcode::ReturnValue
                | Opcode::RaiseVarargs
                | Opcode::Reraise
        )
    }

    pub fn carries_on(self) -> bool {
        !self.no_next()
    }

    pub fn pushes_block(self) -> bool {
        self.handler_kind().is_some()
    }

    pub fn pops_block(self) -> bool {
        matches!(self, Opcode::PopBlock)
    }

    pub fn is_conditional_jump(self) -> bool {
        matches!(
            self,
            Opcode::PopJumpIfFalse
                | Opcode::PopJumpIfTrue
                | Opcode::JumpIfFalseOrPop
                | Opcode::JumpIfTrueOrPop
                | Opcode::ForIter
        )
    }

    /// Raises that propagate to the nearest enclosing exception handler.
    pub fn is_reraise(self) -> bool {
        matches!(self, Opcode::RaiseVarargs | Opcode::Reraise)
    }

    /// Early exits that leave the innermost loop.
    pub fn is_loop_exit(self) -> bool {
        matches!(self, Opcode::BreakLoop)
    }

    pub fn handler_kind(self) -> Option<HandlerKind> {
        match self {
            Opcode::SetupLoop => Some(HandlerKind::Loop),
            Opcode::SetupExcept => Some(HandlerKind::Except),
            Opcode::SetupFinally => Some(HandlerKind::Finally),
            Opcode::SetupWith | Opcode::SetupAsyncWith => Some(HandlerKind::With),
            _ => None,
        }
    }

    /// Symbolic name as printed by disassemblers, e.g. `LOAD_CONST`.
    pub fn name(self) -> String {
        match self {
            Opcode::UnaryOp(op) => format!("UNARY_{}", op.suffix()),
            Opcode::BinaryOp(op) => format!("BINARY_{}", op.suffix()),
            Opcode::InplaceOp(op) => format!("INPLACE_{}", op.suffix()),
            other => other.fixed_name().to_string(),
        }
    }

    fn fixed_name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PopTop => "POP_TOP",
            Opcode::RotTwo => "ROT_TWO",
            Opcode::RotThree => "ROT_THREE",
            Opcode::RotFour => "ROT_FOUR",
            Opcode::DupTop => "DUP_TOP",
            Opcode::DupTopTwo => "DUP_TOP_TWO",
            Opcode::ExtendedArg => "EXTENDED_ARG",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadName => "LOAD_NAME",
            Opcode::StoreName => "STORE_NAME",
            Opcode::DeleteName => "DELETE_NAME",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::DeleteFast => "DELETE_FAST",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::DeleteGlobal => "DELETE_GLOBAL",
            Opcode::LoadDeref => "LOAD_DEREF",
            Opcode::StoreDeref => "STORE_DEREF",
            Opcode::DeleteDeref => "DELETE_DEREF",
            Opcode::LoadClosure => "LOAD_CLOSURE",
            Opcode::LoadClassderef => "LOAD_CLASSDEREF",
            Opcode::LoadAttr => "LOAD_ATTR",
            Opcode::StoreAttr => "STORE_ATTR",
            Opcode::DeleteAttr => "DELETE_ATTR",
            Opcode::LoadMethod => "LOAD_METHOD",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::CallFunctionKw => "CALL_FUNCTION_KW",
            Opcode::CallFunctionEx => "CALL_FUNCTION_EX",
            Opcode::CallMethod => "CALL_METHOD",
            Opcode::MakeFunction => "MAKE_FUNCTION",
            Opcode::LoadBuildClass => "LOAD_BUILD_CLASS",
            Opcode::BuildTuple => "BUILD_TUPLE",
            Opcode::BuildList => "BUILD_LIST",
            Opcode::BuildSet => "BUILD_SET",
            Opcode::BuildMap => "BUILD_MAP",
            Opcode::BuildConstKeyMap => "BUILD_CONST_KEY_MAP",
            Opcode::BuildString => "BUILD_STRING",
            Opcode::ListAppend => "LIST_APPEND",
            Opcode::SetAdd => "SET_ADD",
            Opcode::MapAdd => "MAP_ADD",
            Opcode::UnpackSequence => "UNPACK_SEQUENCE",
            Opcode::FormatValue => "FORMAT_VALUE",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::BinarySubscr => "BINARY_SUBSCR",
            Opcode::StoreSubscr => "STORE_SUBSCR",
            Opcode::DeleteSubscr => "DELETE_SUBSCR",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::JumpIfFalseOrPop => "JUMP_IF_FALSE_OR_POP",
            Opcode::JumpIfTrueOrPop => "JUMP_IF_TRUE_OR_POP",
            Opcode::JumpForward => "JUMP_FORWARD",
            Opcode::JumpAbsolute => "JUMP_ABSOLUTE",
            Opcode::GetIter => "GET_ITER",
            Opcode::ForIter => "FOR_ITER",
            Opcode::SetupLoop => "SETUP_LOOP",
            Opcode::BreakLoop => "BREAK_LOOP",
            Opcode::ContinueLoop => "CONTINUE_LOOP",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::SetupExcept => "SETUP_EXCEPT",
            Opcode::SetupFinally => "SETUP_FINALLY",
            Opcode::SetupWith => "SETUP_WITH",
            Opcode::SetupAsyncWith => "SETUP_ASYNC_WITH",
            Opcode::PopBlock => "POP_BLOCK",
            Opcode::PopExcept => "POP_EXCEPT",
            Opcode::EndFinally => "END_FINALLY",
            Opcode::Reraise => "RERAISE",
            Opcode::RaiseVarargs => "RAISE_VARARGS",
            Opcode::WithCleanupStart => "WITH_CLEANUP_START",
            Opcode::WithCleanupFinish => "WITH_CLEANUP_FINISH",
            Opcode::YieldValue => "YIELD_VALUE",
            Opcode::YieldFrom => "YIELD_FROM",
            Opcode::GetYieldFromIter => "GET_YIELD_FROM_ITER",
            Opcode::GetAwaitable => "GET_AWAITABLE",
            Opcode::GetAiter => "GET_AITER",
            Opcode::GetAnext => "GET_ANEXT",
            Opcode::BeforeAsyncWith => "BEFORE_ASYNC_WITH",
            Opcode::EndAsyncFor => "END_ASYNC_FOR",
            Opcode::ImportName => "IMPORT_NAME",
            Opcode::ImportFrom => "IMPORT_FROM",
            Opcode::ImportStar => "IMPORT_STAR",
            Opcode::SetupAnnotations => "SETUP_ANNOTATIONS",
            Opcode::PrintExpr => "PRINT_EXPR",
            Opcode::UnaryOp(_) | Opcode::BinaryOp(_) | Opcode::InplaceOp(_) => {
                unreachable!("operator families are named by Opcode::name")
            }
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_families_render_with_prefix() {
        assert_eq!(Opcode::BinaryOp(BinaryOperator::Add).name(), "BINARY_ADD");
        assert_eq!(
            Opcode::InplaceOp(BinaryOperator::FloorDivide).to_string(),
            "INPLACE_FLOOR_DIVIDE"
        );
        assert_eq!(Opcode::UnaryOp(UnaryOperator::Not).name(), "UNARY_NOT");
        assert_eq!(Opcode::PopJumpIfFalse.to_string(), "POP_JUMP_IF_FALSE");
    }

    #[test]
    fn block_openers_have_targets_and_fall_through() {
        for op in [
            Opcode::SetupLoop,
            Opcode::SetupExcept,
            Opcode::SetupFinally,
            Opcode::SetupWith,
            Opcode::SetupAsyncWith,
        ] {
            assert!(op.pushes_block(), "{op}");
            assert!(op.has_target(), "{op}");
            assert!(op.carries_on(), "{op}");
        }
        assert!(!Opcode::PopBlock.pushes_block());
        assert!(Opcode::PopBlock.pops_block());
    }

    #[test]
    fn terminators_have_no_successor() {
        assert!(Opcode::ReturnValue.no_next());
        assert!(Opcode::RaiseVarargs.no_next());
        assert!(Opcode::BreakLoop.no_next());
        assert!(!Opcode::BreakLoop.has_target());
        assert!(!Opcode::PopJumpIfTrue.no_next());
        assert!(Opcode::PopJumpIfTrue.is_conditional_jump());
    }

    #[test]
    fn compare_kind_decodes_arguments() {
        assert_eq!(CompareKind::from_arg(2), Some(CompareKind::Equal));
        assert_eq!(CompareKind::from_arg(10), Some(CompareKind::ExceptionMatch));
        assert_eq!(CompareKind::from_arg(11), None);
        assert_eq!(CompareKind::Less.dunder(), Some("__lt__"));
        assert_eq!(CompareKind::Is.dunder(), None);
    }

    #[test]
    fn handler_slots() {
        assert!(!HandlerKind::Loop.catches_exceptions());
        assert_eq!(HandlerKind::Except.exception_slots(), 6);
        assert_eq!(HandlerKind::Finally.exception_slots(), 1);
    }
}
