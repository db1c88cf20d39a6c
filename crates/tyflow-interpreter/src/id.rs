use std::fmt;

/// Declares a dense arena index newtype.
macro_rules! identifier {
    ($(#[$attr:meta])* struct $name:ident, $prefix:literal) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                Self(value)
            }
        }

        impl From<$name> for usize {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

identifier! {
    /// A function created by `MAKE_FUNCTION`, stored in the analysis context.
    struct FunctionId, "fn"
}

identifier! {
    /// A class built by running a class body.
    struct ClassId, "class"
}

identifier! {
    /// A nested code body loaded as a constant.
    struct CodeId, "code"
}

identifier! {
    /// An opaque branch predicate minted when a branch cannot be decided.
    struct AtomId, "c"
}

identifier! {
    /// Identity of one frame run; functions remember the frame that
    /// created them.
    struct FrameToken, "frame"
}
