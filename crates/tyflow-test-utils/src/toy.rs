use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tyflow_interpreter::{
    Args, BuildKind, ClassId, CodeId, FunctionId, Handle, InterpreterClass, ValueSystem,
};
use tyflow_ir::{BinaryOperator, CodeConstant, CompareKind, Constant};

const BUILTINS: &[&str] = &[
    "len", "int", "str", "float", "print", "range", "object", "isinstance", "list", "dict",
];

/// Values of the reference value system: literals where they are known,
/// type names where only the type is known.
#[derive(Clone, Debug, PartialEq)]
pub enum ToyValue {
    Unknown,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
    /// Some value of the named builtin type.
    Typed(&'static str),
    Collection(BuildKind, Vec<ToyValue>),
    /// An iterator producing the boxed value.
    Iterator(Box<ToyValue>),
    Function(FunctionId),
    Class(ClassId),
    Instance(ClassId),
    Code(CodeId),
    BuildClass,
    Builtin(String),
    Module(String),
    Union(Vec<ToyValue>),
}

impl ToyValue {
    pub fn union(values: impl IntoIterator<Item = ToyValue>) -> ToyValue {
        let mut out: Vec<ToyValue> = Vec::new();
        for value in values {
            match value {
                ToyValue::Union(nested) => {
                    for v in nested {
                        if !out.contains(&v) {
                            out.push(v);
                        }
                    }
                }
                v if !out.contains(&v) => out.push(v),
                _ => {}
            }
        }
        if out.contains(&ToyValue::Unknown) {
            return ToyValue::Unknown;
        }
        match out.len() {
            0 => ToyValue::Unknown,
            1 => out.remove(0),
            _ => ToyValue::Union(out),
        }
    }

    fn type_name(&self) -> Option<&'static str> {
        Some(match self {
            ToyValue::None => "NoneType",
            ToyValue::Bool(_) => "bool",
            ToyValue::Int(_) => "int",
            ToyValue::Float(_) => "float",
            ToyValue::Str(_) => "str",
            ToyValue::Bytes(_) => "bytes",
            ToyValue::Typed(name) => *name,
            _ => return None,
        })
    }
}

/// A small value system for tests: folds integer arithmetic, tracks class
/// members and instance attributes, and knows a handful of builtins.
#[derive(Debug, Default)]
pub struct ToyValues {
    classes: FxHashMap<ClassId, IndexMap<String, ToyValue>>,
    instance_attributes: FxHashMap<ClassId, IndexMap<String, ToyValue>>,
}

impl ToyValues {
    /// The joined value of a class member, as recorded when the class was
    /// constructed.
    pub fn class_member(&self, class: ClassId, name: &str) -> Option<&ToyValue> {
        self.classes.get(&class)?.get(name)
    }

    /// The joined value of every assignment to `name` on instances of
    /// `class`.
    pub fn instance_attribute(&self, class: ClassId, name: &str) -> Option<&ToyValue> {
        self.instance_attributes.get(&class)?.get(name)
    }

    fn each(
        &mut self,
        value: &ToyValue,
        mut f: impl FnMut(&mut Self, &ToyValue) -> ToyValue,
    ) -> ToyValue {
        match value {
            ToyValue::Union(values) => {
                let mapped: Vec<ToyValue> = values.iter().map(|v| f(self, v)).collect();
                ToyValue::union(mapped)
            }
            other => f(self, other),
        }
    }
}

fn fold(op: BinaryOperator, l: i64, r: i64) -> Option<ToyValue> {
    let folded = match op {
        BinaryOperator::Add => l.checked_add(r),
        BinaryOperator::Subtract => l.checked_sub(r),
        BinaryOperator::Multiply => l.checked_mul(r),
        _ => None,
    };
    folded.map(ToyValue::Int)
}

fn arithmetic_type(op: BinaryOperator, l: &str, r: &str) -> Option<&'static str> {
    let numeric = |t: &str| matches!(t, "bool" | "int" | "float");
    match (l, r) {
        ("str", "str") if op == BinaryOperator::Add => Some("str"),
        ("str", "int") | ("int", "str") if op == BinaryOperator::Multiply => Some("str"),
        (l, r) if numeric(l) && numeric(r) => {
            if op == BinaryOperator::TrueDivide || l == "float" || r == "float" {
                Some("float")
            } else {
                Some("int")
            }
        }
        _ => None,
    }
}

impl ValueSystem for ToyValues {
    type Value = ToyValue;

    fn constant(&mut self, constant: &CodeConstant) -> ToyValue {
        match constant {
            Constant::None => ToyValue::None,
            Constant::Bool(b) => ToyValue::Bool(*b),
            Constant::Int(i) => ToyValue::Int(*i),
            Constant::Float(x) => ToyValue::Float(*x),
            Constant::Str(s) => ToyValue::Str(s.clone()),
            Constant::Bytes(b) => ToyValue::Bytes(b.clone()),
            Constant::Ellipsis => ToyValue::Ellipsis,
            Constant::Tuple(items) => ToyValue::Collection(
                BuildKind::Tuple,
                items.iter().map(|item| self.constant(item)).collect(),
            ),
            Constant::Code(_) => ToyValue::Unknown,
        }
    }

    fn unknown(&mut self) -> ToyValue {
        ToyValue::Unknown
    }

    fn join(&mut self, values: &[ToyValue]) -> ToyValue {
        ToyValue::union(values.iter().cloned())
    }

    fn wrap(&mut self, handle: Handle) -> ToyValue {
        match handle {
            Handle::Function(id) => ToyValue::Function(id),
            Handle::Class(id) => ToyValue::Class(id),
            Handle::Code(id) => ToyValue::Code(id),
            Handle::BuildClass => ToyValue::BuildClass,
        }
    }

    fn unwrap(&self, value: &ToyValue) -> Option<Handle> {
        match value {
            ToyValue::Function(id) => Some(Handle::Function(*id)),
            ToyValue::Class(id) => Some(Handle::Class(*id)),
            ToyValue::Code(id) => Some(Handle::Code(*id)),
            ToyValue::BuildClass => Some(Handle::BuildClass),
            _ => None,
        }
    }

    fn call(&mut self, callee: &ToyValue, args: &Args<ToyValue>) -> ToyValue {
        self.each(callee, |_, callee| match callee {
            ToyValue::Class(id) => ToyValue::Instance(*id),
            ToyValue::Builtin(name) => match name.as_str() {
                "len" | "int" => ToyValue::Typed("int"),
                "str" => ToyValue::Typed("str"),
                "float" => ToyValue::Typed("float"),
                "print" => ToyValue::None,
                "isinstance" => ToyValue::Typed("bool"),
                "object" => ToyValue::Typed("object"),
                "list" => ToyValue::Collection(
                    BuildKind::List,
                    args.positional.iter().cloned().collect(),
                ),
                "dict" => ToyValue::Collection(BuildKind::Dict, Vec::new()),
                "range" => ToyValue::Collection(BuildKind::List, vec![ToyValue::Typed("int")]),
                _ => ToyValue::Unknown,
            },
            _ => ToyValue::Unknown,
        })
    }

    fn get_attribute(&mut self, value: &ToyValue, name: &str) -> Option<ToyValue> {
        match value {
            ToyValue::Unknown => Some(ToyValue::Unknown),
            ToyValue::Class(id) => self.class_member(*id, name).cloned(),
            ToyValue::Instance(id) => self
                .instance_attribute(*id, name)
                .or_else(|| self.class_member(*id, name))
                .cloned(),
            ToyValue::Module(module) => Some(ToyValue::Builtin(format!("{module}.{name}"))),
            ToyValue::Collection(BuildKind::List, _) if name == "append" => {
                Some(ToyValue::Builtin("list.append".to_owned()))
            }
            ToyValue::Union(values) => {
                let attrs: Vec<ToyValue> = values
                    .iter()
                    .map(|v| self.get_attribute(v, name).unwrap_or(ToyValue::Unknown))
                    .collect();
                Some(ToyValue::union(attrs))
            }
            _ => None,
        }
    }

    fn set_attribute(&mut self, target: &ToyValue, name: &str, value: &ToyValue) {
        if let ToyValue::Instance(id) = target {
            let attrs = self.instance_attributes.entry(*id).or_default();
            let joined = match attrs.get(name) {
                Some(existing) => ToyValue::union([existing.clone(), value.clone()]),
                None => value.clone(),
            };
            attrs.insert(name.to_owned(), joined);
        }
    }

    fn construct_class(&mut self, id: ClassId, class: &InterpreterClass<ToyValue>) -> ToyValue {
        let members = class
            .members
            .iter()
            .map(|(name, var)| (name.clone(), ToyValue::union(var.values().cloned())))
            .collect();
        self.classes.insert(id, members);
        ToyValue::Class(id)
    }

    fn build(&mut self, kind: BuildKind, items: Vec<ToyValue>) -> ToyValue {
        match kind {
            BuildKind::String => ToyValue::Typed("str"),
            BuildKind::Generator | BuildKind::Coroutine => {
                let mut unique = Vec::new();
                for item in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                ToyValue::Collection(kind, unique)
            }
            _ => ToyValue::Collection(kind, items),
        }
    }

    fn builtin(&mut self, name: &str) -> Option<ToyValue> {
        BUILTINS
            .contains(&name)
            .then(|| ToyValue::Builtin(name.to_owned()))
    }

    fn truthiness(&self, value: &ToyValue) -> Option<bool> {
        match value {
            ToyValue::None => Some(false),
            ToyValue::Bool(b) => Some(*b),
            ToyValue::Int(i) => Some(*i != 0),
            ToyValue::Str(s) => Some(!s.is_empty()),
            ToyValue::Collection(BuildKind::Tuple, items) => Some(!items.is_empty()),
            ToyValue::Function(_) | ToyValue::Class(_) | ToyValue::Builtin(_) => Some(true),
            _ => None,
        }
    }

    fn singleton(&mut self, name: &str) -> ToyValue {
        match name {
            "<exception>" => ToyValue::Typed("BaseException"),
            _ => ToyValue::Unknown,
        }
    }

    fn binary_operator(
        &mut self,
        op: BinaryOperator,
        _inplace: bool,
        left: &ToyValue,
        right: &ToyValue,
    ) -> ToyValue {
        if let (ToyValue::Int(l), ToyValue::Int(r)) = (left, right) {
            if let Some(folded) = fold(op, *l, *r) {
                return folded;
            }
        }
        match (left, right) {
            (ToyValue::Str(l), ToyValue::Str(r)) if op == BinaryOperator::Add => {
                return ToyValue::Str(format!("{l}{r}"));
            }
            (ToyValue::Collection(BuildKind::List, l), ToyValue::Collection(BuildKind::List, r))
                if op == BinaryOperator::Add =>
            {
                let mut items = l.clone();
                items.extend(r.iter().cloned());
                return ToyValue::Collection(BuildKind::List, items);
            }
            _ => {}
        }
        match (left.type_name(), right.type_name()) {
            (Some(l), Some(r)) => arithmetic_type(op, l, r)
                .map(ToyValue::Typed)
                .unwrap_or(ToyValue::Unknown),
            _ => ToyValue::Unknown,
        }
    }

    fn compare(&mut self, kind: CompareKind, left: &ToyValue, right: &ToyValue) -> ToyValue {
        if let (ToyValue::Int(l), ToyValue::Int(r)) = (left, right) {
            let decided = match kind {
                CompareKind::Less => Some(l < r),
                CompareKind::LessEqual => Some(l <= r),
                CompareKind::Equal => Some(l == r),
                CompareKind::NotEqual => Some(l != r),
                CompareKind::Greater => Some(l > r),
                CompareKind::GreaterEqual => Some(l >= r),
                _ => None,
            };
            if let Some(b) = decided {
                return ToyValue::Bool(b);
            }
        }
        ToyValue::Typed("bool")
    }

    fn subscript(&mut self, container: &ToyValue, index: &ToyValue) -> ToyValue {
        match (container, index) {
            (ToyValue::Collection(BuildKind::Tuple | BuildKind::List, items), ToyValue::Int(i)) => {
                usize::try_from(*i)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_else(|| ToyValue::union(items.iter().cloned()))
            }
            (ToyValue::Collection(BuildKind::Tuple | BuildKind::List, items), _) => {
                ToyValue::union(items.iter().cloned())
            }
            (ToyValue::Str(_) | ToyValue::Typed("str"), _) => ToyValue::Typed("str"),
            _ => ToyValue::Unknown,
        }
    }

    fn iterate(&mut self, value: &ToyValue) -> ToyValue {
        self.each(value, |_, value| match value {
            ToyValue::Collection(_, items) => {
                ToyValue::Iterator(Box::new(ToyValue::union(items.iter().cloned())))
            }
            ToyValue::Str(_) | ToyValue::Typed("str") => {
                ToyValue::Iterator(Box::new(ToyValue::Typed("str")))
            }
            ToyValue::Iterator(_) => value.clone(),
            _ => ToyValue::Unknown,
        })
    }

    fn next_item(&mut self, iterator: &ToyValue) -> ToyValue {
        self.each(iterator, |_, iterator| match iterator {
            ToyValue::Iterator(item) => item.as_ref().clone(),
            ToyValue::Collection(BuildKind::Generator, items) => {
                ToyValue::union(items.iter().cloned())
            }
            _ => ToyValue::Unknown,
        })
    }

    fn await_result(&mut self, value: &ToyValue) -> ToyValue {
        self.each(value, |_, value| match value {
            ToyValue::Collection(BuildKind::Coroutine, items) => {
                ToyValue::union(items.iter().cloned())
            }
            _ => ToyValue::Unknown,
        })
    }

    fn unpack(&mut self, value: &ToyValue, expected: Option<usize>) -> Option<Vec<ToyValue>> {
        match value {
            ToyValue::Collection(BuildKind::Tuple | BuildKind::List, items)
                if expected.is_none_or(|n| n == items.len()) =>
            {
                Some(items.clone())
            }
            _ => None,
        }
    }

    fn keyword_items(&mut self, value: &ToyValue) -> Option<Vec<(String, ToyValue)>> {
        let ToyValue::Collection(BuildKind::Dict, items) = value else {
            return None;
        };
        items
            .chunks(2)
            .map(|pair| match pair {
                [ToyValue::Str(key), value] => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn string_items(&self, value: &ToyValue) -> Option<Vec<String>> {
        let ToyValue::Collection(BuildKind::Tuple, items) = value else {
            return None;
        };
        items
            .iter()
            .map(|item| match item {
                ToyValue::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn import_module(&mut self, name: &str) -> ToyValue {
        ToyValue::Module(name.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_and_absorbs_unknown() {
        let nested = ToyValue::union([
            ToyValue::Int(1),
            ToyValue::Union(vec![ToyValue::Int(1), ToyValue::Int(2)]),
        ]);
        assert_eq!(nested, ToyValue::Union(vec![ToyValue::Int(1), ToyValue::Int(2)]));
        assert_eq!(
            ToyValue::union([ToyValue::Int(1), ToyValue::Unknown]),
            ToyValue::Unknown
        );
        assert_eq!(ToyValue::union([ToyValue::None]), ToyValue::None);
    }

    #[test]
    fn arithmetic_folds_or_widens() {
        let mut values = ToyValues::default();
        let add = BinaryOperator::Add;
        assert_eq!(
            values.binary_operator(add, false, &ToyValue::Int(2), &ToyValue::Int(3)),
            ToyValue::Int(5)
        );
        assert_eq!(
            values.binary_operator(add, false, &ToyValue::Int(i64::MAX), &ToyValue::Int(1)),
            ToyValue::Typed("int")
        );
        assert_eq!(
            values.binary_operator(
                BinaryOperator::TrueDivide,
                false,
                &ToyValue::Int(1),
                &ToyValue::Int(2)
            ),
            ToyValue::Typed("float")
        );
        assert_eq!(
            values.binary_operator(add, true, &ToyValue::Str("a".into()), &ToyValue::Str("b".into())),
            ToyValue::Str("ab".into())
        );
    }

    #[test]
    fn dict_items_become_keywords() {
        let mut values = ToyValues::default();
        let dict = ToyValue::Collection(
            BuildKind::Dict,
            vec![ToyValue::Str("k".into()), ToyValue::Int(1)],
        );
        assert_eq!(
            values.keyword_items(&dict),
            Some(vec![("k".to_owned(), ToyValue::Int(1))])
        );
        let opaque = ToyValue::Collection(BuildKind::Dict, vec![ToyValue::Unknown, ToyValue::Int(1)]);
        assert_eq!(values.keyword_items(&opaque), None);
    }
}
