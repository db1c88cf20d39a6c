use smallvec::SmallVec;

use crate::Condition;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    #[error("expected exactly one binding, found {count}")]
    NotAtomic { count: usize },
}

/// A value together with the path condition under which it is visible.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding<V> {
    value: V,
    condition: Condition,
}

impl<V> Binding<V> {
    pub fn new(value: V, condition: Condition) -> Self {
        Self { value, condition }
    }

    pub fn unconditional(value: V) -> Self {
        Self::new(value, Condition::True)
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn with_condition(self, condition: &Condition) -> Self {
        if condition.is_true() {
            return self;
        }
        Self {
            value: self.value,
            condition: Condition::and2(self.condition, condition.clone()),
        }
    }

    pub fn into_parts(self) -> (V, Condition) {
        (self.value, self.condition)
    }
}

/// Every value a name or stack slot may hold, each under its own path
/// condition.
///
/// Bindings keep their insertion order. Exact duplicates and bindings whose
/// condition is `FALSE` are dropped on construction. The optional name is
/// only used for diagnostics and does not take part in equality.
#[derive(Clone, Debug)]
pub struct Variable<V> {
    bindings: SmallVec<[Binding<V>; 2]>,
    name: Option<String>,
}

impl<V> Default for Variable<V> {
    fn default() -> Self {
        Self {
            bindings: SmallVec::new(),
            name: None,
        }
    }
}

impl<V: PartialEq> PartialEq for Variable<V> {
    fn eq(&self, other: &Self) -> bool {
        self.bindings == other.bindings
    }
}

impl<V: Clone + PartialEq> Variable<V> {
    pub fn new(bindings: impl IntoIterator<Item = Binding<V>>) -> Self {
        let mut out: SmallVec<[Binding<V>; 2]> = SmallVec::new();
        for binding in bindings {
            if binding.condition.is_false() || out.contains(&binding) {
                continue;
            }
            out.push(binding);
        }
        Self {
            bindings: out,
            name: None,
        }
    }

    pub fn from_value(value: V) -> Self {
        Self::new([Binding::unconditional(value)])
    }

    pub fn from_values(values: impl IntoIterator<Item = V>) -> Self {
        Self::new(values.into_iter().map(Binding::unconditional))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bindings(&self) -> &[Binding<V>] {
        &self.bindings
    }

    pub fn into_bindings(self) -> impl Iterator<Item = Binding<V>> {
        self.bindings.into_iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.bindings.iter().map(Binding::value)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The single value of an unambiguous variable.
    pub fn get_atomic_value(&self) -> Result<&V, VariableError> {
        match self.bindings.as_slice() {
            [binding] => Ok(&binding.value),
            other => Err(VariableError::NotAtomic { count: other.len() }),
        }
    }

    /// AND-combines `condition` into every binding.
    pub fn with_condition(&self, condition: &Condition) -> Self {
        if condition.is_true() {
            return self.clone();
        }
        let mut conditioned = Self::new(
            self.bindings
                .iter()
                .cloned()
                .map(|binding| binding.with_condition(condition)),
        );
        conditioned.name = self.name.clone();
        conditioned
    }

    /// Adds the bindings of `other`; a value already present has its
    /// condition OR-combined with the incoming one.
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for binding in &other.bindings {
            merged.push(binding.clone());
        }
        if merged.name.is_none() {
            merged.name = other.name.clone();
        }
        merged
    }

    /// Adds one binding, OR-combining its condition into an existing
    /// binding of the same value.
    pub fn push(&mut self, binding: Binding<V>) {
        if binding.condition.is_false() {
            return;
        }
        match self
            .bindings
            .iter_mut()
            .find(|existing| existing.value == binding.value)
        {
            Some(existing) => {
                existing.condition =
                    Condition::or2(existing.condition.clone(), binding.condition);
            }
            None => self.bindings.push(binding),
        }
    }
}

impl<V: Clone + PartialEq> FromIterator<Binding<V>> for Variable<V> {
    fn from_iter<I: IntoIterator<Item = Binding<V>>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AtomId;

    fn atom(n: usize) -> Condition {
        Condition::atom(AtomId::from(n))
    }

    #[test]
    fn construction_drops_duplicates_and_false() {
        let var = Variable::new([
            Binding::unconditional(1),
            Binding::unconditional(1),
            Binding::new(2, Condition::False),
            Binding::new(1, atom(0)),
        ]);
        assert_eq!(var.len(), 2);
        assert_eq!(var.values().copied().collect::<Vec<_>>(), [1, 1]);
    }

    #[test]
    fn atomic_value_requires_exactly_one_binding() {
        assert_eq!(Variable::from_value(7).get_atomic_value(), Ok(&7));
        assert_eq!(
            Variable::<i32>::empty().get_atomic_value(),
            Err(VariableError::NotAtomic { count: 0 })
        );
        assert_eq!(
            Variable::from_values([1, 2]).get_atomic_value(),
            Err(VariableError::NotAtomic { count: 2 })
        );
    }

    #[test]
    fn true_condition_is_identity() {
        let var = Variable::new([Binding::new(1, atom(0)), Binding::unconditional(2)]).named("x");
        let same = var.with_condition(&Condition::True);
        assert_eq!(same, var);
        assert_eq!(same.name(), Some("x"));
    }

    #[test]
    fn union_or_combines_equal_values() {
        let left = Variable::new([Binding::new(1, atom(0))]);
        let right = Variable::new([Binding::new(1, Condition::not(atom(0))), Binding::new(2, atom(1))]);
        let merged = left.union(&right);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.bindings()[0].condition(), &Condition::True);
        assert_eq!(merged.bindings()[1].value(), &2);
    }
}
