use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::AtomId;

/// A path condition: the predicate under which a binding is visible.
///
/// Composite conditions must be built through [`Condition::and`],
/// [`Condition::or`] and [`Condition::not`], which keep them in a canonical
/// shape:
///
/// - negation is pushed down to atoms, so `Not` only ever wraps an `Atom`
/// - nested conjunctions and disjunctions are flattened into a set
/// - a literal fixes its atom for its siblings, which are simplified under
///   that assignment (`a & (!a | b)` is `a & b`, `a | (a & b)` is `a`)
/// - complementary literals short-circuit to `FALSE` or `TRUE`
/// - a single remaining child replaces its parent
///
/// The result depends only on the set of flattened operands, so `and` and
/// `or` are commutative, associative and idempotent on structure, and
/// structurally equal conditions compare and hash equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Condition {
    False,
    True,
    Atom(AtomId),
    Not(Box<Condition>),
    And(BTreeSet<Condition>),
    Or(BTreeSet<Condition>),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::True
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Junction {
    All,
    Any,
}

impl Junction {
    fn unit(self) -> Condition {
        match self {
            Junction::All => Condition::True,
            Junction::Any => Condition::False,
        }
    }

    fn zero(self) -> Condition {
        match self {
            Junction::All => Condition::False,
            Junction::Any => Condition::True,
        }
    }

    /// The value a literal of the given polarity fixes its atom to while
    /// simplifying its siblings. Under `or` the other children only matter
    /// when the literal is false.
    fn assumes(self, positive: bool) -> bool {
        positive == (self == Junction::All)
    }

    fn compose(self, children: BTreeSet<Condition>) -> Condition {
        match self {
            Junction::All => Condition::And(children),
            Junction::Any => Condition::Or(children),
        }
    }

    fn flattens(self, condition: &Condition) -> bool {
        matches!(
            (self, condition),
            (Junction::All, Condition::And(_)) | (Junction::Any, Condition::Or(_))
        )
    }
}

impl Condition {
    pub fn atom(id: AtomId) -> Self {
        Condition::Atom(id)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Condition::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Condition::False)
    }

    pub fn not(condition: Condition) -> Condition {
        match condition {
            Condition::True => Condition::False,
            Condition::False => Condition::True,
            Condition::Not(inner) => *inner,
            Condition::And(children) => Condition::or(children.into_iter().map(Condition::not)),
            Condition::Or(children) => Condition::and(children.into_iter().map(Condition::not)),
            atom @ Condition::Atom(_) => Condition::Not(Box::new(atom)),
        }
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        build(Junction::All, conditions)
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        build(Junction::Any, conditions)
    }

    pub fn and2(a: Condition, b: Condition) -> Condition {
        Condition::and([a, b])
    }

    pub fn or2(a: Condition, b: Condition) -> Condition {
        Condition::or([a, b])
    }

    /// The atom and polarity of `a` or `!a`.
    fn literal(&self) -> Option<(AtomId, bool)> {
        match self {
            Condition::Atom(id) => Some((*id, true)),
            Condition::Not(inner) => match inner.as_ref() {
                Condition::Atom(id) => Some((*id, false)),
                _ => None,
            },
            _ => None,
        }
    }

    fn mentions_any(&self, assignment: &BTreeMap<AtomId, bool>) -> bool {
        self.atoms().iter().any(|id| assignment.contains_key(id))
    }

    /// Substitutes the assigned atoms and rebuilds the condition.
    fn restrict(&self, assignment: &BTreeMap<AtomId, bool>) -> Condition {
        if !self.mentions_any(assignment) {
            return self.clone();
        }
        match self {
            Condition::False | Condition::True => self.clone(),
            Condition::Atom(id) => match assignment.get(id) {
                Some(true) => Condition::True,
                Some(false) => Condition::False,
                None => self.clone(),
            },
            Condition::Not(inner) => Condition::not(inner.restrict(assignment)),
            Condition::And(children) => {
                Condition::and(children.iter().map(|c| c.restrict(assignment)))
            }
            Condition::Or(children) => {
                Condition::or(children.iter().map(|c| c.restrict(assignment)))
            }
        }
    }

    /// Evaluates the condition under a truth assignment for its atoms.
    pub fn evaluate(&self, assignment: &impl Fn(AtomId) -> bool) -> bool {
        match self {
            Condition::False => false,
            Condition::True => true,
            Condition::Atom(id) => assignment(*id),
            Condition::Not(inner) => !inner.evaluate(assignment),
            Condition::And(children) => children.iter().all(|c| c.evaluate(assignment)),
            Condition::Or(children) => children.iter().any(|c| c.evaluate(assignment)),
        }
    }

    /// Every atom mentioned by the condition, in ascending order.
    pub fn atoms(&self) -> BTreeSet<AtomId> {
        let mut atoms = BTreeSet::new();
        self.collect_atoms(&mut atoms);
        atoms
    }

    fn collect_atoms(&self, atoms: &mut BTreeSet<AtomId>) {
        match self {
            Condition::False | Condition::True => {}
            Condition::Atom(id) => {
                atoms.insert(*id);
            }
            Condition::Not(inner) => inner.collect_atoms(atoms),
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.collect_atoms(atoms);
                }
            }
        }
    }
}

/// Shared smart constructor of `and` and `or`.
///
/// Operands are flattened and sorted into literals, kept as an atom
/// assignment, and composites. Composites that mention an assigned atom are
/// restricted by the assignment and fed back as operands until none does.
fn build(junction: Junction, conditions: impl IntoIterator<Item = Condition>) -> Condition {
    let mut assignment: BTreeMap<AtomId, bool> = BTreeMap::new();
    let mut composites: BTreeSet<Condition> = BTreeSet::new();
    let mut pending: Vec<Condition> = conditions.into_iter().collect();
    loop {
        while let Some(condition) = pending.pop() {
            if condition == junction.unit() {
                continue;
            }
            if condition == junction.zero() {
                return junction.zero();
            }
            if junction.flattens(&condition) {
                if let Condition::And(nested) | Condition::Or(nested) = condition {
                    pending.extend(nested);
                }
                continue;
            }
            match condition.literal() {
                Some((id, positive)) => {
                    let value = junction.assumes(positive);
                    if *assignment.entry(id).or_insert(value) != value {
                        return junction.zero();
                    }
                }
                None => {
                    composites.insert(condition);
                }
            }
        }

        let stale: Vec<Condition> = composites
            .iter()
            .filter(|c| c.mentions_any(&assignment))
            .cloned()
            .collect();
        if stale.is_empty() {
            break;
        }
        for condition in stale {
            composites.remove(&condition);
            pending.push(condition.restrict(&assignment));
        }
    }

    let mut children = composites;
    children.extend(assignment.into_iter().map(|(id, value)| {
        let atom = Condition::Atom(id);
        if junction.assumes(true) == value {
            atom
        } else {
            Condition::Not(Box::new(atom))
        }
    }));
    collapse(children, junction)
}

fn collapse(mut children: BTreeSet<Condition>, junction: Junction) -> Condition {
    match children.len() {
        0 => junction.unit(),
        1 => children.pop_first().unwrap_or_else(|| junction.unit()),
        _ => junction.compose(children),
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, children: &BTreeSet<Condition>, sep: &str| {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        };
        match self {
            Condition::False => f.write_str("FALSE"),
            Condition::True => f.write_str("TRUE"),
            Condition::Atom(id) => write!(f, "{id}"),
            Condition::Not(inner) => write!(f, "!{inner}"),
            Condition::And(children) => join(f, children, " & "),
            Condition::Or(children) => join(f, children, " | "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(n: usize) -> Condition {
        Condition::atom(AtomId::from(n))
    }

    #[test]
    fn identities_and_annihilators() {
        let x = Condition::or2(atom(0), atom(1));
        assert_eq!(Condition::and2(Condition::True, x.clone()), x);
        assert_eq!(Condition::or2(Condition::False, x.clone()), x);
        assert_eq!(Condition::and2(Condition::False, x.clone()), Condition::False);
        assert_eq!(Condition::or2(Condition::True, x), Condition::True);
    }

    #[test]
    fn complements_short_circuit() {
        let a = atom(3);
        let not_a = Condition::not(a.clone());
        assert_eq!(Condition::and2(a.clone(), not_a.clone()), Condition::False);
        assert_eq!(Condition::or2(a.clone(), not_a.clone()), Condition::True);
        assert_eq!(Condition::not(not_a), a);

        let ab = Condition::and2(atom(0), atom(1));
        assert_eq!(
            Condition::and2(ab.clone(), Condition::not(ab.clone())),
            Condition::False
        );
        let a_or_b = Condition::or2(atom(0), atom(1));
        assert_eq!(
            Condition::or2(a_or_b.clone(), Condition::not(a_or_b)),
            Condition::True
        );
    }

    #[test]
    fn nested_composites_flatten() {
        let inner = Condition::and2(atom(0), atom(1));
        let outer = Condition::and2(inner, atom(2));
        assert_eq!(outer, Condition::and([atom(0), atom(1), atom(2)]));
        assert_eq!(outer.to_string(), "(c0 & c1 & c2)");
    }

    #[test]
    fn absorption() {
        let a = atom(0);
        let ab = Condition::or2(a.clone(), atom(1));
        assert_eq!(Condition::and2(a.clone(), ab), a);
        let a_and_b = Condition::and2(a.clone(), atom(1));
        assert_eq!(Condition::or2(a.clone(), a_and_b), a);
    }

    #[test]
    fn negation_reaches_the_atoms() {
        let ab = Condition::and2(atom(0), atom(1));
        let not_ab = Condition::not(ab.clone());
        assert_eq!(not_ab.to_string(), "(!c0 | !c1)");
        assert_eq!(Condition::not(not_ab), ab);
    }

    #[test]
    fn literals_simplify_their_siblings() {
        let (a, b) = (atom(0), atom(1));
        let implies = Condition::or2(Condition::not(a.clone()), b.clone());
        assert_eq!(
            Condition::and2(a.clone(), implies),
            Condition::and2(a.clone(), b.clone())
        );
        let both = Condition::and2(Condition::not(a.clone()), b.clone());
        assert_eq!(Condition::or2(a.clone(), both), Condition::or2(a, b));
    }

    #[test]
    fn grouping_does_not_change_the_result() {
        let a = atom(0);
        let ab = Condition::and2(a.clone(), atom(1));
        let not_ab = Condition::not(ab.clone());
        let left = Condition::or2(Condition::or2(a.clone(), ab.clone()), not_ab.clone());
        let right = Condition::or2(a, Condition::or2(ab, not_ab));
        assert_eq!(left, Condition::True);
        assert_eq!(right, Condition::True);
    }

    #[test]
    fn evaluation() {
        let c = Condition::or2(Condition::and2(atom(0), atom(1)), Condition::not(atom(2)));
        assert!(c.evaluate(&|_| true));
        assert!(!c.evaluate(&|id| id.index() == 2));
        assert_eq!(c.atoms().len(), 3);
    }
}
