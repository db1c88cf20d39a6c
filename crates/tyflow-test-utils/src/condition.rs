//! Assertion helpers for the algebra of path conditions.
//!
//! Every law is checked over all pairs and triples drawn from the given
//! samples, and all violations are reported together.
//!
//! # Example
//!
//! ```
//! use tyflow_interpreter::{AtomId, Condition};
//! use tyflow_test_utils::condition::assert_condition_laws;
//!
//! let a = Condition::atom(AtomId::from(0));
//! assert_condition_laws(&[a.clone(), Condition::not(a)]);
//! ```

use std::fmt::Write;

use tyflow_interpreter::{AtomId, Condition};

fn report(violations: Vec<String>) {
    if violations.is_empty() {
        return;
    }
    let mut msg = format!("{} condition law violation(s):\n", violations.len());
    for (i, v) in violations.iter().enumerate() {
        let _ = writeln!(msg, "  {}. {}", i + 1, v);
    }
    panic!("{msg}");
}

/// Check every law below over `samples`, with `TRUE` and `FALSE` added.
///
/// - `and`/`or` are commutative, associative and idempotent
/// - `TRUE` and `FALSE` are the identities and annihilators
/// - `not` is an involution and complements annihilate
/// - simplification preserves meaning under every atom assignment
pub fn assert_condition_laws(samples: &[Condition]) {
    let mut elements = samples.to_vec();
    elements.push(Condition::True);
    elements.push(Condition::False);

    let mut violations = Vec::new();
    check_monoid(&elements, "and", Condition::and2, &mut violations);
    check_monoid(&elements, "or", Condition::or2, &mut violations);
    check_units(&elements, &mut violations);
    check_negation(&elements, &mut violations);
    check_meaning(&elements, &mut violations);
    report(violations);
}

fn check_monoid(
    elements: &[Condition],
    name: &str,
    op: fn(Condition, Condition) -> Condition,
    v: &mut Vec<String>,
) {
    for a in elements {
        if op(a.clone(), a.clone()) != *a {
            v.push(format!("{name} not idempotent: {name}({a}, {a}) != {a}"));
        }
        for b in elements {
            let ab = op(a.clone(), b.clone());
            if ab != op(b.clone(), a.clone()) {
                v.push(format!("{name} not commutative on {a}, {b}"));
            }
            for c in elements {
                let left = op(ab.clone(), c.clone());
                let right = op(a.clone(), op(b.clone(), c.clone()));
                if left != right {
                    v.push(format!(
                        "{name} not associative on {a}, {b}, {c}: {left} != {right}"
                    ));
                }
            }
        }
    }
}

fn check_units(elements: &[Condition], v: &mut Vec<String>) {
    for x in elements {
        if Condition::and2(Condition::True, x.clone()) != *x {
            v.push(format!("TRUE is not the identity of and for {x}"));
        }
        if Condition::or2(Condition::False, x.clone()) != *x {
            v.push(format!("FALSE is not the identity of or for {x}"));
        }
        if !Condition::and2(Condition::False, x.clone()).is_false() {
            v.push(format!("FALSE does not annihilate and for {x}"));
        }
        if !Condition::or2(Condition::True, x.clone()).is_true() {
            v.push(format!("TRUE does not annihilate or for {x}"));
        }
    }
}

fn check_negation(elements: &[Condition], v: &mut Vec<String>) {
    for x in elements {
        let not_x = Condition::not(x.clone());
        if Condition::not(not_x.clone()) != *x {
            v.push(format!("not is not an involution for {x}"));
        }
        if !Condition::and2(x.clone(), not_x.clone()).is_false() {
            v.push(format!("{x} and its negation do not conjoin to FALSE"));
        }
        if !Condition::or2(x.clone(), not_x).is_true() {
            v.push(format!("{x} and its negation do not disjoin to TRUE"));
        }
    }
}

/// Compares the simplified `and`/`or` of every pair against the naive
/// boolean result under every assignment of their atoms.
fn check_meaning(elements: &[Condition], v: &mut Vec<String>) {
    for a in elements {
        for b in elements {
            let atoms: Vec<AtomId> = a.atoms().union(&b.atoms()).copied().collect();
            if atoms.len() > 12 {
                continue;
            }
            let conj = Condition::and2(a.clone(), b.clone());
            let disj = Condition::or2(a.clone(), b.clone());
            for bits in 0u32..(1 << atoms.len()) {
                let assignment = |id: AtomId| {
                    atoms
                        .iter()
                        .position(|atom| *atom == id)
                        .is_some_and(|pos| bits & (1 << pos) != 0)
                };
                let (x, y) = (a.evaluate(&assignment), b.evaluate(&assignment));
                if conj.evaluate(&assignment) != (x && y) {
                    v.push(format!("and({a}, {b}) = {conj} changes meaning"));
                    break;
                }
                if disj.evaluate(&assignment) != (x || y) {
                    v.push(format!("or({a}, {b}) = {disj} changes meaning"));
                    break;
                }
            }
        }
    }
}
