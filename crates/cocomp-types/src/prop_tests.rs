//! Property tests for the type algebra using proptest.
//!
//! Invariants that must hold for any value, not just hand-picked ones:
//!
//! 1. Normalization is idempotent
//! 2. Substitution is idempotent: apply(apply(t)) == apply(t)
//! 3. A ground value matches itself with no bindings
//! 4. Matching a pattern against one of its instances recovers bindings
//!    that reproduce the instance
//! 5. Instantiation keeps the number of free variables

use std::collections::BTreeSet;

use proptest::prelude::*;

use crate::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

const CONST_POOL: &[&str] = &["A", "B", "C", "Item", "Store"];
const VAR_POOL: &[&str] = &["x", "y", "z"];

fn arb_const() -> impl Strategy<Value = Type> {
    prop::sample::select(CONST_POOL).prop_map(|name| Type::constant(name))
}

fn arb_var() -> impl Strategy<Value = Type> {
    prop::sample::select(VAR_POOL).prop_map(|name| Type::var(name))
}

fn arb_length() -> impl Strategy<Value = Type> {
    prop_oneof![
        3 => (1i64..4).prop_map(Type::Int),
        1 => Just(Type::Star),
    ]
}

fn arb_compound(leaf: BoxedStrategy<Type>, depth: u32) -> BoxedStrategy<Type> {
    if depth == 0 {
        return leaf;
    }
    let inner = arb_compound(leaf.clone(), depth - 1);
    prop_oneof![
        4 => leaf,
        1 => prop::collection::vec(inner.clone(), 0..4).prop_map(|items| Type::seq(items)),
        1 => prop::collection::vec(inner.clone(), 1..3).prop_map(|items| Type::tuple(items)),
        1 => (inner, arb_length()).prop_map(|(element, length)| Type::list(element, length)),
    ]
    .boxed()
}

/// Values that may contain variables.
fn arb_type(depth: u32) -> BoxedStrategy<Type> {
    let leaf = prop_oneof![3 => arb_const(), 1 => arb_var()].boxed();
    arb_compound(leaf, depth)
}

fn arb_ground_type(depth: u32) -> BoxedStrategy<Type> {
    arb_compound(arb_const().boxed(), depth)
}

fn ground_bindings() -> Substitution {
    let mut subst = Substitution::new();
    subst.bind(Var::new("x"), Type::constant("A"));
    subst.bind(Var::new("y"), Type::constant("Item"));
    subst.bind(Var::new("z"), Type::constant("Store"));
    subst
}

proptest! {
    #[test]
    fn normalize_idempotent(ty in arb_type(3)) {
        let once = ty.normalize();
        prop_assert_eq!(once.normalize(), once);
    }

    #[test]
    fn substitution_idempotent(ty in arb_type(3)) {
        let mut subst = Substitution::new();
        subst.bind(Var::new("x"), Type::seq([Type::constant("B"), Type::constant("C")]));
        subst.bind(Var::new("y"), Type::list(Type::constant("A"), Type::Int(2)));

        let once = subst.apply(&ty);
        let twice = subst.apply(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn ground_value_matches_itself(ty in arb_ground_type(3)) {
        prop_assert_eq!(ty.is_compatible_to(&ty), Some(Substitution::new()));
    }

    #[test]
    fn match_recovers_instance(pattern in arb_type(3)) {
        let instance = ground_bindings().apply(&pattern);
        let found = pattern.is_compatible_to(&instance);
        prop_assert!(found.is_some(), "{} should match {}", pattern, instance);
        let found = found.unwrap_or_default();
        prop_assert_eq!(found.apply(&pattern), instance);
    }

    #[test]
    fn instantiate_preserves_variable_count(ty in arb_type(3)) {
        let fresh = ty.instantiate(7, &BTreeSet::new());
        prop_assert_eq!(fresh.free_vars().len(), ty.free_vars().len());
        prop_assert!(fresh.free_vars().iter().all(|var| var.as_str().ends_with("#7")));
    }
}
