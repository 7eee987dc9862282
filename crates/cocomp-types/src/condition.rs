//! Side conditions attached to contracts, and the class hierarchy they are
//! checked against.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{Substitution, Type, Var};

/// A predicate over a contract's bindings, checked when it receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// `var` is unbound, or bound to `superclass` or one of its subclasses.
    Inherits { var: Var, superclass: String },
    And(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn inherits(var: impl Into<String>, superclass: impl Into<String>) -> Self {
        Condition::Inherits {
            var: Var::new(var),
            superclass: superclass.into(),
        }
    }

    pub fn and(left: Condition, right: Condition) -> Self {
        Condition::And(Box::new(left), Box::new(right))
    }

    /// Drop every clause that constrains a variable outside `bound`.
    ///
    /// Such a clause could never fire, so a contract keeps only the clauses
    /// over variables its receive side can bind. Returns `None` when nothing
    /// remains.
    pub fn restrict_to(self, bound: &BTreeSet<Var>) -> Option<Condition> {
        match self {
            Condition::Inherits { var, superclass } => bound
                .contains(&var)
                .then_some(Condition::Inherits { var, superclass }),
            Condition::And(left, right) => {
                match (left.restrict_to(bound), right.restrict_to(bound)) {
                    (Some(left), Some(right)) => Some(Condition::and(left, right)),
                    (Some(only), None) | (None, Some(only)) => Some(only),
                    (None, None) => None,
                }
            }
        }
    }

    pub fn vars(&self) -> BTreeSet<Var> {
        match self {
            Condition::Inherits { var, .. } => BTreeSet::from([var.clone()]),
            Condition::And(left, right) => {
                let mut vars = left.vars();
                vars.extend(right.vars());
                vars
            }
        }
    }

    pub fn holds(&self, bindings: &Substitution, hierarchy: &TypeHierarchy) -> bool {
        match self {
            Condition::Inherits { var, superclass } => {
                match bindings.apply(&Type::Var(var.clone())) {
                    Type::Var(_) => true,
                    Type::Const(name) => hierarchy.is_subclass(&name, superclass),
                    _ => false,
                }
            }
            Condition::And(left, right) => {
                left.holds(bindings, hierarchy) && right.holds(bindings, hierarchy)
            }
        }
    }

    /// Follow renames: a clause over a variable bound to another variable
    /// moves to that variable.
    pub fn apply(&self, subst: &Substitution) -> Condition {
        match self {
            Condition::Inherits { var, superclass } => match subst.apply(&Type::Var(var.clone())) {
                Type::Var(renamed) => Condition::Inherits {
                    var: renamed,
                    superclass: superclass.clone(),
                },
                _ => self.clone(),
            },
            Condition::And(left, right) => Condition::and(left.apply(subst), right.apply(subst)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Inherits { var, superclass } => write!(f, "{var}: {superclass}"),
            Condition::And(left, right) => write!(f, "{left} and {right}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Class hierarchy
// ---------------------------------------------------------------------------

/// Single-inheritance class table: each class names its direct superclass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHierarchy {
    parents: BTreeMap<String, String>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: impl Into<String>, superclass: impl Into<String>) {
        self.parents.insert(class.into(), superclass.into());
    }

    pub fn with(mut self, class: impl Into<String>, superclass: impl Into<String>) -> Self {
        self.register(class, superclass);
        self
    }

    pub fn superclass(&self, class: &str) -> Option<&str> {
        self.parents.get(class).map(String::as_str)
    }

    /// Reflexive, transitive subclass check.
    pub fn is_subclass(&self, class: &str, superclass: &str) -> bool {
        let mut current = class;
        // The walk is bounded by the table size so a cyclic table terminates.
        for _ in 0..=self.parents.len() {
            if current == superclass {
                return true;
            }
            match self.superclass(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }
}

impl<C: Into<String>, S: Into<String>> FromIterator<(C, S)> for TypeHierarchy {
    fn from_iter<I: IntoIterator<Item = (C, S)>>(iter: I) -> Self {
        let mut hierarchy = TypeHierarchy::new();
        for (class, superclass) in iter {
            hierarchy.register(class, superclass);
        }
        hierarchy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zoo() -> TypeHierarchy {
        TypeHierarchy::from_iter([("Dog", "Mammal"), ("Mammal", "Animal"), ("Rock", "Mineral")])
    }

    #[test]
    fn subclass_is_reflexive_and_transitive() {
        let zoo = zoo();
        assert!(zoo.is_subclass("Animal", "Animal"));
        assert!(zoo.is_subclass("Dog", "Animal"));
        assert!(!zoo.is_subclass("Rock", "Animal"));
        assert!(!zoo.is_subclass("Animal", "Dog"));
    }

    #[test]
    fn cyclic_hierarchy_terminates() {
        let table = TypeHierarchy::from_iter([("A", "B"), ("B", "A")]);
        assert!(!table.is_subclass("A", "C"));
    }

    #[test]
    fn inherits_holds_for_unbound_or_subclass() {
        let cond = Condition::inherits("x", "Animal");
        let zoo = zoo();
        assert!(cond.holds(&Substitution::new(), &zoo));

        let mut dog = Substitution::new();
        dog.bind(Var::new("x"), Type::constant("Dog"));
        assert!(cond.holds(&dog, &zoo));

        let mut rock = Substitution::new();
        rock.bind(Var::new("x"), Type::constant("Rock"));
        assert!(!cond.holds(&rock, &zoo));
    }

    #[test]
    fn and_requires_both_sides() {
        let cond = Condition::and(
            Condition::inherits("x", "Animal"),
            Condition::inherits("y", "Mineral"),
        );
        let mut bindings = Substitution::new();
        bindings.bind(Var::new("x"), Type::constant("Dog"));
        bindings.bind(Var::new("y"), Type::constant("Dog"));
        assert!(!cond.holds(&bindings, &zoo()));
    }

    #[test]
    fn restrict_drops_vacuous_clauses() {
        let bound = BTreeSet::from([Var::new("x")]);
        let cond = Condition::and(
            Condition::inherits("x", "Animal"),
            Condition::inherits("z", "Mineral"),
        );
        assert_eq!(cond.restrict_to(&bound), Some(Condition::inherits("x", "Animal")));
        assert_eq!(Condition::inherits("z", "Mineral").restrict_to(&bound), None);
    }

    #[test]
    fn display_joins_clauses() {
        let cond = Condition::and(
            Condition::inherits("x", "Animal"),
            Condition::inherits("y", "Mineral"),
        );
        assert_eq!(cond.to_string(), "x: Animal and y: Mineral");
    }
}
