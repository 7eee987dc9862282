//! Composing named operations.
//!
//! A catalog holds operation contracts by name. Composing a subset binds
//! each chosen name to its contract, then runs a starter generator that
//! yields all of them as one tuple, so they are composed together first and
//! the result is then run against any low-priority operations.

use cocomp_types::{Coroutine, Substitution, Type, Var};

use crate::{Generator, Solution, SolveError, Solver};

/// Name of the generator that starts a catalog composition.
pub const STARTER: &str = "start";

/// Operations in registration order.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: Vec<Generator>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation, replacing any earlier one with the same name.
    pub fn insert(&mut self, operation: Generator) {
        match self
            .operations
            .iter_mut()
            .find(|known| known.name() == operation.name())
        {
            Some(known) => *known = operation,
            None => self.operations.push(operation),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Generator> {
        self.operations.iter().find(|op| op.name() == name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Generator> {
        self.operations.iter()
    }

    /// Compose the `interested` operations, then run the result against the
    /// `low_priority` ones.
    ///
    /// Interested operations take part in catalog order. Every name must be
    /// registered.
    pub fn compose(
        &self,
        solver: &Solver,
        interested: &[&str],
        low_priority: &[&str],
    ) -> Result<Solution, SolveError> {
        for name in interested.iter().chain(low_priority) {
            if self.get(name).is_none() {
                return Err(SolveError::UnknownOperation {
                    name: name.to_string(),
                });
            }
        }

        let mut bindings = Substitution::new();
        let mut members = Vec::new();
        for operation in self.iter().filter(|op| interested.contains(&op.name())) {
            let contract = operation.contract().clone().with_source(operation.name());
            let contract = if operation.is_infinite() {
                contract.restorable()
            } else {
                contract
            };
            bindings.bind(Var::new(operation.name()), Type::coroutine(contract));
            members.push(Type::var(operation.name()));
        }
        tracing::debug!(
            interested = members.len(),
            low_priority = low_priority.len(),
            "compose: start"
        );

        let mut generators = vec![Generator::new(
            STARTER,
            Coroutine::new(Type::Void, Type::Tuple(members)),
        )];
        generators.extend(
            low_priority
                .iter()
                .filter_map(|name| self.get(name))
                .cloned(),
        );
        solver.solve(generators, &bindings)
    }
}

impl FromIterator<Generator> for OperationCatalog {
    fn from_iter<I: IntoIterator<Item = Generator>>(iter: I) -> Self {
        let mut catalog = OperationCatalog::new();
        for operation in iter {
            catalog.insert(operation);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(name: &str) -> Type {
        Type::constant(name)
    }

    #[test]
    fn insert_replaces_same_name() {
        let mut catalog = OperationCatalog::new();
        catalog.insert(Generator::new("op", Coroutine::new(c("A"), c("B"))));
        catalog.insert(Generator::new("op", Coroutine::new(c("C"), c("D"))));
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get("op").map(Generator::contract),
            Some(&Coroutine::new(c("C"), c("D")))
        );
    }

    #[test]
    fn unknown_operation_is_reported() {
        let catalog: OperationCatalog =
            [Generator::new("op", Coroutine::new(c("A"), c("B")))].into_iter().collect();
        let err = catalog
            .compose(&Solver::default(), &["op", "missing"], &[])
            .unwrap_err();
        assert_eq!(
            err,
            SolveError::UnknownOperation {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn composes_chosen_operations_together() {
        let catalog: OperationCatalog = [
            Generator::new("make", Coroutine::new(Type::Void, c("A"))),
            Generator::new("use", Coroutine::new(c("A"), c("B"))),
            Generator::new("unused", Coroutine::new(c("Z"), c("Z"))),
        ]
        .into_iter()
        .collect();
        let solution = catalog
            .compose(&Solver::default(), &["use", "make"], &[])
            .unwrap();
        assert_eq!(solution.contract, Coroutine::new(Type::Void, c("B")));
        assert_eq!(
            crate::report::operations(&solution.trace),
            ["make", "use", "start", "(make, use)"]
        );
    }
}
