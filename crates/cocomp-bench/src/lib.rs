//! Workload builders shared by the solver benchmarks and the metrics binary.

use cocomp_solver::{Generator, OperationCatalog};
use cocomp_types::{Coroutine, Type};

fn token(i: usize) -> Type {
    Type::constant(format!("T{i}"))
}

/// A source followed by `len` relays, each turning `T{i}` into `T{i+1}`.
pub fn relay_chain(len: usize) -> Vec<Generator> {
    let mut generators = vec![Generator::new(
        "source",
        Coroutine::new(Type::Void, token(0)),
    )];
    generators.extend((0..len).map(|i| {
        Generator::new(format!("relay{i}"), Coroutine::new(token(i), token(i + 1)))
    }));
    generators
}

/// `width` sources each yielding one token into a single sink.
pub fn fan_in(width: usize) -> Vec<Generator> {
    let mut generators: Vec<Generator> = (0..width)
        .map(|i| {
            Generator::new(
                format!("source{i}"),
                Coroutine::new(Type::Void, Type::constant("Token")),
            )
        })
        .collect();
    generators.push(Generator::new(
        "sink",
        Coroutine::new(
            Type::seq((0..width).map(|_| Type::constant("Token"))),
            Type::constant("Done"),
        ),
    ));
    generators
}

/// The relay chain registered as catalog operations, for `compose`.
pub fn relay_catalog(len: usize) -> (OperationCatalog, Vec<String>) {
    let catalog: OperationCatalog = relay_chain(len).into_iter().collect();
    let names = catalog.iter().map(|op| op.name().to_string()).collect();
    (catalog, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cocomp_solver::Solver;
    use cocomp_types::Substitution;

    #[test]
    fn relay_chain_reaches_last_token() {
        let solution = Solver::default()
            .solve(relay_chain(4), &Substitution::new())
            .unwrap();
        assert_eq!(solution.contract, Coroutine::new(Type::Void, token(4)));
        assert_eq!(solution.steps, 5);
    }

    #[test]
    fn fan_in_feeds_the_sink() {
        let solution = Solver::default()
            .solve(fan_in(3), &Substitution::new())
            .unwrap();
        assert_eq!(
            solution.contract,
            Coroutine::new(Type::Void, Type::constant("Done"))
        );
        assert_eq!(solution.steps, 4);
    }

    #[test]
    fn relay_catalog_composes() {
        let (catalog, names) = relay_catalog(3);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let solution = catalog.compose(&Solver::default(), &names, &[]).unwrap();
        assert_eq!(solution.contract, Coroutine::new(Type::Void, token(3)));
    }
}
