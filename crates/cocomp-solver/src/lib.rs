//! Coroutine composition solver.
//!
//! Given a set of generators (named, running contracts) and an initial
//! binding table, the solver searches for a sequence of steps in which
//! yielded values are received by other generators, until the whole set
//! reduces to a single composite contract or no progress is possible.
//!
//! The search is deterministic: generators are considered in the order
//! they were supplied (spawned ones after), and the first applicable step
//! always wins.

pub mod compose;
mod error;
pub mod report;
mod run;
pub mod trace;

pub use compose::OperationCatalog;
pub use error::SolveError;
pub use trace::{TraceEvent, TraceKind};

use cocomp_diag::Diagnostic;
use cocomp_types::{Coroutine, Substitution, TypeHierarchy};

use crate::run::{Counters, Run};

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// A named participant in a composition.
///
/// An infinite generator starts over from its contract each time it
/// finishes, with its variables renamed so earlier bindings do not leak
/// into the next round.
#[derive(Debug, Clone)]
pub struct Generator {
    name: String,
    infinite: bool,
    contract: Coroutine,
}

impl Generator {
    pub fn new(name: impl Into<String>, contract: Coroutine) -> Self {
        Self {
            name: name.into(),
            infinite: false,
            contract,
        }
    }

    pub fn infinite(name: impl Into<String>, contract: Coroutine) -> Self {
        Self {
            infinite: true,
            ..Self::new(name, contract)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    /// The contract the generator starts from.
    pub fn contract(&self) -> &Coroutine {
        &self.contract
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Maximum number of committed steps, nested runs included.
    pub step_budget: usize,
    /// How many trailing trace events a step-limit error reports.
    pub trace_limit: usize,
    /// Class table for `Inherits` conditions.
    pub hierarchy: TypeHierarchy,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            step_budget: 10_000,
            trace_limit: 8,
            hierarchy: TypeHierarchy::new(),
        }
    }
}

impl SolveOptions {
    pub fn with_step_budget(mut self, step_budget: usize) -> Self {
        self.step_budget = step_budget;
        self
    }

    pub fn with_trace_limit(mut self, trace_limit: usize) -> Self {
        self.trace_limit = trace_limit;
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: TypeHierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

/// A successful composition.
#[derive(Debug, Clone)]
pub struct Solution {
    /// What the whole set still receives and yields.
    pub contract: Coroutine,
    pub trace: Vec<TraceEvent>,
    /// Final binding table, caller's bindings included.
    pub bindings: Substitution,
    pub steps: usize,
    /// Non-fatal problems, such as a spawned tuple whose members could not
    /// be composed with each other.
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct Solver {
    options: SolveOptions,
}

impl Solver {
    pub fn new(options: SolveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    /// Compose `generators` under the initial `bindings`.
    ///
    /// Every generator is checked first; variables bound in `bindings` count
    /// as bound.
    pub fn solve(
        &self,
        generators: Vec<Generator>,
        bindings: &Substitution,
    ) -> Result<Solution, SolveError> {
        for generator in &generators {
            generator
                .contract()
                .check_with(bindings)
                .map_err(|source| SolveError::Malformed {
                    generator: generator.name().to_string(),
                    source,
                })?;
        }
        tracing::debug!(
            generators = generators.len(),
            budget = self.options.step_budget,
            "solver: start"
        );

        let mut run = Run::new(
            &self.options,
            generators,
            bindings.clone(),
            bindings.vars(),
            Counters::default(),
        );
        let outcome = run.execute();
        match &outcome {
            Ok(contract) => {
                tracing::debug!(steps = run.counters.steps, contract = %contract, "solver: done")
            }
            Err(err) => tracing::debug!(steps = run.counters.steps, error = %err, "solver: failed"),
        }
        let contract = outcome?;
        Ok(Solution {
            contract,
            trace: run.trace,
            bindings: run.bindings,
            steps: run.counters.steps,
            warnings: run.warnings,
        })
    }
}

/// Compose with default options and the given step budget.
pub fn solve(
    generators: Vec<Generator>,
    bindings: &Substitution,
    step_budget: usize,
) -> Result<Solution, SolveError> {
    Solver::new(SolveOptions::default().with_step_budget(step_budget)).solve(generators, bindings)
}


#[cfg(test)]
mod tests {
    use super::*;
    use cocomp_types::{Type, Var};

    fn c(name: &str) -> Type {
        Type::constant(name)
    }

    fn named(name: &str, receive: Type, yields: Type) -> Generator {
        Generator::new(name, Coroutine::new(receive, yields))
    }

    fn solve_default(generators: Vec<Generator>) -> Result<Solution, SolveError> {
        Solver::default().solve(generators, &Substitution::new())
    }

    #[test]
    fn malformed_generator_is_rejected_before_running() {
        let err = solve_default(vec![
            named("ok", Type::Void, c("A")),
            named("bad", c("A"), Type::var("x")),
        ])
        .unwrap_err();
        assert!(matches!(err, SolveError::Malformed { ref generator, .. } if generator == "bad"));
    }

    #[test]
    fn external_bindings_satisfy_check() {
        let mut bindings = Substitution::new();
        bindings.bind(Var::new("x"), c("X"));
        let solution = Solver::default()
            .solve(vec![named("g", Type::Void, Type::var("x"))], &bindings)
            .unwrap();
        assert_eq!(solution.contract, Coroutine::new(Type::Void, c("X")));
    }

    #[test]
    fn empty_set_solves_to_identity() {
        let solution = solve_default(Vec::new()).unwrap();
        assert!(solution.contract.is_terminal());
        assert_eq!(solution.steps, 0);
        assert!(solution.trace.is_empty());
    }

    #[test]
    fn single_generator_is_returned_as_is() {
        let solution = solve_default(vec![named("only", c("A"), c("B"))]).unwrap();
        assert_eq!(solution.contract, Coroutine::new(c("A"), c("B")));
    }

    #[test]
    fn every_step_records_a_yield_then_a_resume() {
        let solution = solve_default(vec![
            named("source", Type::Void, c("A")),
            named("sink", c("A"), c("B")),
        ])
        .unwrap();
        let kinds: Vec<TraceKind> = solution.trace.iter().map(|e| e.kind).collect();
        assert_eq!(kinds.len(), solution.steps * 2);
        for pair in kinds.chunks(2) {
            assert_eq!(pair, [TraceKind::Yield, TraceKind::Resume]);
        }
        assert_eq!(solution.trace[0].generator.as_deref(), Some("source"));
        assert_eq!(solution.trace[1].generator.as_deref(), Some("sink"));
    }

    #[test]
    fn budget_counts_committed_steps() {
        let generators = vec![
            named("source", Type::Void, Type::seq([c("A"), c("A"), c("A")])),
            named("sink", Type::seq([c("A"), c("A"), c("A")]), Type::Void),
        ];
        let solution = solve(generators.clone(), &Substitution::new(), 3).unwrap();
        assert_eq!(solution.steps, 3);
        assert!(matches!(
            solve(generators, &Substitution::new(), 2),
            Err(SolveError::StepLimit { budget: 2, .. })
        ));
    }

    #[test]
    fn step_limit_reports_recent_events() {
        let err = Solver::new(SolveOptions::default().with_step_budget(5).with_trace_limit(2))
            .solve(
                vec![
                    Generator::infinite("ping", Coroutine::new(Type::Void, c("A"))),
                    Generator::infinite("pong", Coroutine::new(c("A"), Type::Void)),
                ],
                &Substitution::new(),
            )
            .unwrap_err();
        match err {
            SolveError::StepLimit { budget, recent } => {
                assert_eq!(budget, 5);
                assert_eq!(recent.len(), 2);
                assert!(recent[0].starts_with("#6 yield ping"));
                assert!(recent[1].starts_with("#6 resume pong"));
            }
            other => panic!("expected step limit, got {other}"),
        }
    }

    #[test]
    fn finished_generators_are_skipped() {
        let solution = solve_default(vec![
            named("done", Type::Void, Type::Void),
            named("g", c("A"), c("B")),
        ])
        .unwrap();
        assert_eq!(solution.contract, Coroutine::new(c("A"), c("B")));
    }
}
