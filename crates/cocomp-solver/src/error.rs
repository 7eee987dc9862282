use cocomp_diag::{Category, Diagnostic, DiagnosticError};
use cocomp_types::{MalformedContract, Type};

/// Why a composition failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("generator `{generator}` is malformed: {source}")]
    Malformed {
        generator: String,
        source: MalformedContract,
    },
    #[error(
        "deadlock: {} cannot proceed; unmatched yields: [{}]",
        .blocked.join(", "),
        join_types(.unmatched_yields)
    )]
    Deadlock {
        /// Values produced that no generator accepted.
        unmatched_yields: Vec<Type>,
        /// Generators still running when progress stopped.
        blocked: Vec<String>,
    },
    #[error("composition exceeded the step budget of {budget}")]
    StepLimit {
        budget: usize,
        /// Most recent trace lines, newest last.
        recent: Vec<String>,
    },
    #[error("unknown operation `{name}`")]
    UnknownOperation { name: String },
}

fn join_types(tys: &[Type]) -> String {
    tys.iter().map(Type::to_string).collect::<Vec<_>>().join(", ")
}

impl SolveError {
    pub fn category(&self) -> Category {
        match self {
            SolveError::Malformed { .. } => Category::MalformedContract,
            SolveError::Deadlock { .. } => Category::Deadlock,
            SolveError::StepLimit { .. } => Category::StepLimit,
            SolveError::UnknownOperation { .. } => Category::UnknownOperation,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let category = self.category();
        let diag = Diagnostic::error(category, self.to_string());
        match self {
            SolveError::Malformed { generator, source } => diag
                .for_generator(generator)
                .with_help(format!(
                    "receive {} before yielding, or bind it before solving",
                    source.variables.join(", ")
                )),
            SolveError::Deadlock {
                unmatched_yields,
                blocked,
            } => blocked
                .iter()
                .fold(diag, |diag, name| diag.with_note(format!("blocked: `{name}`")))
                .with_note(if unmatched_yields.is_empty() {
                    "no value was left unmatched".to_string()
                } else {
                    format!("unmatched: {}", join_types(unmatched_yields))
                })
                .with_help(category.example_fix()),
            SolveError::StepLimit { recent, .. } => {
                let trace_help = if recent.is_empty() {
                    "no recent steps captured".to_string()
                } else {
                    format!("recent steps:\n- {}", recent.join("\n- "))
                };
                diag.with_help(format!("{trace_help}\n{}", category.example_fix()))
            }
            SolveError::UnknownOperation { name } => diag
                .for_generator(name)
                .with_help(category.example_fix()),
        }
    }
}

impl From<SolveError> for DiagnosticError {
    fn from(err: SolveError) -> Self {
        DiagnosticError::single(err.to_diagnostic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_message_lists_values() {
        let err = SolveError::Deadlock {
            unmatched_yields: vec![Type::constant("C")],
            blocked: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "deadlock: a, b cannot proceed; unmatched yields: [C]");
        let diag = err.to_diagnostic();
        assert_eq!(diag.code.as_deref(), Some("E0102"));
        assert_eq!(diag.notes, ["blocked: `a`", "blocked: `b`", "unmatched: C"]);
    }

    #[test]
    fn malformed_points_at_generator() {
        let err = SolveError::Malformed {
            generator: "g".to_string(),
            source: MalformedContract {
                variables: vec!["x".to_string()],
            },
        };
        assert_eq!(
            err.to_string(),
            "generator `g` is malformed: x are not bound by receive"
        );
        let diag = err.to_diagnostic();
        assert_eq!(diag.code.as_deref(), Some("E0101"));
        assert_eq!(diag.generator.as_deref(), Some("g"));
    }

    #[test]
    fn step_limit_help_carries_recent_steps() {
        let err = SolveError::StepLimit {
            budget: 4,
            recent: vec!["#4 yield a: [Void; A]".to_string()],
        };
        let diag = DiagnosticError::from(err);
        let rendered = diag.to_string();
        assert!(rendered.starts_with("error[E0103]: composition exceeded the step budget of 4"));
        assert!(rendered.contains("- #4 yield a: [Void; A]"));
        assert!(rendered.ends_with(Category::StepLimit.example_fix()));
    }
}
