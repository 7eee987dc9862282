//! Error reporting and diagnostics for coroutine composition.
//!
//! Composition failures are reported as structured diagnostics with a
//! stable code, the generator they concern, and a suggested fix. The solver
//! builds them; this crate only defines and renders them.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A contract yields variables its receive side never binds.
    MalformedContract,
    /// Two or more generators remain and none can make progress.
    Deadlock,
    /// The step budget ran out.
    StepLimit,
    /// A composition request named an operation that does not exist.
    UnknownOperation,
}

impl Category {
    pub fn code(self) -> &'static str {
        match self {
            Category::MalformedContract => "E0101",
            Category::Deadlock => "E0102",
            Category::StepLimit => "E0103",
            Category::UnknownOperation => "E0104",
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::MalformedContract => {
                "Receive the variable before yielding it, or bind it before solving."
            }
            Category::Deadlock => {
                "Add a generator that consumes the unmatched values, or drop the blocked one."
            }
            Category::StepLimit => {
                "Raise the step budget, or make restorable generators finite."
            }
            Category::UnknownOperation => "Check the spelling or register the operation.",
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0101).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// The generator the diagnostic is about, if any.
    pub generator: Option<String>,
    /// Supporting facts, one per line.
    pub notes: Vec<String>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            generator: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(category, message)
        }
    }

    pub fn for_generator(mut self, name: impl Into<String>) -> Self {
        self.generator = Some(name.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(generator) = &self.generator {
            write!(f, "\n  --> generator `{generator}`")?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let diag = Diagnostic::error(Category::Deadlock, "2 generators are blocked")
            .for_generator("deleteItem")
            .with_note("unmatched yields: (Item)")
            .with_help("add a consumer for Item");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("E0102"));
        assert_eq!(diag.category, Category::Deadlock);
        assert_eq!(diag.generator.as_deref(), Some("deleteItem"));
        assert_eq!(diag.notes.len(), 1);
        assert!(diag.help.unwrap().contains("consumer"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(Category::MalformedContract, "x are not bound by receive")
            .for_generator("g")
            .with_help("receive x first");
        let s = format!("{diag}");
        assert!(s.starts_with("error[E0101]: x are not bound"));
        assert!(s.contains("--> generator `g`"));
        assert!(s.ends_with("help: receive x first"));
    }

    #[test]
    fn warning_keeps_category_code() {
        let diag = Diagnostic::warning(Category::Deadlock, "tuple members started separately");
        assert_eq!(diag.severity, Severity::Warning);
        assert!(diag.to_string().starts_with("warning[E0102]"));
    }

    #[test]
    fn diagnostic_error_renders_first() {
        let err = DiagnosticError::multiple(vec![
            Diagnostic::error(Category::StepLimit, "budget of 5 exceeded"),
            Diagnostic::error(Category::UnknownOperation, "unknown operation `x`"),
        ]);
        assert_eq!(err.diagnostics().len(), 2);
        assert_eq!(err.to_string(), "error[E0103]: budget of 5 exceeded");
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in [
            Category::MalformedContract,
            Category::Deadlock,
            Category::StepLimit,
            Category::UnknownOperation,
        ] {
            assert!(!cat.example_fix().is_empty());
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }
}
