//! Coroutine contracts: what a participant receives, what it yields, and
//! the constraints on how its variables may be bound.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{Condition, Substitution, Type, TypeHierarchy, Var, renaming};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A contract yields variables that nothing can bind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} are not bound by receive", .variables.join(", "))]
pub struct MalformedContract {
    pub variables: Vec<String>,
}

// ---------------------------------------------------------------------------
// Forbidden bindings
// ---------------------------------------------------------------------------

/// Inequality constraints: each key tuple must not take any of the listed
/// value tuples.
///
/// Entries whose key and values are fully ground are settled and get
/// dropped by `apply`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForbiddenBindings {
    entries: BTreeMap<Vec<Type>, BTreeSet<Vec<Type>>>,
}

impl ForbiddenBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid `key` from taking any of `values`. Merges with existing
    /// entries for the same key.
    pub fn forbid(&mut self, key: Vec<Type>, values: impl IntoIterator<Item = Vec<Type>>) {
        self.entries.entry(key).or_default().extend(values);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<Type>, &BTreeSet<Vec<Type>>)> {
        self.entries.iter()
    }

    /// True when `bindings` make some key equal to one of its forbidden
    /// values.
    pub fn violated_by(&self, bindings: &Substitution) -> bool {
        self.entries.iter().any(|(key, values)| {
            let key = apply_all(bindings, key);
            values.iter().any(|value| apply_all(bindings, value) == key)
        })
    }

    /// Substitute into every entry. `None` means an entry became
    /// contradictory.
    pub fn apply(&self, subst: &Substitution) -> Option<ForbiddenBindings> {
        let mut applied = ForbiddenBindings::new();
        for (key, values) in &self.entries {
            let key = apply_all(subst, key);
            let values: BTreeSet<Vec<Type>> =
                values.iter().map(|value| apply_all(subst, value)).collect();
            if values.contains(&key) {
                return None;
            }
            let settled = key.iter().all(Type::is_ground)
                && values.iter().flatten().all(Type::is_ground);
            if !settled {
                applied.forbid(key, values);
            }
        }
        Some(applied)
    }

    fn collect_vars(&self, vars: &mut BTreeSet<Var>) {
        for (key, values) in &self.entries {
            for ty in key.iter().chain(values.iter().flatten()) {
                vars.extend(ty.free_vars());
            }
        }
    }
}

fn apply_all(subst: &Substitution, tys: &[Type]) -> Vec<Type> {
    tys.iter().map(|ty| subst.apply(ty)).collect()
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// `[receive; yields]`: consumes values matching `receive` one at a time,
/// then produces the values of `yields` one at a time.
///
/// Identity is structural on `receive` and `yields` only. The condition,
/// forbidden table, source name and restore flag travel with a contract
/// but do not distinguish it.
#[derive(Debug, Clone)]
pub struct Coroutine {
    pub receive: Type,
    pub yields: Type,
    pub condition: Option<Condition>,
    pub forbidden: ForbiddenBindings,
    /// Name of the binding or operation this contract came from.
    pub source: Option<String>,
    /// Restarts from its original contract once finished.
    pub can_restore: bool,
}

/// Outcome of a successful receive.
#[derive(Debug, Clone)]
pub struct Received {
    pub successor: Coroutine,
    /// The caller's bindings merged with those the match produced.
    pub bindings: Substitution,
}

/// Outcome of a successful yield.
#[derive(Debug, Clone)]
pub struct Yielded {
    pub value: Type,
    pub successor: Coroutine,
}

impl Coroutine {
    /// Build a contract without checking it.
    pub fn new(receive: Type, yields: Type) -> Self {
        Coroutine {
            receive: receive.normalize(),
            yields: yields.normalize(),
            condition: None,
            forbidden: ForbiddenBindings::new(),
            source: None,
            can_restore: false,
        }
    }

    /// `[Void; Void]`
    pub fn identity() -> Self {
        Coroutine::new(Type::Void, Type::Void)
    }

    /// Build a contract, rejecting yielded variables the receive side
    /// cannot bind.
    pub fn define(receive: Type, yields: Type) -> Result<Self, MalformedContract> {
        let contract = Coroutine::new(receive, yields);
        contract.check()?;
        Ok(contract)
    }

    /// Attach a condition. Clauses over variables the receive side never
    /// binds are dropped.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition.restrict_to(&self.receive.free_vars());
        self
    }

    pub fn with_forbidden(mut self, forbidden: ForbiddenBindings) -> Self {
        self.forbidden = forbidden;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn restorable(mut self) -> Self {
        self.can_restore = true;
        self
    }

    pub fn check(&self) -> Result<(), MalformedContract> {
        self.check_with(&Substitution::new())
    }

    /// Like `check`, but variables already bound in `known` may appear in
    /// the yield side.
    pub fn check_with(&self, known: &Substitution) -> Result<(), MalformedContract> {
        let bound = self.receive.free_vars();
        let unbound: Vec<String> = self
            .yields
            .free_vars()
            .into_iter()
            .filter(|var| !bound.contains(var) && !known.contains(var))
            .map(|var| var.0)
            .collect();
        if unbound.is_empty() {
            Ok(())
        } else {
            Err(MalformedContract { variables: unbound })
        }
    }

    /// Nothing left to receive and nothing left to yield.
    pub fn is_terminal(&self) -> bool {
        self.receive.normalize().is_void() && self.yields.normalize().is_void()
    }

    /// A finished contract normalizes to `Void`.
    pub fn normalize(&self) -> Type {
        if self.is_terminal() {
            return Type::Void;
        }
        Type::coroutine(Coroutine {
            receive: self.receive.normalize(),
            yields: self.yields.normalize(),
            ..self.clone()
        })
    }

    /// Offer `offered` to the first element of the receive side.
    ///
    /// `known` holds the bindings already in force; they are applied to the
    /// receive head before matching and merged into the result. Fails on a
    /// mismatch, a binding conflict, a forbidden binding, or a condition
    /// that does not hold.
    pub fn run_receive(
        &self,
        offered: &Type,
        known: &Substitution,
        hierarchy: &TypeHierarchy,
    ) -> Option<Received> {
        let (head, rest) = self.receive.pop()?;
        let head = known.apply(&head);
        let found = head.is_compatible_to(offered)?;
        let bindings = known.join(&found)?;
        if self.forbidden.violated_by(&bindings) {
            tracing::trace!(contract = %self, value = %offered, "coroutine: forbidden binding");
            return None;
        }
        if let Some(condition) = &self.condition
            && !condition.holds(&bindings, hierarchy)
        {
            tracing::trace!(contract = %self, value = %offered, "coroutine: condition failed");
            return None;
        }
        let successor = Coroutine {
            receive: rest,
            ..self.clone()
        };
        Some(Received {
            successor,
            bindings,
        })
    }

    /// Produce the first element of the yield side.
    ///
    /// Only a contract with nothing left to receive can yield, and only
    /// once `bindings` ground its yield side.
    pub fn run_yield(&self, bindings: &Substitution) -> Option<Yielded> {
        if !self.receive.is_void() {
            return None;
        }
        let yields = bindings.apply(&self.yields);
        if !yields.is_ground() {
            tracing::trace!(contract = %self, "coroutine: yield blocked on unbound variables");
            return None;
        }
        let (value, rest) = yields.pop()?;
        let successor = Coroutine {
            source: self.source.clone(),
            can_restore: self.can_restore,
            ..Coroutine::new(Type::Void, rest)
        };
        Some(Yielded { value, successor })
    }

    /// Substitute into both sides and the forbidden table.
    ///
    /// A contract whose forbidden table becomes contradictory collapses to
    /// the identity.
    pub fn apply(&self, subst: &Substitution) -> Coroutine {
        let Some(forbidden) = self.forbidden.apply(subst) else {
            tracing::trace!(contract = %self, "coroutine: forbidden binding forced, collapsing");
            return Coroutine {
                source: self.source.clone(),
                ..Coroutine::identity()
            };
        };
        Coroutine {
            receive: subst.apply(&self.receive),
            yields: subst.apply(&self.yields),
            condition: self.condition.as_ref().map(|c| c.apply(subst)),
            forbidden,
            source: self.source.clone(),
            can_restore: self.can_restore,
        }
    }

    /// Run `self`, then `next`.
    pub fn then(&self, next: &Coroutine) -> Coroutine {
        Coroutine {
            receive: self.receive.concat(&next.receive),
            yields: self.yields.concat(&next.yields),
            condition: next.condition.clone(),
            forbidden: next.forbidden.clone(),
            source: next.source.clone().or_else(|| self.source.clone()),
            can_restore: false,
        }
    }

    /// Append one value to the yield side.
    pub fn append_yield(&self, value: Type) -> Coroutine {
        Coroutine {
            yields: self.yields.concat(&Type::seq([value])),
            ..self.clone()
        }
    }

    /// Rename every variable except those in `keep`, so a restarted
    /// contract does not clash with bindings from its earlier runs.
    pub fn instantiate(&self, suffix: usize, keep: &BTreeSet<Var>) -> Coroutine {
        let mut vars = self.receive.free_vars();
        vars.extend(self.yields.free_vars());
        self.forbidden.collect_vars(&mut vars);
        if let Some(condition) = &self.condition {
            vars.extend(condition.vars());
        }
        self.apply(&renaming(vars, suffix, keep))
    }
}

impl PartialEq for Coroutine {
    fn eq(&self, other: &Self) -> bool {
        self.receive == other.receive && self.yields == other.yields
    }
}

impl Eq for Coroutine {}

impl Hash for Coroutine {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.receive.hash(state);
        self.yields.hash(state);
    }
}

impl PartialOrd for Coroutine {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Coroutine {
    fn cmp(&self, other: &Self) -> Ordering {
        self.receive
            .cmp(&other.receive)
            .then_with(|| self.yields.cmp(&other.yields))
    }
}

fn render_tuple(tys: &[Type]) -> String {
    let parts: Vec<String> = tys.iter().map(Type::to_string).collect();
    format!("({})", parts.join(", "))
}

impl fmt::Display for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}; {}]", self.receive, self.yields)?;
        let mut clauses: Vec<String> = self.condition.iter().map(Condition::to_string).collect();
        for (key, values) in self.forbidden.iter() {
            let values: Vec<String> = values.iter().map(|value| render_tuple(value)).collect();
            clauses.push(format!("{} not in {{{}}}", render_tuple(key), values.join(", ")));
        }
        if !clauses.is_empty() {
            write!(f, " where {}", clauses.join(", "))?;
        }
        Ok(())
    }
}
