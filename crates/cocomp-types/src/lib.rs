//! Structural types for coroutine composition.
//!
//! This crate defines the symbolic values exchanged between coroutine
//! contracts: named constants, unification variables, sequences, tuples,
//! homogeneous lists with symbolic lengths, and contracts themselves (so a
//! contract can travel as a value inside another contract).
//!
//! Every operation here is pure. Substitution, decomposition and matching
//! return new values and never mutate the receiver.

pub mod condition;
pub mod coroutine;

pub use condition::{Condition, TypeHierarchy};
pub use coroutine::{Coroutine, ForbiddenBindings, MalformedContract, Received, Yielded};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Longest bare list that is spread into its elements when streams are
/// concatenated. Longer lists stay whole and are treated as open streams.
pub const SPREAD_LIMIT: i64 = 4096;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A named unification variable.
///
/// Variable names are global within one solver run: the same name in two
/// contracts refers to the same binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Symbolic arithmetic over list lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LengthFn {
    /// Smallest of its arguments.
    Min,
    /// One less than its argument, never below zero.
    Dec,
}

impl LengthFn {
    pub fn name(self) -> &'static str {
        match self {
            LengthFn::Min => "min",
            LengthFn::Dec => "dec",
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A symbolic value or type exchanged between contracts.
///
/// Values are kept in normal form by the smart constructors (`seq`, `list`,
/// `min`, `dec`); `normalize` restores it for values built by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Nothing: the empty sequence and the identity of concatenation.
    Void,
    /// A named leaf such as a class name.
    Const(String),
    /// Unbound until substituted.
    Var(Var),
    /// Integer literal, used as a list length.
    Int(i64),
    /// Unknown, unbounded length. Never shrinks.
    Star,
    /// Ordered heterogeneous sequence, consumed one member at a time.
    Seq(Vec<Type>),
    /// Fixed-arity tuple, exchanged as a whole.
    Tuple(Vec<Type>),
    /// `length` repetitions of `element`.
    List {
        element: Box<Type>,
        length: Box<Type>,
    },
    /// Symbolic length expression.
    Func(LengthFn, Vec<Type>),
    /// A contract used as a value.
    Coroutine(Box<Coroutine>),
}

impl Type {
    pub fn constant(name: impl Into<String>) -> Self {
        Type::Const(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Type::Var(Var::new(name))
    }

    /// Build a normalized sequence.
    ///
    /// Nested sequences are flattened and `Void` members dropped. A sequence
    /// with a single member collapses to that member, except for a list: a
    /// list inside a sequence is exchanged whole, a bare list element by
    /// element.
    pub fn seq(items: impl IntoIterator<Item = Type>) -> Self {
        let mut flat = Vec::new();
        for item in items {
            push_seq_member(item, &mut flat);
        }
        match flat.len() {
            0 => Type::Void,
            1 if !matches!(flat[0], Type::List { .. }) => flat.remove(0),
            _ => Type::Seq(flat),
        }
    }

    pub fn tuple(items: impl IntoIterator<Item = Type>) -> Self {
        Type::Tuple(items.into_iter().collect())
    }

    /// Build a list; a list of length zero is `Void`.
    pub fn list(element: Type, length: Type) -> Self {
        match length {
            Type::Int(n) if n <= 0 => Type::Void,
            length => Type::List {
                element: Box::new(element),
                length: Box::new(length),
            },
        }
    }

    pub fn min(left: Type, right: Type) -> Self {
        reduce_length(LengthFn::Min, vec![left, right])
    }

    pub fn dec(length: Type) -> Self {
        reduce_length(LengthFn::Dec, vec![length])
    }

    pub fn coroutine(contract: Coroutine) -> Self {
        Type::Coroutine(Box::new(contract))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// True when the value has no free variables.
    pub fn is_ground(&self) -> bool {
        self.free_vars().is_empty()
    }

    /// A contract value, or a non-empty tuple made only of contract values.
    pub fn is_coroutine_value(&self) -> bool {
        match self {
            Type::Coroutine(_) => true,
            Type::Tuple(items) => {
                !items.is_empty() && items.iter().all(|t| matches!(t, Type::Coroutine(_)))
            }
            _ => false,
        }
    }

    /// A bare list that cannot be spread: its length is symbolic, the
    /// wildcard, or above [`SPREAD_LIMIT`].
    pub fn is_open_stream(&self) -> bool {
        match self {
            Type::List { length, .. } => !matches!(**length, Type::Int(n) if n <= SPREAD_LIMIT),
            _ => false,
        }
    }

    /// The members of a sequence, or the value itself as a single member.
    pub fn items(&self) -> Vec<Type> {
        match self {
            Type::Void => Vec::new(),
            Type::Seq(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Collect the free variables of this value.
    pub fn free_vars(&self) -> BTreeSet<Var> {
        let mut vars = BTreeSet::new();
        collect_free_vars(self, &mut vars);
        vars
    }

    /// Rewrite into normal form. Idempotent.
    pub fn normalize(&self) -> Type {
        match self {
            Type::Seq(items) => Type::seq(items.iter().map(Type::normalize)),
            Type::Tuple(items) => Type::Tuple(items.iter().map(Type::normalize).collect()),
            Type::List { element, length } => Type::list(element.normalize(), length.normalize()),
            Type::Func(func, args) => reduce_length(*func, args.iter().map(Type::normalize).collect()),
            Type::Coroutine(contract) => contract.normalize(),
            Type::Void | Type::Const(_) | Type::Var(_) | Type::Int(_) | Type::Star => self.clone(),
        }
    }

    /// Split off the first element this value would produce.
    ///
    /// Returns `None` for `Void`, for length atoms, and for an exhausted
    /// list. Constants, variables, tuples and contracts produce themselves
    /// and leave `Void`.
    pub fn pop(&self) -> Option<(Type, Type)> {
        match self {
            Type::Void | Type::Int(_) | Type::Star | Type::Func(..) => None,
            Type::Seq(items) => {
                let (head, rest) = items.split_first()?;
                Some((head.clone(), Type::seq(rest.iter().cloned())))
            }
            Type::List { element, length } => match length.as_ref() {
                Type::Int(n) if *n <= 0 => None,
                Type::Star => Some(((**element).clone(), self.clone())),
                length => Some((
                    (**element).clone(),
                    Type::list((**element).clone(), Type::dec(length.clone())),
                )),
            },
            Type::Const(_) | Type::Var(_) | Type::Tuple(_) | Type::Coroutine(_) => {
                Some((self.clone(), Type::Void))
            }
        }
    }

    /// Match `offered` against this pattern.
    ///
    /// `None` means no match. `Some` carries the bindings that make the
    /// pattern describe `offered`, and may be empty.
    pub fn is_compatible_to(&self, offered: &Type) -> Option<Substitution> {
        match (self, offered) {
            (Type::Var(var), _) => {
                let mut found = Substitution::new();
                if self != offered {
                    if offered.free_vars().contains(var) {
                        return None;
                    }
                    found.bind(var.clone(), offered.clone());
                }
                Some(found)
            }
            (Type::Star, Type::Int(_) | Type::Star | Type::Func(..) | Type::Var(_)) => {
                Some(Substitution::new())
            }
            (Type::Void, Type::Void) => Some(Substitution::new()),
            (Type::Const(left), Type::Const(right)) => (left == right).then(Substitution::new),
            (Type::Int(left), Type::Int(right)) => (left == right).then(Substitution::new),
            (Type::Seq(patterns), Type::Seq(values))
            | (Type::Tuple(patterns), Type::Tuple(values)) => match_all(patterns, values),
            (
                Type::List { element, length },
                Type::List {
                    element: offered_element,
                    length: offered_length,
                },
            ) => element
                .is_compatible_to(offered_element)?
                .join(&length.is_compatible_to(offered_length)?),
            (Type::Func(func, args), Type::Func(offered_func, offered_args))
                if func == offered_func =>
            {
                match_all(args, offered_args)
            }
            (Type::Coroutine(pattern), Type::Coroutine(value)) => pattern
                .receive
                .is_compatible_to(&value.receive)?
                .join(&pattern.yields.is_compatible_to(&value.yields)?),
            _ => None,
        }
    }

    /// Concatenate two yield streams.
    ///
    /// A bare list is a stream of its elements, so one with a concrete
    /// length up to [`SPREAD_LIMIT`] is spread before joining. Any other
    /// list stays one value.
    pub fn concat(&self, other: &Type) -> Type {
        if self.is_void() {
            return other.clone();
        }
        if other.is_void() {
            return self.clone();
        }
        Type::seq(stream_members(self).into_iter().chain(stream_members(other)))
    }

    /// Rename every free variable not in `keep` to `name#suffix`.
    pub fn instantiate(&self, suffix: usize, keep: &BTreeSet<Var>) -> Type {
        renaming(self.free_vars(), suffix, keep).apply(self)
    }
}

fn push_seq_member(item: Type, flat: &mut Vec<Type>) {
    match item {
        Type::Void => {}
        Type::Seq(items) => {
            for inner in items {
                push_seq_member(inner, flat);
            }
        }
        other => flat.push(other),
    }
}

fn stream_members(ty: &Type) -> Vec<Type> {
    match ty {
        Type::List { element, length } => match length.as_ref() {
            Type::Int(n) if *n <= SPREAD_LIMIT => {
                std::iter::repeat_n((**element).clone(), (*n).max(0) as usize).collect()
            }
            _ => vec![ty.clone()],
        },
        other => other.items(),
    }
}

/// Evaluate a length function when its operands allow it.
fn reduce_length(func: LengthFn, args: Vec<Type>) -> Type {
    if args.iter().any(|arg| matches!(arg, Type::Star)) {
        return Type::Star;
    }
    match func {
        LengthFn::Min => {
            let concrete: Option<Vec<i64>> = args
                .iter()
                .map(|arg| match arg {
                    Type::Int(n) => Some(*n),
                    _ => None,
                })
                .collect();
            match concrete.and_then(|values| values.into_iter().min()) {
                Some(n) => Type::Int(n),
                None => Type::Func(func, args),
            }
        }
        LengthFn::Dec => match args.as_slice() {
            [Type::Int(n)] => Type::Int((n - 1).max(0)),
            _ => Type::Func(func, args),
        },
    }
}

fn match_all(patterns: &[Type], values: &[Type]) -> Option<Substitution> {
    if patterns.len() != values.len() {
        return None;
    }
    patterns
        .iter()
        .zip(values)
        .try_fold(Substitution::new(), |acc, (pattern, value)| {
            acc.join(&pattern.is_compatible_to(value)?)
        })
}

fn renaming(vars: BTreeSet<Var>, suffix: usize, keep: &BTreeSet<Var>) -> Substitution {
    let mut renames = Substitution::new();
    for var in vars.into_iter().filter(|var| !keep.contains(var)) {
        let fresh = Type::var(format!("{var}#{suffix}"));
        renames.bind(var, fresh);
    }
    renames
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Type]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "Void"),
            Type::Const(name) => write!(f, "{name}"),
            Type::Var(var) => write!(f, "{var}"),
            Type::Int(n) => write!(f, "{n}"),
            Type::Star => write!(f, "*"),
            Type::Seq(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                write!(f, ")")
            }
            Type::Tuple(items) => {
                write!(f, "<")?;
                write_joined(f, items)?;
                write!(f, ">")
            }
            Type::List { element, length } => write!(f, "List({element}, {length})"),
            Type::Func(func, args) => {
                write!(f, "{}(", func.name())?;
                write_joined(f, args)?;
                write!(f, ")")
            }
            Type::Coroutine(contract) => write!(f, "{contract}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Free variable computation
// ---------------------------------------------------------------------------

fn collect_free_vars(ty: &Type, vars: &mut BTreeSet<Var>) {
    match ty {
        Type::Var(var) => {
            vars.insert(var.clone());
        }
        Type::Seq(items) | Type::Tuple(items) | Type::Func(_, items) => {
            for item in items {
                collect_free_vars(item, vars);
            }
        }
        Type::List { element, length } => {
            collect_free_vars(element, vars);
            collect_free_vars(length, vars);
        }
        Type::Coroutine(contract) => {
            collect_free_vars(&contract.receive, vars);
            collect_free_vars(&contract.yields, vars);
        }
        Type::Void | Type::Const(_) | Type::Int(_) | Type::Star => {}
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Maps variables to the values they are bound to.
///
/// Iteration is ordered by variable name so every consumer sees bindings in
/// the same order on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    map: BTreeMap<Var, Type>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, var: Var, ty: Type) {
        self.map.insert(var, ty);
    }

    pub fn lookup(&self, var: &Var) -> Option<&Type> {
        self.map.get(var)
    }

    pub fn contains(&self, var: &Var) -> bool {
        self.map.contains_key(var)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn vars(&self) -> BTreeSet<Var> {
        self.map.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, &Type)> {
        self.map.iter()
    }

    /// Merge two binding sets.
    ///
    /// Returns `None` when both bind the same variable to different values.
    pub fn join(&self, other: &Substitution) -> Option<Substitution> {
        let mut merged = self.clone();
        for (var, ty) in &other.map {
            match merged.map.get(var) {
                Some(existing) if existing.normalize() != ty.normalize() => return None,
                Some(_) => {}
                None => {
                    merged.map.insert(var.clone(), ty.clone());
                }
            }
        }
        Some(merged)
    }

    /// Apply this substitution, resolving chains of bound variables, and
    /// return the normalized result.
    pub fn apply(&self, ty: &Type) -> Type {
        self.resolve(ty, 0).normalize()
    }

    fn resolve(&self, ty: &Type, depth: usize) -> Type {
        match ty {
            Type::Var(var) => match self.map.get(var) {
                // A cyclic chain leaves the variable in place.
                Some(_) if depth > self.map.len() => ty.clone(),
                Some(bound) => match self.resolve(bound, depth + 1) {
                    Type::Coroutine(contract) if contract.source.is_none() => {
                        Type::coroutine(contract.with_source(var.as_str()))
                    }
                    resolved => resolved,
                },
                None => ty.clone(),
            },
            Type::Seq(items) => {
                Type::Seq(items.iter().map(|t| self.resolve(t, depth)).collect())
            }
            Type::Tuple(items) => {
                Type::Tuple(items.iter().map(|t| self.resolve(t, depth)).collect())
            }
            Type::List { element, length } => Type::List {
                element: Box::new(self.resolve(element, depth)),
                length: Box::new(self.resolve(length, depth)),
            },
            Type::Func(func, args) => {
                Type::Func(*func, args.iter().map(|t| self.resolve(t, depth)).collect())
            }
            Type::Coroutine(contract) => Type::coroutine(contract.apply(self)),
            Type::Void | Type::Const(_) | Type::Int(_) | Type::Star => ty.clone(),
        }
    }
}

impl FromIterator<(Var, Type)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (Var, Type)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (var, ty)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var} := {ty}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod prop_tests;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
