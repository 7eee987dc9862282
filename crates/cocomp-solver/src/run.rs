//! One composition run.
//!
//! Generators live in a dense slot arena indexed by `SlotId`; the live list
//! holds the ids still taking part, in the order they joined. Each step
//! looks for the first applicable action, trying four passes in order:
//!
//! 1. exchange: a yielded value is received by another generator
//! 2. spawn: a yielded contract (or tuple of contracts) starts running
//! 3. absorb: a generator with nothing left to receive takes the value
//!    onto its own yield side
//! 4. emit: the value becomes part of the composition's output
//!
//! Within a pass, yielders are tried outer and candidates inner, both in
//! live order, so a run is fully determined by its inputs.
//!
//! Every committed step records one Yield event followed by its Resume
//! events: one for an exchange, absorb or emit, and one per started
//! generator for a spawn. Events of a nested run come before the Yield of
//! the spawn that started it.

use std::collections::BTreeSet;

use cocomp_diag::{Category, Diagnostic};
use cocomp_types::{Coroutine, Received, Substitution, Type, Var, Yielded};

use crate::trace::{TraceEvent, TraceKind};
use crate::{Generator, SolveError, SolveOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct SlotId(u32);

impl SlotId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generator: Generator,
    current: Coroutine,
}

/// Counters shared between a run and the runs nested inside it.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub(crate) steps: usize,
    pub(crate) restarts: usize,
}

pub(crate) struct Run<'a> {
    options: &'a SolveOptions,
    slots: Vec<Slot>,
    live: Vec<SlotId>,
    /// Only ever grows within a run.
    pub(crate) bindings: Substitution,
    /// Bound by the caller; kept as-is when a generator restarts.
    external: BTreeSet<Var>,
    /// Values handed to the outside, in order.
    emitted: Vec<Type>,
    pub(crate) counters: Counters,
    pub(crate) trace: Vec<TraceEvent>,
    pub(crate) warnings: Vec<Diagnostic>,
}

impl<'a> Run<'a> {
    pub(crate) fn new(
        options: &'a SolveOptions,
        generators: Vec<Generator>,
        bindings: Substitution,
        external: BTreeSet<Var>,
        counters: Counters,
    ) -> Self {
        let mut run = Run {
            options,
            slots: Vec::new(),
            live: Vec::new(),
            bindings,
            external,
            emitted: Vec::new(),
            counters,
            trace: Vec::new(),
            warnings: Vec::new(),
        };
        for generator in generators {
            if generator.contract().is_terminal() {
                tracing::debug!(generator = generator.name(), "solver: skipping finished generator");
                continue;
            }
            run.add(generator);
        }
        run
    }

    pub(crate) fn execute(&mut self) -> Result<Coroutine, SolveError> {
        while self.step()? {}
        self.finish()
    }

    // -----------------------------------------------------------------------
    // Arena
    // -----------------------------------------------------------------------

    fn add(&mut self, generator: Generator) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(Slot {
            current: generator.contract().clone(),
            generator,
        });
        self.live.push(id);
        id
    }

    fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    fn slot_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id.index()]
    }

    fn name(&self, id: SlotId) -> &str {
        self.slot(id).generator.name()
    }

    fn replace(&mut self, id: SlotId, next: Coroutine) -> Coroutine {
        std::mem::replace(&mut self.slot_mut(id).current, next)
    }

    /// Drop finished generators from the live list; restart infinite ones
    /// from a fresh copy of their original contract.
    fn retire(&mut self, ids: &[SlotId]) {
        for &id in ids {
            if !self.slot(id).current.is_terminal() {
                continue;
            }
            if self.slot(id).generator.is_infinite() {
                self.counters.restarts += 1;
                let fresh = self
                    .slot(id)
                    .generator
                    .contract()
                    .instantiate(self.counters.restarts, &self.external);
                tracing::debug!(generator = self.name(id), contract = %fresh, "solver: restart");
                self.slot_mut(id).current = fresh;
            } else {
                tracing::debug!(generator = self.name(id), "solver: finished");
                self.live.retain(|&live| live != id);
            }
        }
    }

    /// Apply the binding table to every live generator. A contract whose
    /// forbidden table the bindings now contradict collapses and is retired.
    fn propagate(&mut self) {
        let live = self.live.clone();
        for &id in &live {
            let applied = self.slot(id).current.apply(&self.bindings);
            if applied.is_terminal() && !self.slot(id).current.is_terminal() {
                tracing::debug!(generator = self.name(id), "solver: forbidden binding forced, collapsed");
            }
            self.slot_mut(id).current = applied;
        }
        self.retire(&live);
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    fn record(&mut self, kind: TraceKind, generator: Option<String>, contract: Coroutine) {
        self.trace.push(TraceEvent {
            step: self.counters.steps + 1,
            kind,
            generator,
            contract,
        });
    }

    fn record_slot(&mut self, kind: TraceKind, id: SlotId, contract: Coroutine) {
        let name = self.name(id).to_string();
        self.record(kind, Some(name), contract);
    }

    fn tick(&mut self) -> Result<(), SolveError> {
        self.counters.steps += 1;
        if self.counters.steps > self.options.step_budget {
            let skip = self.trace.len().saturating_sub(self.options.trace_limit);
            return Err(SolveError::StepLimit {
                budget: self.options.step_budget,
                recent: self.trace[skip..].iter().map(TraceEvent::to_string).collect(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    fn step(&mut self) -> Result<bool, SolveError> {
        let yielders = self.yielders();
        if let Some((p, yielded, q, received)) = self.find_exchange(&yielders) {
            self.exchange(p, yielded, q, received)?;
        } else if let Some((p, yielded)) = yielders
            .iter()
            .find(|(_, yielded)| yielded.value.is_coroutine_value())
        {
            self.spawn(*p, yielded.clone())?;
        } else if let Some((p, yielded, q)) = self.find_absorber(&yielders) {
            self.absorb(p, yielded, q)?;
        } else if let Some((p, yielded)) = yielders
            .into_iter()
            .find(|(p, _)| !self.is_unbounded(*p))
        {
            self.emit(p, yielded)?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    fn yielders(&self) -> Vec<(SlotId, Yielded)> {
        self.live
            .iter()
            .filter_map(|&id| {
                let yielded = self.slot(id).current.run_yield(&self.bindings)?;
                Some((id, yielded))
            })
            .collect()
    }

    fn find_exchange(
        &self,
        yielders: &[(SlotId, Yielded)],
    ) -> Option<(SlotId, Yielded, SlotId, Received)> {
        for (p, yielded) in yielders {
            for &q in &self.live {
                if q == *p || self.slot(q).current.receive.is_void() {
                    continue;
                }
                if let Some(received) = self.slot(q).current.run_receive(
                    &yielded.value,
                    &self.bindings,
                    &self.options.hierarchy,
                ) {
                    return Some((*p, yielded.clone(), q, received));
                }
            }
        }
        None
    }

    fn find_absorber(&self, yielders: &[(SlotId, Yielded)]) -> Option<(SlotId, Yielded, SlotId)> {
        yielders
            .iter()
            .filter(|(p, _)| !self.is_unbounded(*p))
            .find_map(|(p, yielded)| {
                self.live
                    .iter()
                    .find(|&&q| {
                        q != *p
                            && self.slot(q).current.receive.is_void()
                            && !self.slot(q).generator.is_infinite()
                            && !self.is_unbounded(q)
                    })
                    .map(|&q| (*p, yielded.clone(), q))
            })
    }

    /// An open stream is neither extended, drained into another generator,
    /// nor emitted; whatever it does not exchange stays as the remainder.
    fn is_unbounded(&self, id: SlotId) -> bool {
        self.bindings
            .apply(&self.slot(id).current.yields)
            .is_open_stream()
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    fn exchange(
        &mut self,
        p: SlotId,
        yielded: Yielded,
        q: SlotId,
        received: Received,
    ) -> Result<(), SolveError> {
        tracing::debug!(
            step = self.counters.steps + 1,
            yielder = self.name(p),
            receiver = self.name(q),
            value = %yielded.value,
            "solver: exchange"
        );
        let grew = received.bindings.len() > self.bindings.len();
        self.bindings = received.bindings;
        let resumed = received.successor.apply(&self.bindings);
        let yielder_before = self.replace(p, yielded.successor);
        let receiver_before = self.replace(q, resumed);
        self.record_slot(TraceKind::Yield, p, yielder_before);
        self.record_slot(TraceKind::Resume, q, receiver_before);
        self.tick()?;
        self.retire(&[p, q]);
        if grew {
            self.propagate();
        }
        Ok(())
    }

    fn spawn(&mut self, p: SlotId, yielded: Yielded) -> Result<(), SolveError> {
        let parent = self.name(p).to_string();
        let members: Vec<Generator> = contract_values(yielded.value.clone())
            .into_iter()
            .enumerate()
            .map(|(i, member)| {
                let name = member.source.clone().unwrap_or_else(|| format!("{parent}/{i}"));
                if member.can_restore {
                    Generator::infinite(name, member)
                } else {
                    Generator::new(name, member)
                }
            })
            .collect();

        let known = self.bindings.len();
        let started = if matches!(yielded.value, Type::Tuple(_)) {
            self.compose_members(&parent, members)?
        } else {
            members
        };

        let yielder_before = self.replace(p, yielded.successor);
        self.record(TraceKind::Yield, Some(parent.clone()), yielder_before);
        let mut joined = vec![p];
        for generator in started {
            tracing::debug!(parent = %parent, generator = generator.name(), "solver: spawn");
            let contract = generator.contract().clone();
            let id = self.add(generator);
            self.record_slot(TraceKind::Resume, id, contract);
            joined.push(id);
        }
        self.tick()?;
        self.retire(&joined);
        if self.bindings.len() > known {
            self.propagate();
        }
        Ok(())
    }

    /// Compose the members of a spawned tuple in a nested run sharing this
    /// run's bindings and budget. On success the composite joins as one
    /// generator; on deadlock the members join individually and the nested
    /// run's bindings, steps and trace are dropped.
    fn compose_members(
        &mut self,
        parent: &str,
        members: Vec<Generator>,
    ) -> Result<Vec<Generator>, SolveError> {
        let names: Vec<&str> = members.iter().map(Generator::name).collect();
        let composite = format!("({})", names.join(", "));
        let mut nested = Run::new(
            self.options,
            members.clone(),
            self.bindings.clone(),
            self.external.clone(),
            self.counters,
        );
        let outcome = nested.execute();
        self.counters.restarts = nested.counters.restarts;
        match outcome {
            Ok(contract) => {
                tracing::debug!(composite = %composite, contract = %contract, "solver: tuple composed");
                self.counters.steps = nested.counters.steps;
                self.bindings = nested.bindings;
                self.trace.append(&mut nested.trace);
                self.warnings.append(&mut nested.warnings);
                Ok(vec![Generator::new(composite, contract)])
            }
            Err(SolveError::Deadlock { blocked, .. }) => {
                tracing::debug!(composite = %composite, "solver: tuple deadlocked, starting members");
                self.warnings.push(
                    Diagnostic::warning(
                        Category::Deadlock,
                        format!("{composite} could not be composed; members started separately"),
                    )
                    .for_generator(parent)
                    .with_note(format!("blocked: {}", blocked.join(", "))),
                );
                Ok(members)
            }
            Err(err) => Err(err),
        }
    }

    fn absorb(&mut self, p: SlotId, yielded: Yielded, q: SlotId) -> Result<(), SolveError> {
        tracing::debug!(
            step = self.counters.steps + 1,
            yielder = self.name(p),
            absorber = self.name(q),
            value = %yielded.value,
            "solver: absorb"
        );
        let extended = self.slot(q).current.append_yield(yielded.value);
        let yielder_before = self.replace(p, yielded.successor);
        let absorber_before = self.replace(q, extended);
        self.record_slot(TraceKind::Yield, p, yielder_before);
        self.record_slot(TraceKind::Resume, q, absorber_before);
        self.tick()?;
        self.retire(&[p]);
        Ok(())
    }

    fn emit(&mut self, p: SlotId, yielded: Yielded) -> Result<(), SolveError> {
        tracing::debug!(
            step = self.counters.steps + 1,
            yielder = self.name(p),
            value = %yielded.value,
            "solver: emit"
        );
        let outside = Coroutine::new(yielded.value.clone(), Type::Void);
        self.emitted.push(yielded.value);
        let yielder_before = self.replace(p, yielded.successor);
        self.record_slot(TraceKind::Yield, p, yielder_before);
        self.record(TraceKind::Resume, None, outside);
        self.tick()?;
        self.retire(&[p]);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Result
    // -----------------------------------------------------------------------

    fn finish(&self) -> Result<Coroutine, SolveError> {
        let accumulator = Coroutine::new(Type::Void, Type::seq(self.emitted.iter().cloned()));
        match self.live.as_slice() {
            [] => Ok(accumulator),
            [only] => {
                let remaining = self.slot(*only).current.apply(&self.bindings);
                Ok(accumulator.then(&remaining))
            }
            blocked => Err(SolveError::Deadlock {
                unmatched_yields: accumulator.yields.items(),
                blocked: blocked.iter().map(|&id| self.name(id).to_string()).collect(),
            }),
        }
    }
}

fn contract_values(value: Type) -> Vec<Coroutine> {
    match value {
        Type::Coroutine(contract) => vec![*contract],
        Type::Tuple(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Type::Coroutine(contract) => Some(*contract),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
