//! Human-facing summaries of a composition trace.

use crate::trace::TraceEvent;

/// Arrow placed between consecutive entries of a composition order.
pub const ORDER_SEPARATOR: &str = " ---->\n";

/// Every event's label, in trace order, joined by arrows.
pub fn composition_order(trace: &[TraceEvent]) -> String {
    trace
        .iter()
        .map(TraceEvent::label)
        .collect::<Vec<_>>()
        .join(ORDER_SEPARATOR)
}

/// Distinct named generators in the order they first appear.
pub fn operations(trace: &[TraceEvent]) -> Vec<String> {
    let mut seen = Vec::new();
    for name in trace.iter().filter_map(|event| event.generator.as_deref()) {
        if !name.is_empty() && !seen.iter().any(|known: &String| known == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceKind;
    use cocomp_types::{Coroutine, Type};

    fn event(step: usize, kind: TraceKind, generator: Option<&str>) -> TraceEvent {
        TraceEvent {
            step,
            kind,
            generator: generator.map(str::to_string),
            contract: Coroutine::new(Type::Void, Type::constant("A")),
        }
    }

    #[test]
    fn order_joins_labels_with_arrows() {
        let trace = [
            event(1, TraceKind::Yield, Some("make")),
            event(1, TraceKind::Resume, Some("use")),
            event(2, TraceKind::Yield, Some("use")),
            event(2, TraceKind::Resume, None),
        ];
        assert_eq!(
            composition_order(&trace),
            "make ---->\nuse ---->\nuse ---->\n[Void; A]"
        );
    }

    #[test]
    fn operations_are_distinct_and_ordered() {
        let trace = [
            event(1, TraceKind::Yield, Some("b")),
            event(1, TraceKind::Resume, Some("a")),
            event(2, TraceKind::Yield, Some("b")),
            event(2, TraceKind::Resume, Some("")),
            event(3, TraceKind::Yield, None),
        ];
        assert_eq!(operations(&trace), ["b", "a"]);
    }
}
