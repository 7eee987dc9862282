//! Step-by-step record of a composition.
//!
//! Every committed step appends the contract that yielded, then each contract
//! that resumed with the value. A spawn resumes every generator it starts;
//! a value handed to the outside resumes an unnamed `[value; Void]`. Events
//! serialize with their contracts rendered in the `[receive; yields]`
//! notation.

use std::fmt;

use cocomp_types::Coroutine;
use serde::{Serialize, Serializer};

/// What a contract did in a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// Produced a value.
    Yield,
    /// Was resumed: received a value, absorbed one, or was started.
    Resume,
}

/// One entry of a composition trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    /// 1-based step the event belongs to.
    pub step: usize,
    pub kind: TraceKind,
    /// Generator involved; `None` for the composition's own output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Contract as it was before the step.
    #[serde(serialize_with = "serialize_display")]
    pub contract: Coroutine,
}

impl TraceEvent {
    /// Human-facing name: the generator, else the contract's source, else
    /// the contract itself.
    pub fn label(&self) -> String {
        self.generator
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(self.contract.source.as_deref().filter(|name| !name.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| self.contract.to_string())
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TraceKind::Yield => "yield",
            TraceKind::Resume => "resume",
        };
        write!(f, "#{} {kind} {}: {}", self.step, self.label(), self.contract)
    }
}

fn serialize_display<S: Serializer>(value: &Coroutine, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cocomp_types::Type;

    fn event(generator: Option<&str>, contract: Coroutine) -> TraceEvent {
        TraceEvent {
            step: 3,
            kind: TraceKind::Yield,
            generator: generator.map(str::to_string),
            contract,
        }
    }

    #[test]
    fn label_prefers_generator_then_source() {
        let contract = Coroutine::new(Type::Void, Type::constant("A"));
        assert_eq!(event(Some("producer"), contract.clone()).label(), "producer");
        assert_eq!(
            event(Some(""), contract.clone().with_source("origin")).label(),
            "origin"
        );
        assert_eq!(event(None, contract).label(), "[Void; A]");
    }

    #[test]
    fn serializes_contract_as_text() {
        let json = serde_json::to_value(event(
            Some("g"),
            Coroutine::new(Type::constant("A"), Type::constant("B")),
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "step": 3,
                "kind": "yield",
                "generator": "g",
                "contract": "[A; B]",
            })
        );
    }

    #[test]
    fn outside_event_omits_generator() {
        let json = serde_json::to_value(event(None, Coroutine::identity())).unwrap();
        assert!(json.get("generator").is_none());
    }
}
