use uuid::Uuid;

use crate::tools::ToolCall;

/// Merges streamed tool-call fragments into complete calls.
///
/// Providers send a call's id and name once and its JSON arguments in
/// pieces. Fragments carrying an id merge into the call with that id;
/// argument-only fragments extend the most recent call.
#[derive(Debug, Default, Clone)]
pub struct ToolCallAccumulator {
    pending: Vec<PendingCall>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: ToolCall) {
        let ToolCall { id, function, .. } = fragment;
        if id.is_empty() && function.name.is_empty() && function.arguments.is_empty() {
            return;
        }

        let target = if !id.is_empty() {
            self.pending.iter().position(|call| call.id == id)
        } else if function.name.is_empty() {
            self.pending.len().checked_sub(1)
        } else {
            self.pending
                .iter()
                .rposition(|call| call.id.is_empty() && call.name.is_empty())
        };

        match target.and_then(|index| self.pending.get_mut(index)) {
            Some(call) => {
                if call.name.is_empty() {
                    call.name = function.name;
                }
                call.arguments.push_str(&function.arguments);
            }
            None => self.pending.push(PendingCall {
                id,
                name: function.name,
                arguments: function.arguments,
            }),
        }
    }

    pub fn extend<I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = ToolCall>,
    {
        for fragment in fragments {
            self.push(fragment);
        }
    }

    /// Complete calls; fragments that never received a name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.pending
            .into_iter()
            .filter(|call| !call.name.trim().is_empty())
            .map(|call| {
                let id = if call.id.is_empty() {
                    format!("call_{}", Uuid::new_v4())
                } else {
                    call.id
                };
                ToolCall::new(id, call.name, call.arguments)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_merge_by_id() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.push(ToolCall::new("call_1", "search", "{\"q\": \""));
        accumulator.push(ToolCall::new("call_2", "fetch", "{}"));
        accumulator.push(ToolCall::new("call_1", "", "rust\"}"));

        let calls = accumulator.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.arguments, "{\"q\": \"rust\"}");
        assert_eq!(calls[1].function.name, "fetch");
    }

    #[test]
    fn argument_only_fragments_extend_last_call() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.push(ToolCall::new("call_1", "calc", "{\"a\":"));
        accumulator.push(ToolCall::new("", "", "1}"));

        let calls = accumulator.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, "{\"a\":1}");
    }

    #[test]
    fn nameless_calls_are_dropped_and_missing_ids_generated() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.push(ToolCall::new("call_1", "", "{}"));
        assert!(accumulator.clone().finish().is_empty());

        let mut accumulator = ToolCallAccumulator::new();
        accumulator.push(ToolCall::new("", "lookup", "{}"));
        let calls = accumulator.finish();
        assert!(calls[0].id.starts_with("call_"));
    }
}
