//! Status transitions
//!
//! One request may run per conversation. Starting while running is rejected,
//! aborting while nothing runs is a no-op.

use thiserror::Error;

use super::events::StatusEvent;
use super::states::ChatStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from} with event {event}")]
    InvalidTransition {
        from: ChatStatus,
        event: &'static str,
    },
}

/// Result of one handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: ChatStatus,
    pub to: ChatStatus,
    pub event: StatusEvent,
    /// Whether the status actually changed.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct StatusMachine {
    current: ChatStatus,
    history: Vec<StatusTransition>,
    max_history: usize,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::with_status(ChatStatus::Idle)
    }

    pub fn with_status(status: ChatStatus) -> Self {
        Self {
            current: status,
            history: Vec::new(),
            max_history: 50,
        }
    }

    pub fn status(&self) -> ChatStatus {
        self.current
    }

    pub fn history(&self) -> &[StatusTransition] {
        &self.history
    }

    /// Applies `event`, leaving the status untouched when it is not allowed.
    pub fn handle_event(&mut self, event: StatusEvent) -> Result<StatusTransition, TransitionError> {
        let from = self.current;
        let to = Self::next_status(from, &event).ok_or(TransitionError::InvalidTransition {
            from,
            event: event.name(),
        })?;

        self.current = to;
        let transition = StatusTransition {
            from,
            to,
            event,
            changed: from != to,
        };

        self.history.push(transition.clone());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        Ok(transition)
    }

    fn next_status(status: ChatStatus, event: &StatusEvent) -> Option<ChatStatus> {
        use ChatStatus::*;
        use StatusEvent::*;

        match (status, event) {
            (Running, RequestStarted { .. }) => None,
            (_, RequestStarted { .. }) => Some(Running),

            (Running, RequestCompleted) => Some(Completed),
            (Running, AbortRequested) => Some(Aborted),
            (Running, RequestFailed { .. }) => Some(Error),

            // nothing to abort
            (other, AbortRequested) => Some(other),

            _ => None,
        }
    }

    pub fn can_handle(&self, event: &StatusEvent) -> bool {
        Self::next_status(self.current, event).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(id: &str) -> StatusEvent {
        StatusEvent::RequestStarted {
            request_id: id.to_string(),
        }
    }

    #[test]
    fn test_basic_flow() {
        let mut sm = StatusMachine::new();
        assert_eq!(sm.status(), ChatStatus::Idle);

        let t1 = sm.handle_event(start("r1")).unwrap();
        assert!(t1.changed);
        assert_eq!(sm.status(), ChatStatus::Running);

        sm.handle_event(StatusEvent::RequestCompleted).unwrap();
        assert_eq!(sm.status(), ChatStatus::Completed);

        // a new request starts straight from a terminal status
        sm.handle_event(start("r2")).unwrap();
        assert_eq!(sm.status(), ChatStatus::Running);
    }

    #[test]
    fn test_single_flight() {
        let mut sm = StatusMachine::new();
        sm.handle_event(start("r1")).unwrap();

        let err = sm.handle_event(start("r2")).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: ChatStatus::Running,
                event: "request_started",
            }
        );
        assert_eq!(sm.status(), ChatStatus::Running);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut sm = StatusMachine::new();
        let noop = sm.handle_event(StatusEvent::AbortRequested).unwrap();
        assert!(!noop.changed);
        assert_eq!(sm.status(), ChatStatus::Idle);

        sm.handle_event(start("r1")).unwrap();
        sm.handle_event(StatusEvent::AbortRequested).unwrap();
        assert_eq!(sm.status(), ChatStatus::Aborted);

        let again = sm.handle_event(StatusEvent::AbortRequested).unwrap();
        assert!(!again.changed);
        assert_eq!(sm.status(), ChatStatus::Aborted);
    }

    #[test]
    fn test_finish_requires_running() {
        let mut sm = StatusMachine::with_status(ChatStatus::Completed);
        assert!(sm.handle_event(StatusEvent::RequestCompleted).is_err());
        assert!(!sm.can_handle(&StatusEvent::RequestFailed {
            error: "x".to_string()
        }));
    }

    #[test]
    fn test_history_tracking() {
        let mut sm = StatusMachine::new();
        sm.handle_event(start("r1")).unwrap();
        sm.handle_event(StatusEvent::RequestFailed {
            error: "boom".to_string(),
        })
        .unwrap();

        assert_eq!(sm.history().len(), 2);
        assert_eq!(sm.status(), ChatStatus::Error);
    }
}
