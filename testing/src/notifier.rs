//! Recording notifiers and notification sinks.

use std::sync::{Mutex, PoisonError};

use flowline_core::error::FlowError;
use flowline_core::event::Event;
use flowline_core::notification::{NotificationKind, NotificationSink};
use flowline_runtime::phase::PhaseResultNotifier;

/// Outcome captured by a [`RecordingNotifier`].
#[derive(Debug)]
pub enum RecordedPhaseOutcome {
    /// `phase_successfully` was invoked.
    Success,
    /// `phase_consumed_message` was invoked.
    Consumed,
    /// `phase_failure` was invoked.
    Failure(FlowError),
}

/// Phase notifier that records every outcome it receives, so tests can
/// assert the exactly-once discipline.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    outcomes: Vec<RecordedPhaseOutcome>,
}

impl RecordingNotifier {
    /// An empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded outcomes, in order.
    #[must_use]
    pub fn outcomes(&self) -> &[RecordedPhaseOutcome] {
        &self.outcomes
    }

    /// Exactly one outcome was recorded and it was success.
    #[must_use]
    pub fn only_success(&self) -> bool {
        matches!(self.outcomes.as_slice(), [RecordedPhaseOutcome::Success])
    }

    /// Exactly one outcome was recorded and it was consumed.
    #[must_use]
    pub fn only_consumed(&self) -> bool {
        matches!(self.outcomes.as_slice(), [RecordedPhaseOutcome::Consumed])
    }

    /// Exactly one outcome was recorded and it was a failure.
    #[must_use]
    pub fn only_failure(&self) -> bool {
        matches!(self.outcomes.as_slice(), [RecordedPhaseOutcome::Failure(_)])
    }
}

impl PhaseResultNotifier for RecordingNotifier {
    fn phase_successfully(&mut self) {
        self.outcomes.push(RecordedPhaseOutcome::Success);
    }

    fn phase_consumed_message(&mut self) {
        self.outcomes.push(RecordedPhaseOutcome::Consumed);
    }

    fn phase_failure(&mut self, error: FlowError) {
        self.outcomes.push(RecordedPhaseOutcome::Failure(error));
    }
}

/// Notification sink that records the kind of every notification fired.
#[derive(Debug, Default)]
pub struct RecordingSink {
    fired: Mutex<Vec<NotificationKind>>,
}

impl RecordingSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds fired so far, in order.
    #[must_use]
    pub fn fired(&self) -> Vec<NotificationKind> {
        self.fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSink for RecordingSink {
    fn fire(&self, kind: NotificationKind, _event: &Event, _location: &str) {
        self.fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(kind);
    }
}
