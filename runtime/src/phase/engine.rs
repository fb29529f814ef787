//! Drives a template through the ordered phase pipeline.

use std::sync::Arc;

use flowline_core::error::FlowError;
use flowline_core::notification::NotificationSink;
use flowline_core::template::MessageProcessTemplate;

use crate::context::ExecutionContext;

use super::{
    EndProcessPhase, FlowProcessingPhase, MessageProcessPhase, PhaseRank, PhaseResultNotifier,
    ValidationPhase,
};

/// Terminal outcome of one pipeline pass.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every applicable phase completed.
    Completed,
    /// A phase consumed the message.
    Consumed,
    /// A phase failed.
    Failed(FlowError),
}

impl PipelineOutcome {
    /// True when every applicable phase completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Captures the single outcome a phase reports.
#[derive(Default)]
struct OutcomeRecorder {
    outcome: Option<RecordedOutcome>,
}

enum RecordedOutcome {
    Success,
    Consumed,
    Failure(FlowError),
}

impl OutcomeRecorder {
    fn record(&mut self, outcome: RecordedOutcome) {
        if self.outcome.is_some() {
            tracing::error!("phase reported more than one outcome; keeping the first");
            return;
        }
        self.outcome = Some(outcome);
    }
}

impl PhaseResultNotifier for OutcomeRecorder {
    fn phase_successfully(&mut self) {
        self.record(RecordedOutcome::Success);
    }

    fn phase_consumed_message(&mut self) {
        self.record(RecordedOutcome::Consumed);
    }

    fn phase_failure(&mut self, error: FlowError) {
        self.record(RecordedOutcome::Failure(error));
    }
}

/// The ordered pipeline. Phases run in their declared order for every
/// template that supports them; a consumed or failed outcome short-circuits
/// the remaining phases, except end-process, which always runs.
pub struct PhaseExecutionEngine {
    phases: Vec<Box<dyn MessageProcessPhase>>,
}

impl PhaseExecutionEngine {
    /// An engine with no phases.
    #[must_use]
    pub const fn new() -> Self {
        Self { phases: Vec::new() }
    }

    /// The standard three-phase pipeline, with the given sink receiving
    /// response notifications.
    #[must_use]
    pub fn standard(sink: Arc<dyn NotificationSink>) -> Self {
        let mut engine = Self::new();
        engine.add_phase(Box::new(ValidationPhase::new()));
        engine.add_phase(Box::new(FlowProcessingPhase::new(sink)));
        engine.add_phase(Box::new(EndProcessPhase::new()));
        engine
    }

    /// Add a phase, keeping the pipeline sorted by phase order.
    pub fn add_phase(&mut self, phase: Box<dyn MessageProcessPhase>) {
        self.phases.push(phase);
        self.phases.sort_by(|a, b| a.compare_to(b.as_ref()));
    }

    /// Run the template through every applicable phase.
    pub async fn process(
        &self,
        template: &mut dyn MessageProcessTemplate,
        ctx: &mut ExecutionContext,
    ) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::Completed;
        for phase in &self.phases {
            let is_end_phase = phase.rank() == Some(PhaseRank::EndProcess);
            if !outcome.is_completed() && !is_end_phase {
                continue;
            }
            if !phase.supports_template(template) {
                continue;
            }

            let mut recorder = OutcomeRecorder::default();
            phase.run_phase(template, ctx, &mut recorder).await;
            match recorder.outcome {
                Some(RecordedOutcome::Success) => {}
                None => tracing::error!("phase reported no outcome; treating as success"),
                Some(RecordedOutcome::Consumed) => {
                    tracing::debug!("phase consumed the message");
                    if outcome.is_completed() {
                        outcome = PipelineOutcome::Consumed;
                    }
                }
                Some(RecordedOutcome::Failure(error)) => {
                    tracing::warn!(error = %error, "phase failed");
                    if outcome.is_completed() {
                        outcome = PipelineOutcome::Failed(error);
                    }
                }
            }
        }
        outcome
    }
}

impl Default for PhaseExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PhaseExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseExecutionEngine")
            .field("phases", &self.phases.len())
            .finish()
    }
}
