//! The fixed message-processing pipeline.
//!
//! Three phases run in a total order: Validation, then FlowProcessing, then
//! EndProcess. A phase only runs for templates that declare its capability,
//! and reports its outcome through a [`PhaseResultNotifier`] exactly once
//! per run. Phase failures never propagate past the phase boundary.
//!
//! [`engine::PhaseExecutionEngine`] drives a template through the pipeline.

pub mod end_process;
pub mod engine;
pub mod flow_processing;
pub mod validation;

pub use end_process::EndProcessPhase;
pub use engine::{PhaseExecutionEngine, PipelineOutcome};
pub use flow_processing::FlowProcessingPhase;
pub use validation::ValidationPhase;

use std::cmp::Ordering;

use async_trait::async_trait;

use flowline_core::error::FlowError;
use flowline_core::template::MessageProcessTemplate;

use crate::context::ExecutionContext;

/// Position of a built-in phase within the pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhaseRank {
    /// Message validation, first.
    Validation,
    /// Routing through the flow, second.
    FlowProcessing,
    /// End-of-processing callback, last.
    EndProcess,
}

/// Single-use sink for a phase run's outcome.
///
/// Exactly one of the three methods must be invoked exactly once per
/// `run_phase` call; the phase implementations enforce this, not the
/// notifier.
pub trait PhaseResultNotifier: Send {
    /// The phase completed and processing may continue.
    fn phase_successfully(&mut self);

    /// The phase consumed the message; downstream phases must not run.
    fn phase_consumed_message(&mut self);

    /// The phase failed.
    fn phase_failure(&mut self, error: FlowError);
}

/// One stage of the pipeline: a stateless policy object that runs a
/// template it supports.
#[async_trait]
pub trait MessageProcessPhase: Send + Sync {
    /// Rank of this phase in the built-in order. Phases outside the
    /// built-in pipeline return `None` and compare neutral to everything.
    fn rank(&self) -> Option<PhaseRank> {
        None
    }

    /// Whether this phase can run the given template.
    fn supports_template(&self, template: &dyn MessageProcessTemplate) -> bool;

    /// Total order of built-in phases; two phases without a mutual rank
    /// relation compare equal.
    fn compare_to(&self, other: &dyn MessageProcessPhase) -> Ordering {
        match (self.rank(), other.rank()) {
            (Some(own), Some(theirs)) => own.cmp(&theirs),
            _ => Ordering::Equal,
        }
    }

    /// Run the phase. The outcome is reported through `notifier`, never
    /// raised.
    async fn run_phase(
        &self,
        template: &mut dyn MessageProcessTemplate,
        ctx: &mut ExecutionContext,
        notifier: &mut dyn PhaseResultNotifier,
    );
}
