//! End-process phase: unconditional completion callback.

use async_trait::async_trait;

use flowline_core::template::{MessageProcessTemplate, PhaseCapability};

use crate::context::ExecutionContext;

use super::{MessageProcessPhase, PhaseRank, PhaseResultNotifier};

/// Last pipeline phase. Always terminal-successful: it never consumes or
/// fails, it only tells the template that processing is over.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndProcessPhase;

impl EndProcessPhase {
    /// Create the phase.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageProcessPhase for EndProcessPhase {
    fn rank(&self) -> Option<PhaseRank> {
        Some(PhaseRank::EndProcess)
    }

    fn supports_template(&self, template: &dyn MessageProcessTemplate) -> bool {
        template.supports(PhaseCapability::EndProcess)
    }

    async fn run_phase(
        &self,
        template: &mut dyn MessageProcessTemplate,
        _ctx: &mut ExecutionContext,
        notifier: &mut dyn PhaseResultNotifier,
    ) {
        if let Some(end) = template.as_end_process() {
            end.message_processing_ended();
        }
        notifier.phase_successfully();
    }
}
