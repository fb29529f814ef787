//! Validation phase: accept, consume or fail the inbound message.

use async_trait::async_trait;

use flowline_core::error::FlowError;
use flowline_core::template::{MessageProcessTemplate, PhaseCapability};

use crate::context::ExecutionContext;

use super::{MessageProcessPhase, PhaseRank, PhaseResultNotifier};

/// First pipeline phase. A valid message passes through; an invalid one is
/// discarded and reported as consumed, unless discarding itself fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationPhase;

impl ValidationPhase {
    /// Create the phase.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageProcessPhase for ValidationPhase {
    fn rank(&self) -> Option<PhaseRank> {
        Some(PhaseRank::Validation)
    }

    fn supports_template(&self, template: &dyn MessageProcessTemplate) -> bool {
        template.supports(PhaseCapability::Validation)
    }

    async fn run_phase(
        &self,
        template: &mut dyn MessageProcessTemplate,
        _ctx: &mut ExecutionContext,
        notifier: &mut dyn PhaseResultNotifier,
    ) {
        let Some(validation) = template.as_validation() else {
            notifier.phase_failure(FlowError::UnsupportedTemplate("validation"));
            return;
        };

        match validation.validate_message() {
            Ok(true) => notifier.phase_successfully(),
            Ok(false) => {
                tracing::debug!("message rejected by validation; discarding");
                match validation.discard_invalid_message() {
                    Ok(()) => notifier.phase_consumed_message(),
                    Err(error) => notifier.phase_failure(error),
                }
            }
            Err(error) => notifier.phase_failure(error),
        }
    }
}
