//! Flow-processing phase: routes the event through the configured flow and
//! dispatches the response.
//!
//! Routing runs the template's hooks in order: `before_route_event`,
//! `route_event` (where the interception chain and any transactional scope
//! live), `after_route_event`. For request/response templates the phase
//! then dispatches a response or failure response and fires exactly one
//! Response/ErrorResponse notification per terminal outcome.
//!
//! Failure discipline: an unhandled messaging failure is reported to the
//! template through `after_failure_processing_flow` exactly once. A failure
//! while sending the success response is reported through the same hook,
//! without overriding the successful phase outcome. A failure while sending
//! the *failure* response becomes the phase failure and is never reported
//! to the hook a second time.

use std::sync::Arc;

use async_trait::async_trait;

use flowline_core::error::{ErrorType, EventError, FlowError};
use flowline_core::event::Event;
use flowline_core::notification::{NotificationKind, NotificationSink, NullNotificationSink};
use flowline_core::template::{FlowProcessingTemplate, MessageProcessTemplate, PhaseCapability};

use crate::context::ExecutionContext;

use super::{MessageProcessPhase, PhaseRank, PhaseResultNotifier};

/// Second pipeline phase: the flow itself.
pub struct FlowProcessingPhase {
    sink: Arc<dyn NotificationSink>,
}

impl FlowProcessingPhase {
    /// Create the phase with a notification sink for response outcomes.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    async fn route(flow: &mut dyn FlowProcessingTemplate) -> Result<Event, FlowError> {
        let event = flow.event();
        let event = flow.before_route_event(event).await?;
        let event = flow.route_event(event).await?;
        flow.after_route_event(event).await
    }

    /// Success path, also taken for handled failures: dispatch the
    /// response, then declare success.
    async fn complete_successfully(
        &self,
        flow: &mut dyn FlowProcessingTemplate,
        event: Event,
        notifier: &mut dyn PhaseResultNotifier,
    ) {
        if flow.sends_response() {
            self.sink
                .fire(NotificationKind::Response, &event, flow.location());
            if let Err(send_error) = flow.send_response_to_client(&event).await {
                tracing::warn!(error = %send_error, "failed to send response to client");
                let failure = dispatch_failure(event, send_error);
                if let Err(hook_error) = flow.after_failure_processing_flow(&failure).await {
                    tracing::warn!(error = %hook_error, "after-failure hook failed");
                }
                // The flow itself completed; the phase outcome stays
                // successful.
                notifier.phase_successfully();
                return;
            }
        }
        if let Err(hook_error) = flow.after_successful_processing_flow(&event).await {
            tracing::warn!(error = %hook_error, "after-success hook failed");
        }
        notifier.phase_successfully();
    }

    /// Unhandled-failure path: report to the template once, then dispatch
    /// the failure response.
    async fn complete_with_failure(
        &self,
        flow: &mut dyn FlowProcessingTemplate,
        failure: EventError,
        notifier: &mut dyn PhaseResultNotifier,
    ) {
        if let Err(hook_error) = flow.after_failure_processing_flow(&failure).await {
            tracing::warn!(error = %hook_error, "after-failure hook failed");
        }
        if flow.sends_response() {
            self.sink
                .fire(NotificationKind::ErrorResponse, failure.event(), flow.location());
            match flow.send_failure_response_to_client(&failure).await {
                // The failure was dispatched to the client; the phase did
                // its job.
                Ok(()) => notifier.phase_successfully(),
                Err(send_error) => notifier.phase_failure(send_error),
            }
        } else {
            notifier.phase_failure(FlowError::messaging(failure));
        }
    }
}

impl Default for FlowProcessingPhase {
    fn default() -> Self {
        Self::new(Arc::new(NullNotificationSink))
    }
}

impl std::fmt::Debug for FlowProcessingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowProcessingPhase").finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageProcessPhase for FlowProcessingPhase {
    fn rank(&self) -> Option<PhaseRank> {
        Some(PhaseRank::FlowProcessing)
    }

    fn supports_template(&self, template: &dyn MessageProcessTemplate) -> bool {
        template.supports(PhaseCapability::FlowProcessing)
    }

    async fn run_phase(
        &self,
        template: &mut dyn MessageProcessTemplate,
        _ctx: &mut ExecutionContext,
        notifier: &mut dyn PhaseResultNotifier,
    ) {
        let Some(flow) = template.as_flow_processing() else {
            notifier.phase_failure(FlowError::UnsupportedTemplate("flow-processing"));
            return;
        };

        match Self::route(flow).await {
            Ok(event) => self.complete_successfully(flow, event, notifier).await,
            Err(error) => match error.into_messaging() {
                Ok(failure) if failure.handled() => {
                    tracing::debug!("flow failed with a handled error; responding normally");
                    let event = failure.into_event();
                    self.complete_successfully(flow, event, notifier).await;
                }
                Ok(failure) => self.complete_with_failure(flow, failure, notifier).await,
                Err(other) => notifier.phase_failure(other),
            },
        }
    }
}

/// A response-dispatch failure, typed so on-error strategies can match it.
fn dispatch_failure(event: Event, cause: FlowError) -> EventError {
    let description = cause.to_string();
    EventError::new(
        event,
        ErrorType::new("flowline.ResponseDispatchError"),
        description,
    )
    .with_source(cause)
}
