//! Scripted message-process template.
//!
//! Implements every phase facet and records the order in which its hooks
//! were invoked. Builder methods script the failure points tests need.

use async_trait::async_trait;
use serde_json::Value;

use flowline_core::error::{ErrorType, EventError, FlowError};
use flowline_core::event::Event;
use flowline_core::template::{
    EndProcessTemplate, FlowProcessingTemplate, MessageProcessTemplate, PhaseCapability,
    ValidationTemplate,
};

struct ScriptedRouteFailure {
    error_type: String,
    handled: bool,
}

/// A template supporting all three phase capabilities, with scriptable
/// validation, routing and response behavior.
pub struct ScriptedTemplate {
    event: Event,
    location: String,
    calls: Vec<&'static str>,
    valid: bool,
    fail_discard: bool,
    responding: bool,
    route_failure: Option<ScriptedRouteFailure>,
    fail_response_send: bool,
    fail_failure_response_send: bool,
}

impl ScriptedTemplate {
    /// A well-behaved template around an event with the given payload.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            event: Event::new(payload),
            location: "test-flow/source".to_owned(),
            calls: Vec::new(),
            valid: true,
            fail_discard: false,
            responding: false,
            route_failure: None,
            fail_response_send: false,
            fail_failure_response_send: false,
        }
    }

    /// Script validation to reject the message.
    #[must_use]
    pub const fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    /// Script discarding to fail.
    #[must_use]
    pub const fn failing_discard(mut self) -> Self {
        self.fail_discard = true;
        self
    }

    /// Declare request/response semantics.
    #[must_use]
    pub const fn responding(mut self) -> Self {
        self.responding = true;
        self
    }

    /// Script routing to fail with an unhandled messaging error of the
    /// given type.
    #[must_use]
    pub fn failing_route(mut self, error_type: &str) -> Self {
        self.route_failure = Some(ScriptedRouteFailure {
            error_type: error_type.to_owned(),
            handled: false,
        });
        self
    }

    /// Script routing to fail with an already-handled messaging error.
    #[must_use]
    pub fn failing_route_handled(mut self, error_type: &str) -> Self {
        self.route_failure = Some(ScriptedRouteFailure {
            error_type: error_type.to_owned(),
            handled: true,
        });
        self
    }

    /// Script the success response dispatch to fail.
    #[must_use]
    pub const fn failing_response_send(mut self) -> Self {
        self.fail_response_send = true;
        self
    }

    /// Script the failure response dispatch to fail.
    #[must_use]
    pub const fn failing_failure_response_send(mut self) -> Self {
        self.fail_failure_response_send = true;
        self
    }

    /// Hook invocations observed so far, in order.
    #[must_use]
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }
}

impl MessageProcessTemplate for ScriptedTemplate {
    fn supports(&self, _capability: PhaseCapability) -> bool {
        true
    }

    fn as_validation(&mut self) -> Option<&mut dyn ValidationTemplate> {
        Some(self)
    }

    fn as_flow_processing(&mut self) -> Option<&mut dyn FlowProcessingTemplate> {
        Some(self)
    }

    fn as_end_process(&mut self) -> Option<&mut dyn EndProcessTemplate> {
        Some(self)
    }
}

impl ValidationTemplate for ScriptedTemplate {
    fn validate_message(&mut self) -> Result<bool, FlowError> {
        self.calls.push("validate");
        Ok(self.valid)
    }

    fn discard_invalid_message(&mut self) -> Result<(), FlowError> {
        self.calls.push("discard");
        if self.fail_discard {
            return Err(FlowError::messaging(EventError::new(
                self.event.clone(),
                ErrorType::new("flowline.DiscardError"),
                "scripted discard failure",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FlowProcessingTemplate for ScriptedTemplate {
    fn event(&self) -> Event {
        self.event.clone()
    }

    fn location(&self) -> &str {
        &self.location
    }

    async fn before_route_event(&mut self, event: Event) -> Result<Event, FlowError> {
        self.calls.push("before_route");
        Ok(event)
    }

    async fn route_event(&mut self, event: Event) -> Result<Event, FlowError> {
        self.calls.push("route");
        if let Some(scripted) = &self.route_failure {
            let mut failure = EventError::new(
                event,
                ErrorType::new(scripted.error_type.clone()),
                "scripted routing failure",
            );
            failure.set_handled(scripted.handled);
            return Err(FlowError::messaging(failure));
        }
        Ok(event)
    }

    async fn after_route_event(&mut self, event: Event) -> Result<Event, FlowError> {
        self.calls.push("after_route");
        Ok(event)
    }

    async fn after_successful_processing_flow(&mut self, _event: &Event) -> Result<(), FlowError> {
        self.calls.push("after_successful");
        Ok(())
    }

    async fn after_failure_processing_flow(&mut self, _error: &EventError) -> Result<(), FlowError> {
        self.calls.push("after_failure");
        Ok(())
    }

    fn sends_response(&self) -> bool {
        self.responding
    }

    async fn send_response_to_client(&mut self, _event: &Event) -> Result<(), FlowError> {
        self.calls.push("send_response");
        if self.fail_response_send {
            return Err(FlowError::ResponseDispatch(
                "scripted response failure".to_owned(),
            ));
        }
        Ok(())
    }

    async fn send_failure_response_to_client(
        &mut self,
        _error: &EventError,
    ) -> Result<(), FlowError> {
        self.calls.push("send_failure_response");
        if self.fail_failure_response_send {
            return Err(FlowError::ResponseDispatch(
                "scripted failure-response failure".to_owned(),
            ));
        }
        Ok(())
    }
}

impl EndProcessTemplate for ScriptedTemplate {
    fn message_processing_ended(&mut self) {
        self.calls.push("ended");
    }
}
