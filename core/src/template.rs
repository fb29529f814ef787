//! Phase-facing template traits.
//!
//! A concrete processing context (typically supplied by a connector)
//! participates in the pipeline by implementing [`MessageProcessTemplate`]
//! plus one facet trait per phase capability it supports. Capability is
//! declared explicitly through [`MessageProcessTemplate::supports`] and the
//! `as_*` facet accessors; a phase presented with a template that lacks its
//! capability is a caller programming error.
//!
//! The facet split keeps each phase's contract narrow: validation sees only
//! validate/discard, flow processing sees the routing hooks, and the end
//! phase sees the single completion callback.

use async_trait::async_trait;

use crate::error::{EventError, FlowError};
use crate::event::Event;

/// Phase capability tags a template can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCapability {
    /// The template can validate and discard inbound messages.
    Validation,
    /// The template can route an event through the configured processor.
    FlowProcessing,
    /// The template wants to observe the end of processing.
    EndProcess,
}

/// Base trait every processing template implements.
///
/// Declares supported capabilities and exposes the matching facets. A
/// template must return a facet for every capability it declares; the
/// default accessors return `None`.
pub trait MessageProcessTemplate: Send {
    /// Whether this template declares the given capability.
    fn supports(&self, capability: PhaseCapability) -> bool;

    /// The validation facet, if [`PhaseCapability::Validation`] is declared.
    fn as_validation(&mut self) -> Option<&mut dyn ValidationTemplate> {
        None
    }

    /// The flow-processing facet, if [`PhaseCapability::FlowProcessing`] is
    /// declared.
    fn as_flow_processing(&mut self) -> Option<&mut dyn FlowProcessingTemplate> {
        None
    }

    /// The end-process facet, if [`PhaseCapability::EndProcess`] is
    /// declared.
    fn as_end_process(&mut self) -> Option<&mut dyn EndProcessTemplate> {
        None
    }
}

/// Validation-phase contract.
pub trait ValidationTemplate: Send {
    /// Decide whether the inbound message is acceptable.
    ///
    /// # Errors
    ///
    /// Returns an error if validation itself cannot be performed.
    fn validate_message(&mut self) -> Result<bool, FlowError>;

    /// Dispose of a message that failed validation.
    ///
    /// # Errors
    ///
    /// Returns an error if discarding fails; the phase reports it through
    /// the notifier.
    fn discard_invalid_message(&mut self) -> Result<(), FlowError>;
}

/// Flow-processing-phase contract: the routing hooks around the configured
/// processor, plus optional request/response semantics.
#[async_trait]
pub trait FlowProcessingTemplate: Send {
    /// The event to process.
    fn event(&self) -> Event;

    /// Location of the message source, used when emitting notifications.
    fn location(&self) -> &str;

    /// Hook before routing; may replace the event.
    ///
    /// # Errors
    ///
    /// A failure here aborts routing.
    async fn before_route_event(&mut self, event: Event) -> Result<Event, FlowError> {
        Ok(event)
    }

    /// Route the event through the configured processor (the interception
    /// chain runs here).
    ///
    /// # Errors
    ///
    /// Returns the routing failure, handled or not.
    async fn route_event(&mut self, event: Event) -> Result<Event, FlowError>;

    /// Hook after successful routing; may replace the event.
    ///
    /// # Errors
    ///
    /// A failure here is treated like a routing failure.
    async fn after_route_event(&mut self, event: Event) -> Result<Event, FlowError> {
        Ok(event)
    }

    /// Called once after the flow completed successfully.
    ///
    /// # Errors
    ///
    /// Failures are logged by the phase; they do not change the outcome.
    async fn after_successful_processing_flow(&mut self, _event: &Event) -> Result<(), FlowError> {
        Ok(())
    }

    /// Called once when the flow failed with an unhandled messaging error.
    ///
    /// # Errors
    ///
    /// Failures are logged by the phase; they do not change the outcome.
    async fn after_failure_processing_flow(&mut self, _error: &EventError) -> Result<(), FlowError> {
        Ok(())
    }

    /// Whether this template has request/response semantics. Templates that
    /// return `true` get `send_response_to_client` /
    /// `send_failure_response_to_client` invoked before the phase declares
    /// its outcome.
    fn sends_response(&self) -> bool {
        false
    }

    /// Send the success response to the client.
    ///
    /// # Errors
    ///
    /// A failure here is reported once through
    /// `after_failure_processing_flow` without overriding the successful
    /// phase outcome.
    async fn send_response_to_client(&mut self, _event: &Event) -> Result<(), FlowError> {
        Ok(())
    }

    /// Send the failure response to the client.
    ///
    /// # Errors
    ///
    /// A failure here becomes the phase failure; the original error is not
    /// reported a second time.
    async fn send_failure_response_to_client(
        &mut self,
        _error: &EventError,
    ) -> Result<(), FlowError> {
        Ok(())
    }
}

/// End-process-phase contract.
pub trait EndProcessTemplate: Send {
    /// Called unconditionally once the pipeline is done with the message.
    fn message_processing_ended(&mut self);
}
