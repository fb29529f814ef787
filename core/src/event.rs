//! Event - the unit of work flowing through the processing pipeline.
//!
//! An [`Event`] is created once per inbound request and flows through the
//! execution phases and the interception chain. Events are immutable by
//! convention: each transformation step returns a new `Event` (via the
//! `with_*` builders) instead of mutating the previous one in place.
//!
//! # Example
//!
//! ```
//! use flowline_core::event::Event;
//! use serde_json::json;
//!
//! let event = Event::new(json!("hello"))
//!     .with_attribute("source", "inbound-http");
//!
//! let transformed = event.with_payload(json!("HELLO"));
//! assert_eq!(transformed.payload(), &json!("HELLO"));
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ErrorDescriptor;

/// The unit of work carried through phases, templates and interceptors.
///
/// Carries a payload, a string attribute map, and an optional error
/// descriptor attached when a failure is being propagated or has been
/// handled. The error slot is the "processed" slot used for exception
/// enrichment: a failure attaches the descriptor of what went wrong so
/// diagnostics downstream see the resolved event.
#[derive(Debug, Clone)]
pub struct Event {
    id: Uuid,
    correlation_id: String,
    created_at: DateTime<Utc>,
    payload: Value,
    attributes: HashMap<String, String>,
    error: Option<ErrorDescriptor>,
}

impl Event {
    /// Create a new event with the given payload.
    ///
    /// The correlation id defaults to the event id.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            correlation_id: id.to_string(),
            created_at: Utc::now(),
            payload,
            attributes: HashMap::new(),
            error: None,
        }
    }

    /// Unique id of this event.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Correlation id, shared by every event derived from the same inbound
    /// request.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Creation timestamp of the original inbound event.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The event payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Attribute value by key, if present.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The error descriptor attached to this event, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorDescriptor> {
        self.error.as_ref()
    }

    /// Return a copy of this event with a different payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Return a copy of this event with an attribute set.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Return a copy of this event with an error descriptor attached.
    #[must_use]
    pub fn with_error(mut self, error: ErrorDescriptor) -> Self {
        self.error = Some(error);
        self
    }

    /// Return a copy of this event with the error slot cleared.
    ///
    /// Used by continue-style error handlers: absorption must surface a
    /// result event that downstream phases observe as success.
    #[must_use]
    pub fn without_error(mut self) -> Self {
        self.error = None;
        self
    }
}
