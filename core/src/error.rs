//! Error taxonomy for the processing runtime.
//!
//! Four failure families flow through the runtime:
//!
//! - **Validation failures**: the message is rejected and consumed, not
//!   necessarily fatal.
//! - **Messaging failures** ([`EventError`]): carry the offending event and a
//!   handled/unhandled flag; may be absorbed by an error-handler chain.
//! - **Illegal-transaction-state failures**: programming or configuration
//!   errors, always fatal, never retried.
//! - **Interception failures**: wrap the original error, preserved as the
//!   source cause.
//!
//! [`ErrorType`] gives every messaging failure a runtime type identity with
//! declared parents, so on-error strategies can match "this type and all its
//! subtypes" without language-level inheritance.

use thiserror::Error;

use crate::event::Event;

/// Runtime type identity of a failure.
///
/// A fully-qualified name plus the names of its ancestor types. Filter
/// expressions match against this identity: an exact filter matches the name
/// only, while a `Name+` subtype filter also matches any type that lists
/// `Name` among its parents.
///
/// # Example
///
/// ```
/// use flowline_core::error::ErrorType;
///
/// let retryable = ErrorType::new("flowline.ConnectionError")
///     .with_parent("flowline.TransportError");
/// assert!(retryable.is_assignable_to("flowline.TransportError"));
/// assert!(!retryable.is_assignable_to("flowline.SecurityError"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorType {
    name: String,
    parents: Vec<String>,
}

impl ErrorType {
    /// Create an error type with the given fully-qualified name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
        }
    }

    /// Declare an ancestor type. Ancestors are transitive and must all be
    /// listed; there is no repository to resolve them from.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// The fully-qualified type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this type is the named type or declares it as an ancestor.
    #[must_use]
    pub fn is_assignable_to(&self, name: &str) -> bool {
        self.name == name || self.parents.iter().any(|p| p == name)
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Lightweight error summary attached to an [`Event`].
///
/// Cloneable, unlike the full [`EventError`], so it can ride on the event
/// through the rest of the pipeline for diagnostics.
#[derive(Debug, Clone)]
pub struct ErrorDescriptor {
    error_type: ErrorType,
    description: String,
}

impl ErrorDescriptor {
    /// Create a descriptor for the given type and description.
    #[must_use]
    pub fn new(error_type: ErrorType, description: impl Into<String>) -> Self {
        Self {
            error_type,
            description: description.into(),
        }
    }

    /// The runtime type of the failure.
    #[must_use]
    pub const fn error_type(&self) -> &ErrorType {
        &self.error_type
    }

    /// Human-readable description of the failure.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A messaging failure: an error raised while processing a specific event.
///
/// Owns the failing event (the "processed" slot, replaceable for
/// enrichment), its runtime [`ErrorType`], and a handled flag. An error
/// handler that absorbs the failure marks it handled; an unhandled failure
/// surfaces to the caller with the processed event attached.
#[derive(Debug, Error)]
#[error("error processing event {}: {description} [{error_type}]", .event.id())]
pub struct EventError {
    event: Event,
    error_type: ErrorType,
    description: String,
    handled: bool,
    #[source]
    source: Option<Box<FlowError>>,
}

impl EventError {
    /// Create a messaging failure for the given event.
    #[must_use]
    pub fn new(event: Event, error_type: ErrorType, description: impl Into<String>) -> Self {
        Self {
            event,
            error_type,
            description: description.into(),
            handled: false,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: FlowError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The event that was being processed when the failure occurred.
    #[must_use]
    pub const fn event(&self) -> &Event {
        &self.event
    }

    /// Replace the processed event, enriching the failure with the latest
    /// resolved state.
    pub fn set_processed_event(&mut self, event: Event) {
        self.event = event;
    }

    /// Consume the failure, yielding its event.
    #[must_use]
    pub fn into_event(self) -> Event {
        self.event
    }

    /// The runtime type of this failure.
    #[must_use]
    pub const fn error_type(&self) -> &ErrorType {
        &self.error_type
    }

    /// Description of the failure.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether an error handler already absorbed this failure.
    #[must_use]
    pub const fn handled(&self) -> bool {
        self.handled
    }

    /// Mark this failure handled or unhandled.
    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    /// A cloneable summary of this failure, suitable for attaching to an
    /// event.
    #[must_use]
    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor::new(self.error_type.clone(), self.description.clone())
    }
}

/// Failures raised by transaction operations or the transaction registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// A transaction is already bound to the execution context.
    #[error("a transaction is already bound to this execution context")]
    AlreadyBound,

    /// The bound transaction cannot be suspended (not XA-capable).
    #[error("bound transaction is not suspendable")]
    NotSuspendable,

    /// Beginning the transaction failed.
    #[error("failed to begin transaction: {0}")]
    BeginFailed(String),

    /// Committing the transaction failed.
    #[error("failed to commit transaction: {0}")]
    CommitFailed(String),

    /// Rolling the transaction back failed.
    #[error("failed to roll back transaction: {0}")]
    RollbackFailed(String),

    /// Suspending the transaction failed.
    #[error("failed to suspend transaction: {0}")]
    SuspendFailed(String),

    /// Resuming the transaction failed.
    #[error("failed to resume transaction: {0}")]
    ResumeFailed(String),
}

/// Top-level failure type for the processing runtime.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A messaging failure carrying the offending event.
    #[error(transparent)]
    Messaging(Box<EventError>),

    /// A declared transaction action conflicts with the current transaction
    /// state. Always a programming or configuration error.
    #[error("illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// A transaction operation failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// A failure raised inside the interception chain, with the original
    /// error preserved as the cause.
    #[error("interception chain failed")]
    Interception {
        /// The original failure.
        #[source]
        source: Box<FlowError>,
    },

    /// Dispatching a response to the client failed.
    #[error("failed to dispatch response to client: {0}")]
    ResponseDispatch(String),

    /// A phase was invoked with a template that does not support it.
    #[error("template does not support the {0} phase")]
    UnsupportedTemplate(&'static str),
}

impl FlowError {
    /// Wrap a messaging failure.
    #[must_use]
    pub fn messaging(error: EventError) -> Self {
        Self::Messaging(Box::new(error))
    }

    /// Wrap an error as an interception failure, preserving it as the cause.
    /// An already-wrapped interception failure is returned unchanged so the
    /// original cause is never nested twice.
    #[must_use]
    pub fn interception(error: Self) -> Self {
        match error {
            wrapped @ Self::Interception { .. } => wrapped,
            other => Self::Interception {
                source: Box::new(other),
            },
        }
    }

    /// The messaging failure inside this error, if that is what it is.
    /// Interception wrappers are looked through.
    #[must_use]
    pub fn as_messaging(&self) -> Option<&EventError> {
        match self {
            Self::Messaging(e) => Some(e),
            Self::Interception { source } => source.as_messaging(),
            _ => None,
        }
    }

    /// Unwrap down to the messaging failure, looking through interception
    /// wrappers. A non-messaging error comes back unchanged, re-wrapped the
    /// way it arrived.
    ///
    /// # Errors
    ///
    /// Returns the error itself when it carries no messaging failure.
    pub fn into_messaging(self) -> Result<EventError, Self> {
        match self {
            Self::Messaging(failure) => Ok(*failure),
            Self::Interception { source } => source.into_messaging().map_err(Self::interception),
            other => Err(other),
        }
    }
}

impl From<EventError> for FlowError {
    fn from(error: EventError) -> Self {
        Self::messaging(error)
    }
}
