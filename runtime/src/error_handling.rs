//! Error-handling execution template and on-error strategies.
//!
//! Wraps the transactional template: the callback runs inside the
//! transactional scope, and a messaging failure is routed through an ordered
//! list of [`OnErrorStrategy`] values before the transaction is resolved. A
//! continue strategy absorbs the failure and yields a replacement event, so
//! the owning scope observes success and commits. A propagate strategy
//! enriches the failure and re-raises it, so the owning scope rolls back.
//!
//! Each strategy owns an optional accept filter (which failures it handles)
//! and optional rollback/commit filters that decide whether a joined or
//! ambient transaction is marked rollback-only.
//!
//! # Example
//!
//! ```
//! use flowline_runtime::error_handling::{ErrorTypeFilter, OnErrorStrategy};
//! use flowline_core::error::ErrorType;
//!
//! let filter = ErrorTypeFilter::parse("flowline.TransportError+");
//! let conn = ErrorType::new("flowline.ConnectionError")
//!     .with_parent("flowline.TransportError");
//! assert!(filter.matches(&conn));
//!
//! let strategy = OnErrorStrategy::propagate().when("flowline.TransportError+");
//! assert!(strategy.accepts(&conn));
//! ```

use flowline_core::error::{ErrorType, FlowError};
use flowline_core::event::Event;
use flowline_core::transaction::TransactionConfig;

use crate::context::ExecutionContext;
use crate::transactional::TransactionalExecutionTemplate;

/// A filter expression matched against the runtime [`ErrorType`] of a
/// failure.
///
/// Grammar, per comma-separated segment:
/// - `*` matches any type
/// - `name+` matches `name` and every type that declares `name` as an
///   ancestor
/// - anything else matches that fully-qualified name exactly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTypeFilter {
    matchers: Vec<Matcher>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    Any,
    Exact(String),
    SubtypeOf(String),
}

impl ErrorTypeFilter {
    /// Parse a filter expression. Empty segments are ignored; an expression
    /// with no usable segment matches nothing.
    #[must_use]
    pub fn parse(expression: &str) -> Self {
        let matchers = expression
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                if segment == "*" {
                    Matcher::Any
                } else if let Some(name) = segment.strip_suffix('+') {
                    Matcher::SubtypeOf(name.to_owned())
                } else {
                    Matcher::Exact(segment.to_owned())
                }
            })
            .collect();
        Self { matchers }
    }

    /// True if any segment of the expression matches the given type.
    #[must_use]
    pub fn matches(&self, error_type: &ErrorType) -> bool {
        self.matchers.iter().any(|matcher| match matcher {
            Matcher::Any => true,
            Matcher::Exact(name) => error_type.name() == name,
            Matcher::SubtypeOf(name) => error_type.is_assignable_to(name),
        })
    }
}

/// What a matched strategy does with the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Absorb the failure and resume as success with a replacement event.
    Continue,
    /// Enrich the failure and re-raise it.
    Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Rollback,
    NoAction,
}

/// Transforms the failing event inside a strategy.
pub type EventTransform = Box<dyn FnMut(Event) -> Event + Send>;

/// One configured on-error handler.
///
/// Strategies are evaluated in registration order; the first whose accept
/// filter matches the failure's runtime type handles it.
pub struct OnErrorStrategy {
    kind: HandlerKind,
    accept: Option<ErrorTypeFilter>,
    rollback_filter: Option<ErrorTypeFilter>,
    commit_filter: Option<ErrorTypeFilter>,
    handler: Option<EventTransform>,
}

impl OnErrorStrategy {
    /// A continue strategy: absorbs matched failures.
    #[must_use]
    pub const fn continue_flow() -> Self {
        Self::new(HandlerKind::Continue)
    }

    /// A propagate strategy: re-raises matched failures after enrichment.
    #[must_use]
    pub const fn propagate() -> Self {
        Self::new(HandlerKind::Propagate)
    }

    const fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            accept: None,
            rollback_filter: None,
            commit_filter: None,
            handler: None,
        }
    }

    /// Restrict this strategy to failures matching the expression. Without
    /// an accept filter the strategy matches every failure.
    #[must_use]
    pub fn when(mut self, expression: &str) -> Self {
        self.accept = Some(ErrorTypeFilter::parse(expression));
        self
    }

    /// Failure types for which a joined or ambient transaction is marked
    /// rollback-only.
    #[must_use]
    pub fn rollback_when(mut self, expression: &str) -> Self {
        self.rollback_filter = Some(ErrorTypeFilter::parse(expression));
        self
    }

    /// Failure types explicitly excluded from rollback.
    #[must_use]
    pub fn commit_when(mut self, expression: &str) -> Self {
        self.commit_filter = Some(ErrorTypeFilter::parse(expression));
        self
    }

    /// Transform applied to the failing event while handling.
    #[must_use]
    pub fn with_handler(mut self, handler: impl FnMut(Event) -> Event + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// The strategy's handling kind.
    #[must_use]
    pub const fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// True if this strategy's accept filter matches the failure type.
    #[must_use]
    pub fn accepts(&self, error_type: &ErrorType) -> bool {
        self.accept
            .as_ref()
            .is_none_or(|filter| filter.matches(error_type))
    }

    /// Decide the transaction disposition for a matched failure.
    ///
    /// Rollback when both filters are absent (propagate only), when the
    /// rollback filter matches, or when a commit filter is configured and
    /// does not match. A commit-filter match with no rollback filter leaves
    /// the disposition ambiguous; that is resolved as no action and logged.
    fn disposition(&self, error_type: &ErrorType) -> Disposition {
        match (&self.rollback_filter, &self.commit_filter) {
            (None, None) => match self.kind {
                HandlerKind::Propagate => Disposition::Rollback,
                HandlerKind::Continue => Disposition::NoAction,
            },
            (Some(rollback), _) if rollback.matches(error_type) => Disposition::Rollback,
            (_, Some(commit)) if !commit.matches(error_type) => Disposition::Rollback,
            (None, Some(_)) => {
                tracing::warn!(
                    error_type = %error_type,
                    "commit filter matched with no rollback filter configured; \
                     taking no transaction action at this layer"
                );
                Disposition::NoAction
            }
            _ => Disposition::NoAction,
        }
    }
}

impl std::fmt::Debug for OnErrorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnErrorStrategy")
            .field("kind", &self.kind)
            .field("accept", &self.accept)
            .field("rollback_filter", &self.rollback_filter)
            .field("commit_filter", &self.commit_filter)
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Executes a unit of work inside a transactional scope with an on-error
/// strategy chain between the failure and the transaction resolution.
pub struct ErrorHandlingExecutionTemplate {
    transactional: TransactionalExecutionTemplate,
    strategies: Vec<OnErrorStrategy>,
}

impl ErrorHandlingExecutionTemplate {
    /// A template with no configured strategies: every messaging failure
    /// takes the default propagate path.
    #[must_use]
    pub fn new(config: TransactionConfig) -> Self {
        Self::with_strategies(config, Vec::new())
    }

    /// A template with an ordered strategy chain.
    #[must_use]
    pub fn with_strategies(config: TransactionConfig, strategies: Vec<OnErrorStrategy>) -> Self {
        Self {
            transactional: TransactionalExecutionTemplate::new(config),
            strategies,
        }
    }

    /// Execute the callback; route a messaging failure through the strategy
    /// chain before the transactional scope resolves.
    ///
    /// # Errors
    ///
    /// Returns the transactional template's errors, non-messaging callback
    /// failures unchanged, and messaging failures a propagate strategy (or
    /// the absence of a match) re-raised.
    pub fn execute(
        &mut self,
        ctx: &mut ExecutionContext,
        callback: impl FnOnce(&mut ExecutionContext) -> Result<Event, FlowError>,
    ) -> Result<Event, FlowError> {
        let strategies = &mut self.strategies;
        self.transactional.execute(ctx, |ctx| match callback(ctx) {
            Ok(event) => Ok(event),
            Err(error) => Self::handle(strategies, ctx, error),
        })
    }

    /// Route a failure through the chain. Runs inside the transactional
    /// scope, so a continue strategy's success return leads to commit.
    fn handle(
        strategies: &mut [OnErrorStrategy],
        ctx: &mut ExecutionContext,
        error: FlowError,
    ) -> Result<Event, FlowError> {
        let mut failure = match error.into_messaging() {
            Ok(failure) => failure,
            // Only messaging failures are recoverable.
            Err(other) => return Err(other),
        };

        let Some(strategy) = strategies
            .iter_mut()
            .find(|strategy| strategy.accepts(failure.error_type()))
        else {
            tracing::debug!(
                error_type = %failure.error_type(),
                "no on-error strategy matched; re-raising"
            );
            mark_rollback_only(ctx);
            return Err(FlowError::messaging(failure));
        };

        tracing::debug!(
            error_type = %failure.error_type(),
            kind = ?strategy.kind,
            "on-error strategy matched"
        );
        if strategy.disposition(failure.error_type()) == Disposition::Rollback {
            mark_rollback_only(ctx);
        }

        match strategy.kind {
            HandlerKind::Continue => {
                failure.set_handled(true);
                let descriptor = failure.descriptor();
                let event = failure.into_event().with_error(descriptor);
                let event = match strategy.handler.as_mut() {
                    Some(handler) => handler(event),
                    None => event,
                };
                Ok(event.without_error())
            }
            HandlerKind::Propagate => {
                let descriptor = failure.descriptor();
                let enriched = failure.event().clone().with_error(descriptor);
                let enriched = match strategy.handler.as_mut() {
                    Some(handler) => handler(enriched),
                    None => enriched,
                };
                failure.set_processed_event(enriched);
                Err(FlowError::messaging(failure))
            }
        }
    }
}

impl std::fmt::Debug for ErrorHandlingExecutionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlingExecutionTemplate")
            .field("transactional", &self.transactional)
            .field("strategies", &self.strategies)
            .finish()
    }
}

/// Mark the currently bound transaction rollback-only. A transaction a
/// failure might reference that is no longer bound is never touched.
fn mark_rollback_only(ctx: &ExecutionContext) {
    if let Some(tx) = ctx.transaction() {
        tracing::debug!(tx = %tx.id(), "marking transaction rollback-only");
        tx.set_rollback_only();
    }
}
