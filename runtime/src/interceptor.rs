//! Processor interception chain.
//!
//! Wraps a single processor invocation with zero or more ordered
//! interceptors, each exposing `before`/`around`/`after` hooks. The chain
//! runs in two stages: first every active interceptor's `before` in order,
//! mutating one shared event, then the `around` onion. For N active
//! interceptors: `before₁ → … → beforeₙ → around₁{ around₂{ … process() … }
//! } → afterₙ → … → after₁`. The first-registered interceptor is outermost
//! in the onion, and a `before` mutation is visible to every `around`,
//! including those of earlier interceptors.
//!
//! `around` receives an [`InterceptionAction`] and either proceeds down the
//! chain or skips the wrapped processor entirely. The chain is built as
//! composed continuation functions: each layer hands the next layer a
//! boxed-future continuation, so an `around` hook that completes its
//! deferred result on another task still unwinds `after` hooks in reverse
//! order, driven by completion rather than wall-clock.
//!
//! `after` runs exactly once for every interceptor whose `before` was
//! entered, on both normal completion and failure unwinding. A failure
//! anywhere in the chain surfaces to the caller as
//! [`FlowError::Interception`] with the original error preserved as the
//! cause.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use flowline_core::error::FlowError;
use flowline_core::event::Event;

/// Resolved configuration parameters handed to interception hooks.
pub type InterceptionParameters = HashMap<String, serde_json::Value>;

/// Identifies the component a chain wraps: where it sits in the flow and
/// which namespaced operation it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentLocation {
    location: String,
    namespace: String,
    name: String,
}

impl ComponentLocation {
    /// Create a component location.
    #[must_use]
    pub fn new(
        location: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Path of the component within its flow.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Namespace of the component's declaring extension.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Component name within its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ComponentLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} at {}", self.namespace, self.name, self.location)
    }
}

/// The wrapped unit of work.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Process one event, producing its successor.
    async fn process(&self, event: Event) -> Result<Event, FlowError>;
}

/// Continuation control handed to an `around` hook.
///
/// Exactly one of [`proceed`](Self::proceed) or [`skip`](Self::skip) should
/// be awaited; dropping the action without calling either behaves like
/// `skip` with the event the hook already had.
pub struct InterceptionAction<'a> {
    next: Box<dyn FnOnce(Event) -> BoxFuture<'a, Result<Event, FlowError>> + Send + 'a>,
}

impl<'a> InterceptionAction<'a> {
    /// Continue down the chain toward the wrapped processor. The returned
    /// future settles when everything downstream has completed; mutating
    /// its output overrides the downstream result.
    pub fn proceed(self, event: Event) -> BoxFuture<'a, Result<Event, FlowError>> {
        (self.next)(event)
    }

    /// Bypass the wrapped processor and everything downstream, resolving
    /// the chain with the given event.
    #[must_use]
    pub fn skip(self, event: Event) -> BoxFuture<'a, Result<Event, FlowError>> {
        Box::pin(async move { Ok(event) })
    }
}

impl std::fmt::Debug for InterceptionAction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionAction").finish_non_exhaustive()
    }
}

/// Hooks wrapped around a processor invocation.
///
/// All hooks have pass-through defaults; implement only what you need.
#[async_trait]
pub trait ProcessorInterceptor: Send + Sync {
    /// Whether this interceptor applies to the given component. Declining
    /// means none of its hooks run for that component.
    fn intercept(&self, location: &ComponentLocation) -> bool {
        let _ = location;
        true
    }

    /// Runs before any `around`, in interceptor order. Mutations to the
    /// event are visible to every subsequent hook, including the `around`
    /// hooks of earlier interceptors, and to the processor.
    ///
    /// # Errors
    ///
    /// A failure here means no `around` runs at all and the processor is
    /// never invoked; `after` hooks of every entered `before` still unwind.
    fn before(
        &self,
        location: &ComponentLocation,
        params: &InterceptionParameters,
        event: &mut Event,
    ) -> Result<(), FlowError> {
        let _ = (location, params, event);
        Ok(())
    }

    /// Wraps everything downstream. The default proceeds unchanged.
    ///
    /// # Errors
    ///
    /// Propagates the downstream failure, or its own.
    async fn around<'a>(
        &self,
        location: &ComponentLocation,
        params: &InterceptionParameters,
        event: Event,
        action: InterceptionAction<'a>,
    ) -> Result<Event, FlowError> {
        let _ = (location, params);
        action.proceed(event).await
    }

    /// Runs exactly once per entered `before`, in reverse order, on both
    /// completion and failure unwinding. `thrown` carries the failure
    /// during unwinding.
    fn after(&self, location: &ComponentLocation, event: &mut Event, thrown: Option<&FlowError>) {
        let _ = (location, event, thrown);
    }
}

/// Creates interceptors and decides which components they apply to.
pub trait ProcessorInterceptorFactory: Send + Sync {
    /// Namespace this factory was contributed from; used by
    /// [`InterceptorRegistry::set_interceptors_order`].
    fn namespace(&self) -> &str;

    /// Whether interceptors from this factory apply to the component.
    fn intercept(&self, location: &ComponentLocation) -> bool {
        let _ = location;
        true
    }

    /// Create one interceptor instance.
    fn create(&self) -> Arc<dyn ProcessorInterceptor>;
}

/// Ordered registration of interceptor factories.
///
/// Factories apply in registration order unless an explicit namespace
/// precedence reorders them; the sort is stable, and factories whose
/// namespace is not listed keep their relative order after all listed ones.
#[derive(Default)]
pub struct InterceptorRegistry {
    factories: Vec<Arc<dyn ProcessorInterceptorFactory>>,
    order: Vec<String>,
}

impl InterceptorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interceptor factory at the end of the current order.
    pub fn add_interceptor(&mut self, factory: Arc<dyn ProcessorInterceptorFactory>) {
        self.factories.push(factory);
        self.apply_order();
    }

    /// Declare namespace precedence. Factories are reordered stably so
    /// that listed namespaces come first, in list order.
    pub fn set_interceptors_order<I, S>(&mut self, namespaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = namespaces.into_iter().map(Into::into).collect();
        self.apply_order();
    }

    fn apply_order(&mut self) {
        let order = &self.order;
        self.factories.sort_by_key(|factory| {
            order
                .iter()
                .position(|ns| ns == factory.namespace())
                .unwrap_or(order.len())
        });
    }

    /// Create the interceptors that apply to the given component, in
    /// effective order.
    #[must_use]
    pub fn interceptors_for(
        &self,
        location: &ComponentLocation,
    ) -> Vec<Arc<dyn ProcessorInterceptor>> {
        self.factories
            .iter()
            .filter(|factory| factory.intercept(location))
            .map(|factory| factory.create())
            .collect()
    }

    /// Build an interception chain around a processor at the given
    /// component.
    #[must_use]
    pub fn chain(
        &self,
        processor: Arc<dyn Processor>,
        location: ComponentLocation,
        params: InterceptionParameters,
    ) -> InterceptionChain {
        InterceptionChain::new(self.interceptors_for(&location), processor, location, params)
    }

    /// Namespaces of the registered factories, in effective order.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.namespace()).collect()
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("namespaces", &self.namespaces())
            .field("order", &self.order)
            .finish()
    }
}

/// A processor wrapped by its active interceptors for one component.
pub struct InterceptionChain {
    interceptors: Vec<Arc<dyn ProcessorInterceptor>>,
    processor: Arc<dyn Processor>,
    location: ComponentLocation,
    params: InterceptionParameters,
}

impl InterceptionChain {
    /// Assemble a chain. Interceptors apply outermost-first.
    #[must_use]
    pub fn new(
        interceptors: Vec<Arc<dyn ProcessorInterceptor>>,
        processor: Arc<dyn Processor>,
        location: ComponentLocation,
        params: InterceptionParameters,
    ) -> Self {
        Self {
            interceptors,
            processor,
            location,
            params,
        }
    }

    /// The component this chain wraps.
    #[must_use]
    pub const fn location(&self) -> &ComponentLocation {
        &self.location
    }

    /// Run the event through the chain and the wrapped processor.
    ///
    /// # Errors
    ///
    /// Any failure raised by a hook or the processor, wrapped as
    /// [`FlowError::Interception`] with the original error as the cause.
    pub async fn process(&self, event: Event) -> Result<Event, FlowError> {
        let active: Vec<Arc<dyn ProcessorInterceptor>> = self
            .interceptors
            .iter()
            .filter(|interceptor| interceptor.intercept(&self.location))
            .map(Arc::clone)
            .collect();

        tracing::trace!(
            component = %self.location,
            active = active.len(),
            "running interception chain"
        );

        // Stage one: every before, in order, against the one shared event.
        let mut event = event;
        for (idx, interceptor) in active.iter().enumerate() {
            if let Err(error) = interceptor.before(&self.location, &self.params, &mut event) {
                // No around runs once a before has failed; every entered
                // before still gets its after, in reverse order.
                for entered in active[..=idx].iter().rev() {
                    entered.after(&self.location, &mut event, Some(&error));
                }
                return Err(FlowError::interception(error));
            }
        }

        // Stage two: the around onion down to the processor.
        Self::apply(&active, &self.processor, &self.location, &self.params, event)
            .await
            .map_err(FlowError::interception)
    }

    /// One onion layer: run the head interceptor's `around` around the rest
    /// of the chain. Recursion makes the reverse-order `after` unwinding
    /// fall out of the call structure.
    fn apply<'a>(
        interceptors: &'a [Arc<dyn ProcessorInterceptor>],
        processor: &'a Arc<dyn Processor>,
        location: &'a ComponentLocation,
        params: &'a InterceptionParameters,
        event: Event,
    ) -> BoxFuture<'a, Result<Event, FlowError>> {
        Box::pin(async move {
            let Some((head, rest)) = interceptors.split_first() else {
                return processor.process(event).await;
            };

            // Fallback for after-on-failure, when the error carries no event.
            let entering = event.clone();
            let action = InterceptionAction {
                next: Box::new(move |event| Self::apply(rest, processor, location, params, event)),
            };
            match head.around(location, params, event, action).await {
                Ok(mut output) => {
                    head.after(location, &mut output, None);
                    Ok(output)
                }
                Err(error) => {
                    let mut unwound = error
                        .as_messaging()
                        .map_or(entering, |failure| failure.event().clone());
                    head.after(location, &mut unwound, Some(&error));
                    Err(error)
                }
            }
        })
    }
}

impl std::fmt::Debug for InterceptionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionChain")
            .field("location", &self.location)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}
