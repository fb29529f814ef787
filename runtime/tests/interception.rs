//! Interception chain behavior: onion ordering, mutation visibility,
//! proceed/skip control and failure unwinding.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};

use flowline_core::error::FlowError;
use flowline_core::event::Event;
use flowline_runtime::interceptor::{
    ComponentLocation, InterceptionAction, InterceptionChain, InterceptionParameters,
    InterceptorRegistry, Processor, ProcessorInterceptor, ProcessorInterceptorFactory,
};

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log, entry: String) {
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(entry);
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn payload_text(event: &Event) -> String {
    event
        .payload()
        .as_str()
        .map_or_else(|| event.payload().to_string(), str::to_owned)
}

fn location() -> ComponentLocation {
    ComponentLocation::new("flow/processors/0", "test", "operation")
}

#[derive(Default)]
struct RecordingInterceptor {
    name: &'static str,
    log: Log,
    declines: bool,
    fail_before: bool,
    skip_in_around: bool,
    mutate_in_before: Option<Value>,
    mutate_in_around: Option<Value>,
}

impl RecordingInterceptor {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ProcessorInterceptor for RecordingInterceptor {
    fn intercept(&self, _location: &ComponentLocation) -> bool {
        !self.declines
    }

    fn before(
        &self,
        _location: &ComponentLocation,
        _params: &InterceptionParameters,
        event: &mut Event,
    ) -> Result<(), FlowError> {
        record(&self.log, format!("{}:before:{}", self.name, payload_text(event)));
        if let Some(payload) = &self.mutate_in_before {
            *event = event.clone().with_payload(payload.clone());
        }
        if self.fail_before {
            return Err(FlowError::ResponseDispatch(format!(
                "{} failed in before",
                self.name
            )));
        }
        Ok(())
    }

    async fn around<'a>(
        &self,
        _location: &ComponentLocation,
        _params: &InterceptionParameters,
        mut event: Event,
        action: InterceptionAction<'a>,
    ) -> Result<Event, FlowError> {
        record(&self.log, format!("{}:around:{}", self.name, payload_text(&event)));
        if let Some(payload) = &self.mutate_in_around {
            event = event.with_payload(payload.clone());
        }
        if self.skip_in_around {
            return action.skip(event).await;
        }
        action.proceed(event).await
    }

    fn after(&self, _location: &ComponentLocation, event: &mut Event, thrown: Option<&FlowError>) {
        let suffix = if thrown.is_some() { ":err" } else { "" };
        record(
            &self.log,
            format!("{}:after:{}{}", self.name, payload_text(event), suffix),
        );
    }
}

struct EchoProcessor {
    log: Log,
}

#[async_trait]
impl Processor for EchoProcessor {
    async fn process(&self, event: Event) -> Result<Event, FlowError> {
        record(&self.log, format!("processor:{}", payload_text(&event)));
        Ok(event)
    }
}

struct FailingProcessor {
    log: Log,
}

#[async_trait]
impl Processor for FailingProcessor {
    async fn process(&self, event: Event) -> Result<Event, FlowError> {
        record(&self.log, format!("processor:{}", payload_text(&event)));
        Err(FlowError::ResponseDispatch("processor blew up".to_owned()))
    }
}

fn chain_of(interceptors: Vec<Arc<dyn ProcessorInterceptor>>, log: &Log) -> InterceptionChain {
    InterceptionChain::new(
        interceptors,
        Arc::new(EchoProcessor { log: Arc::clone(log) }),
        location(),
        InterceptionParameters::new(),
    )
}

#[tokio::test]
async fn around_mutation_before_proceed_propagates_downstream() {
    let log = Log::default();
    let mut outer = RecordingInterceptor::new("outer", &log);
    outer.mutate_in_around = Some(json!("TEST"));
    let inner = RecordingInterceptor::new("inner", &log);

    let chain = chain_of(vec![Arc::new(outer), Arc::new(inner)], &log);
    let result = chain.process(Event::new(json!(""))).await;

    assert!(result.is_ok_and(|event| event.payload() == &json!("TEST")));
    // All befores run first, then the around onion.
    assert_eq!(
        entries(&log),
        vec![
            "outer:before:",
            "inner:before:",
            "outer:around:",
            "inner:around:TEST",
            "processor:TEST",
            "inner:after:TEST",
            "outer:after:TEST",
        ]
    );
}

#[tokio::test]
async fn inner_before_mutation_is_visible_to_outer_around() {
    let log = Log::default();
    let outer = RecordingInterceptor::new("outer", &log);
    let mut inner = RecordingInterceptor::new("inner", &log);
    inner.mutate_in_before = Some(json!("TEST"));

    let chain = chain_of(vec![Arc::new(outer), Arc::new(inner)], &log);
    let result = chain.process(Event::new(json!(""))).await;

    assert!(result.is_ok_and(|event| event.payload() == &json!("TEST")));
    // The before stage completes before any around starts, so the outer
    // around already observes the inner before's mutation.
    assert_eq!(
        entries(&log),
        vec![
            "outer:before:",
            "inner:before:",
            "outer:around:TEST",
            "inner:around:TEST",
            "processor:TEST",
            "inner:after:TEST",
            "outer:after:TEST",
        ]
    );
}

#[tokio::test]
async fn before_mutation_is_visible_to_the_processor() {
    let log = Log::default();
    let outer = RecordingInterceptor::new("outer", &log);
    let mut inner = RecordingInterceptor::new("inner", &log);
    inner.mutate_in_before = Some(json!("mutated"));

    let chain = chain_of(vec![Arc::new(outer), Arc::new(inner)], &log);
    let result = chain.process(Event::new(json!("original"))).await;

    assert!(result.is_ok());
    assert!(entries(&log).contains(&"processor:mutated".to_owned()));
    assert!(entries(&log).contains(&"inner:around:mutated".to_owned()));
}

#[tokio::test]
async fn before_failure_skips_downstream_and_unwinds_afters() {
    let log = Log::default();
    let outer = RecordingInterceptor::new("outer", &log);
    let mut inner = RecordingInterceptor::new("inner", &log);
    inner.fail_before = true;

    let chain = chain_of(vec![Arc::new(outer), Arc::new(inner)], &log);
    let result = chain.process(Event::new(json!("payload"))).await;

    let Err(FlowError::Interception { source }) = result else {
        unreachable!("expected an interception failure");
    };
    assert!(matches!(*source, FlowError::ResponseDispatch(_)));

    let log = entries(&log);
    assert!(!log.iter().any(|e| e.starts_with("processor")));
    // A before failure means no around runs at all, not even for
    // interceptors whose before already succeeded.
    assert!(!log.iter().any(|e| e.contains(":around:")));
    // Reverse-order unwinding, one after per entered before.
    assert_eq!(
        log.iter().filter(|e| e.contains(":after:")).collect::<Vec<_>>(),
        vec!["inner:after:payload:err", "outer:after:payload:err"]
    );
}

#[tokio::test]
async fn skip_bypasses_the_processor() {
    let log = Log::default();
    let mut only = RecordingInterceptor::new("only", &log);
    only.mutate_in_around = Some(json!("at-skip-time"));
    only.skip_in_around = true;

    let chain = chain_of(vec![Arc::new(only)], &log);
    let result = chain.process(Event::new(json!("payload"))).await;

    assert!(result.is_ok_and(|event| event.payload() == &json!("at-skip-time")));
    let log = entries(&log);
    assert!(!log.iter().any(|e| e.starts_with("processor")));
    assert_eq!(log.iter().filter(|e| e.contains(":after:")).count(), 1);
}

#[tokio::test]
async fn processor_failure_unwinds_afters_in_reverse_order() {
    let log = Log::default();
    let outer = RecordingInterceptor::new("outer", &log);
    let inner = RecordingInterceptor::new("inner", &log);
    let chain = InterceptionChain::new(
        vec![Arc::new(outer), Arc::new(inner)],
        Arc::new(FailingProcessor { log: Arc::clone(&log) }),
        location(),
        InterceptionParameters::new(),
    );

    let result = chain.process(Event::new(json!("payload"))).await;

    let Err(FlowError::Interception { source }) = result else {
        unreachable!("expected an interception failure");
    };
    assert!(matches!(*source, FlowError::ResponseDispatch(_)));
    assert_eq!(
        entries(&log)
            .iter()
            .filter(|e| e.contains(":after:"))
            .collect::<Vec<_>>(),
        vec!["inner:after:payload:err", "outer:after:payload:err"]
    );
}

#[tokio::test]
async fn declined_interceptor_runs_no_hooks() {
    let log = Log::default();
    let mut declining = RecordingInterceptor::new("declining", &log);
    declining.declines = true;
    let active = RecordingInterceptor::new("active", &log);

    let chain = chain_of(vec![Arc::new(declining), Arc::new(active)], &log);
    let result = chain.process(Event::new(json!("payload"))).await;

    assert!(result.is_ok());
    assert!(!entries(&log).iter().any(|e| e.starts_with("declining")));
    assert!(entries(&log).contains(&"active:before:payload".to_owned()));
}

struct DeferringInterceptor {
    log: Log,
}

#[async_trait]
impl ProcessorInterceptor for DeferringInterceptor {
    async fn around<'a>(
        &self,
        _location: &ComponentLocation,
        _params: &InterceptionParameters,
        event: Event,
        action: InterceptionAction<'a>,
    ) -> Result<Event, FlowError> {
        let result = action.proceed(event).await?;
        // Completion is deferred; the after unwinding is causal on it.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        record(&self.log, "deferred:completed".to_owned());
        Ok(result)
    }

    fn after(&self, _location: &ComponentLocation, _event: &mut Event, _thrown: Option<&FlowError>) {
        record(&self.log, "deferred:after".to_owned());
    }
}

#[tokio::test]
async fn after_unwinding_is_causal_on_deferred_completion() {
    let log = Log::default();
    let chain = chain_of(
        vec![Arc::new(DeferringInterceptor { log: Arc::clone(&log) })],
        &log,
    );

    let result = chain.process(Event::new(json!("payload"))).await;
    assert!(result.is_ok());

    let log = entries(&log);
    let completed = log.iter().position(|e| e == "deferred:completed");
    let after = log.iter().position(|e| e == "deferred:after");
    assert!(completed.is_some_and(|c| after.is_some_and(|a| c < a)));
}

struct NamedFactory {
    namespace: &'static str,
    log: Log,
    applies: bool,
}

impl ProcessorInterceptorFactory for NamedFactory {
    fn namespace(&self) -> &str {
        self.namespace
    }

    fn intercept(&self, _location: &ComponentLocation) -> bool {
        self.applies
    }

    fn create(&self) -> Arc<dyn ProcessorInterceptor> {
        Arc::new(RecordingInterceptor::new(self.namespace, &self.log))
    }
}

#[test]
fn interceptor_order_is_stable_under_namespace_precedence() {
    let log = Log::default();
    let mut registry = InterceptorRegistry::new();
    for namespace in ["http", "tracing", "core", "custom"] {
        registry.add_interceptor(Arc::new(NamedFactory {
            namespace,
            log: Arc::clone(&log),
            applies: true,
        }));
    }

    registry.set_interceptors_order(["core", "tracing"]);
    // Listed namespaces lead in list order; the rest keep registration
    // order.
    assert_eq!(registry.namespaces(), vec!["core", "tracing", "http", "custom"]);
}

#[tokio::test]
async fn registry_chain_applies_factory_predicates() {
    let log = Log::default();
    let mut registry = InterceptorRegistry::new();
    registry.add_interceptor(Arc::new(NamedFactory {
        namespace: "applies",
        log: Arc::clone(&log),
        applies: true,
    }));
    registry.add_interceptor(Arc::new(NamedFactory {
        namespace: "filtered",
        log: Arc::clone(&log),
        applies: false,
    }));

    let chain = registry.chain(
        Arc::new(EchoProcessor { log: Arc::clone(&log) }),
        location(),
        InterceptionParameters::new(),
    );
    let result = chain.process(Event::new(json!("payload"))).await;

    assert!(result.is_ok());
    assert!(entries(&log).contains(&"applies:before:payload".to_owned()));
    assert!(!entries(&log).iter().any(|e| e.starts_with("filtered")));
}
