//! # Flowline Runtime
//!
//! The execution machinery of the Flowline message-processing runtime: one
//! inbound event is driven through the fixed phase pipeline, routed through
//! an interception chain around the configured processor, and executed
//! under declarative transaction semantics with an on-error strategy chain
//! between failures and transaction resolution.
//!
//! Modules, leaf-first:
//!
//! - **[`context`]**: the per-execution [`context::ExecutionContext`] and
//!   its transaction registry — at most one bound transaction per logical
//!   call chain, passed explicitly rather than held in ambient state
//! - **[`transactional`]**: the transactional execution template and its
//!   begin/join/suspend/reject decision table
//! - **[`error_handling`]**: on-error strategies (continue/propagate) with
//!   rollback/commit filter expressions, wrapped around the transactional
//!   template
//! - **[`phase`]**: the Validation → FlowProcessing → EndProcess pipeline
//!   and its execution engine
//! - **[`interceptor`]**: the onion-style before/around/after interception
//!   chain with proceed/skip control
//!
//! # Example
//!
//! ```
//! use flowline_core::transaction::{TransactionAction, TransactionConfig};
//! use flowline_runtime::context::ExecutionContext;
//! use flowline_runtime::transactional::TransactionalExecutionTemplate;
//!
//! let template = TransactionalExecutionTemplate::new(
//!     TransactionConfig::builder()
//!         .action(TransactionAction::JoinIfPossible)
//!         .build(),
//! );
//! let mut ctx = ExecutionContext::new();
//! let result = template.execute(&mut ctx, |_ctx| Ok("processed"));
//! assert!(matches!(result, Ok("processed")));
//! ```

pub mod context;
pub mod error_handling;
pub mod interceptor;
pub mod phase;
pub mod transactional;

pub use context::{ExecutionContext, TransactionRegistry};
pub use error_handling::{
    ErrorHandlingExecutionTemplate, ErrorTypeFilter, HandlerKind, OnErrorStrategy,
};
pub use interceptor::{
    ComponentLocation, InterceptionAction, InterceptionChain, InterceptionParameters,
    InterceptorRegistry, Processor, ProcessorInterceptor, ProcessorInterceptorFactory,
};
pub use phase::{
    EndProcessPhase, FlowProcessingPhase, MessageProcessPhase, PhaseExecutionEngine,
    PhaseRank, PhaseResultNotifier, PipelineOutcome, ValidationPhase,
};
pub use transactional::TransactionalExecutionTemplate;
