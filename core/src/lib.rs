//! # Flowline Core
//!
//! Core types and traits for the Flowline message-processing runtime.
//!
//! This crate defines the contracts that connectors and processing elements
//! implement to participate in the runtime, and the data types that flow
//! through it:
//!
//! - **[`event::Event`]**: the unit of work, immutable by convention
//! - **[`error`]**: the failure taxonomy, including runtime-typed messaging
//!   failures matched by on-error strategies
//! - **[`transaction`]**: the transaction abstraction, factory, and the
//!   declarative per-element [`transaction::TransactionConfig`]
//! - **[`template`]**: the phase-facing template traits with explicit
//!   capability tags
//! - **[`notification`]**: fire-and-forget response notifications
//!
//! The execution machinery itself (phases, transactional templates, error
//! handling, interception) lives in the `flowline-runtime` crate.

pub mod error;
pub mod event;
pub mod notification;
pub mod template;
pub mod transaction;

pub use error::{ErrorDescriptor, ErrorType, EventError, FlowError, TransactionError};
pub use event::Event;
pub use notification::{NotificationKind, NotificationSink};
pub use template::{MessageProcessTemplate, PhaseCapability};
pub use transaction::{Transaction, TransactionAction, TransactionConfig, TransactionFactory};
