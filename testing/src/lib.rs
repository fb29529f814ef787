//! # Flowline Testing
//!
//! Test doubles shared by the Flowline crates' unit and integration tests:
//!
//! - **[`transaction`]**: [`transaction::TestTransaction`], an in-memory
//!   transaction that enforces the lifecycle state machine and counts every
//!   begin/commit/rollback/suspend/resume, plus a recording factory
//! - **[`notifier`]**: a phase notifier and a notification sink that record
//!   what they were told, so tests can assert the exactly-once outcome
//!   discipline
//! - **[`template`]**: [`template::ScriptedTemplate`], a message-process
//!   template supporting all three phase capabilities with scriptable
//!   failure points, recording the order of its hook invocations
//!
//! ## Example
//!
//! ```
//! use flowline_testing::transaction::TestTransaction;
//! use flowline_core::transaction::{Transaction, TransactionStatus};
//!
//! let tx = TestTransaction::begun(false);
//! assert_eq!(tx.status(), TransactionStatus::Active);
//! assert!(tx.commit().is_ok());
//! assert_eq!(tx.commit_count(), 1);
//! ```

pub mod notifier;
pub mod template;
pub mod transaction;

/// Install a compact tracing subscriber for a test, if none is installed
/// yet. Safe to call from every test; only the first call wins.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .compact()
        .try_init();
}
