//! Execution context and transaction registry.
//!
//! Transaction binding is deliberately not ambient state: instead of a
//! process-wide, thread-bound singleton, every execution carries an
//! [`ExecutionContext`] down the call chain, and the context owns the
//! [`TransactionRegistry`]. The invariant is unchanged: at most one bound
//! (non-suspended) transaction per logical call chain at any time.
//! Ownership transfer across tasks is explicit unbind/rebind.

use std::sync::Arc;

use flowline_core::error::TransactionError;
use flowline_core::transaction::Transaction;

/// Store of at most one active transaction for one logical call chain.
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    bound: Option<Arc<dyn Transaction>>,
}

impl TransactionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { bound: None }
    }

    /// Bind a transaction to this call chain.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::AlreadyBound`] if a transaction is
    /// already bound.
    pub fn bind_transaction(&mut self, tx: Arc<dyn Transaction>) -> Result<(), TransactionError> {
        if self.bound.is_some() {
            return Err(TransactionError::AlreadyBound);
        }
        tracing::trace!(tx = %tx.id(), "binding transaction");
        self.bound = Some(tx);
        Ok(())
    }

    /// Clear the binding, but only if `tx` is the currently bound
    /// transaction. Unbinding a transaction that is not bound is a no-op.
    pub fn unbind_transaction(&mut self, tx: &Arc<dyn Transaction>) {
        if self.bound.as_ref().is_some_and(|bound| Arc::ptr_eq(bound, tx)) {
            tracing::trace!(tx = %tx.id(), "unbinding transaction");
            self.bound = None;
        }
    }

    /// Suspend and detach the bound transaction, leaving the registry empty.
    ///
    /// Returns `None` when no transaction is bound.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotSuspendable`] if the bound transaction
    /// is not XA-capable, or the underlying suspend failure.
    pub fn suspend_current_transaction(
        &mut self,
    ) -> Result<Option<Arc<dyn Transaction>>, TransactionError> {
        let Some(tx) = self.bound.as_ref() else {
            return Ok(None);
        };
        if !tx.is_xa() {
            return Err(TransactionError::NotSuspendable);
        }
        tx.suspend()?;
        tracing::debug!(tx = %tx.id(), "suspended transaction");
        Ok(self.bound.take())
    }

    /// Resume a previously suspended transaction and rebind it.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::AlreadyBound`] if another transaction is
    /// bound, or the underlying resume failure.
    pub fn resume_transaction(&mut self, tx: Arc<dyn Transaction>) -> Result<(), TransactionError> {
        if self.bound.is_some() {
            return Err(TransactionError::AlreadyBound);
        }
        tx.resume()?;
        tracing::debug!(tx = %tx.id(), "resumed transaction");
        self.bound = Some(tx);
        Ok(())
    }

    /// The currently bound transaction, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.bound.clone()
    }
}

/// Per-execution state passed explicitly through templates, callbacks and
/// error handlers.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    registry: TransactionRegistry,
}

impl ExecutionContext {
    /// Create a fresh context with no bound transaction.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registry: TransactionRegistry::new(),
        }
    }

    /// The transaction registry of this call chain.
    #[must_use]
    pub const fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// Mutable access to the transaction registry.
    pub const fn registry_mut(&mut self) -> &mut TransactionRegistry {
        &mut self.registry
    }

    /// Convenience accessor for the bound transaction.
    #[must_use]
    pub fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.registry.transaction()
    }
}
