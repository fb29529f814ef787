//! Transaction abstraction and declarative transaction configuration.
//!
//! A [`Transaction`] is owned by exactly one logical scope at a time;
//! ownership transfers explicitly through suspend/resume. The XA flag marks
//! a transaction as suspendable: only XA-capable transactions may be
//! detached from one scope and resumed in another.
//!
//! [`TransactionConfig`] declares, per processing element, how the element
//! participates in transactions. It is immutable after construction and
//! built once:
//!
//! ```
//! use flowline_core::transaction::{TransactionAction, TransactionConfig};
//!
//! let config = TransactionConfig::builder()
//!     .action(TransactionAction::BeginOrJoin)
//!     .build();
//! assert_eq!(config.action(), TransactionAction::BeginOrJoin);
//! ```

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::TransactionError;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Created, not yet begun.
    NotBegun,
    /// Begun and bound to a scope.
    Active,
    /// Detached from its scope, awaiting resume.
    Suspended,
    /// Resolved by commit.
    Committed,
    /// Resolved by rollback.
    RolledBack,
}

/// Abstraction over a resource transaction.
///
/// Implementations use interior mutability: the runtime shares transactions
/// as `Arc<dyn Transaction>` between the registry, callbacks and error
/// handlers. A transaction is resolved (committed or rolled back) at most
/// once; implementations should surface a [`TransactionError`] when a
/// lifecycle operation is invoked in the wrong state.
pub trait Transaction: Send + Sync + fmt::Debug {
    /// Identity of this transaction.
    fn id(&self) -> Uuid;

    /// True if this transaction can be suspended and resumed (XA-capable).
    fn is_xa(&self) -> bool;

    /// Current lifecycle state.
    fn status(&self) -> TransactionStatus;

    /// Begin the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource fails to start the
    /// transaction or it was already begun.
    fn begin(&self) -> Result<(), TransactionError>;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not active or the resource
    /// fails to commit.
    fn commit(&self) -> Result<(), TransactionError>;

    /// Roll the transaction back.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not active or the resource
    /// fails to roll back.
    fn rollback(&self) -> Result<(), TransactionError>;

    /// Detach the transaction from its current scope.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotSuspendable`] for non-XA transactions,
    /// or an error if the resource fails to suspend.
    fn suspend(&self) -> Result<(), TransactionError>;

    /// Re-attach a suspended transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not suspended or the resource
    /// fails to resume.
    fn resume(&self) -> Result<(), TransactionError>;

    /// Mark the transaction so its eventual resolution must be a rollback.
    fn set_rollback_only(&self);

    /// Whether the transaction has been marked rollback-only.
    fn is_rollback_only(&self) -> bool;
}

/// Creates transactions for scopes that begin their own.
pub trait TransactionFactory: Send + Sync {
    /// Create a new, not-yet-begun transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying resource cannot create a
    /// transaction.
    fn create_transaction(&self) -> Result<Arc<dyn Transaction>, TransactionError>;
}

/// Declared transaction participation of a processing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionAction {
    /// Execute outside any transaction; a bound XA transaction is suspended
    /// for the duration and resumed afterwards.
    None,
    /// Always begin a new transaction, suspending a bound XA transaction;
    /// a bound non-XA transaction is an illegal state.
    AlwaysBegin,
    /// Require an existing transaction; its absence is an illegal state.
    AlwaysJoin,
    /// Join the bound transaction if present, otherwise begin and own one.
    BeginOrJoin,
    /// Join the bound transaction if present, otherwise run without one.
    JoinIfPossible,
    /// Reject execution when a transaction is bound.
    Never,
    /// Execute as-is with no transaction interaction whatsoever.
    Indifferent,
}

/// Immutable per-element transaction configuration: one action plus the
/// factory used when the action begins a transaction.
#[derive(Clone)]
pub struct TransactionConfig {
    action: TransactionAction,
    factory: Option<Arc<dyn TransactionFactory>>,
}

impl TransactionConfig {
    /// Start building a configuration. The default action is
    /// [`TransactionAction::Indifferent`].
    #[must_use]
    pub fn builder() -> TransactionConfigBuilder {
        TransactionConfigBuilder {
            action: TransactionAction::Indifferent,
            factory: None,
        }
    }

    /// The declared action.
    #[must_use]
    pub const fn action(&self) -> TransactionAction {
        self.action
    }

    /// The factory used to begin owned transactions, if configured.
    #[must_use]
    pub fn factory(&self) -> Option<&Arc<dyn TransactionFactory>> {
        self.factory.as_ref()
    }
}

impl fmt::Debug for TransactionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionConfig")
            .field("action", &self.action)
            .field("factory", &self.factory.as_ref().map(|_| "<factory>"))
            .finish()
    }
}

/// Builder for [`TransactionConfig`].
#[derive(Clone)]
pub struct TransactionConfigBuilder {
    action: TransactionAction,
    factory: Option<Arc<dyn TransactionFactory>>,
}

impl TransactionConfigBuilder {
    /// Set the transaction action.
    #[must_use]
    pub const fn action(mut self, action: TransactionAction) -> Self {
        self.action = action;
        self
    }

    /// Set the transaction factory.
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn TransactionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the immutable configuration.
    #[must_use]
    pub fn build(self) -> TransactionConfig {
        TransactionConfig {
            action: self.action,
            factory: self.factory,
        }
    }
}
