//! Transactional execution template.
//!
//! Decides, from the declared [`TransactionAction`] and the context's
//! current transaction state, whether to begin, join, suspend or reject,
//! then resolves commit/rollback once the callback has completed or failed.
//!
//! A transaction begun here is *owned*: it is resolved exactly once
//! (committed on success unless marked rollback-only, rolled back on
//! failure) and unbound from the registry afterwards. A joined or ambient
//! transaction is never resolved by this template. A suspended outer XA
//! transaction is resumed and left bound, untouched.
//!
//! # Example
//!
//! ```
//! use flowline_core::transaction::{TransactionAction, TransactionConfig};
//! use flowline_runtime::context::ExecutionContext;
//! use flowline_runtime::transactional::TransactionalExecutionTemplate;
//!
//! let config = TransactionConfig::builder()
//!     .action(TransactionAction::Never)
//!     .build();
//! let template = TransactionalExecutionTemplate::new(config);
//!
//! let mut ctx = ExecutionContext::new();
//! let result = template.execute(&mut ctx, |_ctx| Ok(21 * 2));
//! assert!(matches!(result, Ok(42)));
//! ```

use std::sync::Arc;

use flowline_core::error::FlowError;
use flowline_core::transaction::{Transaction, TransactionAction, TransactionConfig};

use crate::context::ExecutionContext;

/// Executes a caller-supplied unit of work under a declared transaction
/// action.
#[derive(Debug, Clone)]
pub struct TransactionalExecutionTemplate {
    config: TransactionConfig,
}

impl TransactionalExecutionTemplate {
    /// Create a template for the given configuration.
    #[must_use]
    pub const fn new(config: TransactionConfig) -> Self {
        Self { config }
    }

    /// The configuration this template executes under.
    #[must_use]
    pub const fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Execute the callback under the configured transaction action.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::IllegalTransactionState`] when the declared
    /// action conflicts with the current binding, a transaction error when
    /// begin/suspend/resume/resolve fails, or the callback's own failure
    /// (re-raised after an owned transaction was rolled back).
    pub fn execute<T>(
        &self,
        ctx: &mut ExecutionContext,
        callback: impl FnOnce(&mut ExecutionContext) -> Result<T, FlowError>,
    ) -> Result<T, FlowError> {
        match self.config.action() {
            TransactionAction::Indifferent => callback(ctx),
            TransactionAction::Never => {
                if ctx.transaction().is_some() {
                    return Err(FlowError::IllegalTransactionState(
                        "action NEVER but a transaction is bound".into(),
                    ));
                }
                callback(ctx)
            }
            TransactionAction::AlwaysJoin => {
                if ctx.transaction().is_none() {
                    return Err(FlowError::IllegalTransactionState(
                        "action ALWAYS_JOIN but no transaction is bound".into(),
                    ));
                }
                callback(ctx)
            }
            TransactionAction::JoinIfPossible => callback(ctx),
            TransactionAction::None => {
                let suspended = Self::suspend_if_xa(ctx)?;
                let result = callback(ctx);
                Self::resume_suspended(ctx, suspended, result)
            }
            TransactionAction::BeginOrJoin => {
                if ctx.transaction().is_some() {
                    callback(ctx)
                } else {
                    self.execute_owned(ctx, callback)
                }
            }
            TransactionAction::AlwaysBegin => {
                if ctx.transaction().as_ref().is_some_and(|tx| !tx.is_xa()) {
                    return Err(FlowError::IllegalTransactionState(
                        "action ALWAYS_BEGIN but a non-XA transaction is bound; \
                         nesting non-XA transactions is illegal"
                            .into(),
                    ));
                }
                let suspended = ctx.registry_mut().suspend_current_transaction()?;
                let result = self.execute_owned(ctx, callback);
                Self::resume_suspended(ctx, suspended, result)
            }
        }
    }

    /// Suspend a bound XA transaction; leave a non-XA one untouched.
    fn suspend_if_xa(
        ctx: &mut ExecutionContext,
    ) -> Result<Option<Arc<dyn Transaction>>, FlowError> {
        match ctx.transaction() {
            Some(tx) if tx.is_xa() => Ok(ctx.registry_mut().suspend_current_transaction()?),
            _ => Ok(None),
        }
    }

    /// Resume a suspended outer transaction, preferring the callback's own
    /// failure over a resume failure.
    fn resume_suspended<T>(
        ctx: &mut ExecutionContext,
        suspended: Option<Arc<dyn Transaction>>,
        result: Result<T, FlowError>,
    ) -> Result<T, FlowError> {
        let Some(outer) = suspended else {
            return result;
        };
        match ctx.registry_mut().resume_transaction(outer) {
            Ok(()) => result,
            Err(resume_err) => match result {
                Ok(_) => Err(resume_err.into()),
                Err(original) => {
                    tracing::warn!(error = %resume_err, "failed to resume suspended transaction");
                    Err(original)
                }
            },
        }
    }

    /// Begin a new transaction, bind it, run the callback, and resolve the
    /// transaction exactly once.
    fn execute_owned<T>(
        &self,
        ctx: &mut ExecutionContext,
        callback: impl FnOnce(&mut ExecutionContext) -> Result<T, FlowError>,
    ) -> Result<T, FlowError> {
        let factory = self.config.factory().ok_or_else(|| {
            FlowError::IllegalTransactionState(
                "transaction action requires a factory but none is configured".into(),
            )
        })?;
        let tx = factory.create_transaction()?;
        tx.begin()?;
        ctx.registry_mut().bind_transaction(tx.clone())?;
        tracing::debug!(tx = %tx.id(), "began owned transaction");

        let result = callback(ctx);
        let resolution = Self::resolve_owned(&tx, result.is_ok());
        ctx.registry_mut().unbind_transaction(&tx);

        match (result, resolution) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(resolve_err)) => Err(resolve_err.into()),
            // The callback failure wins; a rollback failure is only logged.
            (Err(original), resolution) => {
                if let Err(resolve_err) = resolution {
                    tracing::warn!(error = %resolve_err, "failed to roll back owned transaction");
                }
                Err(original)
            }
        }
    }

    /// Commit on success (rollback when marked rollback-only), rollback on
    /// failure.
    fn resolve_owned(
        tx: &Arc<dyn Transaction>,
        success: bool,
    ) -> Result<(), flowline_core::error::TransactionError> {
        if success && !tx.is_rollback_only() {
            tracing::debug!(tx = %tx.id(), "committing owned transaction");
            tx.commit()
        } else {
            tracing::debug!(tx = %tx.id(), "rolling back owned transaction");
            tx.rollback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::transaction::TransactionStatus;
    use flowline_testing::transaction::{TestTransaction, TestTransactionFactory};

    fn template(action: TransactionAction) -> TransactionalExecutionTemplate {
        TransactionalExecutionTemplate::new(
            TransactionConfig::builder().action(action).build(),
        )
    }

    fn template_with_factory(
        action: TransactionAction,
        factory: Arc<TestTransactionFactory>,
    ) -> TransactionalExecutionTemplate {
        TransactionalExecutionTemplate::new(
            TransactionConfig::builder()
                .action(action)
                .factory(factory)
                .build(),
        )
    }

    #[test]
    fn action_indifferent_runs_as_is() {
        let mut ctx = ExecutionContext::new();
        let result = template(TransactionAction::Indifferent).execute(&mut ctx, |_| Ok(7));
        assert!(matches!(result, Ok(7)));
        assert!(ctx.transaction().is_none());
    }

    #[test]
    fn action_never_without_transaction_runs() {
        let mut ctx = ExecutionContext::new();
        let result = template(TransactionAction::Never).execute(&mut ctx, |_| Ok("done"));
        assert!(matches!(result, Ok("done")));
    }

    #[test]
    fn action_never_with_transaction_fails_without_running_callback() {
        let mut ctx = ExecutionContext::new();
        let tx = TestTransaction::begun(false);
        assert!(ctx.registry_mut().bind_transaction(tx).is_ok());

        let mut ran = false;
        let result = template(TransactionAction::Never).execute(&mut ctx, |_| {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(FlowError::IllegalTransactionState(_))));
        assert!(!ran);
    }

    #[test]
    fn action_always_join_without_transaction_fails() {
        let mut ctx = ExecutionContext::new();
        let result = template(TransactionAction::AlwaysJoin).execute(&mut ctx, |_| Ok(()));
        assert!(matches!(result, Err(FlowError::IllegalTransactionState(_))));
    }

    #[test]
    fn action_always_join_with_transaction_leaves_it_untouched() {
        let mut ctx = ExecutionContext::new();
        let tx = TestTransaction::begun(false);
        assert!(ctx.registry_mut().bind_transaction(tx.clone()).is_ok());

        let result = template(TransactionAction::AlwaysJoin).execute(&mut ctx, |_| Ok(1));
        assert!(matches!(result, Ok(1)));
        assert_eq!(tx.commit_count(), 0);
        assert_eq!(tx.rollback_count(), 0);
        assert!(ctx.transaction().is_some());
    }

    #[test]
    fn action_join_if_possible_without_transaction_never_begins() {
        let mut ctx = ExecutionContext::new();
        let result = template(TransactionAction::JoinIfPossible).execute(&mut ctx, |ctx| {
            assert!(ctx.transaction().is_none());
            Ok(())
        });
        assert!(result.is_ok());
        assert!(ctx.transaction().is_none());
    }

    #[test]
    fn action_join_if_possible_joins_existing() {
        let mut ctx = ExecutionContext::new();
        let tx = TestTransaction::begun(false);
        assert!(ctx.registry_mut().bind_transaction(tx.clone()).is_ok());

        let result = template(TransactionAction::JoinIfPossible).execute(&mut ctx, |_| Ok(()));
        assert!(result.is_ok());
        assert_eq!(tx.commit_count(), 0);
        assert_eq!(tx.rollback_count(), 0);
    }

    #[test]
    fn action_begin_or_join_without_transaction_commits_new_one() {
        let mut ctx = ExecutionContext::new();
        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::BeginOrJoin, Arc::clone(&factory));

        let result = tpl.execute(&mut ctx, |ctx| {
            assert!(ctx.transaction().is_some());
            Ok("routed")
        });
        assert!(matches!(result, Ok("routed")));

        let created = factory.last_created();
        assert!(created.is_some_and(|tx| {
            tx.commit_count() == 1
                && tx.rollback_count() == 0
                && tx.status() == TransactionStatus::Committed
        }));
        assert!(ctx.transaction().is_none());
    }

    #[test]
    fn action_begin_or_join_with_transaction_joins() {
        let mut ctx = ExecutionContext::new();
        let tx = TestTransaction::begun(false);
        assert!(ctx.registry_mut().bind_transaction(tx.clone()).is_ok());

        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::BeginOrJoin, Arc::clone(&factory));
        let result = tpl.execute(&mut ctx, |_| Ok(()));

        assert!(result.is_ok());
        assert!(factory.last_created().is_none());
        assert_eq!(tx.commit_count(), 0);
        assert!(ctx.transaction().is_some());
    }

    #[test]
    fn owned_transaction_rolls_back_on_callback_failure() {
        let mut ctx = ExecutionContext::new();
        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::BeginOrJoin, Arc::clone(&factory));

        let result: Result<(), FlowError> = tpl.execute(&mut ctx, |_| {
            Err(FlowError::ResponseDispatch("boom".into()))
        });
        assert!(matches!(result, Err(FlowError::ResponseDispatch(_))));

        let created = factory.last_created();
        assert!(created.is_some_and(|tx| tx.rollback_count() == 1 && tx.commit_count() == 0));
        assert!(ctx.transaction().is_none());
    }

    #[test]
    fn owned_transaction_marked_rollback_only_is_rolled_back_on_success() {
        let mut ctx = ExecutionContext::new();
        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::BeginOrJoin, Arc::clone(&factory));

        let result = tpl.execute(&mut ctx, |ctx| {
            if let Some(tx) = ctx.transaction() {
                tx.set_rollback_only();
            }
            Ok(())
        });
        assert!(result.is_ok());

        let created = factory.last_created();
        assert!(created.is_some_and(|tx| tx.rollback_count() == 1 && tx.commit_count() == 0));
    }

    #[test]
    fn action_always_begin_with_non_xa_bound_is_illegal() {
        let mut ctx = ExecutionContext::new();
        let tx = TestTransaction::begun(false);
        assert!(ctx.registry_mut().bind_transaction(tx.clone()).is_ok());

        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::AlwaysBegin, factory);
        let result = tpl.execute(&mut ctx, |_| Ok(()));

        assert!(matches!(result, Err(FlowError::IllegalTransactionState(_))));
        assert_eq!(tx.suspend_count(), 0);
    }

    #[test]
    fn action_always_begin_suspends_xa_and_commits_new_transaction() {
        let mut ctx = ExecutionContext::new();
        let outer = TestTransaction::begun(true);
        assert!(ctx.registry_mut().bind_transaction(outer.clone()).is_ok());

        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::AlwaysBegin, Arc::clone(&factory));
        let result = tpl.execute(&mut ctx, |ctx| {
            // The suspended outer transaction is not visible here.
            assert!(ctx.transaction().is_some_and(|tx| !tx.is_xa()));
            Ok(())
        });
        assert!(result.is_ok());

        let created = factory.last_created();
        assert!(created.is_some_and(|tx| tx.commit_count() == 1 && tx.rollback_count() == 0));
        assert_eq!(outer.suspend_count(), 1);
        assert_eq!(outer.resume_count(), 1);
        assert_eq!(outer.commit_count(), 0);
        assert_eq!(outer.rollback_count(), 0);
        // The outer transaction is bound again afterwards.
        assert!(ctx.transaction().is_some_and(|tx| tx.is_xa()));
    }

    #[test]
    fn action_always_begin_suspends_xa_and_rolls_back_new_transaction() {
        let mut ctx = ExecutionContext::new();
        let outer = TestTransaction::begun(true);
        assert!(ctx.registry_mut().bind_transaction(outer.clone()).is_ok());

        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::AlwaysBegin, Arc::clone(&factory));
        let result: Result<(), FlowError> = tpl.execute(&mut ctx, |_| {
            Err(FlowError::ResponseDispatch("routing blew up".into()))
        });
        assert!(result.is_err());

        let created = factory.last_created();
        assert!(created.is_some_and(|tx| tx.rollback_count() == 1 && tx.commit_count() == 0));
        assert_eq!(outer.resume_count(), 1);
        assert!(ctx.transaction().is_some_and(|tx| tx.is_xa()));
    }

    #[test]
    fn action_always_begin_without_bound_transaction_owns_a_new_one() {
        let mut ctx = ExecutionContext::new();
        let factory = TestTransactionFactory::new(false);
        let tpl = template_with_factory(TransactionAction::AlwaysBegin, Arc::clone(&factory));

        let result = tpl.execute(&mut ctx, |_| Ok(()));
        assert!(result.is_ok());
        assert!(factory.last_created().is_some_and(|tx| tx.commit_count() == 1));
        assert!(ctx.transaction().is_none());
    }

    #[test]
    fn action_none_suspends_and_resumes_xa_without_resolving_it() {
        let mut ctx = ExecutionContext::new();
        let tx = TestTransaction::begun(true);
        assert!(ctx.registry_mut().bind_transaction(tx.clone()).is_ok());

        let result = template(TransactionAction::None).execute(&mut ctx, |ctx| {
            assert!(ctx.transaction().is_none());
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(tx.suspend_count(), 1);
        assert_eq!(tx.resume_count(), 1);
        assert_eq!(tx.commit_count(), 0);
        assert_eq!(tx.rollback_count(), 0);
        assert!(ctx.transaction().is_some());
    }

    #[test]
    fn action_none_leaves_non_xa_bound_and_untouched() {
        let mut ctx = ExecutionContext::new();
        let tx = TestTransaction::begun(false);
        assert!(ctx.registry_mut().bind_transaction(tx.clone()).is_ok());

        let result = template(TransactionAction::None).execute(&mut ctx, |ctx| {
            assert!(ctx.transaction().is_some());
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(tx.suspend_count(), 0);
        assert_eq!(tx.commit_count(), 0);
        assert_eq!(tx.rollback_count(), 0);
    }
}
