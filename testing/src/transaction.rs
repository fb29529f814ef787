//! Recording transaction doubles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use flowline_core::error::TransactionError;
use flowline_core::transaction::{Transaction, TransactionFactory, TransactionStatus};

/// In-memory transaction that enforces the lifecycle state machine and
/// counts every operation.
#[derive(Debug)]
pub struct TestTransaction {
    id: Uuid,
    xa: bool,
    status: Mutex<TransactionStatus>,
    rollback_only: AtomicBool,
    begin_count: AtomicUsize,
    commit_count: AtomicUsize,
    rollback_count: AtomicUsize,
    suspend_count: AtomicUsize,
    resume_count: AtomicUsize,
}

impl TestTransaction {
    /// A transaction that has not been begun yet.
    #[must_use]
    pub fn new(xa: bool) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            xa,
            status: Mutex::new(TransactionStatus::NotBegun),
            rollback_only: AtomicBool::new(false),
            begin_count: AtomicUsize::new(0),
            commit_count: AtomicUsize::new(0),
            rollback_count: AtomicUsize::new(0),
            suspend_count: AtomicUsize::new(0),
            resume_count: AtomicUsize::new(0),
        })
    }

    /// A transaction already begun, ready to bind.
    #[must_use]
    pub fn begun(xa: bool) -> Arc<Self> {
        let tx = Self::new(xa);
        *tx.status_guard() = TransactionStatus::Active;
        tx.begin_count.store(1, Ordering::SeqCst);
        tx
    }

    fn status_guard(&self) -> MutexGuard<'_, TransactionStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Times `begin` succeeded.
    #[must_use]
    pub fn begin_count(&self) -> usize {
        self.begin_count.load(Ordering::SeqCst)
    }

    /// Times `commit` succeeded.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    /// Times `rollback` succeeded.
    #[must_use]
    pub fn rollback_count(&self) -> usize {
        self.rollback_count.load(Ordering::SeqCst)
    }

    /// Times `suspend` succeeded.
    #[must_use]
    pub fn suspend_count(&self) -> usize {
        self.suspend_count.load(Ordering::SeqCst)
    }

    /// Times `resume` succeeded.
    #[must_use]
    pub fn resume_count(&self) -> usize {
        self.resume_count.load(Ordering::SeqCst)
    }
}

impl Transaction for TestTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_xa(&self) -> bool {
        self.xa
    }

    fn status(&self) -> TransactionStatus {
        *self.status_guard()
    }

    fn begin(&self) -> Result<(), TransactionError> {
        let mut status = self.status_guard();
        if *status != TransactionStatus::NotBegun {
            return Err(TransactionError::BeginFailed(format!(
                "cannot begin in state {status:?}"
            )));
        }
        *status = TransactionStatus::Active;
        self.begin_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        let mut status = self.status_guard();
        if *status != TransactionStatus::Active {
            return Err(TransactionError::CommitFailed(format!(
                "cannot commit in state {status:?}"
            )));
        }
        *status = TransactionStatus::Committed;
        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        let mut status = self.status_guard();
        if *status != TransactionStatus::Active {
            return Err(TransactionError::RollbackFailed(format!(
                "cannot roll back in state {status:?}"
            )));
        }
        *status = TransactionStatus::RolledBack;
        self.rollback_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&self) -> Result<(), TransactionError> {
        if !self.xa {
            return Err(TransactionError::NotSuspendable);
        }
        let mut status = self.status_guard();
        if *status != TransactionStatus::Active {
            return Err(TransactionError::SuspendFailed(format!(
                "cannot suspend in state {status:?}"
            )));
        }
        *status = TransactionStatus::Suspended;
        self.suspend_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), TransactionError> {
        let mut status = self.status_guard();
        if *status != TransactionStatus::Suspended {
            return Err(TransactionError::ResumeFailed(format!(
                "cannot resume in state {status:?}"
            )));
        }
        *status = TransactionStatus::Active;
        self.resume_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }
}

/// Factory that creates [`TestTransaction`]s and remembers every one it
/// made.
#[derive(Debug)]
pub struct TestTransactionFactory {
    xa: bool,
    created: Mutex<Vec<Arc<TestTransaction>>>,
}

impl TestTransactionFactory {
    /// A factory producing transactions with the given XA capability.
    #[must_use]
    pub fn new(xa: bool) -> Arc<Self> {
        Arc::new(Self {
            xa,
            created: Mutex::new(Vec::new()),
        })
    }

    /// Every transaction this factory created, in creation order.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<TestTransaction>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recently created transaction.
    #[must_use]
    pub fn last_created(&self) -> Option<Arc<TestTransaction>> {
        self.created().last().map(Arc::clone)
    }
}

impl TransactionFactory for TestTransactionFactory {
    fn create_transaction(&self) -> Result<Arc<dyn Transaction>, TransactionError> {
        let tx = TestTransaction::new(self.xa);
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&tx));
        Ok(tx)
    }
}
