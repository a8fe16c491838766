//! Nestable transaction scope.
//!
//! A root [`Tx`] owns the backend transaction and the storage diff collected
//! by every operation composed inside it. Nested scopes borrow the root:
//! they see the same transaction, forward their diffs to it, and their
//! `commit`/`rollback` are no-ops. Only the root's `commit` makes the work
//! durable and then applies the accumulated diff to owner quotas, exactly once.
//!
//! Both `commit` and `rollback` consume the scope, so a finished scope can
//! not be used again, and the root can not finish while a nested scope
//! still borrows it. Dropping an unfinished root rolls the transaction back.

use std::sync::{Arc, Mutex, PoisonError};

use common::StorageDiff;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::quota::{QuotaError, QuotaStore};

/// Result of [`Tx::commit`].
#[derive(Debug)]
pub enum Commit {
    /// The root committed. `quota_error` carries per-owner quota failures,
    /// which callers should log; usage can be reconciled later.
    Committed { quota_error: Option<QuotaError> },
    /// A nested scope was "committed"; the root still decides the outcome.
    Deferred,
}

impl Commit {
    pub fn is_committed(&self) -> bool {
        matches!(self, Commit::Committed { .. })
    }
}

struct RootTx {
    txn: DatabaseTransaction,
    diff: Mutex<StorageDiff>,
    quota: Arc<dyn QuotaStore>,
}

enum Scope<'a> {
    Root(RootTx),
    Nested(&'a RootTx),
}

pub struct Tx<'a> {
    scope: Scope<'a>,
}

impl Tx<'static> {
    /// Open a new backend transaction as a root scope.
    pub async fn begin(
        db: &DatabaseConnection,
        quota: Arc<dyn QuotaStore>,
    ) -> Result<Self, StoreError> {
        let txn = db.begin().await?;
        Ok(Tx {
            scope: Scope::Root(RootTx {
                txn,
                diff: Mutex::new(StorageDiff::new()),
                quota,
            }),
        })
    }
}

impl<'a> Tx<'a> {
    /// Join `parent` when one is given, otherwise begin a new root.
    pub async fn acquire(
        parent: Option<&'a Tx<'_>>,
        db: &DatabaseConnection,
        quota: Arc<dyn QuotaStore>,
    ) -> Result<Tx<'a>, StoreError> {
        match parent {
            Some(parent) => Ok(parent.nested()),
            None => Ok(Tx::begin(db, quota).await?),
        }
    }

    fn root(&self) -> &RootTx {
        match &self.scope {
            Scope::Root(root) => root,
            Scope::Nested(root) => root,
        }
    }

    /// A nested scope sharing this scope's root.
    pub fn nested(&self) -> Tx<'_> {
        Tx {
            scope: Scope::Nested(self.root()),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.scope, Scope::Root(_))
    }

    /// The live backend transaction every operation in this scope runs on.
    pub fn conn(&self) -> &DatabaseTransaction {
        &self.root().txn
    }

    /// Merge `diff` into the root's pending diff.
    pub fn append_diff(&self, diff: StorageDiff) {
        if diff.is_empty() {
            return;
        }
        self.root()
            .diff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(diff);
    }

    /// Snapshot of the diff accumulated so far.
    pub fn pending_diff(&self) -> StorageDiff {
        self.root()
            .diff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commit the root transaction and apply the accumulated diff.
    ///
    /// Nested scopes return [`Commit::Deferred`] without touching anything.
    pub async fn commit(self) -> Result<Commit, StoreError> {
        let root = match self.scope {
            Scope::Nested(_) => {
                debug!("Nested transaction commit deferred to root");
                return Ok(Commit::Deferred);
            }
            Scope::Root(root) => root,
        };

        let RootTx { txn, diff, quota } = root;
        txn.commit().await?;

        let diff = diff.into_inner().unwrap_or_else(PoisonError::into_inner);
        if diff.is_empty() {
            return Ok(Commit::Committed { quota_error: None });
        }

        let quota_error = match quota.apply_storage_diff(&diff).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Transaction committed but storage diff was only partly applied");
                Some(e)
            }
        };
        Ok(Commit::Committed { quota_error })
    }

    /// Roll back the root transaction, discarding its diff. No-op when nested.
    pub async fn rollback(self) -> Result<(), StoreError> {
        match self.scope {
            Scope::Nested(_) => {
                debug!("Nested transaction rollback deferred to root");
                Ok(())
            }
            Scope::Root(root) => {
                root.txn.rollback().await?;
                Ok(())
            }
        }
    }
}
