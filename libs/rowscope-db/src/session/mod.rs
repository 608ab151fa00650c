//! Per-user unit of work.
//!
//! A [`Session`] owns one change set and at most one open transaction. Reads
//! issued while a transaction is open run inside it; [`Session::save`] writes
//! the change set either in that transaction or in a fresh one.

mod changes;
pub(crate) mod runner;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use rowscope_security::{AuthorizationContext, UserId};
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, TransactionTrait};

pub(crate) use changes::{BulkInsert, ChangeSet, EntityChange, PendingChange, RawCommand};
use runner::SessionConn;

use crate::error::{EntityValidation, RepoError, RepoResult, ValidationErrors};
use crate::keys::KeyRegistry;
use crate::policy::EntityPolicy;
use crate::repository::EntityRepository;

/// Lifecycle state of a staged or tracked row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    Added,
    Modified,
    Removed,
    Unchanged,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryState::Added => "Added",
            EntryState::Modified => "Modified",
            EntryState::Removed => "Removed",
            EntryState::Unchanged => "Unchanged",
        };
        f.write_str(name)
    }
}

/// Public view of one pending change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub entity: String,
    pub state: EntryState,
    /// Key identity (`table#v1,v2`); `None` for rows not yet inserted.
    pub key: Option<String>,
}

/// Row counts written by a successful save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

impl SaveSummary {
    fn of(entries: &[Box<dyn PendingChange>]) -> Self {
        entries
            .iter()
            .fold(Self::default(), |mut acc, entry| {
                match entry.state() {
                    EntryState::Added => acc.added += 1,
                    EntryState::Modified => acc.modified += 1,
                    EntryState::Removed => acc.removed += 1,
                    EntryState::Unchanged => {}
                }
                acc
            })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.added + self.modified + self.removed
    }
}

/// Unit of work of one acting user.
pub struct Session {
    ctx: AuthorizationContext,
    conn: DatabaseConnection,
    keys: Arc<KeyRegistry>,
    lazy_load: bool,
    changes: Mutex<ChangeSet>,
    tx: tokio::sync::Mutex<Option<DatabaseTransaction>>,
    released: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.ctx.user_id())
            .field("lazy_load", &self.lazy_load)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session acting for `ctx` over `conn`.
    ///
    /// Sessions are normally obtained from a `RepositoryFactory`, which
    /// caches one per user.
    #[must_use]
    pub fn new(
        ctx: AuthorizationContext,
        conn: DatabaseConnection,
        keys: Arc<KeyRegistry>,
        lazy_load: bool,
    ) -> Self {
        tracing::debug!(user_id = %ctx.user_id(), lazy_load, "Creating session");
        Self {
            ctx,
            conn,
            keys,
            lazy_load,
            changes: Mutex::new(ChangeSet::default()),
            tx: tokio::sync::Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn context(&self) -> &AuthorizationContext {
        &self.ctx
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.ctx.user_id()
    }

    /// Whether related rows are loaded on demand rather than eagerly.
    #[must_use]
    pub fn is_lazy_load(&self) -> bool {
        self.lazy_load
    }

    #[must_use]
    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    /// Repository view over `E`, bound to this session.
    #[must_use]
    pub fn repository<E>(&self) -> EntityRepository<'_, E>
    where
        E: EntityPolicy,
        E::Model: Sync,
        E::ActiveModel: Send + Sync,
    {
        EntityRepository::new(self)
    }

    pub(crate) fn backend(&self) -> DbBackend {
        self.conn.get_database_backend()
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_live(&self) -> RepoResult<()> {
        if self.is_released() {
            return Err(RepoError::SessionReleased(self.user_id()));
        }
        Ok(())
    }

    /// Executor for reads: the open transaction if any, else the connection.
    pub(crate) async fn conn(&self) -> RepoResult<SessionConn<'_>> {
        self.ensure_live()?;
        Ok(SessionConn {
            tx: self.tx.lock().await,
            conn: &self.conn,
        })
    }

    // --- transactions ---

    /// Open the session transaction.
    ///
    /// # Errors
    /// `RepoError::TransactionActive` if one is already open.
    pub async fn begin(&self) -> RepoResult<()> {
        self.ensure_live()?;
        let mut slot = self.tx.lock().await;
        if slot.is_some() {
            return Err(RepoError::TransactionActive);
        }
        *slot = Some(self.conn.begin().await?);
        tracing::debug!(user_id = %self.user_id(), "Transaction opened");
        Ok(())
    }

    /// # Errors
    /// `RepoError::NoTransaction` if none is open.
    pub async fn commit(&self) -> RepoResult<()> {
        self.ensure_live()?;
        let tx = self.tx.lock().await.take().ok_or(RepoError::NoTransaction)?;
        tx.commit().await?;
        tracing::debug!(user_id = %self.user_id(), "Transaction committed");
        Ok(())
    }

    /// # Errors
    /// `RepoError::NoTransaction` if none is open.
    pub async fn rollback(&self) -> RepoResult<()> {
        self.ensure_live()?;
        let tx = self.tx.lock().await.take().ok_or(RepoError::NoTransaction)?;
        tx.rollback().await?;
        tracing::debug!(user_id = %self.user_id(), "Transaction rolled back");
        Ok(())
    }

    pub async fn in_transaction(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    // --- change tracking ---

    pub(crate) fn stage(&self, change: Box<dyn PendingChange>) {
        tracing::trace!(entity = change.entity(), state = %change.state(), key = ?change.identity(), "Staging change");
        self.changes.lock().stage(change);
    }

    pub(crate) fn track(&self, identity: String) {
        self.changes.lock().track(identity);
    }

    /// Whether the row with key identity `identity` was read with tracking
    /// or staged in this session.
    #[must_use]
    pub fn is_tracked(&self, identity: &str) -> bool {
        self.changes.lock().is_tracked(identity)
    }

    /// `Unchanged` for rows read with tracking, the staged state for rows
    /// with a pending change, `None` for unknown rows.
    #[must_use]
    pub fn entry_state(&self, identity: &str) -> Option<EntryState> {
        self.changes.lock().state_of(identity)
    }

    /// Pending changes in staging order.
    #[must_use]
    pub fn modified(&self) -> Vec<ChangeEntry> {
        self.changes
            .lock()
            .entries()
            .iter()
            .map(|entry| ChangeEntry {
                entity: entry.entity().to_owned(),
                state: entry.state(),
                key: entry.identity().map(str::to_owned),
            })
            .collect()
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.lock().is_empty()
    }

    // --- saving ---

    /// Validate, audit-stamp and write every pending change.
    ///
    /// Changes are written in staging order, inside the open transaction or
    /// in a fresh one committed here. On failure nothing from this call is
    /// committed and the pending changes stay staged.
    ///
    /// # Errors
    /// - `RepoError::ValidationFailed` with every failing entity,
    /// - `RepoError::ConcurrencyConflict` when an updated row changed meanwhile,
    /// - `RepoError::StoreFailure` with the innermost store message otherwise.
    pub async fn save(&self) -> RepoResult<SaveSummary> {
        let (summary, _) = self.flush(None).await?;
        Ok(summary)
    }

    /// [`save`](Self::save), reporting failure as a message; an empty string
    /// means the save succeeded.
    pub async fn save_or_message(&self) -> String {
        match self.save().await {
            Ok(_) => String::new(),
            Err(err) => {
                tracing::debug!(user_id = %self.user_id(), error = %err, "Save failed");
                err.to_string()
            }
        }
    }

    /// Run `lead` followed by the pending changes as one atomic write.
    /// Returns the rows affected by `lead`.
    pub(crate) async fn save_with(&self, lead: Box<dyn PendingChange>) -> RepoResult<u64> {
        let (_, rows) = self.flush(Some(lead)).await?;
        Ok(rows)
    }

    async fn flush(&self, lead: Option<Box<dyn PendingChange>>) -> RepoResult<(SaveSummary, u64)> {
        self.ensure_live()?;
        let mut entries = self.changes.lock().take();

        let failures: Vec<EntityValidation> = entries
            .iter()
            .filter_map(|entry| {
                let errors = entry.validate();
                (!errors.is_empty()).then(|| EntityValidation {
                    entity: entry.entity().to_owned(),
                    state: entry.state(),
                    errors,
                })
            })
            .collect();
        if !failures.is_empty() {
            self.changes.lock().restore(entries);
            return Err(RepoError::ValidationFailed(ValidationErrors(failures)));
        }

        if self.ctx.stamps_audit_fields() {
            let now = Utc::now();
            for entry in &mut entries {
                entry.stamp(self.user_id(), now);
            }
        }

        let result = {
            let slot = self.tx.lock().await;
            match slot.as_ref() {
                Some(tx) => apply_all(tx, lead.as_deref(), &entries).await,
                None => self.apply_in_fresh_tx(lead.as_deref(), &entries).await,
            }
        };

        match result {
            Ok(rows) => {
                self.changes.lock().forget_removed(&entries);
                let summary = SaveSummary::of(&entries);
                tracing::debug!(
                    user_id = %self.user_id(),
                    added = summary.added,
                    modified = summary.modified,
                    removed = summary.removed,
                    "Saved changes"
                );
                Ok((summary, rows))
            }
            Err(err) => {
                self.changes.lock().restore(entries);
                Err(err)
            }
        }
    }

    async fn apply_in_fresh_tx(
        &self,
        lead: Option<&dyn PendingChange>,
        entries: &[Box<dyn PendingChange>],
    ) -> RepoResult<u64> {
        let tx = self.conn.begin().await.map_err(|e| RepoError::store(&e))?;
        match apply_all(&tx, lead, entries).await {
            Ok(rows) => {
                tx.commit().await.map_err(|e| RepoError::store(&e))?;
                Ok(rows)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback after failed save failed");
                }
                Err(err)
            }
        }
    }

    /// Roll back any open transaction and drop the change set. Every later
    /// operation on this session fails with `SessionReleased`.
    pub async fn dispose(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.tx.lock().await.take()
            && let Err(err) = tx.rollback().await
        {
            tracing::warn!(user_id = %self.user_id(), error = %err, "Rollback on dispose failed");
        }
        self.changes.lock().clear();
        tracing::debug!(user_id = %self.user_id(), "Session released");
    }
}

async fn apply_all(
    tx: &DatabaseTransaction,
    lead: Option<&dyn PendingChange>,
    entries: &[Box<dyn PendingChange>],
) -> RepoResult<u64> {
    let rows = match lead {
        Some(lead) => lead.apply(tx).await?,
        None => 0,
    };
    for entry in entries {
        entry.apply(tx).await?;
    }
    Ok(rows)
}
