use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rowscope_security::UserId;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction,
    EntityTrait, IntoActiveModel, QueryFilter, Statement, Value,
};

use super::EntryState;
use crate::error::{FieldError, RepoError, RepoResult};
use crate::policy::EntityPolicy;

/// A unit of work applied by `Session::save` inside a transaction.
#[async_trait]
pub(crate) trait PendingChange: Send + Sync {
    fn entity(&self) -> &str;

    fn state(&self) -> EntryState;

    /// Key identity for rows that already exist; `None` for new rows.
    fn identity(&self) -> Option<&str>;

    fn validate(&self) -> Vec<FieldError>;

    fn stamp(&mut self, editor: UserId, now: DateTime<Utc>);

    /// Returns the number of affected rows.
    async fn apply(&self, tx: &DatabaseTransaction) -> RepoResult<u64>;
}

/// A staged insert, update or delete of one `E` row.
pub(crate) struct EntityChange<E: EntityTrait> {
    entity: String,
    state: EntryState,
    model: E::ActiveModel,
    key: Condition,
    identity: Option<String>,
    expected_version: Option<Value>,
}

impl<E: EntityPolicy> EntityChange<E> {
    pub(crate) fn added(model: E::ActiveModel) -> Self {
        Self {
            entity: E::default().table_name().to_owned(),
            state: EntryState::Added,
            model,
            key: Condition::all(),
            identity: None,
            expected_version: None,
        }
    }

    /// Update of the row matched by `key`. With `expected_version`, the row
    /// is only written while its version column still holds that value.
    pub(crate) fn modified(
        model: E::ActiveModel,
        key: Condition,
        identity: String,
        expected_version: Option<Value>,
    ) -> Self {
        Self {
            entity: E::default().table_name().to_owned(),
            state: EntryState::Modified,
            model,
            key,
            identity: Some(identity),
            expected_version,
        }
    }

    pub(crate) fn removed(model: E::ActiveModel, key: Condition, identity: String) -> Self {
        Self {
            entity: E::default().table_name().to_owned(),
            state: EntryState::Removed,
            model,
            key,
            identity: Some(identity),
            expected_version: None,
        }
    }

    fn conflict(&self) -> RepoError {
        RepoError::ConcurrencyConflict {
            entity: self.entity.clone(),
        }
    }
}

#[async_trait]
impl<E> PendingChange for EntityChange<E>
where
    E: EntityPolicy,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: Send + Sync,
{
    fn entity(&self) -> &str {
        &self.entity
    }

    fn state(&self) -> EntryState {
        self.state
    }

    fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    fn validate(&self) -> Vec<FieldError> {
        match self.state {
            EntryState::Added | EntryState::Modified => E::validate(&self.model),
            EntryState::Removed | EntryState::Unchanged => Vec::new(),
        }
    }

    fn stamp(&mut self, editor: UserId, now: DateTime<Utc>) {
        let Some(cols) = E::audit_columns() else {
            return;
        };
        let editor = Value::BigInt(Some(editor.get()));
        let now = Value::ChronoDateTimeUtc(Some(Box::new(now)));
        match self.state {
            EntryState::Added => {
                self.model.set(cols.created_at, now);
                self.model.set(cols.last_editor, editor);
            }
            EntryState::Modified => {
                self.model.set(cols.edited_at, now);
                self.model.set(cols.last_editor, editor);
            }
            EntryState::Removed | EntryState::Unchanged => {}
        }
    }

    async fn apply(&self, tx: &DatabaseTransaction) -> RepoResult<u64> {
        match self.state {
            EntryState::Added => E::insert(self.model.clone())
                .exec_without_returning(tx)
                .await
                .map_err(|e| RepoError::store(&e)),
            EntryState::Modified => {
                let mut filter = self.key.clone();
                let version = E::audit_columns().and_then(|cols| cols.row_version);
                if let (Some(col), Some(expected)) = (version, self.expected_version.clone()) {
                    filter = filter.add(col.eq(expected));
                }
                let res = E::update_many()
                    .set(self.model.clone())
                    .filter(filter)
                    .exec(tx)
                    .await
                    .map_err(|e| RepoError::store(&e))?;
                if res.rows_affected == 0 {
                    tracing::debug!(entity = %self.entity, key = ?self.identity, "Update matched no row");
                    return Err(self.conflict());
                }
                Ok(res.rows_affected)
            }
            EntryState::Removed => {
                let res = E::delete_many()
                    .filter(self.key.clone())
                    .exec(tx)
                    .await
                    .map_err(|e| RepoError::store(&e))?;
                Ok(res.rows_affected)
            }
            EntryState::Unchanged => Ok(0),
        }
    }
}

/// Multi-row insert that bypasses validation and audit stamping.
pub(crate) struct BulkInsert<E: EntityTrait> {
    entity: String,
    models: Vec<E::ActiveModel>,
}

impl<E: EntityTrait> BulkInsert<E> {
    pub(crate) fn new(models: Vec<E::ActiveModel>) -> Self {
        Self {
            entity: E::default().table_name().to_owned(),
            models,
        }
    }
}

#[async_trait]
impl<E> PendingChange for BulkInsert<E>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: Send + Sync,
{
    fn entity(&self) -> &str {
        &self.entity
    }

    fn state(&self) -> EntryState {
        EntryState::Added
    }

    fn identity(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }

    fn stamp(&mut self, _editor: UserId, _now: DateTime<Utc>) {}

    async fn apply(&self, tx: &DatabaseTransaction) -> RepoResult<u64> {
        if self.models.is_empty() {
            return Ok(0);
        }
        E::insert_many(self.models.clone())
            .exec_without_returning(tx)
            .await
            .map_err(|e| RepoError::store(&e))
    }
}

/// Raw statement executed as-is.
pub(crate) struct RawCommand {
    entity: String,
    stmt: Statement,
}

impl RawCommand {
    pub(crate) fn new(entity: &str, stmt: Statement) -> Self {
        Self {
            entity: entity.to_owned(),
            stmt,
        }
    }
}

#[async_trait]
impl PendingChange for RawCommand {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn state(&self) -> EntryState {
        EntryState::Unchanged
    }

    fn identity(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }

    fn stamp(&mut self, _editor: UserId, _now: DateTime<Utc>) {}

    async fn apply(&self, tx: &DatabaseTransaction) -> RepoResult<u64> {
        let res = tx
            .execute(self.stmt.clone())
            .await
            .map_err(|e| RepoError::store(&e))?;
        Ok(res.rows_affected())
    }
}

/// Staged changes of a session, in staging order, plus the identities of
/// rows read with tracking.
#[derive(Default)]
pub(crate) struct ChangeSet {
    entries: Vec<Box<dyn PendingChange>>,
    tracked: HashSet<String>,
}

impl ChangeSet {
    /// A change to an already staged row replaces the earlier entry in place.
    pub(crate) fn stage(&mut self, change: Box<dyn PendingChange>) {
        if let Some(id) = change.identity().map(str::to_owned) {
            if let Some(slot) = self
                .entries
                .iter_mut()
                .find(|entry| entry.identity() == Some(id.as_str()))
            {
                *slot = change;
                self.tracked.insert(id);
                return;
            }
            self.tracked.insert(id);
        }
        self.entries.push(change);
    }

    pub(crate) fn track(&mut self, identity: String) {
        self.tracked.insert(identity);
    }

    pub(crate) fn is_tracked(&self, identity: &str) -> bool {
        self.tracked.contains(identity)
    }

    /// State of a tracked row; `None` when the row is not tracked.
    pub(crate) fn state_of(&self, identity: &str) -> Option<EntryState> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.identity() == Some(identity))
        {
            return Some(entry.state());
        }
        self.is_tracked(identity).then_some(EntryState::Unchanged)
    }

    pub(crate) fn entries(&self) -> &[Box<dyn PendingChange>] {
        &self.entries
    }

    pub(crate) fn take(&mut self) -> Vec<Box<dyn PendingChange>> {
        std::mem::take(&mut self.entries)
    }

    /// Put back entries of a failed save ahead of anything staged since.
    pub(crate) fn restore(&mut self, mut earlier: Vec<Box<dyn PendingChange>>) {
        earlier.append(&mut self.entries);
        self.entries = earlier;
    }

    /// Stop tracking rows whose removal was just written.
    pub(crate) fn forget_removed(&mut self, saved: &[Box<dyn PendingChange>]) {
        for entry in saved {
            if entry.state() == EntryState::Removed
                && let Some(id) = entry.identity()
            {
                self.tracked.remove(id);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.tracked.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
