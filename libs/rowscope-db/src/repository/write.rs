use sea_orm::{ActiveModelTrait, Condition, IntoActiveModel, ModelTrait, Value};

use super::{EntityRepository, active_from_model, merged};
use crate::error::{RepoError, RepoResult};
use crate::policy::EntityPolicy;
use crate::session::{BulkInsert, EntityChange, RawCommand};

/// Version following `held`, for integer version columns.
fn next_version(held: &Value) -> Option<Value> {
    match held {
        Value::BigInt(Some(v)) => Some(Value::BigInt(Some(v + 1))),
        Value::Int(Some(v)) => Some(Value::Int(Some(v + 1))),
        _ => None,
    }
}

/// Start new rows at version 1 unless the caller picked one.
fn init_version<E: EntityPolicy>(model: &mut E::ActiveModel) {
    if let Some(col) = E::audit_columns().and_then(|cols| cols.row_version)
        && model.is_not_set(col)
    {
        model.set(col, Value::BigInt(Some(1)));
    }
}

impl<E> EntityRepository<'_, E>
where
    E: EntityPolicy,
    E::Model: Sync + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: Send + Sync,
{
    /// Stage a new row.
    ///
    /// # Errors
    /// `RepoError::SessionReleased` on a disposed session.
    pub fn insert(&self, mut model: E::ActiveModel) -> RepoResult<()> {
        self.session.ensure_live()?;
        init_version::<E>(&mut model);
        self.session.stage(Box::new(EntityChange::<E>::added(model)));
        Ok(())
    }

    /// Reconcile `model` with its stored row and stage the update.
    ///
    /// The stored row is looked up in the edit tier by `model`'s key. The
    /// returned model is what the row will hold after save, apart from the
    /// audit stamps applied at save time.
    ///
    /// # Errors
    /// - `RepoError::AuthorizationDenied` when the row is outside the edit tier,
    /// - `RepoError::ConcurrencyConflict` when `model` carries a stale row version,
    /// - whatever `before_update` returns.
    pub async fn update(&self, model: E::Model) -> RepoResult<E::Model> {
        let keys = self.keys()?;
        let key = keys.condition(&model);
        let Some(current) = self
            .for_edit(Some(key.clone()))
            .no_tracking()
            .one()
            .await?
        else {
            return Err(self.deny());
        };

        let ctx = self.session.context();
        E::before_update(ctx, &current, &model)?;

        let mut active = active_from_model::<E>(&model);
        let mut expected = None;
        if let Some(cols) = E::audit_columns() {
            active.not_set(cols.created_at);
            if let Some(col) = cols.row_version {
                let held = current.get(col);
                if model.get(col) != held {
                    return Err(RepoError::ConcurrencyConflict {
                        entity: Self::entity_name(),
                    });
                }
                if let Some(next) = next_version(&held) {
                    active.set(col, next);
                }
                expected = Some(held);
            }
        }

        let out = merged::<E>(&current, &model);
        self.session.stage(Box::new(EntityChange::<E>::modified(
            active,
            key,
            keys.identity(&model),
            expected,
        )));
        E::after_update(ctx, &out);
        Ok(out)
    }

    /// Stage removal of the stored row with `model`'s key.
    ///
    /// # Errors
    /// `RepoError::AuthorizationDenied` when the row is outside the edit tier,
    /// or whatever `before_remove` returns.
    pub async fn remove(&self, model: &E::Model) -> RepoResult<E::Model> {
        let key = self.keys()?.condition(model);
        self.remove_matching(key).await
    }

    /// # Errors
    /// As [`remove`](Self::remove); `RepoError::NotMapped` without an `id` column.
    pub async fn remove_by_id(&self, id: i64) -> RepoResult<E::Model> {
        let key = self.id_condition(id)?;
        self.remove_matching(key).await
    }

    async fn remove_matching(&self, key: Condition) -> RepoResult<E::Model> {
        let Some(row) = self.for_edit(Some(key)).no_tracking().one().await? else {
            return Err(self.deny());
        };
        E::before_remove(self.session.context(), &row)?;
        self.stage_removal(&row)?;
        Ok(row)
    }

    /// Stage removal of every edit-tier row matching `filter`.
    ///
    /// Hooks run for every row before anything is staged, so a veto leaves
    /// the change set untouched.
    ///
    /// # Errors
    /// Whatever `before_remove` returns; store failures.
    pub async fn remove_where(&self, filter: Condition) -> RepoResult<usize> {
        let rows = self.for_edit(Some(filter)).no_tracking().all().await?;
        let ctx = self.session.context();
        for row in &rows {
            E::before_remove(ctx, row)?;
        }
        for row in &rows {
            self.stage_removal(row)?;
        }
        Ok(rows.len())
    }

    fn stage_removal(&self, row: &E::Model) -> RepoResult<()> {
        let keys = self.keys()?;
        self.session.stage(Box::new(EntityChange::<E>::removed(
            active_from_model::<E>(row),
            keys.condition(row),
            keys.identity(row),
        )));
        Ok(())
    }

    /// Insert `models` in one statement, atomically with the pending change
    /// set. The rows skip validation and audit stamping.
    ///
    /// # Errors
    /// As `Session::save`.
    pub async fn bulk_insert(&self, models: Vec<E::ActiveModel>) -> RepoResult<u64> {
        let models = models
            .into_iter()
            .map(|mut model| {
                init_version::<E>(&mut model);
                model
            })
            .collect();
        self.session.save_with(Box::new(BulkInsert::<E>::new(models))).await
    }

    /// Execute a raw statement, then the pending change set, atomically.
    /// Returns the rows affected by the statement.
    ///
    /// # Errors
    /// As `Session::save`.
    pub async fn execute_command(&self, sql: &str, values: Vec<Value>) -> RepoResult<u64> {
        let stmt = sea_orm::Statement::from_sql_and_values(self.session.backend(), sql, values);
        let command = RawCommand::new(&Self::entity_name(), stmt);
        self.session.save_with(Box::new(command)).await
    }
}
