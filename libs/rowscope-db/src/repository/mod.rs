//! Tiered, authorization-scoped access to one entity type.
//!
//! Reads go through one of three [`Tier`]s. Writes always reconcile the
//! incoming model against the edit tier by primary key first; a row outside
//! that tier cannot be updated or removed, whatever the caller sends.

mod children;
mod paging;
mod tier;
mod write;

use std::marker::PhantomData;

use sea_orm::sea_query::IntoCondition;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, Iterable,
    ModelTrait, QueryFilter, Related, Statement, Value,
};

pub use children::TreeSource;
pub use paging::ElementsPage;
pub use tier::{Tier, TierQuery};

use crate::error::{RepoError, RepoResult};
use crate::keys::KeySet;
use crate::policy::EntityPolicy;
use crate::session::Session;

/// Repository view over `E`, bound to one session.
///
/// Holds no entity data; obtain one with `Session::repository`.
pub struct EntityRepository<'s, E: EntityPolicy> {
    session: &'s Session,
    _entity: PhantomData<E>,
}

impl<E: EntityPolicy> Clone for EntityRepository<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: EntityPolicy> Copy for EntityRepository<'_, E> {}

impl<E: EntityPolicy> std::fmt::Debug for EntityRepository<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRepository")
            .field("entity", &E::default().table_name())
            .field("user_id", &self.session.user_id())
            .finish()
    }
}

impl<'s, E> EntityRepository<'s, E>
where
    E: EntityPolicy,
    E::Model: Sync,
    E::ActiveModel: Send + Sync,
{
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn session(&self) -> &'s Session {
        self.session
    }

    fn entity_name() -> String {
        E::default().table_name().to_owned()
    }

    fn keys(&self) -> RepoResult<KeySet<E>> {
        Ok(self.session.keys().resolve::<E>()?)
    }

    fn id_condition(&self, id: i64) -> RepoResult<Condition> {
        let col = self.session.keys().id_column::<E>()?;
        Ok(Condition::all().add(col.eq(id)))
    }

    // --- tiers ---

    /// Rows the user may see, optionally narrowed by `filter`.
    pub fn lookups(&self, filter: Option<Condition>) -> TierQuery<'s, E> {
        TierQuery::new(self.session, Tier::Lookups, filter)
    }

    /// Rows the user may modify, optionally narrowed by `filter`.
    pub fn for_edit(&self, filter: Option<Condition>) -> TierQuery<'s, E> {
        TierQuery::new(self.session, Tier::ForEdit, filter)
    }

    /// Every row, bypassing authorization.
    pub fn unsafe_query(&self, filter: Option<Condition>) -> TierQuery<'s, E> {
        TierQuery::new(self.session, Tier::Unsafe, filter)
    }

    pub fn tier(&self, tier: Tier, filter: Option<Condition>) -> TierQuery<'s, E> {
        TierQuery::new(self.session, tier, filter)
    }

    // --- single-row reads ---

    /// First lookup-tier row matching `filter`.
    ///
    /// # Errors
    /// Propagates store failures; a missing row is `Ok(None)`.
    pub async fn get<F: IntoCondition>(&self, filter: F) -> RepoResult<Option<E::Model>> {
        self.lookups(Some(filter.into_condition())).one().await
    }

    /// # Errors
    /// Propagates store failures; a missing row is `Ok(None)`.
    pub async fn get_no_tracking<F: IntoCondition>(&self, filter: F) -> RepoResult<Option<E::Model>> {
        self.lookups(Some(filter.into_condition())).no_tracking().one().await
    }

    /// First edit-tier row matching `filter`.
    ///
    /// # Errors
    /// Propagates store failures; a missing row is `Ok(None)`.
    pub async fn get_for_edit<F: IntoCondition>(&self, filter: F) -> RepoResult<Option<E::Model>> {
        self.for_edit(Some(filter.into_condition())).one().await
    }

    /// # Errors
    /// Propagates store failures; a missing row is `Ok(None)`.
    pub async fn get_for_edit_no_tracking<F: IntoCondition>(
        &self,
        filter: F,
    ) -> RepoResult<Option<E::Model>> {
        self.for_edit(Some(filter.into_condition())).no_tracking().one().await
    }

    /// First row matching `filter`, without authorization.
    ///
    /// # Errors
    /// Propagates store failures; a missing row is `Ok(None)`.
    pub async fn get_unsafe<F: IntoCondition>(&self, filter: F) -> RepoResult<Option<E::Model>> {
        self.unsafe_query(Some(filter.into_condition())).one().await
    }

    /// # Errors
    /// Propagates store failures; a missing row is `Ok(None)`.
    pub async fn get_unsafe_no_tracking<F: IntoCondition>(
        &self,
        filter: F,
    ) -> RepoResult<Option<E::Model>> {
        self.unsafe_query(Some(filter.into_condition())).no_tracking().one().await
    }

    /// # Errors
    /// `RepoError::NotMapped` when `E` has no `id` column; store failures.
    pub async fn get_by_id(&self, id: i64) -> RepoResult<Option<E::Model>> {
        self.get(self.id_condition(id)?).await
    }

    /// # Errors
    /// `RepoError::NotMapped` when `E` has no `id` column; store failures.
    pub async fn get_for_edit_by_id(&self, id: i64) -> RepoResult<Option<E::Model>> {
        self.get_for_edit(self.id_condition(id)?).await
    }

    /// # Errors
    /// `RepoError::NotMapped` when `E` has no `id` column; store failures.
    pub async fn get_unsafe_by_id(&self, id: i64) -> RepoResult<Option<E::Model>> {
        self.get_unsafe(self.id_condition(id)?).await
    }

    /// First row of `tier` matching `filter`, with its related `R` rows as
    /// visible to the user.
    ///
    /// # Errors
    /// Propagates store failures; a missing row is `Ok(None)`.
    pub async fn get_with_related<R>(
        &self,
        tier: Tier,
        filter: Condition,
    ) -> RepoResult<Option<(E::Model, Vec<R::Model>)>>
    where
        E: Related<R>,
        R: EntityPolicy,
        R::Model: Sync,
    {
        let Some(row) = self.tier(tier, Some(filter)).one().await? else {
            return Ok(None);
        };
        let related = self.load_collection::<R>(&row, None).await?;
        Ok(Some((row, related)))
    }

    /// Related `R` rows of `model` within `R`'s lookup tier.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn load_collection<R>(
        &self,
        model: &E::Model,
        filter: Option<Condition>,
    ) -> RepoResult<Vec<R::Model>>
    where
        E: Related<R>,
        R: EntityPolicy,
        R::Model: Sync,
    {
        let mut select = model
            .find_related(R::default())
            .filter(R::lookup_scope(self.session.context()));
        if let Some(filter) = filter {
            select = select.filter(filter);
        }
        let conn = self.session.conn().await?;
        Ok(conn.runner().all(select).await?)
    }

    /// The `R` row `model` refers to, if the user may see it.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn load_reference<R>(&self, model: &E::Model) -> RepoResult<Option<R::Model>>
    where
        E: Related<R>,
        R: EntityPolicy,
        R::Model: Sync,
    {
        let select = model
            .find_related(R::default())
            .filter(R::lookup_scope(self.session.context()));
        let conn = self.session.conn().await?;
        Ok(conn.runner().one(select).await?)
    }

    // --- counts and rights ---

    /// Number of edit-tier rows matching `filter`.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn count(&self, filter: Option<Condition>) -> RepoResult<u64> {
        self.for_edit(filter).count().await
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn has_rights_for_view<F: IntoCondition>(&self, filter: F) -> RepoResult<bool> {
        self.lookups(Some(filter.into_condition())).exists().await
    }

    /// # Errors
    /// `RepoError::NotMapped` when `E` has no `id` column; store failures.
    pub async fn has_rights_for_view_by_id(&self, id: i64) -> RepoResult<bool> {
        self.has_rights_for_view(self.id_condition(id)?).await
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn has_rights_for_edit<F: IntoCondition>(&self, filter: F) -> RepoResult<bool> {
        self.for_edit(Some(filter.into_condition())).exists().await
    }

    /// # Errors
    /// `RepoError::NotMapped` when `E` has no `id` column; store failures.
    pub async fn has_rights_for_edit_by_id(&self, id: i64) -> RepoResult<bool> {
        self.has_rights_for_edit(self.id_condition(id)?).await
    }

    // --- reconciliation previews ---

    /// What [`update`](Self::update) would produce for `model`, without
    /// staging anything. `None` when the row is outside the edit tier.
    ///
    /// # Errors
    /// `RepoError::NotMapped` for keyless entities; store failures.
    pub async fn find_entity(&self, model: &E::Model) -> RepoResult<Option<E::Model>> {
        let keys = self.keys()?;
        let current = self
            .for_edit(Some(keys.condition(model)))
            .no_tracking()
            .one()
            .await?;
        Ok(current.map(|current| merged::<E>(&current, model)))
    }

    /// Untracked edit-tier row matching `filter`, as currently stored.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn get_original<F: IntoCondition>(&self, filter: F) -> RepoResult<Option<E::Model>> {
        self.get_for_edit_no_tracking(filter).await
    }

    /// Raw `SELECT` mapped onto `E`, without authorization.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn sql_query(&self, sql: &str, values: Vec<Value>) -> RepoResult<Vec<E::Model>> {
        let stmt = Statement::from_sql_and_values(self.session.backend(), sql, values);
        let conn = self.session.conn().await?;
        Ok(conn.runner().raw::<E>(stmt).await?)
    }

    fn deny(&self) -> RepoError {
        let entity = Self::entity_name();
        tracing::warn!(
            target: "security",
            entity = %entity,
            user_id = %self.session.user_id(),
            "Write outside edit scope rejected"
        );
        RepoError::AuthorizationDenied {
            entity,
            user: self.session.user_id(),
        }
    }
}

/// Active model with every column of `model` set.
fn active_from_model<E: EntityTrait>(model: &E::Model) -> E::ActiveModel {
    let mut active = <E::ActiveModel as ActiveModelTrait>::default();
    for col in E::Column::iter() {
        active.set(col, model.get(col));
    }
    active
}

/// `incoming` as it will read after an update of `current`: every column
/// from `incoming`, except the audit columns a save never rewrites.
fn merged<E: EntityPolicy>(current: &E::Model, incoming: &E::Model) -> E::Model {
    let mut out = incoming.clone();
    if let Some(cols) = E::audit_columns() {
        out.set(cols.created_at, current.get(cols.created_at));
    }
    out
}
