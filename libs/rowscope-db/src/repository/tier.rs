use std::fmt;

use sea_orm::sea_query::IntoCondition;
use sea_orm::{
    ColumnTrait, Condition, Order, QueryFilter, QueryOrder,
    QuerySelect, Select,
};

use crate::error::RepoResult;
use crate::policy::EntityPolicy;
use crate::predicate::DynamicQueryExt;
use crate::session::Session;

/// Visibility tier a query reads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Rows the user may see for display and references.
    Lookups,
    /// Rows the user may modify.
    ForEdit,
    /// Every row, no authorization filter.
    Unsafe,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Lookups => write!(f, "lookups"),
            Tier::ForEdit => write!(f, "for_edit"),
            Tier::Unsafe => write!(f, "unsafe"),
        }
    }
}

impl Tier {
    /// Authorization filter of this tier for the session's user.
    pub(crate) fn scope<E: EntityPolicy>(self, session: &Session) -> Option<Condition> {
        match self {
            Tier::Lookups => Some(E::lookup_scope(session.context())),
            Tier::ForEdit => Some(E::edit_scope(session.context())),
            Tier::Unsafe => None,
        }
    }
}

/// Composable query over one tier of `E`, bound to a session.
///
/// Further filters only narrow the tier; nothing added here can widen the
/// authorization filter the query started with.
#[must_use]
pub struct TierQuery<'s, E: EntityPolicy> {
    session: &'s Session,
    tier: Tier,
    select: Select<E>,
    tracking: bool,
}

impl<E: EntityPolicy> fmt::Debug for TierQuery<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierQuery")
            .field("tier", &self.tier)
            .field("tracking", &self.tracking)
            .finish_non_exhaustive()
    }
}

impl<'s, E> TierQuery<'s, E>
where
    E: EntityPolicy,
    E::Model: Sync,
{
    pub(crate) fn new(session: &'s Session, tier: Tier, filter: Option<Condition>) -> Self {
        let mut select = E::find();
        if let Some(scope) = tier.scope::<E>(session) {
            select = select.filter(scope);
        }
        if let Some(filter) = filter {
            select = select.filter(filter);
        }
        Self {
            session,
            tier,
            select,
            tracking: true,
        }
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn filter<F: IntoCondition>(mut self, filter: F) -> Self {
        self.select = self.select.filter(filter);
        self
    }

    pub fn order_by(mut self, col: E::Column, order: Order) -> Self {
        self.select = self.select.order_by(col, order);
        self
    }

    pub fn order_by_asc(self, col: E::Column) -> Self {
        self.order_by(col, Order::Asc)
    }

    pub fn order_by_desc(self, col: E::Column) -> Self {
        self.order_by(col, Order::Desc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.select = QuerySelect::limit(self.select, limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.select = QuerySelect::offset(self.select, offset);
        self
    }

    /// `count` rows starting at row `start`.
    pub fn page(self, start: u64, count: u64) -> Self {
        self.offset(start).limit(count)
    }

    /// Rows read by this query are not registered with the session.
    pub fn no_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    /// Prefix match on a named field; unknown fields are ignored.
    pub fn where_field_starts_with(mut self, field: &str, value: &str) -> Self {
        self.select = self.select.where_field_starts_with(&E::fields(), field, value);
        self
    }

    /// Equality on a named field; unknown fields are ignored.
    ///
    /// # Errors
    /// `RepoError::Predicate` when `value` does not parse as the field's type.
    pub fn where_field_equals(mut self, field: &str, value: &str) -> RepoResult<Self> {
        self.select = self.select.where_field_equals(&E::fields(), field, value)?;
        Ok(self)
    }

    /// Apply a `field=value;field=value` filter as a conjunction of prefix
    /// matches.
    pub fn filter_query(mut self, expr: &str) -> Self {
        self.select = self.select.filter_query(&E::fields(), expr);
        self
    }

    /// Ascending order on a named field; unknown fields are ignored.
    pub fn try_order_by(mut self, field: &str) -> Self {
        self.select = self.select.try_order_by(&E::fields(), field);
        self
    }

    /// Order by a spec such as `"Title DESC, Id"`.
    pub fn order_by_spec(mut self, spec: &str) -> Self {
        self.select = self.select.order_by_spec(&E::fields(), spec);
        self
    }

    /// Rows whose `col` is one of `values`.
    pub fn filter_in<V, I>(self, col: E::Column, values: I) -> Self
    where
        V: Into<sea_orm::Value>,
        I: IntoIterator<Item = V>,
    {
        self.filter(col.is_in(values))
    }

    #[must_use]
    pub fn into_select(self) -> Select<E> {
        self.select
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn all(self) -> RepoResult<Vec<E::Model>> {
        let Self {
            session,
            select,
            tracking,
            ..
        } = self;
        let rows = {
            let conn = session.conn().await?;
            conn.runner().all(select).await?
        };
        if tracking {
            track::<E>(session, &rows);
        }
        Ok(rows)
    }

    /// First matching row, if any.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn one(self) -> RepoResult<Option<E::Model>> {
        let Self {
            session,
            select,
            tracking,
            ..
        } = self;
        let row = {
            let conn = session.conn().await?;
            conn.runner().one(select).await?
        };
        if tracking && let Some(row) = &row {
            track::<E>(session, std::slice::from_ref(row));
        }
        Ok(row)
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn count(self) -> RepoResult<u64> {
        let conn = self.session.conn().await?;
        Ok(conn.runner().count(self.select).await?)
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn exists(self) -> RepoResult<bool> {
        Ok(self.limit(1).no_tracking().one().await?.is_some())
    }
}

fn track<E: EntityPolicy>(session: &Session, rows: &[E::Model]) {
    // Keyless entities are readable but never tracked.
    let Ok(keys) = session.keys().resolve::<E>() else {
        return;
    };
    for row in rows {
        session.track(keys.identity(row));
    }
}
