use sea_orm::{Condition, Order};

use super::{EntityRepository, TierQuery};
use crate::error::RepoResult;
use crate::policy::EntityPolicy;

/// One page request's result: the query to read the page with, and the
/// number of rows matching the hard predicate alone.
#[derive(Debug)]
pub struct ElementsPage<'s, E: EntityPolicy> {
    pub query: TierQuery<'s, E>,
    /// Counted before the sort spec and the text filter are applied.
    pub total: u64,
}

impl<'s, E> EntityRepository<'s, E>
where
    E: EntityPolicy,
    E::Model: Sync,
    E::ActiveModel: Send + Sync,
{
    /// Page of edit-tier rows for grid-style callers.
    ///
    /// `total` counts the rows matching `predicate` only. The returned query
    /// additionally carries `sort` and the `field=value;...` text `filter`,
    /// and is limited to `count` rows from `start` unless `count` is zero.
    /// Without a sort spec a paged query is ordered by key.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn get_elements(
        &self,
        start: u64,
        count: u64,
        sort: Option<&str>,
        filter: Option<&str>,
        predicate: Option<Condition>,
    ) -> RepoResult<ElementsPage<'s, E>> {
        let total = self.count(predicate.clone()).await?;

        let mut query = self.for_edit(predicate);
        match sort.map(str::trim).filter(|s| !s.is_empty()) {
            Some(spec) => query = query.order_by_spec(spec),
            None if count > 0 => {
                if let Ok(keys) = self.keys() {
                    for &col in keys.columns() {
                        query = query.order_by(col, Order::Asc);
                    }
                }
            }
            None => {}
        }
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            query = query.filter_query(filter);
        }
        if count > 0 {
            query = query.page(start, count);
        }
        Ok(ElementsPage { query, total })
    }
}
