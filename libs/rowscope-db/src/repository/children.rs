use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rowscope_tree::ChildSource;
use sea_orm::{ColumnTrait, Condition, ModelTrait, Value};

use super::EntityRepository;
use crate::error::{RepoError, RepoResult};
use crate::keys::render_value;
use crate::policy::SelfReferencing;

/// Children of self-referencing rows, read through the lookup tier.
///
/// Children known in memory are served from a resident cache; anything else
/// is fetched on demand, one query per parent. With lazy loading switched
/// off on the session, [`roots`](Self::roots) loads every visible row up
/// front so building a tree issues no further queries.
pub struct TreeSource<'s, E: SelfReferencing> {
    repo: EntityRepository<'s, E>,
    filter: Option<Condition>,
    resident: Mutex<HashMap<String, Vec<E::Model>>>,
}

impl<'s, E> TreeSource<'s, E>
where
    E: SelfReferencing,
    E::Model: Sync,
    E::ActiveModel: Send + Sync,
{
    /// Source over `repo`, every read additionally narrowed by `filter`.
    #[must_use]
    pub fn new(repo: EntityRepository<'s, E>, filter: Option<Condition>) -> Self {
        Self {
            repo,
            filter,
            resident: Mutex::new(HashMap::new()),
        }
    }

    fn id_of(&self, row: &E::Model) -> RepoResult<Value> {
        let col = self.repo.session().keys().id_column::<E>()?;
        Ok(row.get(col))
    }

    /// Parentless visible rows.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn roots(&self) -> RepoResult<Vec<E::Model>> {
        let parent = E::parent_column();
        if !self.repo.session().is_lazy_load() {
            let all = self.repo.lookups(self.filter.clone()).all().await?;
            let roots = all
                .iter()
                .filter(|row| is_null(&row.get(parent)))
                .cloned()
                .collect();
            self.make_resident(&all, &all)?;
            return Ok(roots);
        }
        self.repo
            .lookups(self.filter.clone())
            .filter(parent.is_null())
            .all()
            .await
    }

    /// Load the children of all `parents` with one query.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn preload(&self, parents: &[E::Model]) -> RepoResult<()> {
        if parents.is_empty() {
            return Ok(());
        }
        let ids = parents
            .iter()
            .map(|p| self.id_of(p))
            .collect::<RepoResult<Vec<_>>>()?;
        let children = self
            .repo
            .lookups(self.filter.clone())
            .filter_in(E::parent_column(), ids)
            .all()
            .await?;
        self.make_resident(parents, &children)
    }

    /// Record `children` under their parents; every row of `parents` ends up
    /// resident, with an empty list when it has no children among them.
    /// Lists loaded earlier for the same parents are replaced, not extended.
    fn make_resident(&self, parents: &[E::Model], children: &[E::Model]) -> RepoResult<()> {
        let parent_col = E::parent_column();
        let mut loaded: HashMap<String, Vec<E::Model>> = HashMap::with_capacity(parents.len());
        for parent in parents {
            loaded.entry(render_value(&self.id_of(parent)?)).or_default();
        }
        for child in children {
            let parent = child.get(parent_col);
            if !is_null(&parent) {
                loaded
                    .entry(render_value(&parent))
                    .or_default()
                    .push(child.clone());
            }
        }
        self.resident.lock().extend(loaded);
        Ok(())
    }
}

fn is_null(value: &Value) -> bool {
    *value == value.as_null()
}

#[async_trait]
impl<'s, E> ChildSource<E::Model> for TreeSource<'s, E>
where
    E: SelfReferencing,
    E::Model: Sync,
    E::ActiveModel: Send + Sync,
{
    type Error = RepoError;

    fn resident(&self, item: &E::Model) -> Option<Vec<E::Model>> {
        let id = self.id_of(item).ok()?;
        self.resident.lock().get(&render_value(&id)).cloned()
    }

    async fn fetch(&self, item: &E::Model) -> RepoResult<Vec<E::Model>> {
        let id = self.id_of(item)?;
        let children = self
            .repo
            .lookups(self.filter.clone())
            .filter(E::parent_column().eq(id.clone()))
            .all()
            .await?;
        self.resident
            .lock()
            .insert(render_value(&id), children.clone());
        Ok(children)
    }
}
