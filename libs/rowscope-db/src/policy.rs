//! Per-entity authorization and persistence policy.
//!
//! An entity takes part in tiered access by implementing [`EntityPolicy`] on
//! its `SeaORM` entity type. Only [`EntityPolicy::edit_scope`] is required.

use rowscope_security::AuthorizationContext;
use sea_orm::{Condition, EntityTrait};

use crate::error::{FieldError, RepoResult};
use crate::predicate::FieldRegistry;

/// Columns a session stamps on save.
///
/// `last_editor` must hold an `i64` (or `Option<i64>`), the timestamps a
/// `DateTime<Utc>` (or its `Option`), and `row_version` an `i64`.
pub struct AuditColumns<E: EntityTrait> {
    pub last_editor: E::Column,
    pub created_at: E::Column,
    pub edited_at: E::Column,
    /// Optimistic-concurrency token, incremented on every update.
    pub row_version: Option<E::Column>,
}

impl<E: EntityTrait> Clone for AuditColumns<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: EntityTrait> Copy for AuditColumns<E> {}

impl<E: EntityTrait> std::fmt::Debug for AuditColumns<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditColumns")
            .field("last_editor", &self.last_editor)
            .field("created_at", &self.created_at)
            .field("edited_at", &self.edited_at)
            .field("row_version", &self.row_version)
            .finish()
    }
}

/// Visibility rules, validation and mutation hooks of one entity.
///
/// # Example
/// ```rust,ignore
/// impl EntityPolicy for document::Entity {
///     fn edit_scope(ctx: &AuthorizationContext) -> Condition {
///         Condition::all().add(document::Column::OwnerId.eq(ctx.user_id().get()))
///     }
/// }
/// ```
pub trait EntityPolicy: EntityTrait {
    /// Rows `ctx` may modify. Every write is reconciled against this tier.
    fn edit_scope(ctx: &AuthorizationContext) -> Condition;

    /// Rows `ctx` may see for display and references. Defaults to every row.
    fn lookup_scope(_ctx: &AuthorizationContext) -> Condition {
        Condition::all()
    }

    fn audit_columns() -> Option<AuditColumns<Self>> {
        None
    }

    /// Fields addressable by name in filters and sort specs.
    fn fields() -> FieldRegistry<Self> {
        FieldRegistry::from_entity()
    }

    /// Property-level checks run by `Session::save` on added and modified rows.
    fn validate(_model: &Self::ActiveModel) -> Vec<FieldError> {
        Vec::new()
    }

    /// Runs after the edit-tier lookup and before the merge. An error aborts
    /// the update with nothing staged.
    ///
    /// # Errors
    /// Implementations return `RepoError::HookRejected` to veto.
    fn before_update(
        _ctx: &AuthorizationContext,
        _current: &Self::Model,
        _incoming: &Self::Model,
    ) -> RepoResult<()> {
        Ok(())
    }

    fn after_update(_ctx: &AuthorizationContext, _merged: &Self::Model) {}

    /// # Errors
    /// Implementations return `RepoError::HookRejected` to veto.
    fn before_remove(_ctx: &AuthorizationContext, _row: &Self::Model) -> RepoResult<()> {
        Ok(())
    }
}

/// Entities whose rows form a hierarchy through a nullable parent column
/// referencing their own `id`.
pub trait SelfReferencing: EntityPolicy {
    fn parent_column() -> Self::Column;
}
