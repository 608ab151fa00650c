//! Primary-key resolution.
//!
//! Keys are registered per entity at startup from `SeaORM` primary-key
//! metadata and stored by canonical table (`schema.table`), so every entity
//! type mapping the same table shares one key set. Entities exposing a plain
//! `id` column take a fast path and need no registration.
//!
//! Resolution never yields an empty key set: callers turn keys into
//! authorization-narrowing filters, and an empty filter would match every row.

use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, IdenStatic, Iterable, ModelTrait,
    PrimaryKeyToColumn, Value,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("entity `{entity}` is not mapped: no key columns registered for table `{table}`")]
    NotMapped { entity: &'static str, table: String },

    #[error("entity `{entity}` has no `id` column")]
    NoIdColumn { entity: &'static str },
}

/// Column name of the conventional single-column key.
pub const ID_COLUMN: &str = "id";

/// Append-only registry of key column names per canonical table.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    tables: DashMap<String, Arc<[String]>>,
}

impl KeyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<E: EntityTrait>(self) -> Self {
        self.register::<E>();
        self
    }

    /// Record the primary-key columns of `E`.
    ///
    /// A table registered twice keeps its first key set; key sets are
    /// structural metadata and never change during a run.
    pub fn register<E: EntityTrait>(&self) {
        let names: Vec<String> = E::PrimaryKey::iter()
            .map(|pk| pk.into_column().as_str().to_owned())
            .collect();
        if names.is_empty() {
            tracing::warn!(entity = std::any::type_name::<E>(), "Entity has no primary key, not registered");
            return;
        }
        let table = canonical_table::<E>();
        tracing::debug!(table = %table, keys = ?names, "Registered entity keys");
        self.tables.entry(table).or_insert_with(|| names.into());
    }

    /// Ordered key columns of `E`.
    ///
    /// # Errors
    /// Returns `KeyError::NotMapped` if `E` has no `id` column and its table
    /// was never registered, or a registered name is not a column of `E`.
    pub fn resolve<E: EntityTrait>(&self) -> Result<KeySet<E>, KeyError> {
        if let Ok(id) = E::Column::from_str(ID_COLUMN) {
            return Ok(KeySet {
                columns: vec![id],
                names: Arc::from([ID_COLUMN.to_owned()]),
                _entity: PhantomData,
            });
        }

        let table = canonical_table::<E>();
        let not_mapped = || KeyError::NotMapped {
            entity: std::any::type_name::<E>(),
            table: table.clone(),
        };
        let names = self
            .tables
            .get(&table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(not_mapped)?;
        let columns = names
            .iter()
            .map(|name| E::Column::from_str(name).map_err(|_| not_mapped()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeySet {
            columns,
            names,
            _entity: PhantomData,
        })
    }

    /// The `id` column of `E`, used by the by-id operations.
    ///
    /// # Errors
    /// Returns `KeyError::NoIdColumn` when `E` has no `id` column.
    pub fn id_column<E: EntityTrait>(&self) -> Result<E::Column, KeyError> {
        E::Column::from_str(ID_COLUMN).map_err(|_| KeyError::NoIdColumn {
            entity: std::any::type_name::<E>(),
        })
    }

    #[must_use]
    pub fn is_registered<E: EntityTrait>(&self) -> bool {
        self.tables.contains_key(&canonical_table::<E>())
    }
}

/// `schema.table` or just `table` for the table `E` maps to.
#[must_use]
pub fn canonical_table<E: EntityTrait>() -> String {
    let entity = E::default();
    match entity.schema_name() {
        Some(schema) => format!("{schema}.{}", entity.table_name()),
        None => entity.table_name().to_owned(),
    }
}

/// Resolved, ordered key columns of one entity.
pub struct KeySet<E: EntityTrait> {
    columns: Vec<E::Column>,
    names: Arc<[String]>,
    _entity: PhantomData<E>,
}

impl<E: EntityTrait> Clone for KeySet<E> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            names: Arc::clone(&self.names),
            _entity: PhantomData,
        }
    }
}

impl<E: EntityTrait> std::fmt::Debug for KeySet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet").field("names", &self.names).finish_non_exhaustive()
    }
}

impl<E: EntityTrait> KeySet<E> {
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn columns(&self) -> &[E::Column] {
        &self.columns
    }

    /// Key values of `model`, aligned with [`names`](Self::names).
    #[must_use]
    pub fn values(&self, model: &E::Model) -> Vec<Value> {
        self.columns.iter().map(|&col| model.get(col)).collect()
    }

    /// Ordered `(name, value)` pairs of `model`'s key.
    #[must_use]
    pub fn map(&self, model: &E::Model) -> Vec<(String, Value)> {
        self.names
            .iter()
            .cloned()
            .zip(self.values(model))
            .collect()
    }

    /// `(column, value)` pairs of `model`'s key.
    #[must_use]
    pub fn pairs(&self, model: &E::Model) -> Vec<(E::Column, Value)> {
        self.columns.iter().map(|&col| (col, model.get(col))).collect()
    }

    /// Equality over every key column.
    #[must_use]
    pub fn condition(&self, model: &E::Model) -> Condition {
        self.columns
            .iter()
            .fold(Condition::all(), |cond, &col| cond.add(col.eq(model.get(col))))
    }

    /// Stable textual identity of `model`, used to address staged changes.
    #[must_use]
    pub fn identity(&self, model: &E::Model) -> String {
        let values: Vec<String> = self.values(model).iter().map(render_value).collect();
        format!("{}#{}", canonical_table::<E>(), values.join(","))
    }
}

/// Human-readable rendering of a key value.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(Some(v)) => v.to_string(),
        Value::TinyInt(Some(v)) => v.to_string(),
        Value::SmallInt(Some(v)) => v.to_string(),
        Value::Int(Some(v)) => v.to_string(),
        Value::BigInt(Some(v)) => v.to_string(),
        Value::TinyUnsigned(Some(v)) => v.to_string(),
        Value::SmallUnsigned(Some(v)) => v.to_string(),
        Value::Unsigned(Some(v)) => v.to_string(),
        Value::BigUnsigned(Some(v)) => v.to_string(),
        Value::String(Some(v)) => v.as_str().to_owned(),
        Value::Char(Some(v)) => v.to_string(),
        Value::Uuid(Some(v)) => v.to_string(),
        other => format!("{other:?}"),
    }
}
