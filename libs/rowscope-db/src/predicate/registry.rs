use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use heck::ToUpperCamelCase;
use sea_orm::prelude::Decimal;
use sea_orm::sea_query::{Alias, Expr, LikeExpr};
use sea_orm::{ColumnTrait, EntityTrait, IdenStatic, Iterable, Value};

use super::{FieldKind, Predicate, PredicateError, like_starts, parse_bool_tolerant};

/// One filterable/sortable field of `E`.
pub struct Field<E: EntityTrait> {
    pub col: E::Column,
    pub kind: FieldKind,
}

impl<E: EntityTrait> Clone for Field<E> {
    fn clone(&self) -> Self {
        Self {
            col: self.col,
            kind: self.kind,
        }
    }
}

/// Typed registry translating caller-facing field names into columns.
///
/// Names are matched exactly. A name missing from the registry is an
/// explicit miss, and the query-level helpers treat it as a no-op.
#[must_use]
pub struct FieldRegistry<E: EntityTrait> {
    map: HashMap<String, Field<E>>,
}

impl<E: EntityTrait> Clone for FieldRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<E: EntityTrait> Default for FieldRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityTrait> FieldRegistry<E> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Every column of `E`, under its column name and its `UpperCamelCase`
    /// alias (`is_active` and `IsActive`), with the kind taken from the
    /// column definition.
    pub fn from_entity() -> Self {
        let mut registry = Self::new();
        for col in E::Column::iter() {
            let kind = FieldKind::from_column_type(col.def().get_column_type());
            let name = col.as_str();
            registry = registry
                .insert(name, col, kind)
                .insert(name.to_upper_camel_case(), col, kind);
        }
        registry
    }

    pub fn insert(mut self, name: impl Into<String>, col: E::Column, kind: FieldKind) -> Self {
        self.map.insert(name.into(), Field { col, kind });
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field<E>> {
        self.map.get(name)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<E::Column> {
        self.get(name).map(|f| f.col)
    }

    /// Equality on `field`, with `value` read according to the field kind.
    /// `Ok(None)` when the field is unknown.
    ///
    /// # Errors
    /// Returns `PredicateError::InvalidValue` when `value` does not parse as
    /// the field's kind.
    pub fn equals(&self, field: &str, value: &str) -> Result<Option<Predicate<E>>, PredicateError> {
        let Some(f) = self.get(field) else {
            return Ok(None);
        };
        let value = coerce(field, f.kind, value)?;
        Ok(Some(Predicate::from_condition(
            sea_orm::Condition::all().add(f.col.eq(value)),
        )))
    }

    /// Starts-with on `field`; `None` when the field is unknown.
    ///
    /// Boolean fields become equality on the tolerantly parsed value. Other
    /// fields use a case-sensitive prefix match on their text form.
    #[must_use]
    pub fn starts_with(&self, field: &str, value: &str) -> Option<Predicate<E>> {
        let f = self.get(field)?;
        let col = Expr::col((E::default(), f.col));
        let pattern = LikeExpr::new(like_starts(value)).escape('\\');
        let expr = match f.kind {
            FieldKind::Bool => f.col.eq(parse_bool_tolerant(value)),
            FieldKind::String => col.like(pattern),
            _ => Expr::expr(col.cast_as(Alias::new("TEXT"))).like(pattern),
        };
        Some(Predicate::from_condition(sea_orm::Condition::all().add(expr)))
    }
}

fn coerce(field: &str, kind: FieldKind, raw: &str) -> Result<Value, PredicateError> {
    let invalid = || PredicateError::InvalidValue {
        field: field.to_owned(),
        kind,
        value: raw.to_owned(),
    };
    Ok(match kind {
        FieldKind::String => Value::String(Some(Box::new(raw.to_owned()))),
        FieldKind::Bool => Value::Bool(Some(parse_bool_tolerant(raw))),
        FieldKind::I64 => Value::BigInt(Some(raw.trim().parse().map_err(|_| invalid())?)),
        FieldKind::F64 => Value::Double(Some(raw.trim().parse().map_err(|_| invalid())?)),
        FieldKind::Decimal => Value::Decimal(Some(Box::new(
            Decimal::from_str(raw.trim()).map_err(|_| invalid())?,
        ))),
        FieldKind::Uuid => Value::Uuid(Some(Box::new(
            uuid::Uuid::parse_str(raw.trim()).map_err(|_| invalid())?,
        ))),
        FieldKind::DateTimeUtc => {
            let dt = DateTime::parse_from_rfc3339(raw.trim()).map_err(|_| invalid())?;
            Value::ChronoDateTimeUtc(Some(Box::new(dt.with_timezone(&Utc))))
        }
        FieldKind::Date => Value::ChronoDate(Some(Box::new(
            NaiveDate::from_str(raw.trim()).map_err(|_| invalid())?,
        ))),
        FieldKind::Time => Value::ChronoTime(Some(Box::new(
            NaiveTime::from_str(raw.trim()).map_err(|_| invalid())?,
        ))),
    })
}
