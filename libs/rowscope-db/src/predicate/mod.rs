//! Runtime predicate composition from field-name strings.
//!
//! Filter and sort criteria usually arrive as untyped strings. A
//! [`FieldRegistry`] maps their field names to typed columns; everything
//! here is a no-op for names the registry does not know, so unknown filter
//! keys from callers are tolerated.

mod compose;
mod kind;
mod registry;

pub use compose::Predicate;
pub use kind::FieldKind;
pub use registry::{Field, FieldRegistry};

use sea_orm::{EntityTrait, Order, QueryFilter, QueryOrder, Select};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PredicateError {
    #[error("cannot read `{value}` as {kind} for field `{field}`")]
    InvalidValue {
        field: String,
        kind: FieldKind,
        value: String,
    },
}

/// Reads `true`/`false` in any letter case, otherwise any non-zero integer
/// as true. Everything else is false.
#[must_use]
pub fn parse_bool_tolerant(raw: &str) -> bool {
    let raw = raw.trim();
    if let Ok(b) = raw.to_lowercase().parse::<bool>() {
        return b;
    }
    raw.parse::<i64>().is_ok_and(|n| n != 0)
}

/// `field=value` pairs of a `;`-separated filter expression.
/// Segments without `=` and segments with an empty field name are skipped.
pub fn parse_filter(expr: &str) -> impl Iterator<Item = (&str, &str)> {
    expr.split(';').filter_map(|segment| {
        let (field, value) = segment.split_once('=')?;
        let field = field.trim();
        (!field.is_empty()).then_some((field, value))
    })
}

/// `(field, order)` pairs of a sort spec such as `"Title DESC, Id"`.
/// The direction defaults to ascending.
pub fn parse_sort(spec: &str) -> impl Iterator<Item = (&str, Order)> {
    spec.split(',').filter_map(|part| {
        let mut words = part.split_whitespace();
        let field = words.next()?;
        let order = match words.next() {
            Some(dir) if dir.eq_ignore_ascii_case("desc") => Order::Desc,
            _ => Order::Asc,
        };
        Some((field, order))
    })
}

pub(crate) fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn like_starts(s: &str) -> String {
    format!("{}%", like_escape(s))
}

/// Name-driven filtering and ordering for `SeaORM` selects.
pub trait DynamicQueryExt<E: EntityTrait>: Sized {
    /// Narrow by a starts-with match on `field`; unchanged if `field` is unknown.
    fn where_field_starts_with(self, fields: &FieldRegistry<E>, field: &str, value: &str) -> Self;

    /// Narrow by equality on `field`; unchanged if `field` is unknown.
    ///
    /// # Errors
    /// Returns `PredicateError::InvalidValue` when `value` does not parse.
    fn where_field_equals(
        self,
        fields: &FieldRegistry<E>,
        field: &str,
        value: &str,
    ) -> Result<Self, PredicateError>;

    /// Fold [`where_field_starts_with`](Self::where_field_starts_with) over
    /// every `field=value` pair of `expr` (conjunction).
    fn filter_query(self, fields: &FieldRegistry<E>, expr: &str) -> Self {
        parse_filter(expr).fold(self, |query, (field, value)| {
            query.where_field_starts_with(fields, field, value)
        })
    }

    /// Ascending order on `field`; unchanged if `field` is unknown.
    fn try_order_by(self, fields: &FieldRegistry<E>, field: &str) -> Self;

    /// Apply every known field of a sort spec, in order.
    fn order_by_spec(self, fields: &FieldRegistry<E>, spec: &str) -> Self;
}

impl<E: EntityTrait> DynamicQueryExt<E> for Select<E> {
    fn where_field_starts_with(self, fields: &FieldRegistry<E>, field: &str, value: &str) -> Self {
        match fields.starts_with(field, value) {
            Some(predicate) => self.filter(predicate.into_condition()),
            None => self,
        }
    }

    fn where_field_equals(
        self,
        fields: &FieldRegistry<E>,
        field: &str,
        value: &str,
    ) -> Result<Self, PredicateError> {
        Ok(match fields.equals(field, value)? {
            Some(predicate) => self.filter(predicate.into_condition()),
            None => self,
        })
    }

    fn try_order_by(self, fields: &FieldRegistry<E>, field: &str) -> Self {
        match fields.column(field) {
            Some(col) => self.order_by(col, Order::Asc),
            None => self,
        }
    }

    fn order_by_spec(self, fields: &FieldRegistry<E>, spec: &str) -> Self {
        parse_sort(spec).fold(self, |query, (field, order)| match fields.column(field) {
            Some(col) => query.order_by(col, order),
            None => query,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    mod doc {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "documents")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub title: String,
            pub is_active: bool,
            pub score: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    fn sql(select: Select<doc::Entity>) -> String {
        select.build(DbBackend::Sqlite).to_string()
    }

    fn fields() -> FieldRegistry<doc::Entity> {
        FieldRegistry::from_entity()
    }

    #[test]
    fn tolerant_bool_parsing() {
        assert!(parse_bool_tolerant("true"));
        assert!(parse_bool_tolerant("TRUE"));
        assert!(parse_bool_tolerant("1"));
        assert!(parse_bool_tolerant("-3"));
        assert!(!parse_bool_tolerant("0"));
        assert!(!parse_bool_tolerant("False"));
        assert!(!parse_bool_tolerant("yes"));
        assert!(!parse_bool_tolerant(""));
    }

    #[test]
    fn registry_knows_column_and_camel_case_names() {
        let fields = fields();
        assert_eq!(fields.get("is_active").unwrap().kind, FieldKind::Bool);
        assert_eq!(fields.get("IsActive").unwrap().kind, FieldKind::Bool);
        assert_eq!(fields.get("Score").unwrap().kind, FieldKind::I64);
        assert_eq!(fields.get("Title").unwrap().kind, FieldKind::String);
        assert!(fields.get("isactive").is_none());
    }

    #[test]
    fn unknown_field_leaves_query_unchanged() {
        let base = sql(doc::Entity::find());
        let filtered = sql(doc::Entity::find().where_field_starts_with(&fields(), "UnknownField", "x"));
        assert_eq!(base, filtered);
        let ordered = sql(doc::Entity::find().try_order_by(&fields(), "Nope"));
        assert_eq!(base, ordered);
    }

    #[test]
    fn bool_starts_with_is_equality() {
        let starts = sql(doc::Entity::find().where_field_starts_with(&fields(), "IsActive", "1"));
        let equals = sql(doc::Entity::find()
            .where_field_equals(&fields(), "IsActive", "true")
            .unwrap());
        assert_eq!(starts, equals);
        assert!(starts.contains("\"is_active\" = "), "{starts}");
        assert!(!starts.contains("LIKE"), "{starts}");
    }

    #[test]
    fn text_starts_with_escapes_wildcards() {
        assert_eq!(like_starts("50%_off"), "50\\%\\_off%");
        let q = sql(doc::Entity::find().where_field_starts_with(&fields(), "Title", "Re"));
        assert!(q.contains("\"title\" LIKE 'Re%'"), "{q}");
        assert!(q.contains("ESCAPE"), "{q}");
    }

    #[test]
    fn numeric_starts_with_casts_to_text() {
        let q = sql(doc::Entity::find().where_field_starts_with(&fields(), "Score", "4"));
        assert!(q.contains("CAST("), "{q}");
        assert!(q.contains("AS TEXT) LIKE '4%'"), "{q}");
    }

    #[test]
    fn filter_query_is_conjunctive_and_skips_noise() {
        let q = sql(doc::Entity::find().filter_query(&fields(), "Title=Re;bogus;Unknown=1;IsActive=true;"));
        assert!(q.contains("\"title\" LIKE 'Re%'"), "{q}");
        assert!(q.contains(" AND "), "{q}");
        assert!(q.contains("\"is_active\" = "), "{q}");
        assert!(!q.contains("Unknown"), "{q}");
    }

    #[test]
    fn equality_rejects_bad_numbers() {
        let err = doc::Entity::find()
            .where_field_equals(&fields(), "Score", "many")
            .unwrap_err();
        assert!(matches!(err, PredicateError::InvalidValue { kind: FieldKind::I64, .. }));
    }

    #[test]
    fn sort_spec_applies_known_fields_in_order() {
        let q = sql(doc::Entity::find().order_by_spec(&fields(), "Title DESC, Nope, Id"));
        let title = q.find("\"title\" DESC").expect("title ordering");
        let id = q.find("\"id\" ASC").expect("id ordering");
        assert!(title < id, "{q}");
    }

    #[test]
    fn predicates_compose() {
        let fields = fields();
        let active = fields.equals("IsActive", "true").unwrap().unwrap();
        let titled = fields.starts_with("Title", "A").unwrap();
        let either = active.clone().or(titled.clone());
        let q = sql(doc::Entity::find().filter(either.into_condition()));
        assert!(q.contains(" OR "), "{q}");

        let both = active.and(titled.not());
        let q = sql(doc::Entity::find().filter(both.into_condition()));
        assert!(q.contains("NOT"), "{q}");

        let none = sql(doc::Entity::find().filter(Predicate::<doc::Entity>::never().into_condition()));
        assert!(none.contains("WHERE"), "{none}");
    }

    #[test]
    fn filter_segments_are_split_once() {
        let pairs: Vec<_> = parse_filter("a=b=c; =x;k=").collect();
        assert_eq!(pairs, vec![("a", "b=c"), ("k", "")]);
    }
}
