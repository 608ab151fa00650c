use std::marker::PhantomData;

use sea_orm::sea_query::Expr;
use sea_orm::sea_query::IntoCondition;
use sea_orm::{Condition, EntityTrait};

/// Boolean filter over the rows of `E`.
///
/// Combinators build real `AND`/`OR`/`NOT` trees, so composed predicates
/// keep every operand.
#[must_use]
pub struct Predicate<E: EntityTrait> {
    cond: Condition,
    _entity: PhantomData<E>,
}

impl<E: EntityTrait> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        Self::from_condition(self.cond.clone())
    }
}

impl<E: EntityTrait> std::fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Predicate").field(&self.cond).finish()
    }
}

impl<E: EntityTrait> Predicate<E> {
    pub fn from_condition(cond: Condition) -> Self {
        Self {
            cond,
            _entity: PhantomData,
        }
    }

    /// Matches every row.
    pub fn always() -> Self {
        Self::from_condition(Condition::all().add(Expr::value(true)))
    }

    /// Matches no row.
    pub fn never() -> Self {
        Self::from_condition(Condition::all().add(Expr::value(false)))
    }

    pub fn and(self, other: Self) -> Self {
        Self::from_condition(Condition::all().add(self.cond).add(other.cond))
    }

    pub fn or(self, other: Self) -> Self {
        Self::from_condition(Condition::any().add(self.cond).add(other.cond))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::from_condition(self.cond.not())
    }

    #[must_use]
    pub fn into_condition(self) -> Condition {
        self.cond
    }
}

impl<E: EntityTrait> IntoCondition for Predicate<E> {
    fn into_condition(self) -> Condition {
        self.cond
    }
}
