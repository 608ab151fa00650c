//! Executor of a session: its open transaction, or the shared connection.

use sea_orm::{
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, FromQueryResult, PaginatorTrait,
    Select, Statement,
};
use tokio::sync::MutexGuard;

pub(crate) enum Runner<'a> {
    Conn(&'a DatabaseConnection),
    Tx(&'a DatabaseTransaction),
}

/// Read access to a session's executor.
///
/// Holds the transaction slot for as long as it lives, so `begin`/`commit`
/// cannot interleave with a running read.
pub(crate) struct SessionConn<'s> {
    pub(super) tx: MutexGuard<'s, Option<DatabaseTransaction>>,
    pub(super) conn: &'s DatabaseConnection,
}

impl SessionConn<'_> {
    pub(crate) fn runner(&self) -> Runner<'_> {
        match self.tx.as_ref() {
            Some(tx) => Runner::Tx(tx),
            None => Runner::Conn(self.conn),
        }
    }
}

impl Runner<'_> {
    pub(crate) async fn all<E: EntityTrait>(&self, select: Select<E>) -> Result<Vec<E::Model>, DbErr> {
        match self {
            Self::Conn(c) => select.all(*c).await,
            Self::Tx(t) => select.all(*t).await,
        }
    }

    pub(crate) async fn one<E: EntityTrait>(&self, select: Select<E>) -> Result<Option<E::Model>, DbErr> {
        match self {
            Self::Conn(c) => select.one(*c).await,
            Self::Tx(t) => select.one(*t).await,
        }
    }

    pub(crate) async fn count<E>(&self, select: Select<E>) -> Result<u64, DbErr>
    where
        E: EntityTrait,
        E::Model: Sync,
    {
        match self {
            Self::Conn(c) => select.count(*c).await,
            Self::Tx(t) => select.count(*t).await,
        }
    }

    pub(crate) async fn raw<E: EntityTrait>(&self, stmt: Statement) -> Result<Vec<E::Model>, DbErr>
    where
        E::Model: FromQueryResult,
    {
        match self {
            Self::Conn(c) => E::find().from_raw_sql(stmt).all(*c).await,
            Self::Tx(t) => E::find().from_raw_sql(stmt).all(*t).await,
        }
    }
}

