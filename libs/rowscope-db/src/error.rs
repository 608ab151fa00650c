use std::error::Error as StdError;
use std::fmt;

use rowscope_security::UserId;
use sea_orm::DbErr;
use thiserror::Error;

use crate::connect::DbError;
use crate::keys::KeyError;
use crate::predicate::PredicateError;
use crate::session::EntryState;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors surfaced by repositories, sessions and the factory.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    NotMapped(#[from] KeyError),

    #[error("user {user} is not allowed to modify this `{entity}` row")]
    AuthorizationDenied { entity: String, user: UserId },

    #[error("{0}")]
    ValidationFailed(ValidationErrors),

    /// Any other save-time failure, reduced to its innermost message.
    #[error("{message}")]
    StoreFailure { message: String },

    #[error("`{entity}` row was changed or removed by someone else")]
    ConcurrencyConflict { entity: String },

    #[error("`{entity}` change rejected: {reason}")]
    HookRejected { entity: String, reason: String },

    #[error("a transaction is already open on this session")]
    TransactionActive,

    #[error("no transaction is open on this session")]
    NoTransaction,

    #[error("session of user {0} has been released")]
    SessionReleased(UserId),

    #[error("repository factory has been released")]
    FactoryReleased,

    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Connection(#[from] DbError),

    #[error(transparent)]
    Db(#[from] DbErr),
}

impl RepoError {
    /// Convenience for entity hooks vetoing a change.
    #[must_use]
    pub fn rejected(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HookRejected {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn store(err: &(dyn StdError + 'static)) -> Self {
        Self::StoreFailure {
            message: innermost_message(err),
        }
    }
}

/// Message of the deepest error in the `source()` chain.
#[must_use]
pub fn innermost_message(err: &(dyn StdError + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

/// One failed property of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub property: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
}

/// Validation failures of one staged entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityValidation {
    pub entity: String,
    pub state: EntryState,
    pub errors: Vec<FieldError>,
}

/// Aggregated validation failures of a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<EntityValidation>);

impl ValidationErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityValidation> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entity in &self.0 {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(
                f,
                "Entity of type \"{}\" in state \"{}\" has the following validation errors:",
                entity.entity, entity.state
            )?;
            for error in &entity.errors {
                write!(
                    f,
                    "\n- Property: \"{}\", Error: \"{}\"",
                    error.property, error.message
                )?;
            }
        }
        Ok(())
    }
}
