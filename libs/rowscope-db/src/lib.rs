#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Authorization-aware data access over `SeaORM`.
//!
//! A [`RepositoryFactory`] caches one [`Session`] (unit of work) per acting
//! user. A session hands out [`EntityRepository`] views, one per entity type,
//! which read through three visibility tiers:
//!
//! - **lookups**: rows the user may see for display and references,
//! - **for edit**: rows the user may mutate; the only boundary for writes,
//! - **unsafe**: the whole table, for trusted/system callers.
//!
//! Writes reconcile the incoming model against the edit tier by primary key
//! before anything is staged, so a caller can never modify a row it is not
//! allowed to edit. Staged changes are written by [`Session::save`], which
//! validates and audit-stamps them first.
//!
//! # Example
//! ```rust,ignore
//! use rowscope_db::{KeyRegistry, RepositoryFactory, DsnConnectionFactory, ConnectOpts};
//! use rowscope_security::{FixedUserIdProvider, UserId};
//! use std::sync::Arc;
//!
//! let factory = RepositoryFactory::builder()
//!     .connector(Arc::new(DsnConnectionFactory::new("sqlite::memory:", ConnectOpts::default())))
//!     .users(Arc::new(FixedUserIdProvider(UserId::new(42))))
//!     .keys(Arc::new(KeyRegistry::new().with::<document::Entity>()))
//!     .build()
//!     .await?;
//!
//! let session = factory.current()?;
//! let docs = session.repository::<document::Entity>();
//! let mine = docs.for_edit(None).all().await?;
//! ```

pub mod config;
pub mod connect;
pub mod error;
pub mod factory;
pub mod keys;
pub mod policy;
pub mod predicate;
pub mod repository;
pub mod session;

mod pool_opts;

pub use config::{ConfigError, DatabaseConfig, RowscopeConfig};
pub use connect::{ConnectOpts, DbEngine, DbError, connect};
pub use error::{EntityValidation, FieldError, RepoError, RepoResult, ValidationErrors};
pub use factory::{ConnectionFactory, DsnConnectionFactory, RepositoryFactory, RepositoryFactoryBuilder};
pub use keys::{KeyError, KeyRegistry, KeySet};
pub use policy::{AuditColumns, EntityPolicy, SelfReferencing};
pub use predicate::{DynamicQueryExt, FieldKind, FieldRegistry, Predicate, PredicateError};
pub use repository::{ElementsPage, EntityRepository, Tier, TierQuery, TreeSource};
pub use session::{ChangeEntry, EntryState, SaveSummary, Session};
