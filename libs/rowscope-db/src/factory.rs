//! Per-user session cache.
//!
//! The [`RepositoryFactory`] owns the top-level connection and hands out one
//! [`Session`] per acting user, created on first request and reused until
//! [`RepositoryFactory::release_all_contexts`] drops them all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rowscope_security::constants::{ANONYMOUS, SYSTEM};
use rowscope_security::{AuthorizationContext, FixedUserIdProvider, UserId, UserIdProvider};
use sea_orm::DatabaseConnection;

use crate::config::{DatabaseConfig, RowscopeConfig};
use crate::connect::{ConnectOpts, DbError, connect, redact_dsn};
use crate::error::{RepoError, RepoResult};
use crate::keys::KeyRegistry;
use crate::session::Session;

/// Source of the factory's top-level connection, used on build and renew.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// # Errors
    /// Returns `DbError` when the store cannot be reached.
    async fn connect(&self) -> Result<DatabaseConnection, DbError>;
}

/// Connects to a DSN with fixed pool options.
#[derive(Debug, Clone)]
pub struct DsnConnectionFactory {
    dsn: String,
    opts: ConnectOpts,
}

impl DsnConnectionFactory {
    #[must_use]
    pub fn new(dsn: impl Into<String>, opts: ConnectOpts) -> Self {
        Self {
            dsn: dsn.into(),
            opts,
        }
    }

    #[must_use]
    pub fn from_config(cfg: &DatabaseConfig) -> Self {
        Self::new(cfg.dsn.clone(), ConnectOpts::from(cfg))
    }
}

#[async_trait]
impl ConnectionFactory for DsnConnectionFactory {
    async fn connect(&self) -> Result<DatabaseConnection, DbError> {
        tracing::debug!(dsn = %redact_dsn(&self.dsn), "Connecting");
        connect(&self.dsn, &self.opts).await
    }
}

/// Connection and sessions of a live factory.
struct Live {
    conn: DatabaseConnection,
    sessions: HashMap<UserId, Arc<Session>>,
    current: Option<Arc<Session>>,
    system: Option<Arc<Session>>,
}

impl Live {
    fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            sessions: HashMap::new(),
            current: None,
            system: None,
        }
    }
}

/// Cache of one [`Session`] per acting user.
pub struct RepositoryFactory {
    connector: Arc<dyn ConnectionFactory>,
    users: Arc<dyn UserIdProvider>,
    keys: Arc<KeyRegistry>,
    lazy_load: bool,
    live: Mutex<Option<Live>>,
}

impl std::fmt::Debug for RepositoryFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryFactory")
            .field("lazy_load", &self.lazy_load)
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl RepositoryFactory {
    #[must_use]
    pub fn builder() -> RepositoryFactoryBuilder {
        RepositoryFactoryBuilder::default()
    }

    #[must_use]
    pub fn keys(&self) -> &Arc<KeyRegistry> {
        &self.keys
    }

    #[must_use]
    pub fn is_lazy_load(&self) -> bool {
        self.lazy_load
    }

    /// Session of `user_id`, created on first request.
    ///
    /// # Errors
    /// `RepoError::FactoryReleased` after `release_all_contexts`.
    pub fn get_by_user(&self, user_id: UserId) -> RepoResult<Arc<Session>> {
        let mut guard = self.live.lock();
        let live = guard.as_mut().ok_or(RepoError::FactoryReleased)?;
        Ok(self.session_in(live, context_of(user_id)))
    }

    /// Session of the user named by the factory's `UserIdProvider`. The
    /// provider is asked once; later calls return the same session.
    ///
    /// The provider runs outside the cache lock, so it may itself use the
    /// factory.
    ///
    /// # Errors
    /// `RepoError::FactoryReleased` after `release_all_contexts`.
    pub fn current(&self) -> RepoResult<Arc<Session>> {
        {
            let guard = self.live.lock();
            let live = guard.as_ref().ok_or(RepoError::FactoryReleased)?;
            if let Some(session) = &live.current {
                return Ok(Arc::clone(session));
            }
        }
        let user_id = self.users.current_user_id();

        let mut guard = self.live.lock();
        let live = guard.as_mut().ok_or(RepoError::FactoryReleased)?;
        // Another caller may have resolved it meanwhile; the first one wins.
        if let Some(session) = &live.current {
            return Ok(Arc::clone(session));
        }
        let session = self.session_in(live, context_of(user_id));
        live.current = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Session acting as the system identity.
    ///
    /// # Errors
    /// `RepoError::FactoryReleased` after `release_all_contexts`.
    pub fn system(&self) -> RepoResult<Arc<Session>> {
        let mut guard = self.live.lock();
        let live = guard.as_mut().ok_or(RepoError::FactoryReleased)?;
        if let Some(session) = &live.system {
            return Ok(Arc::clone(session));
        }
        let session = self.session_in(live, context_of(SYSTEM));
        live.system = Some(Arc::clone(&session));
        Ok(session)
    }

    fn session_in(&self, live: &mut Live, ctx: AuthorizationContext) -> Arc<Session> {
        let user_id = ctx.user_id();
        Arc::clone(live.sessions.entry(user_id).or_insert_with(|| {
            Arc::new(Session::new(
                ctx,
                live.conn.clone(),
                Arc::clone(&self.keys),
                self.lazy_load,
            ))
        }))
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.live
            .lock()
            .as_ref()
            .map_or(0, |live| live.sessions.len())
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.live.lock().is_none()
    }

    /// Dispose every cached session and close the top-level connection.
    /// Handles obtained earlier fail with `SessionReleased` from now on.
    pub async fn release_all_contexts(&self) {
        let Some(live) = self.live.lock().take() else {
            return;
        };
        let count = live.sessions.len();
        for session in live.sessions.values() {
            session.dispose().await;
        }
        if let Err(err) = live.conn.close().await {
            tracing::warn!(error = %err, "Closing connection failed");
        }
        tracing::info!(sessions = count, "Released all sessions");
    }

    /// Release everything, then reconnect with the same configuration.
    ///
    /// # Errors
    /// Returns `RepoError::Connection` when reconnecting fails; the factory
    /// then stays released.
    pub async fn renew(&self) -> RepoResult<()> {
        self.release_all_contexts().await;
        let conn = self.connector.connect().await?;
        *self.live.lock() = Some(Live::new(conn));
        tracing::info!("Repository factory renewed");
        Ok(())
    }
}

/// Context for `user_id`; the reserved system id always gets the full
/// system context, whichever entry point creates its session first.
fn context_of(user_id: UserId) -> AuthorizationContext {
    if user_id == SYSTEM {
        AuthorizationContext::system()
    } else {
        AuthorizationContext::for_user(user_id)
    }
}

/// Builder for [`RepositoryFactory`].
#[must_use]
pub struct RepositoryFactoryBuilder {
    connector: Option<Arc<dyn ConnectionFactory>>,
    users: Arc<dyn UserIdProvider>,
    keys: Arc<KeyRegistry>,
    lazy_load: bool,
}

impl Default for RepositoryFactoryBuilder {
    fn default() -> Self {
        Self {
            connector: None,
            users: Arc::new(FixedUserIdProvider(ANONYMOUS)),
            keys: Arc::new(KeyRegistry::new()),
            lazy_load: true,
        }
    }
}

impl RepositoryFactoryBuilder {
    pub fn connector(mut self, connector: Arc<dyn ConnectionFactory>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Resolves the acting user of [`RepositoryFactory::current`].
    pub fn users(mut self, users: Arc<dyn UserIdProvider>) -> Self {
        self.users = users;
        self
    }

    pub fn keys(mut self, keys: Arc<KeyRegistry>) -> Self {
        self.keys = keys;
        self
    }

    pub fn lazy_load(mut self, lazy_load: bool) -> Self {
        self.lazy_load = lazy_load;
        self
    }

    /// Connector and lazy-load policy from `cfg`.
    pub fn config(self, cfg: &RowscopeConfig) -> Self {
        self.connector(Arc::new(DsnConnectionFactory::from_config(&cfg.database)))
            .lazy_load(cfg.lazy_load)
    }

    /// Connect and build.
    ///
    /// # Errors
    /// Returns `RepoError::Connection` when no connector was given or the
    /// connection fails.
    pub async fn build(self) -> RepoResult<RepositoryFactory> {
        let connector = self
            .connector
            .ok_or_else(|| DbError::Other(anyhow::anyhow!("no connection factory configured")))?;
        let conn = connector.connect().await?;
        tracing::debug!(lazy_load = self.lazy_load, "Repository factory ready");
        Ok(RepositoryFactory {
            connector,
            users: self.users,
            keys: self.keys,
            lazy_load: self.lazy_load,
            live: Mutex::new(Some(Live::new(conn))),
        })
    }
}
