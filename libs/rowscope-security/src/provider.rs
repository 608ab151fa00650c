use crate::UserId;

/// Resolves the acting user of the current unit of work.
///
/// The repository factory calls this once and memoizes the resulting session.
pub trait UserIdProvider: Send + Sync {
    fn current_user_id(&self) -> UserId;
}

/// Provider returning one preconfigured id; handy for workers and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedUserIdProvider(pub UserId);

impl UserIdProvider for FixedUserIdProvider {
    fn current_user_id(&self) -> UserId {
        self.0
    }
}

impl<F> UserIdProvider for F
where
    F: Fn() -> UserId + Send + Sync,
{
    fn current_user_id(&self) -> UserId {
        self()
    }
}
