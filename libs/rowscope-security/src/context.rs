use crate::UserId;
use crate::constants::{ANONYMOUS, SYSTEM};

/// `AuthorizationContext` identifies the principal a session acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    user_id: UserId,
    display_name: Option<String>,
}

impl AuthorizationContext {
    /// Create a new `AuthorizationContext` builder
    #[must_use]
    pub fn builder() -> AuthorizationContextBuilder {
        AuthorizationContextBuilder::default()
    }

    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self::builder().user_id(user_id).build()
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::for_user(ANONYMOUS)
    }

    #[must_use]
    pub fn system() -> Self {
        Self::builder()
            .user_id(SYSTEM)
            .display_name("system")
            .build()
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Whether saves made in this context receive audit stamps.
    #[must_use]
    pub fn stamps_audit_fields(&self) -> bool {
        !self.user_id.is_reserved()
    }
}

#[derive(Default)]
pub struct AuthorizationContextBuilder {
    user_id: Option<UserId>,
    display_name: Option<String>,
}

impl AuthorizationContextBuilder {
    #[must_use]
    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_owned());
        self
    }

    /// Missing user id falls back to the anonymous identity.
    #[must_use]
    pub fn build(self) -> AuthorizationContext {
        AuthorizationContext {
            user_id: self.user_id.unwrap_or(ANONYMOUS),
            display_name: self.display_name,
        }
    }
}
