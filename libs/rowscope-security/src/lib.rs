#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Identities of acting principals and the authorization context every
//! session and repository carries.

pub mod constants;
pub mod context;
pub mod provider;
pub mod user;

pub use context::{AuthorizationContext, AuthorizationContextBuilder};
pub use provider::{FixedUserIdProvider, UserIdProvider};
pub use user::UserId;
