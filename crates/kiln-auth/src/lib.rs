//! Kiln Auth: password and two-factor login, JWT and refresh tokens,
//! API keys, and claim-based authorization.

pub mod api_key;
pub mod authorization;
pub mod config;
pub mod error;
pub mod password;
pub mod principal;
pub mod service;
pub mod token;
pub mod totp;

pub use api_key::{ApiKeyService, CreatedApiKey, NewApiKey};
pub use authorization::{Authorizer, Decision, Requirement, ResolvedPrincipal, SecurityRequirement};
pub use config::AuthConfig;
pub use error::AuthError;
pub use principal::Principal;
pub use service::{AuthService, LoginInput, TokenPair};
pub use token::AccessTokenClaims;
