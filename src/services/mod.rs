mod audit;
mod authorize;
mod cleanup;
mod client_auth;
mod clients;
mod decider;
mod introspection;
mod rate_limiter;
mod rbac;
mod system;
mod token;
mod users;

pub use audit::{AuditEvent, AuditService};
pub use authorize::{
    append_query, error_redirect, AuthorizeOutcome, AuthorizeParams, AuthorizeReject,
    AuthorizeService, ConsentDecision,
};
pub use cleanup::run_cleanup_loop;
pub use client_auth::{ClientAuthenticator, PresentedCredentials, ASSERTION_TYPE_JWT_BEARER};
pub use clients::{ClientCreateParams, ClientRegistryService, ClientUpdateParams};
pub use decider::{client_effective, AccessDecider};
pub use introspection::{IntrospectionResponse, IntrospectionService};
pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiterService};
pub use rbac::{validate_permission_name, RbacService};
pub use system::SystemService;
pub use token::{IssuedTokens, TokenService};
pub use users::{validate_email, validate_username, LockoutConfig, UserService};
