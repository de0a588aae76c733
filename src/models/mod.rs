mod audit;
mod authorization_code;
mod backup;
mod client;
mod consent;
mod rbac;
mod scope;
mod token;
mod user;

pub use audit::{actions, ActorType, AuditLog};
pub use authorization_code::AuthorizationCode;
pub use backup::SystemBackup;
pub use client::{is_loopback_uri, Client, ClientType, TokenEndpointAuthMethod};
pub use consent::ConsentGrant;
pub use rbac::{Permission, PermissionType, Role, UserPermission};
pub use scope::Scope;
pub use token::{blacklist_type, AccessToken, BlacklistEntry, RefreshToken};
pub use user::User;
