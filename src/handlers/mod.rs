pub mod account;
pub mod audit;
pub mod auth;
pub mod clients;
pub mod oauth;
pub mod permissions;
pub mod roles;
pub mod scopes;
pub mod system;
pub mod users;
