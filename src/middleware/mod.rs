mod auth;
mod rate_limit;
mod request_meta;

pub use auth::{bearer_auth_middleware, AuthContext};
pub use rate_limit::{
    authorize_rate_limit, introspect_rate_limit, login_rate_limit, register_rate_limit,
    token_rate_limit,
};
pub use request_meta::RequestMeta;
