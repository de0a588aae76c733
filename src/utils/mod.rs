pub mod clock;
pub mod keys;
pub mod password;
pub mod pkce;
pub mod secret;
pub mod token;
