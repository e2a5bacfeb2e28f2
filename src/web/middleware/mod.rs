pub mod auth;
pub mod device_auth;
