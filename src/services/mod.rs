pub mod auth;
pub mod cache;
pub mod clients;
pub mod clock;
