pub mod access_jwt;
pub mod binding;
pub mod dpop;
pub mod replay;

pub use access_jwt::{AuthService, VerifiedAccessToken};
