//! Business logic services

pub mod auth;
pub mod whr;

pub use auth::AuthService;
pub use whr::WhrService;
