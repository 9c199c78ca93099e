//! HTTP handlers

pub mod auth;
pub mod health;
pub mod whr;

pub use auth::*;
pub use health::*;
pub use whr::*;
