//! Data models for the WHR Tracking Backend
//!
//! Domain types live in the shared crate so the pure calculations and the
//! server agree on one definition; re-exported here for convenience.

pub use shared::models::*;
