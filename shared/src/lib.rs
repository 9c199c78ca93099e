//! Shared types and calculations for the WHR Tracking Backend
//!
//! This crate contains the warehouse receipt domain model, the CAMCA
//! volumetric calculations, and validation helpers shared between the
//! backend and its tests.

pub mod camca;
pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
