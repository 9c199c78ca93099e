//! Domain models for the WHR Tracking Backend

pub mod whr;

pub use whr::*;
