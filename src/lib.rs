//! Partner onboarding: workflow engine, persistence and REST surface.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
