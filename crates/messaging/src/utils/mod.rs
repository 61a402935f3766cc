//! Internal utilities for the messaging core.

pub mod validation;

pub use validation::*;
