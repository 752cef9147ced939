//! Execution engine for shorewall
//!
//! The engine orchestrates:
//! 1. Diffing - Compute current vs desired state and show it
//! 2. Confirming - Ask before real changes unless `--yes`
//! 3. Executing - Apply resources in order, reporting progress

pub mod differ;
pub mod executor;

pub use executor::{ExecuteOptions, execute};
