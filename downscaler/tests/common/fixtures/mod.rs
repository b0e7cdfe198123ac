//! This module provides reusable test utilities:
//! - Policy document builders
//! - Pre-populated in-memory clusters
//! - Fixed instants and polling helpers

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod test_cluster;
pub mod test_data;
pub mod test_policy;

// Re-export commonly used items
pub use test_cluster::*;
pub use test_data::*;
pub use test_policy::PolicyBuilder;
