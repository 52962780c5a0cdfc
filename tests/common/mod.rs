//! Common test utilities for total-indicator.
//!
//! This module provides shared fixtures and assertions for the pipeline tests.

pub mod assertions;
pub mod test_data;
