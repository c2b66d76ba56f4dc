//! Level 3: Feature Integration Tests
//!
//! These tests drive whole reconciliation phases against in-memory archives.

pub mod reconcile;
pub mod rename;
pub mod stored_representation;
