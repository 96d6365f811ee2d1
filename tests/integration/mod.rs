//! Integration tests for EquipTrack
//!
//! These tests verify the behavior of the API endpoints with a real
//! (temporary file) database, the mock identity provider and all extractors.

mod api_tests;
mod lazy_sync_tests;
mod security_tests;
