//! Unit tests for instance provisioning orchestration.

mod property_tests;
mod rollback_tests;
mod service_tests;
mod support;
