//! Berth: provisioning engine for isolated self-hosted Supabase instances.
//!
//! This crate allocates conflict-free ports and names for each instance on a
//! single host, mints the signed API tokens the stack requires, and keeps a
//! crash-consistent registry of instance metadata.
//!
//! # Architecture
//!
//! Berth follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (filesystem, `docker
//!   compose`, entropy)
//!
//! # Modules
//!
//! - [`instance`]: Instance records, allocation, credentials, and lifecycle

pub mod instance;
