//! Core registry functionality for a network service manager
//!
//! This library provides:
//! - The local endpoint model
//! - Workspace bookkeeping for connected endpoint processes
//! - The registry server passing registrations through to an upstream registry

pub mod error;
pub mod model;
pub mod registry_server;
pub mod upstream;
pub mod workspace;

pub use error::{CoreError, Result};
pub use model::{InMemoryModel, Model};
pub use registry_server::RegistryServer;
pub use upstream::{NoUpstream, UpstreamRegistryClient, UpstreamResolver};
pub use workspace::{InMemoryWorkspaceRegistry, Workspace, WorkspaceRegistry};
