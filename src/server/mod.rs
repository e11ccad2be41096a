//! Server module for building HTTP servers with auto-registered routes
//!
//! This module provides a `ServerBuilder` that automatically registers:
//! - CRUD routes for every resource spec, including nested and
//!   tenant-prefixed paths
//! - Form routes (`/new`, `/{id}/edit`) and custom operation routes
//! - Health check routes

pub mod builder;
pub mod endpoint;
pub mod extract;
pub mod registry;
pub mod render;
pub mod route;

pub use builder::ServerBuilder;
pub use endpoint::{ListOutcome, MutationOutcome, RequestScope, ResourceEndpoint};
pub use extract::Submission;
pub use registry::{RegistryBuilder, ResourceRegistry};
pub use render::{negotiate, RenderMode, ResponseRenderer, TeraRenderer, ViewRenderer};
pub use route::{ResourceSpec, RouteDescriptor};
