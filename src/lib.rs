//! # Rudder
//!
//! A generic resource dispatch and authorization engine for building RESTful
//! APIs in Rust.
//!
//! ## Features
//!
//! - **Schema-Driven Resources**: Declare fields, variants and defaults once;
//!   binding, validation and rendering follow
//! - **Policy Verdicts**: Every operation is authorized through a
//!   [`core::policy::ResourcePolicy`], with field-level response restriction
//! - **Patch vs Replace**: Partial updates leave absent fields alone; full
//!   replacement resets them to schema defaults
//! - **Nested & Tenant Routes**: Children nest under their parent's item
//!   path, tenants prefix with `/t/{tenant}`
//! - **Query Allow-Lists**: Sorting and filtering only over declared fields,
//!   deterministic pagination
//! - **Dual Rendering**: Structured JSON or server-rendered views from the
//!   same handlers
//! - **Soft Delete Support**: Built-in soft deletion with deleted_at
//! - **Automatic Timestamps**: created_at and updated_at managed automatically
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rudder::prelude::*;
//!
//! let schema = FieldSchema::new()
//!     .field("title", FieldSpec::string().required().max_len(200))
//!     .field("body", FieldSpec::string());
//!
//! let spec = ResourceSpec::new("article", schema)
//!     .with_policy(ResourcePolicy::owner_edits())
//!     .with_query(QueryOptions::default().with_sortable(["title", "created_at"]));
//!
//! ServerBuilder::new()
//!     .with_store(MemoryStore::new())
//!     .register(spec)
//!     .serve("0.0.0.0:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        audit::{AuditBus, AuditEntry, AuditSink, MemorySink},
        binding::{BindMode, EntityBinding, FieldErrors},
        context::{Actor, RequestContext},
        error::{EngineError, EngineResult, ErrorResponse},
        operation::Operation,
        pluralize::Pluralizer,
        policy::{ResourcePolicy, Verdict},
        query::{PaginationMeta, QueryDescriptor, QueryOptions},
        resource::Resource,
        schema::{FieldFormat, FieldSchema, FieldSpec, FieldType},
    };

    // === Storage ===
    pub use crate::storage::{
        EntityStore, MemoryStore, QueryPage, StoreError, StoreQuery, VisibilityScope,
    };

    // === Config ===
    pub use crate::config::{FieldConfig, PolicySet, ResourceConfig, ResourcesConfig};

    // === Server ===
    pub use crate::server::{
        RequestScope, ResourceEndpoint, ResourceSpec, ResponseRenderer, RouteDescriptor,
        ServerBuilder, Submission, TeraRenderer, ViewRenderer,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;

    // === Axum ===
    pub use axum::{
        Router,
        extract::{Path, State},
        http::HeaderMap,
        routing::{delete, get, post, put},
    };
}
