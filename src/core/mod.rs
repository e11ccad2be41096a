//! Core module containing the dispatch and authorization engine's types

pub mod audit;
pub mod binding;
pub mod context;
pub mod error;
pub mod operation;
pub mod pluralize;
pub mod policy;
pub mod query;
pub mod resource;
pub mod schema;

pub use audit::{AuditBus, AuditEntry, AuditSink, MemorySink};
pub use binding::{BindMode, EntityBinding, FieldErrors};
pub use context::{Actor, RequestContext, context_from_headers};
pub use error::{EngineError, EngineResult, ErrorResponse};
pub use operation::{Operation, RouteKind, effective_method, operation_for};
pub use pluralize::Pluralizer;
pub use policy::{ResourcePolicy, Verdict};
pub use query::{ArgumentParser, PaginationMeta, QueryDescriptor, QueryOptions, UNBOUNDED};
pub use resource::Resource;
pub use schema::{FieldFormat, FieldSchema, FieldSpec, FieldType};
