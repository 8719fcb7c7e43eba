//! Mergeable, in-process execution tracing.
//!
//! Callers record key/value observations against named stages of a pipeline.
//! Stages keep the order in which they were first touched; records keep call
//! order within a stage. A trace can be encoded to bytes, shipped elsewhere by
//! the caller, extended there, and merged back into the original.
//!
//! - **Types**: `Stage` and `Record`, plus the JSON wire codec
//! - **Tracer**: Thread-safe recording, serialization and merging
//! - **Scope**: Task-local tracer via `with_tracer()` and helper functions
//! - **Writer**: JSONL file persistence with daily rotation
//!
//! # Usage
//!
//! ```rust
//! use stagetrace::Tracer;
//!
//! let upstream = Tracer::new();
//! upstream.record_value("auth", "user", "alice");
//! upstream.record_value("fetch", "rows", 3);
//!
//! // Bytes travel to another service, which appends its own stages.
//! let downstream = Tracer::deserialize(&upstream.serialize().unwrap()).unwrap();
//! downstream.record_value("render", "template", "list.html");
//!
//! let returned = downstream.serialize().unwrap();
//! upstream.merge_bytes(&returned).unwrap();
//! assert_eq!(upstream.stage_names(), vec!["auth", "fetch", "render"]);
//! ```
//!
//! # Merge Ordering
//!
//! Merging keeps the receiver's stage order. Incoming stages that already
//! exist append to their existing position; new stages are appended in the
//! order the merge first meets them.

pub mod error;
pub mod scope;
pub mod tracer;
pub mod types;
pub mod writer;

// Re-export main types
pub use error::{Result, TraceError};
pub use scope::{
    current_snapshot, current_tracer, is_tracing_active, record_info, record_value,
    with_shared_tracer, with_tracer,
};
pub use tracer::Tracer;
pub use types::{Record, Stage, record};
pub use writer::{TraceWriter, WriterConfig};
