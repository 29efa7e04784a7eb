//! External collaborator interfaces and in-memory reference implementations
//!
//! The pipeline core consumes a record store, two work queues, an object
//! store and an audit log as injected services. Each seam is a trait; the
//! in-memory implementations back tests and single-process deployments.

pub mod audit;
pub mod object;
pub mod queue;
pub mod record;

pub use audit::{AuditEvent, AuditEventType, AuditLog, MemoryAuditLog};
pub use object::{MemoryObjectStore, ObjectStore};
pub use queue::{MemoryQueue, WorkQueue};
pub use record::{MemoryRecordStore, RecordStore};
