//! # Adjudication Core
//!
//! Concurrency core of the claims-adjudication admin platform: the two pieces
//! that have to stay correct while many requests run at once.
//!
//! ## Key Features
//!
//! - Role-based permission cache with a fixed TTL and explicit invalidation
//! - Fail-closed authorization when the role store is unreachable
//! - Unbounded multi-producer / single-consumer policy ingestion queue
//! - Background ingestion worker with strict FIFO and per-event failure isolation
//!
//! ## Architecture
//!
//! ```text
//!  request ──► PermissionCache ──miss──► RoleStore
//!                    ▲
//!                    └── invalidate ── RoleManager
//!
//!  upload ──► UploadService ──► IngestQueue ──► IngestWorker ──► IngestHandler
//!                  │                                                  │
//!                  └──────────────► PolicyStore ◄─────── status ──────┘
//! ```
//!
//! Both subsystems are single-process and in memory.

pub mod clock;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod policy;
pub mod rbac;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use errors::{CoreError, Result};
pub use ingest::{
    ingest_queue, ingest_queue_with_warning, shutdown_channel, HandlerScope, IngestConsumer, IngestHandler,
    IngestQueue, IngestWorker, PolicyIngestEvent, SharedScope, ShutdownSignal, ShutdownTrigger, WorkerState,
    WorkerStats,
};
pub use policy::{
    DocumentProcessor, InMemoryPolicyStore, PolicyId, PolicyRecord, PolicyStatus, PolicyStore,
    StatusTrackingHandler, UploadService,
};
pub use rbac::{
    CacheStats, FeaturePermissions, InMemoryRoleStore, PermissionCache, PermissionLevel, Role, RoleFile, RoleId,
    RoleManager, RoleStore, RoleWriter, YamlRoleStore,
};

/// Version of the core configuration format
pub const VERSION: &str = "0.4.2";
