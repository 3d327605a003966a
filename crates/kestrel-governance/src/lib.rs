//! Permission lifecycle and RBAC engine.
//!
//! This crate provides the core domain logic for granting, tracking, and
//! revoking third-party access to managed resources: the rules deciding
//! whether a requested grant is auto-approved, who must approve it
//! otherwise, how a user's effective set of accessible resources is
//! computed, and how grants move through their lifecycle with extension
//! and bulk-operation support.
//!
//! # Features
//!
//! - Strict role hierarchy with rank comparison and containment
//! - Data-driven auto-approval rule table, validated total at startup
//! - Effective-access resolution from role tier, assignments, and
//!   time-bounded overrides
//! - Permission request state machine (pending → approved / rejected /
//!   cancelled) with atomic single-winner decisions
//! - Grant lifecycle: activation, extension (single and bulk), revocation,
//!   and pure expiry detection separated from scheduling
//! - Role-change validation against escalation and self-demotion
//! - Audit logging and lifecycle event hooks for all state changes
//!
//! # Services
//!
//! The [`services`] module provides business logic for:
//! - [`services::PermissionRequestService`] - Request lifecycle operations
//! - [`services::GrantLifecycleService`] - Post-approval grant management
//! - [`services::RoleAssignmentValidator`] - Role-change guards
//!
//! # Scope resolution
//!
//! The [`scope`] module computes the resources a user may act on; both
//! entry points are idempotent and side-effect-free.
//!
//! # Audit
//!
//! The [`audit`] module provides audit logging:
//! - [`audit::AuditStore`] trait for pluggable storage backends
//! - [`audit::InMemoryAuditStore`] for testing
//! - [`audit::AuditEvent`] for tracking changes
//!
//! The engine holds no mutable shared state between calls; every public
//! operation is a single logical transaction against the storage
//! collaborator, so concurrent invocation is safe wherever the backend
//! provides the atomic insert and compare-and-set operations the store
//! traits document.

pub mod audit;
pub mod error;
pub mod events;
pub mod rules;
pub mod scope;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use error::{GovernanceError, Result};
pub use types::{
    Actor,
    AssignmentId,
    AssignmentStatus,
    ExpiryUrgency,
    GrantId,
    GrantStatus,
    PermissionLevel,
    RequestId,
    RequestStatus,
    ResourceStatus,
    Role,
    ScopedRoleAssignment,
    User,
};

// Re-export rule engine types
pub use rules::{ApprovalDecision, ApprovalRule, ApprovalRuleTable, AutoApprovalEngine};

// Re-export scope types
pub use scope::{
    AccessScopeResolver, AssignmentStore, InMemoryAssignmentStore, InMemoryResourceStore,
    ResourceAssignment, ResourceRecord, ResourceStore, ScopeConfig,
};

// Re-export service types
pub use services::{
    BulkExtendOutcome,
    CreateGrantInput,
    CreateRequestInput,
    GrantFilter,
    GrantLifecycleService,
    GrantStore,
    InMemoryGrantStore,
    InMemoryRequestStore,
    ListOptions,
    PermissionGrant,
    PermissionRequest,
    PermissionRequestService,
    RequestFilter,
    RequestStore,
    RoleAssignmentValidator,
};

// Re-export audit types
pub use audit::{AuditAction, AuditEvent, AuditEventFilter, AuditStore, InMemoryAuditStore};

// Re-export event types
pub use events::{EventSink, InMemoryEventSink, LifecycleEvent};
