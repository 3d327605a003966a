//! Service layer for access governance.
//!
//! This module provides the business logic services: the permission request
//! state machine, the grant lifecycle manager, and the role assignment
//! validator.

pub mod grant;
pub mod request;
pub mod role_assignment;

// Re-export commonly used types
pub use grant::{
    BulkExtendOutcome, CreateGrantInput, GrantFilter, GrantLifecycleService, GrantStore,
    InMemoryGrantStore, PermissionGrant,
};
pub use request::{
    CreateRequestInput, InMemoryRequestStore, ListOptions, PermissionRequest,
    PermissionRequestService, RequestDecision, RequestFilter, RequestStore,
};
pub use role_assignment::RoleAssignmentValidator;
