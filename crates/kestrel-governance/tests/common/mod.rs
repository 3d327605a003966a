//! Shared test context for integration tests.
//!
//! Wires the full engine over in-memory stores with the default rule table
//! and scope configuration.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use kestrel_core::{ResourceId, UserId};
use kestrel_governance::audit::InMemoryAuditStore;
use kestrel_governance::events::InMemoryEventSink;
use kestrel_governance::scope::{
    AccessScopeResolver, InMemoryAssignmentStore, InMemoryResourceStore, ResourceAssignment,
    ResourceRecord, ScopeConfig,
};
use kestrel_governance::services::grant::{GrantLifecycleService, InMemoryGrantStore};
use kestrel_governance::services::request::{
    CreateRequestInput, InMemoryRequestStore, PermissionRequestService,
};
use kestrel_governance::types::{
    AssignmentId, AssignmentStatus, PermissionLevel, ResourceStatus, Role, User,
};
use kestrel_governance::{ApprovalRuleTable, AutoApprovalEngine};

/// Fully wired engine over in-memory stores.
pub struct TestContext {
    pub request_store: Arc<InMemoryRequestStore>,
    pub grant_store: Arc<InMemoryGrantStore>,
    pub assignment_store: Arc<InMemoryAssignmentStore>,
    pub resource_store: Arc<InMemoryResourceStore>,
    pub audit: Arc<InMemoryAuditStore>,
    pub events: Arc<InMemoryEventSink>,
    pub grants: Arc<GrantLifecycleService>,
    pub requests: PermissionRequestService,
}

impl TestContext {
    /// Build a context with the default rule table and scope config.
    pub fn new() -> Self {
        let request_store = Arc::new(InMemoryRequestStore::new());
        let grant_store = Arc::new(InMemoryGrantStore::new());
        let assignment_store = Arc::new(InMemoryAssignmentStore::new());
        let resource_store = Arc::new(InMemoryResourceStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let events = Arc::new(InMemoryEventSink::new());

        let grants = Arc::new(GrantLifecycleService::new(
            grant_store.clone(),
            audit.clone(),
            events.clone(),
        ));
        let scope = Arc::new(AccessScopeResolver::new(
            assignment_store.clone(),
            resource_store.clone(),
            ScopeConfig::default(),
        ));
        let requests = PermissionRequestService::new(
            request_store.clone(),
            grants.clone(),
            scope,
            AutoApprovalEngine::new(ApprovalRuleTable::default()),
            audit.clone(),
            events.clone(),
        );

        Self {
            request_store,
            grant_store,
            assignment_store,
            resource_store,
            audit,
            events,
            grants,
            requests,
        }
    }

    /// Register an active resource and return its id.
    pub async fn add_resource(&self, name: &str) -> ResourceId {
        let resource = ResourceRecord {
            id: ResourceId::new(),
            name: name.to_string(),
            status: ResourceStatus::Active,
        };
        let id = resource.id;
        self.resource_store.insert(resource).await;
        id
    }

    /// Create a user with the given role and an active assignment on the
    /// resource.
    pub async fn user_with_access(&self, role: Role, resource_id: ResourceId) -> User {
        let user = User::new(UserId::new(), role);
        self.assignment_store
            .insert(ResourceAssignment {
                id: AssignmentId::new(),
                user_id: user.id,
                resource_id,
                status: AssignmentStatus::Active,
                assigned_by: UserId::new(),
                expires_at: None,
                notes: None,
                created_at: Utc::now(),
            })
            .await;
        user
    }

    /// A valid request input for the resource and level.
    pub fn request_input(resource_id: ResourceId, level: PermissionLevel) -> CreateRequestInput {
        CreateRequestInput {
            resource_id,
            target_principal: "analyst@example.com".to_string(),
            level,
            justification: "Quarterly reporting needs read access to this property".to_string(),
            duration_days: 30,
        }
    }
}
