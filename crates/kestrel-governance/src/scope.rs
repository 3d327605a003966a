//! Effective-access computation.
//!
//! [`AccessScopeResolver`] answers "which resources may this user act on"
//! from role tier, explicit assignments, and assignment status/expiry. The
//! precedence order is fixed: an explicit deny (suspended assignment) wins
//! over everything, then explicit grants (active assignments and
//! resource-scoped role overrides), then the role-tier default. Resource
//! status always wins: an inactive resource is invisible regardless of
//! assignments.
//!
//! Both entry points are idempotent and side-effect-free; callers may
//! invoke them speculatively.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kestrel_core::{ResourceId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{AssignmentId, AssignmentStatus, ResourceStatus, Role, User};

// ============================================================================
// Domain Types
// ============================================================================

/// A record establishing that a user may act on a given resource.
///
/// At most one *active* assignment exists per (user, resource) pair at a
/// time; the storage collaborator owns that uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAssignment {
    /// Unique identifier.
    pub id: AssignmentId,
    /// The assigned user.
    pub user_id: UserId,
    /// The resource.
    pub resource_id: ResourceId,
    /// Assignment status.
    pub status: AssignmentStatus,
    /// Who created the assignment.
    pub assigned_by: UserId,
    /// When the assignment lapses, if time-bounded.
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When created.
    pub created_at: DateTime<Utc>,
}

impl ResourceAssignment {
    /// True iff the assignment grants access at `now`.
    #[must_use]
    pub fn grants_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AssignmentStatus::Active && self.expires_at.is_none_or(|e| e > now)
    }
}

/// A managed resource as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Unique identifier.
    pub id: ResourceId,
    /// Display name.
    pub name: String,
    /// Resource status.
    pub status: ResourceStatus,
}

// ============================================================================
// Store Traits
// ============================================================================

/// Read access to resource assignments.
///
/// The engine consumes assignments; their maintenance belongs to the
/// user-management collaborator.
#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    /// All assignments for a user, regardless of status.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ResourceAssignment>>;
}

/// Read access to managed resources.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up one resource.
    async fn get(&self, id: ResourceId) -> Result<Option<ResourceRecord>>;

    /// Every resource with active status.
    async fn list_active(&self) -> Result<Vec<ResourceRecord>>;
}

// ============================================================================
// In-Memory Stores (for testing)
// ============================================================================

/// In-memory assignment store for testing.
#[derive(Debug, Default)]
pub struct InMemoryAssignmentStore {
    assignments: Arc<RwLock<HashMap<AssignmentId, ResourceAssignment>>>,
}

impl InMemoryAssignmentStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            assignments: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert an assignment.
    pub async fn insert(&self, assignment: ResourceAssignment) {
        let mut assignments = self.assignments.write().await;
        assignments.insert(assignment.id, assignment);
    }

    /// Change an assignment's status.
    pub async fn set_status(&self, id: AssignmentId, status: AssignmentStatus) {
        let mut assignments = self.assignments.write().await;
        if let Some(assignment) = assignments.get_mut(&id) {
            assignment.status = status;
        }
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.assignments.write().await.clear();
    }
}

#[async_trait::async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ResourceAssignment>> {
        let assignments = self.assignments.read().await;
        Ok(assignments
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// In-memory resource store for testing.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: Arc<RwLock<HashMap<ResourceId, ResourceRecord>>>,
}

impl InMemoryResourceStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a resource.
    pub async fn insert(&self, resource: ResourceRecord) {
        let mut resources = self.resources.write().await;
        resources.insert(resource.id, resource);
    }

    /// Change a resource's status.
    pub async fn set_status(&self, id: ResourceId, status: ResourceStatus) {
        let mut resources = self.resources.write().await;
        if let Some(resource) = resources.get_mut(&id) {
            resource.status = status;
        }
    }
}

#[async_trait::async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get(&self, id: ResourceId) -> Result<Option<ResourceRecord>> {
        let resources = self.resources.read().await;
        Ok(resources.get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<ResourceRecord>> {
        let resources = self.resources.read().await;
        Ok(resources
            .values()
            .filter(|r| r.status == ResourceStatus::Active)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Which role tiers see every active resource without assignment lookup.
///
/// Explicit configuration, loaded once at startup; no role check is
/// hard-coded in the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Roles whose members see all active resources.
    pub unrestricted_roles: BTreeSet<Role>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            unrestricted_roles: BTreeSet::from([Role::Admin, Role::SuperAdmin]),
        }
    }
}

/// Computes the set of resources a user may act on.
pub struct AccessScopeResolver {
    assignments: Arc<dyn AssignmentStore>,
    resources: Arc<dyn ResourceStore>,
    config: ScopeConfig,
}

impl AccessScopeResolver {
    /// Create a resolver over the given stores and tier configuration.
    pub fn new(
        assignments: Arc<dyn AssignmentStore>,
        resources: Arc<dyn ResourceStore>,
        config: ScopeConfig,
    ) -> Self {
        Self {
            assignments,
            resources,
            config,
        }
    }

    /// The set of resource ids `user` may act on at `now`.
    pub async fn accessible_resources(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<ResourceId>> {
        if !user.active {
            return Ok(BTreeSet::new());
        }

        let assignments = self.assignments.list_for_user(user.id).await?;
        let denied: BTreeSet<ResourceId> = assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Suspended)
            .map(|a| a.resource_id)
            .collect();

        let mut candidates: BTreeSet<ResourceId> = BTreeSet::new();

        if self
            .config
            .unrestricted_roles
            .contains(&user.effective_role(now))
        {
            for resource in self.resources.list_active().await? {
                candidates.insert(resource.id);
            }
        } else {
            for assignment in assignments.iter().filter(|a| a.grants_at(now)) {
                candidates.insert(assignment.resource_id);
            }
            // Resource-scoped role overrides grant access to that one resource.
            for scoped in user
                .scoped_roles
                .iter()
                .filter(|s| s.in_effect(now))
                .filter_map(|s| s.resource_id)
            {
                candidates.insert(scoped);
            }
        }

        let mut accessible = BTreeSet::new();
        for id in candidates {
            if denied.contains(&id) {
                continue;
            }
            let active = self
                .resources
                .get(id)
                .await?
                .map(|r| r.status == ResourceStatus::Active)
                .unwrap_or(false);
            if active {
                accessible.insert(id);
            }
        }

        Ok(accessible)
    }

    /// True iff `resource_id` is in the user's accessible set at `now`.
    pub async fn can_access(
        &self,
        user: &User,
        resource_id: ResourceId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .accessible_resources(user, now)
            .await?
            .contains(&resource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScopedRoleAssignment;
    use chrono::Duration;

    fn assignment(
        user_id: UserId,
        resource_id: ResourceId,
        status: AssignmentStatus,
    ) -> ResourceAssignment {
        ResourceAssignment {
            id: AssignmentId::new(),
            user_id,
            resource_id,
            status,
            assigned_by: UserId::new(),
            expires_at: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn resource(status: ResourceStatus) -> ResourceRecord {
        ResourceRecord {
            id: ResourceId::new(),
            name: "Web Property".to_string(),
            status,
        }
    }

    async fn setup() -> (
        AccessScopeResolver,
        Arc<InMemoryAssignmentStore>,
        Arc<InMemoryResourceStore>,
    ) {
        let assignments = Arc::new(InMemoryAssignmentStore::new());
        let resources = Arc::new(InMemoryResourceStore::new());
        let resolver = AccessScopeResolver::new(
            assignments.clone(),
            resources.clone(),
            ScopeConfig::default(),
        );
        (resolver, assignments, resources)
    }

    #[tokio::test]
    async fn test_assigned_resource_is_accessible() {
        let (resolver, assignments, resources) = setup().await;
        let user = User::new(UserId::new(), Role::Requester);
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;
        assignments
            .insert(assignment(user.id, r.id, AssignmentStatus::Active))
            .await;

        assert!(resolver.can_access(&user, r.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unassigned_resource_is_not_accessible() {
        let (resolver, _, resources) = setup().await;
        let user = User::new(UserId::new(), Role::Requester);
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;

        assert!(!resolver.can_access(&user, r.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_assignment_does_not_grant() {
        let (resolver, assignments, resources) = setup().await;
        let user = User::new(UserId::new(), Role::Requester);
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;
        let mut a = assignment(user.id, r.id, AssignmentStatus::Active);
        a.expires_at = Some(Utc::now() - Duration::hours(1));
        assignments.insert(a).await;

        assert!(!resolver.can_access(&user, r.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactive_resource_excluded_despite_assignment() {
        let (resolver, assignments, resources) = setup().await;
        let user = User::new(UserId::new(), Role::Requester);
        let r = resource(ResourceStatus::Inactive);
        resources.insert(r.clone()).await;
        assignments
            .insert(assignment(user.id, r.id, AssignmentStatus::Active))
            .await;

        assert!(!resolver.can_access(&user, r.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrestricted_tier_sees_all_active_resources() {
        let (resolver, _, resources) = setup().await;
        let admin = User::new(UserId::new(), Role::Admin);
        let r1 = resource(ResourceStatus::Active);
        let r2 = resource(ResourceStatus::Active);
        let r3 = resource(ResourceStatus::Inactive);
        resources.insert(r1.clone()).await;
        resources.insert(r2.clone()).await;
        resources.insert(r3.clone()).await;

        let scope = resolver
            .accessible_resources(&admin, Utc::now())
            .await
            .unwrap();
        assert_eq!(scope, BTreeSet::from([r1.id, r2.id]));
    }

    #[tokio::test]
    async fn test_suspended_assignment_denies_even_for_admin() {
        let (resolver, assignments, resources) = setup().await;
        let admin = User::new(UserId::new(), Role::Admin);
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;
        assignments
            .insert(assignment(admin.id, r.id, AssignmentStatus::Suspended))
            .await;

        assert!(!resolver.can_access(&admin, r.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactive_user_has_empty_scope() {
        let (resolver, assignments, resources) = setup().await;
        let mut user = User::new(UserId::new(), Role::Requester);
        user.active = false;
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;
        assignments
            .insert(assignment(user.id, r.id, AssignmentStatus::Active))
            .await;

        let scope = resolver
            .accessible_resources(&user, Utc::now())
            .await
            .unwrap();
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn test_resource_scoped_role_grants_that_resource_only() {
        let (resolver, _, resources) = setup().await;
        let r1 = resource(ResourceStatus::Active);
        let r2 = resource(ResourceStatus::Active);
        resources.insert(r1.clone()).await;
        resources.insert(r2.clone()).await;

        let mut user = User::new(UserId::new(), Role::Requester);
        user.scoped_roles.push(ScopedRoleAssignment {
            role: Role::Manager,
            resource_id: Some(r1.id),
            expires_at: None,
        });

        let now = Utc::now();
        assert!(resolver.can_access(&user, r1.id, now).await.unwrap());
        assert!(!resolver.can_access(&user, r2.id, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_unscoped_elevated_role_unlocks_unrestricted_tier() {
        let (resolver, _, resources) = setup().await;
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;

        let mut user = User::new(UserId::new(), Role::Requester);
        user.scoped_roles.push(ScopedRoleAssignment {
            role: Role::Admin,
            resource_id: None,
            expires_at: Some(Utc::now() + Duration::days(1)),
        });

        assert!(resolver.can_access(&user, r.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let (resolver, assignments, resources) = setup().await;
        let user = User::new(UserId::new(), Role::Requester);
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;
        assignments
            .insert(assignment(user.id, r.id, AssignmentStatus::Active))
            .await;

        let now = Utc::now();
        let first = resolver.accessible_resources(&user, now).await.unwrap();
        let second = resolver.accessible_resources(&user, now).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_alternate_config_restricts_admin() {
        let assignments = Arc::new(InMemoryAssignmentStore::new());
        let resources = Arc::new(InMemoryResourceStore::new());
        let resolver = AccessScopeResolver::new(
            assignments.clone(),
            resources.clone(),
            ScopeConfig {
                unrestricted_roles: BTreeSet::from([Role::SuperAdmin]),
            },
        );

        let admin = User::new(UserId::new(), Role::Admin);
        let r = resource(ResourceStatus::Active);
        resources.insert(r.clone()).await;

        assert!(!resolver.can_access(&admin, r.id, Utc::now()).await.unwrap());
    }
}
