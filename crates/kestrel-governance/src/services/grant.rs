//! Grant lifecycle management.
//!
//! Owns the post-approval grant: activation, expiry arithmetic, extension
//! (single and bulk), revocation, and expiry detection. Expiry *detection*
//! ([`GrantLifecycleService::sweep_expirations`]) is a pure scan separated
//! from the scheduling mechanism; the caller decides the cadence and drives
//! [`GrantLifecycleService::mark_expired`] per grant.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kestrel_core::{ResourceId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::audit::{AuditAction, AuditEventInput, AuditStore};
use crate::error::{GovernanceError, Result};
use crate::events::{EventSink, LifecycleEvent};
use crate::services::request::{ListOptions, PermissionRequest};
use crate::types::{Actor, ExpiryUrgency, GrantId, GrantStatus, PermissionLevel, RequestId};

/// Days-until-expiry threshold for critical urgency.
const URGENCY_CRITICAL_DAYS: i64 = 1;

/// Days-until-expiry threshold for high urgency.
const URGENCY_HIGH_DAYS: i64 = 3;

/// Days-until-expiry threshold for medium urgency.
const URGENCY_MEDIUM_DAYS: i64 = 7;

// ============================================================================
// Domain Types
// ============================================================================

/// An active, time-bounded permission record resulting from an approved
/// request (or created directly by an administrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Unique identifier.
    pub id: GrantId,
    /// The originating request, when not created directly.
    pub request_id: Option<RequestId>,
    /// The user the grant belongs to.
    pub user_id: UserId,
    /// The resource access is granted on.
    pub resource_id: ResourceId,
    /// The external principal (e.g. email) receiving access.
    pub target_principal: String,
    /// The granted level.
    pub level: PermissionLevel,
    /// Current status.
    pub status: GrantStatus,
    /// When the grant became active.
    pub granted_at: DateTime<Utc>,
    /// When the grant lapses.
    pub expires_at: DateTime<Utc>,
    /// The expiry set at activation, before any extension.
    pub original_expires_at: DateTime<Utc>,
    /// How many times the grant has been extended.
    pub extension_count: u32,
    /// When revoked, if revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Who revoked, if revoked.
    pub revoked_by: Option<UserId>,
    /// Why revoked, if revoked. Surfaced to the affected requester.
    pub revocation_reason: Option<String>,
}

/// Input for creating a grant directly, outside the request flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGrantInput {
    /// The user the grant belongs to.
    pub user_id: UserId,
    /// The resource access is granted on.
    pub resource_id: ResourceId,
    /// The external principal receiving access.
    pub target_principal: String,
    /// The granted level.
    pub level: PermissionLevel,
    /// Grant duration in days.
    pub duration_days: i64,
}

/// Filter options for listing grants.
#[derive(Debug, Clone, Default)]
pub struct GrantFilter {
    /// Filter by owning user.
    pub user_id: Option<UserId>,
    /// Filter by resource.
    pub resource_id: Option<ResourceId>,
    /// Filter by status.
    pub status: Option<GrantStatus>,
}

/// Per-item outcome of a bulk extension.
#[derive(Debug, Default)]
pub struct BulkExtendOutcome {
    /// Grants extended, in input order.
    pub extended: Vec<PermissionGrant>,
    /// Grants that could not be extended, with the per-item error,
    /// in input order.
    pub failed: Vec<(GrantId, GovernanceError)>,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Trait for grant storage backends.
///
/// Mutating operations are semantic and atomic: the backend checks the
/// lifecycle guard and applies the change in one step, so concurrent calls
/// resolve to exactly one winner.
#[async_trait::async_trait]
pub trait GrantStore: Send + Sync {
    /// Insert a new grant.
    ///
    /// Fails with [`GovernanceError::DuplicateRequest`] when an active
    /// grant already exists for the same (user, resource, principal) tuple.
    async fn insert(&self, grant: PermissionGrant) -> Result<PermissionGrant>;

    /// Look up one grant.
    async fn get(&self, id: GrantId) -> Result<Option<PermissionGrant>>;

    /// Find the active grant for a (user, resource, principal) tuple.
    async fn find_active_for(
        &self,
        user_id: UserId,
        resource_id: ResourceId,
        target_principal: &str,
    ) -> Result<Option<PermissionGrant>>;

    /// Push the expiry out by `additional` and bump the extension count.
    ///
    /// Fails with [`GovernanceError::GrantNotActive`] unless the grant is
    /// active.
    async fn extend(&self, id: GrantId, additional: Duration) -> Result<PermissionGrant>;

    /// Transition an active grant to revoked, recording actor and reason.
    async fn revoke(
        &self,
        id: GrantId,
        revoked_by: UserId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<PermissionGrant>;

    /// Transition an active, lapsed grant to expired.
    ///
    /// No-op on an already-expired grant; fails with
    /// [`GovernanceError::GrantNotActive`] on a revoked one and
    /// [`GovernanceError::GrantNotExpiredYet`] before the expiry time.
    async fn mark_expired(&self, id: GrantId, now: DateTime<Utc>) -> Result<PermissionGrant>;

    /// Every grant with active status.
    async fn list_active(&self) -> Result<Vec<PermissionGrant>>;

    /// List grants with filtering and pagination.
    async fn list(&self, filter: &GrantFilter, options: &ListOptions)
        -> Result<Vec<PermissionGrant>>;
}

// ============================================================================
// In-Memory Store (for testing)
// ============================================================================

/// In-memory grant store for testing.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: Arc<RwLock<HashMap<GrantId, PermissionGrant>>>,
}

impl InMemoryGrantStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grants: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.grants.write().await.clear();
    }
}

#[async_trait::async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn insert(&self, grant: PermissionGrant) -> Result<PermissionGrant> {
        let mut grants = self.grants.write().await;
        let duplicate = grants.values().any(|g| {
            g.status.is_active()
                && g.user_id == grant.user_id
                && g.resource_id == grant.resource_id
                && g.target_principal == grant.target_principal
        });
        if duplicate {
            return Err(GovernanceError::DuplicateRequest);
        }
        grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn get(&self, id: GrantId) -> Result<Option<PermissionGrant>> {
        let grants = self.grants.read().await;
        Ok(grants.get(&id).cloned())
    }

    async fn find_active_for(
        &self,
        user_id: UserId,
        resource_id: ResourceId,
        target_principal: &str,
    ) -> Result<Option<PermissionGrant>> {
        let grants = self.grants.read().await;
        Ok(grants
            .values()
            .find(|g| {
                g.status.is_active()
                    && g.user_id == user_id
                    && g.resource_id == resource_id
                    && g.target_principal == target_principal
            })
            .cloned())
    }

    async fn extend(&self, id: GrantId, additional: Duration) -> Result<PermissionGrant> {
        let mut grants = self.grants.write().await;
        let grant = grants
            .get_mut(&id)
            .ok_or(GovernanceError::GrantNotFound(id))?;
        if !grant.status.is_active() {
            return Err(GovernanceError::GrantNotActive {
                id,
                status: grant.status,
            });
        }
        grant.expires_at += additional;
        grant.extension_count += 1;
        Ok(grant.clone())
    }

    async fn revoke(
        &self,
        id: GrantId,
        revoked_by: UserId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<PermissionGrant> {
        let mut grants = self.grants.write().await;
        let grant = grants
            .get_mut(&id)
            .ok_or(GovernanceError::GrantNotFound(id))?;
        if !grant.status.is_active() {
            return Err(GovernanceError::GrantNotActive {
                id,
                status: grant.status,
            });
        }
        grant.status = GrantStatus::Revoked;
        grant.revoked_at = Some(at);
        grant.revoked_by = Some(revoked_by);
        grant.revocation_reason = Some(reason.to_string());
        Ok(grant.clone())
    }

    async fn mark_expired(&self, id: GrantId, now: DateTime<Utc>) -> Result<PermissionGrant> {
        let mut grants = self.grants.write().await;
        let grant = grants
            .get_mut(&id)
            .ok_or(GovernanceError::GrantNotFound(id))?;
        match grant.status {
            GrantStatus::Expired => Ok(grant.clone()),
            GrantStatus::Revoked => Err(GovernanceError::GrantNotActive {
                id,
                status: grant.status,
            }),
            GrantStatus::Active => {
                if grant.expires_at > now {
                    return Err(GovernanceError::GrantNotExpiredYet(id));
                }
                grant.status = GrantStatus::Expired;
                Ok(grant.clone())
            }
        }
    }

    async fn list_active(&self) -> Result<Vec<PermissionGrant>> {
        let grants = self.grants.read().await;
        Ok(grants
            .values()
            .filter(|g| g.status.is_active())
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        filter: &GrantFilter,
        options: &ListOptions,
    ) -> Result<Vec<PermissionGrant>> {
        let grants = self.grants.read().await;
        let mut results: Vec<_> = grants
            .values()
            .filter(|g| filter.user_id.is_none_or(|id| g.user_id == id))
            .filter(|g| filter.resource_id.is_none_or(|id| g.resource_id == id))
            .filter(|g| filter.status.is_none_or(|s| g.status == s))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));

        Ok(results
            .into_iter()
            .skip(options.offset as usize)
            .take(options.limit as usize)
            .collect())
    }
}

// ============================================================================
// Service
// ============================================================================

/// Service managing the post-approval grant lifecycle.
pub struct GrantLifecycleService {
    store: Arc<dyn GrantStore>,
    audit: Arc<dyn AuditStore>,
    events: Arc<dyn EventSink>,
}

impl GrantLifecycleService {
    /// Create a new grant lifecycle service.
    pub fn new(
        store: Arc<dyn GrantStore>,
        audit: Arc<dyn AuditStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            audit,
            events,
        }
    }

    /// Activate a grant for an approved request.
    pub async fn activate(
        &self,
        request: &PermissionRequest,
        actor_id: UserId,
    ) -> Result<PermissionGrant> {
        let now = Utc::now();
        let expires_at = now + Duration::days(request.requested_duration_days);
        let grant = PermissionGrant {
            id: GrantId::new(),
            request_id: Some(request.id),
            user_id: request.requester_id,
            resource_id: request.resource_id,
            target_principal: request.target_principal.clone(),
            level: request.level,
            status: GrantStatus::Active,
            granted_at: now,
            expires_at,
            original_expires_at: expires_at,
            extension_count: 0,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
        };

        let grant = self.store.insert(grant).await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(grant.resource_id),
                request_id: grant.request_id,
                grant_id: Some(grant.id),
                after_state: serde_json::to_value(&grant).ok(),
                ..AuditEventInput::new(actor_id, AuditAction::GrantActivated)
            })
            .await?;

        tracing::info!(grant_id = %grant.id, resource_id = %grant.resource_id, "grant activated");
        Ok(grant)
    }

    /// Create a grant directly, outside the request flow.
    pub async fn create_direct(
        &self,
        input: CreateGrantInput,
        actor: &Actor,
    ) -> Result<PermissionGrant> {
        if input.duration_days <= 0 {
            return Err(GovernanceError::InvalidDuration(input.duration_days));
        }

        let now = Utc::now();
        let expires_at = now + Duration::days(input.duration_days);
        let grant = PermissionGrant {
            id: GrantId::new(),
            request_id: None,
            user_id: input.user_id,
            resource_id: input.resource_id,
            target_principal: input.target_principal,
            level: input.level,
            status: GrantStatus::Active,
            granted_at: now,
            expires_at,
            original_expires_at: expires_at,
            extension_count: 0,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
        };

        let grant = self.store.insert(grant).await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(grant.resource_id),
                grant_id: Some(grant.id),
                after_state: serde_json::to_value(&grant).ok(),
                ..AuditEventInput::new(actor.user_id, AuditAction::GrantActivated)
            })
            .await?;

        tracing::info!(grant_id = %grant.id, "grant created directly");
        Ok(grant)
    }

    /// Look up one grant.
    pub async fn get(&self, id: GrantId) -> Result<Option<PermissionGrant>> {
        self.store.get(id).await
    }

    /// Find the active grant for a (user, resource, principal) tuple.
    pub async fn find_active_for(
        &self,
        user_id: UserId,
        resource_id: ResourceId,
        target_principal: &str,
    ) -> Result<Option<PermissionGrant>> {
        self.store
            .find_active_for(user_id, resource_id, target_principal)
            .await
    }

    /// List grants with filtering and pagination.
    pub async fn list(
        &self,
        filter: &GrantFilter,
        options: &ListOptions,
    ) -> Result<Vec<PermissionGrant>> {
        self.store.list(filter, options).await
    }

    /// Extend an active grant by `additional_days`.
    ///
    /// Pure additive extension: the expiry only ever moves out.
    pub async fn extend(
        &self,
        grant_id: GrantId,
        additional_days: i64,
        actor: &Actor,
        reason: &str,
    ) -> Result<PermissionGrant> {
        if additional_days <= 0 {
            tracing::warn!(%grant_id, additional_days, "extension refused: non-positive duration");
            return Err(GovernanceError::InvalidDuration(additional_days));
        }

        let before = self
            .store
            .get(grant_id)
            .await?
            .ok_or(GovernanceError::GrantNotFound(grant_id))?;

        let updated = self
            .store
            .extend(grant_id, Duration::days(additional_days))
            .await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(updated.resource_id),
                grant_id: Some(grant_id),
                before_state: serde_json::to_value(&before).ok(),
                after_state: serde_json::to_value(&updated).ok(),
                metadata: Some(serde_json::json!({
                    "additional_days": additional_days,
                    "reason": reason,
                })),
                ..AuditEventInput::new(actor.user_id, AuditAction::GrantExtended)
            })
            .await?;

        tracing::info!(
            %grant_id,
            additional_days,
            expires_at = %updated.expires_at,
            "grant extended"
        );
        Ok(updated)
    }

    /// Extend each grant independently; a failing item never aborts the
    /// batch. Partial success is the expected outcome.
    pub async fn bulk_extend(
        &self,
        grant_ids: &[GrantId],
        additional_days: i64,
        actor: &Actor,
        reason: &str,
    ) -> BulkExtendOutcome {
        let mut outcome = BulkExtendOutcome::default();
        for &grant_id in grant_ids {
            match self.extend(grant_id, additional_days, actor, reason).await {
                Ok(grant) => outcome.extended.push(grant),
                Err(err) => {
                    tracing::warn!(%grant_id, %err, "bulk extension item failed");
                    outcome.failed.push((grant_id, err));
                }
            }
        }
        outcome
    }

    /// Revoke an active grant. The reason is required and surfaced to the
    /// affected requester.
    pub async fn revoke(
        &self,
        grant_id: GrantId,
        actor: &Actor,
        reason: &str,
    ) -> Result<PermissionGrant> {
        if reason.trim().is_empty() {
            return Err(GovernanceError::MissingReason("revoke a grant"));
        }

        let before = self
            .store
            .get(grant_id)
            .await?
            .ok_or(GovernanceError::GrantNotFound(grant_id))?;

        let updated = self
            .store
            .revoke(grant_id, actor.user_id, reason, Utc::now())
            .await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(updated.resource_id),
                grant_id: Some(grant_id),
                before_state: serde_json::to_value(&before).ok(),
                after_state: serde_json::to_value(&updated).ok(),
                ..AuditEventInput::new(actor.user_id, AuditAction::GrantRevoked)
            })
            .await?;

        self.events
            .publish(LifecycleEvent::GrantRevoked {
                grant_id,
                revoked_by: actor.user_id,
                reason: reason.to_string(),
            })
            .await?;

        tracing::info!(%grant_id, revoked_by = %actor.user_id, "grant revoked");
        Ok(updated)
    }

    /// Every active grant whose expiry has passed at `now`.
    ///
    /// Pure detection: never mutates state, so it can run on any cadence
    /// without coordination. The caller drives [`Self::mark_expired`].
    pub async fn sweep_expirations(&self, now: DateTime<Utc>) -> Result<Vec<GrantId>> {
        let lapsed = self
            .store
            .list_active()
            .await?
            .into_iter()
            .filter(|g| g.expires_at <= now)
            .map(|g| g.id)
            .collect();
        Ok(lapsed)
    }

    /// Transition one lapsed grant to expired.
    ///
    /// Idempotent: a grant already expired is returned unchanged.
    pub async fn mark_expired(
        &self,
        grant_id: GrantId,
        now: DateTime<Utc>,
        actor_id: UserId,
    ) -> Result<PermissionGrant> {
        let before = self
            .store
            .get(grant_id)
            .await?
            .ok_or(GovernanceError::GrantNotFound(grant_id))?;

        let updated = self.store.mark_expired(grant_id, now).await?;

        if before.status.is_active() {
            self.audit
                .log_event(AuditEventInput {
                    resource_id: Some(updated.resource_id),
                    grant_id: Some(grant_id),
                    before_state: serde_json::to_value(&before).ok(),
                    after_state: serde_json::to_value(&updated).ok(),
                    ..AuditEventInput::new(actor_id, AuditAction::GrantExpired)
                })
                .await?;
            tracing::info!(%grant_id, "grant expired");
        }

        Ok(updated)
    }

    /// Urgency classification for a grant at `now`.
    ///
    /// Reporting only; nothing in the lifecycle branches on it.
    #[must_use]
    pub fn classify_urgency(grant: &PermissionGrant, now: DateTime<Utc>) -> ExpiryUrgency {
        if !grant.status.is_active() {
            return ExpiryUrgency::None;
        }
        let remaining = grant.expires_at - now;
        if remaining < Duration::days(URGENCY_CRITICAL_DAYS) {
            ExpiryUrgency::Critical
        } else if remaining < Duration::days(URGENCY_HIGH_DAYS) {
            ExpiryUrgency::High
        } else if remaining < Duration::days(URGENCY_MEDIUM_DAYS) {
            ExpiryUrgency::Medium
        } else {
            ExpiryUrgency::None
        }
    }

    /// Emit a `grant_expiring` event for every active grant approaching
    /// expiry. Read-only scan plus event emission; grant state is untouched.
    pub async fn notify_expiring(&self, now: DateTime<Utc>) -> Result<Vec<GrantId>> {
        let mut notified = Vec::new();
        for grant in self.store.list_active().await? {
            let urgency = Self::classify_urgency(&grant, now);
            if urgency == ExpiryUrgency::None {
                continue;
            }
            self.events
                .publish(LifecycleEvent::GrantExpiring {
                    grant_id: grant.id,
                    expires_at: grant.expires_at,
                    urgency,
                })
                .await?;
            notified.push(grant.id);
        }
        Ok(notified)
    }
}
