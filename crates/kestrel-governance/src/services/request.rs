//! Permission request state machine.
//!
//! A request is created `pending` and leaves that state exactly once, to
//! `approved`, `rejected`, or `cancelled`. Auto-approval is modeled as an
//! instantaneous pending→approved transition so history is uniform. The
//! store's `decide` operation is the only legal mutator out of `pending`
//! and is atomic: of two concurrent decisions, exactly one wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kestrel_core::{ResourceId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::audit::{AuditAction, AuditEventInput, AuditStore};
use crate::error::{GovernanceError, Result};
use crate::events::{EventSink, LifecycleEvent};
use crate::rules::AutoApprovalEngine;
use crate::scope::AccessScopeResolver;
use crate::services::grant::GrantLifecycleService;
use crate::types::{Actor, GrantId, PermissionLevel, RequestId, RequestStatus, Role, User};

/// Minimum justification length, in characters after trimming.
const MIN_JUSTIFICATION_LENGTH: usize = 20;

// ============================================================================
// Domain Types
// ============================================================================

/// A request for third-party access to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Unique identifier.
    pub id: RequestId,
    /// The user submitting the request.
    pub requester_id: UserId,
    /// The requester's effective role at submission time. Cancellation
    /// authority is checked against this snapshot.
    pub requester_role: Role,
    /// The target resource.
    pub resource_id: ResourceId,
    /// The external principal (e.g. email) access is requested for.
    pub target_principal: String,
    /// The requested level.
    pub level: PermissionLevel,
    /// Business justification.
    pub justification: String,
    /// Requested grant duration in days.
    pub requested_duration_days: i64,
    /// Current status.
    pub status: RequestStatus,
    /// Whether the rule table approved the request without review.
    pub auto_approved: bool,
    /// Minimum approver rank when review is required.
    pub required_approver_role: Option<Role>,
    /// Who processed the request, for manual decisions.
    pub processed_by: Option<UserId>,
    /// Decision notes; for auto-approvals, the rule that fired.
    pub processing_notes: Option<String>,
    /// The activated grant, once approved.
    pub grant_id: Option<GrantId>,
    /// When submitted.
    pub created_at: DateTime<Utc>,
    /// When last updated.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a permission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestInput {
    /// The target resource.
    pub resource_id: ResourceId,
    /// The external principal access is requested for.
    pub target_principal: String,
    /// The requested level.
    pub level: PermissionLevel,
    /// Business justification.
    pub justification: String,
    /// Requested grant duration in days.
    pub duration_days: i64,
}

/// Filter options for listing requests.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// Filter by requester.
    pub requester_id: Option<UserId>,
    /// Filter by resource.
    pub resource_id: Option<ResourceId>,
    /// Filter by status.
    pub status: Option<RequestStatus>,
    /// Filter by requested level.
    pub level: Option<PermissionLevel>,
}

/// Options for list operations.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Maximum number of results.
    pub limit: i64,
    /// Number of results to skip.
    pub offset: i64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// The fields a decision writes when a request leaves `pending`.
#[derive(Debug, Clone)]
pub struct RequestDecision {
    /// The terminal status.
    pub status: RequestStatus,
    /// Who decided, for manual decisions.
    pub processed_by: Option<UserId>,
    /// Decision notes or rejection reason.
    pub processing_notes: Option<String>,
    /// Whether the rule table decided without review.
    pub auto_approved: bool,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Trait for request storage backends.
#[async_trait::async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new pending request.
    ///
    /// The check-then-insert is atomic: fails with
    /// [`GovernanceError::DuplicateRequest`] when a pending request already
    /// exists for the same (requester, resource, principal) tuple.
    async fn insert(&self, request: PermissionRequest) -> Result<PermissionRequest>;

    /// Look up one request.
    async fn get(&self, id: RequestId) -> Result<Option<PermissionRequest>>;

    /// Move a pending request to a terminal status.
    ///
    /// Atomic compare-and-set: fails with
    /// [`GovernanceError::RequestNotPending`] unless the stored status is
    /// still `pending`, so of two concurrent decisions exactly one wins.
    async fn decide(&self, id: RequestId, decision: RequestDecision)
        -> Result<PermissionRequest>;

    /// Record the activated grant on an approved request.
    async fn attach_grant(&self, id: RequestId, grant_id: GrantId) -> Result<PermissionRequest>;

    /// Physically remove a request, permitted only while pending.
    async fn delete_pending(&self, id: RequestId) -> Result<()>;

    /// List requests with filtering and pagination.
    async fn list(
        &self,
        filter: &RequestFilter,
        options: &ListOptions,
    ) -> Result<Vec<PermissionRequest>>;
}

// ============================================================================
// In-Memory Store (for testing)
// ============================================================================

/// In-memory request store for testing.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: Arc<RwLock<HashMap<RequestId, PermissionRequest>>>,
}

impl InMemoryRequestStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.requests.write().await.clear();
    }
}

#[async_trait::async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: PermissionRequest) -> Result<PermissionRequest> {
        let mut requests = self.requests.write().await;
        let duplicate = requests.values().any(|r| {
            r.status.is_pending()
                && r.requester_id == request.requester_id
                && r.resource_id == request.resource_id
                && r.target_principal == request.target_principal
        });
        if duplicate {
            return Err(GovernanceError::DuplicateRequest);
        }
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get(&self, id: RequestId) -> Result<Option<PermissionRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn decide(
        &self,
        id: RequestId,
        decision: RequestDecision,
    ) -> Result<PermissionRequest> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&id)
            .ok_or(GovernanceError::RequestNotFound(id))?;
        if !request.status.is_pending() {
            return Err(GovernanceError::RequestNotPending(id));
        }
        request.status = decision.status;
        request.processed_by = decision.processed_by;
        request.processing_notes = decision.processing_notes;
        request.auto_approved = decision.auto_approved;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn attach_grant(&self, id: RequestId, grant_id: GrantId) -> Result<PermissionRequest> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&id)
            .ok_or(GovernanceError::RequestNotFound(id))?;
        request.grant_id = Some(grant_id);
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn delete_pending(&self, id: RequestId) -> Result<()> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get(&id)
            .ok_or(GovernanceError::RequestNotFound(id))?;
        if !request.status.is_pending() {
            return Err(GovernanceError::RequestNotPending(id));
        }
        requests.remove(&id);
        Ok(())
    }

    async fn list(
        &self,
        filter: &RequestFilter,
        options: &ListOptions,
    ) -> Result<Vec<PermissionRequest>> {
        let requests = self.requests.read().await;
        let mut results: Vec<_> = requests
            .values()
            .filter(|r| filter.requester_id.is_none_or(|id| r.requester_id == id))
            .filter(|r| filter.resource_id.is_none_or(|id| r.resource_id == id))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.level.is_none_or(|l| r.level == l))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));

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

/// Service owning the request lifecycle.
pub struct PermissionRequestService {
    requests: Arc<dyn RequestStore>,
    grants: Arc<GrantLifecycleService>,
    scope: Arc<AccessScopeResolver>,
    engine: AutoApprovalEngine,
    audit: Arc<dyn AuditStore>,
    events: Arc<dyn EventSink>,
}

impl PermissionRequestService {
    /// Create a new request service.
    pub fn new(
        requests: Arc<dyn RequestStore>,
        grants: Arc<GrantLifecycleService>,
        scope: Arc<AccessScopeResolver>,
        engine: AutoApprovalEngine,
        audit: Arc<dyn AuditStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            requests,
            grants,
            scope,
            engine,
            audit,
            events,
        }
    }

    /// Submit a new permission request.
    ///
    /// Validates justification and duration, confirms the requester may act
    /// on the target resource, enforces the duplicate invariant, then
    /// consults the rule table for the initial disposition.
    pub async fn create(
        &self,
        requester: &User,
        input: CreateRequestInput,
    ) -> Result<PermissionRequest> {
        let now = Utc::now();

        if input.justification.trim().len() < MIN_JUSTIFICATION_LENGTH {
            return Err(GovernanceError::JustificationTooShort);
        }
        if input.duration_days <= 0 {
            return Err(GovernanceError::InvalidDuration(input.duration_days));
        }

        if !self
            .scope
            .can_access(requester, input.resource_id, now)
            .await?
        {
            tracing::warn!(
                requester_id = %requester.id,
                resource_id = %input.resource_id,
                "request refused: requester has no access to resource"
            );
            return Err(GovernanceError::AccessDenied(input.resource_id));
        }

        // An approved request whose grant is still live counts as a
        // duplicate even after the originating request turned terminal.
        if self
            .grants
            .find_active_for(requester.id, input.resource_id, &input.target_principal)
            .await?
            .is_some()
        {
            return Err(GovernanceError::DuplicateRequest);
        }

        let requester_role = requester.effective_role(now);
        let decision = self.engine.evaluate(requester_role, input.level);

        let request = PermissionRequest {
            id: RequestId::new(),
            requester_id: requester.id,
            requester_role,
            resource_id: input.resource_id,
            target_principal: input.target_principal,
            level: input.level,
            justification: input.justification,
            requested_duration_days: input.duration_days,
            status: RequestStatus::Pending,
            auto_approved: false,
            required_approver_role: decision.required_approver_role,
            processed_by: None,
            processing_notes: None,
            grant_id: None,
            created_at: now,
            updated_at: now,
        };

        let request = self.requests.insert(request).await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(request.resource_id),
                request_id: Some(request.id),
                after_state: serde_json::to_value(&request).ok(),
                ..AuditEventInput::new(requester.id, AuditAction::RequestCreated)
            })
            .await?;
        self.events
            .publish(LifecycleEvent::RequestCreated {
                request_id: request.id,
                requester_id: requester.id,
                resource_id: request.resource_id,
                level: request.level,
            })
            .await?;
        tracing::info!(request_id = %request.id, level = %request.level, "request created");

        if decision.auto_approved {
            return self
                .finalize_approval(request, None, Some(decision.reason), true)
                .await;
        }

        Ok(request)
    }

    /// Approve a pending request.
    pub async fn approve(
        &self,
        request_id: RequestId,
        approver: &Actor,
        notes: Option<String>,
    ) -> Result<PermissionRequest> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(GovernanceError::RequestNotFound(request_id))?;

        Self::check_can_process(&request, approver)?;

        self.finalize_approval(request, Some(approver.user_id), notes, false)
            .await
    }

    /// Reject a pending request. The reason is required and surfaced back
    /// to the requester.
    pub async fn reject(
        &self,
        request_id: RequestId,
        approver: &Actor,
        reason: &str,
    ) -> Result<PermissionRequest> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(GovernanceError::RequestNotFound(request_id))?;

        Self::check_can_process(&request, approver)?;

        if reason.trim().is_empty() {
            return Err(GovernanceError::MissingReason("reject a request"));
        }

        let before = request.clone();
        let rejected = self
            .requests
            .decide(
                request_id,
                RequestDecision {
                    status: RequestStatus::Rejected,
                    processed_by: Some(approver.user_id),
                    processing_notes: Some(reason.to_string()),
                    auto_approved: false,
                },
            )
            .await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(rejected.resource_id),
                request_id: Some(request_id),
                before_state: serde_json::to_value(&before).ok(),
                after_state: serde_json::to_value(&rejected).ok(),
                ..AuditEventInput::new(approver.user_id, AuditAction::RequestRejected)
            })
            .await?;
        self.events
            .publish(LifecycleEvent::RequestRejected {
                request_id,
                reason: reason.to_string(),
            })
            .await?;
        tracing::info!(%request_id, approver = %approver.user_id, "request rejected");

        Ok(rejected)
    }

    /// Cancel a pending request. Only the original requester, or an actor
    /// outranking them, may cancel.
    pub async fn cancel(
        &self,
        request_id: RequestId,
        actor: &Actor,
    ) -> Result<PermissionRequest> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(GovernanceError::RequestNotFound(request_id))?;

        if !request.status.is_pending() {
            return Err(GovernanceError::RequestNotPending(request_id));
        }
        Self::check_requester_or_outranks(&request, actor)?;

        let before = request.clone();
        let cancelled = self
            .requests
            .decide(
                request_id,
                RequestDecision {
                    status: RequestStatus::Cancelled,
                    processed_by: Some(actor.user_id),
                    processing_notes: None,
                    auto_approved: false,
                },
            )
            .await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(cancelled.resource_id),
                request_id: Some(request_id),
                before_state: serde_json::to_value(&before).ok(),
                after_state: serde_json::to_value(&cancelled).ok(),
                ..AuditEventInput::new(actor.user_id, AuditAction::RequestCancelled)
            })
            .await?;
        tracing::info!(%request_id, actor = %actor.user_id, "request cancelled");

        Ok(cancelled)
    }

    /// Physically delete a request, permitted only while pending. Decided
    /// requests are retained for audit.
    pub async fn delete(&self, request_id: RequestId, actor: &Actor) -> Result<()> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(GovernanceError::RequestNotFound(request_id))?;

        Self::check_requester_or_outranks(&request, actor)?;

        self.requests.delete_pending(request_id).await?;

        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(request.resource_id),
                request_id: Some(request_id),
                before_state: serde_json::to_value(&request).ok(),
                ..AuditEventInput::new(actor.user_id, AuditAction::RequestDeleted)
            })
            .await?;
        tracing::info!(%request_id, actor = %actor.user_id, "pending request deleted");

        Ok(())
    }

    /// Look up one request.
    pub async fn get(&self, id: RequestId) -> Result<Option<PermissionRequest>> {
        self.requests.get(id).await
    }

    /// List requests with filtering and pagination.
    pub async fn list(
        &self,
        filter: &RequestFilter,
        options: &ListOptions,
    ) -> Result<Vec<PermissionRequest>> {
        self.requests.list(filter, options).await
    }

    /// Shared guards for approve/reject: state, self-approval, rank.
    fn check_can_process(
        request: &PermissionRequest,
        approver: &Actor,
    ) -> Result<()> {
        if !request.status.is_pending() {
            return Err(GovernanceError::RequestNotPending(request.id));
        }
        if approver.user_id == request.requester_id {
            return Err(GovernanceError::SelfApprovalNotAllowed);
        }
        if let Some(required) = request.required_approver_role {
            if !approver.role.meets(required) {
                tracing::warn!(
                    request_id = %request.id,
                    approver_role = %approver.role,
                    required = %required,
                    "processing refused: insufficient rank"
                );
                return Err(GovernanceError::InsufficientPrivilege {
                    required,
                    actual: approver.role,
                });
            }
        }
        Ok(())
    }

    /// Guard for cancel/delete: the requester themselves, or an actor
    /// outranking the requester's role snapshot.
    fn check_requester_or_outranks(
        request: &PermissionRequest,
        actor: &Actor,
    ) -> Result<()> {
        if actor.user_id == request.requester_id || actor.role.outranks(request.requester_role) {
            Ok(())
        } else {
            Err(GovernanceError::InsufficientPrivilege {
                required: request.requester_role,
                actual: actor.role,
            })
        }
    }

    /// Claim the pending→approved transition, then activate the grant and
    /// link it back. The decide step is the atomic winner-takes-all point.
    async fn finalize_approval(
        &self,
        request: PermissionRequest,
        processed_by: Option<UserId>,
        notes: Option<String>,
        auto_approved: bool,
    ) -> Result<PermissionRequest> {
        let before = request.clone();
        let request_id = request.id;

        let approved = self
            .requests
            .decide(
                request_id,
                RequestDecision {
                    status: RequestStatus::Approved,
                    processed_by,
                    processing_notes: notes,
                    auto_approved,
                },
            )
            .await?;

        let grant_actor = processed_by.unwrap_or(approved.requester_id);
        let grant = self.grants.activate(&approved, grant_actor).await?;
        let linked = self.requests.attach_grant(request_id, grant.id).await?;

        let action = if auto_approved {
            AuditAction::RequestAutoApproved
        } else {
            AuditAction::RequestApproved
        };
        self.audit
            .log_event(AuditEventInput {
                resource_id: Some(linked.resource_id),
                request_id: Some(request_id),
                grant_id: Some(grant.id),
                before_state: serde_json::to_value(&before).ok(),
                after_state: serde_json::to_value(&linked).ok(),
                ..AuditEventInput::new(grant_actor, action)
            })
            .await?;
        self.events
            .publish(LifecycleEvent::RequestApproved {
                request_id,
                grant_id: grant.id,
                auto_approved,
            })
            .await?;
        tracing::info!(%request_id, grant_id = %grant.id, auto_approved, "request approved");

        Ok(linked)
    }
}
