//! Audit logging for governance operations.
//!
//! Every state-changing operation emits an abstract audit record to a
//! pluggable [`AuditStore`]; the engine never persists audit history
//! itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_governance::audit::{AuditAction, AuditEventInput, AuditStore, InMemoryAuditStore};
//! use kestrel_core::UserId;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryAuditStore::new());
//! let input = AuditEventInput::new(UserId::new(), AuditAction::RequestCreated);
//! let event = store.log_event(input).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kestrel_core::{ResourceId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{GrantId, RequestId};

/// Action performed on a request or grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Permission request was created.
    RequestCreated,
    /// Request was approved by the rule table, without review.
    RequestAutoApproved,
    /// Request was approved by an approver.
    RequestApproved,
    /// Request was rejected.
    RequestRejected,
    /// Request was cancelled by its requester.
    RequestCancelled,
    /// Pending request was deleted.
    RequestDeleted,
    /// Grant became active.
    GrantActivated,
    /// Grant expiry was extended.
    GrantExtended,
    /// Grant was revoked.
    GrantRevoked,
    /// Grant lapsed at its expiry time.
    GrantExpired,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestCreated => write!(f, "request_created"),
            Self::RequestAutoApproved => write!(f, "request_auto_approved"),
            Self::RequestApproved => write!(f, "request_approved"),
            Self::RequestRejected => write!(f, "request_rejected"),
            Self::RequestCancelled => write!(f, "request_cancelled"),
            Self::RequestDeleted => write!(f, "request_deleted"),
            Self::GrantActivated => write!(f, "grant_activated"),
            Self::GrantExtended => write!(f, "grant_extended"),
            Self::GrantRevoked => write!(f, "grant_revoked"),
            Self::GrantExpired => write!(f, "grant_expired"),
        }
    }
}

/// An audit event for governance operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for the event.
    pub id: Uuid,
    /// User who performed the action.
    pub actor_id: UserId,
    /// Action performed.
    pub action: AuditAction,
    /// The resource involved (if any).
    pub resource_id: Option<ResourceId>,
    /// The request involved (if any).
    pub request_id: Option<RequestId>,
    /// The grant involved (if any).
    pub grant_id: Option<GrantId>,
    /// State before the change (JSON).
    pub before_state: Option<serde_json::Value>,
    /// State after the change (JSON).
    pub after_state: Option<serde_json::Value>,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Additional metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Input for creating an audit event.
#[derive(Debug, Clone)]
pub struct AuditEventInput {
    /// User who performed the action.
    pub actor_id: UserId,
    /// Action performed.
    pub action: AuditAction,
    /// The resource involved (if any).
    pub resource_id: Option<ResourceId>,
    /// The request involved (if any).
    pub request_id: Option<RequestId>,
    /// The grant involved (if any).
    pub grant_id: Option<GrantId>,
    /// State before the change (JSON).
    pub before_state: Option<serde_json::Value>,
    /// State after the change (JSON).
    pub after_state: Option<serde_json::Value>,
    /// Additional metadata.
    pub metadata: Option<serde_json::Value>,
}

impl AuditEventInput {
    /// Create an input with only the required fields set.
    #[must_use]
    pub fn new(actor_id: UserId, action: AuditAction) -> Self {
        Self {
            actor_id,
            action,
            resource_id: None,
            request_id: None,
            grant_id: None,
            before_state: None,
            after_state: None,
            metadata: None,
        }
    }
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditEventFilter {
    /// Filter by actor.
    pub actor_id: Option<UserId>,
    /// Filter by action type.
    pub action: Option<AuditAction>,
    /// Filter by resource.
    pub resource_id: Option<ResourceId>,
    /// Filter by request.
    pub request_id: Option<RequestId>,
    /// Filter by grant.
    pub grant_id: Option<GrantId>,
    /// Filter by events after this date.
    pub from_date: Option<DateTime<Utc>>,
    /// Filter by events before this date.
    pub to_date: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of results to skip.
    pub offset: Option<usize>,
}

/// Trait for audit event storage backends.
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Log an audit event.
    async fn log_event(&self, input: AuditEventInput) -> Result<AuditEvent>;

    /// Query audit events.
    async fn query_events(&self, filter: AuditEventFilter) -> Result<Vec<AuditEvent>>;
}

/// In-memory audit store for testing.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    events: Arc<RwLock<HashMap<Uuid, AuditEvent>>>,
}

impl InMemoryAuditStore {
    /// Create a new in-memory audit store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the count of events in the store.
    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Clear all events (for testing).
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn log_event(&self, input: AuditEventInput) -> Result<AuditEvent> {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            actor_id: input.actor_id,
            action: input.action,
            resource_id: input.resource_id,
            request_id: input.request_id,
            grant_id: input.grant_id,
            before_state: input.before_state,
            after_state: input.after_state,
            timestamp: Utc::now(),
            metadata: input.metadata,
        };

        self.events.write().await.insert(event.id, event.clone());
        Ok(event)
    }

    async fn query_events(&self, filter: AuditEventFilter) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;
        let mut results: Vec<_> = events
            .values()
            .filter(|e| filter.actor_id.is_none_or(|id| e.actor_id == id))
            .filter(|e| filter.action.is_none_or(|a| e.action == a))
            .filter(|e| filter.resource_id.is_none_or(|id| e.resource_id == Some(id)))
            .filter(|e| filter.request_id.is_none_or(|id| e.request_id == Some(id)))
            .filter(|e| filter.grant_id.is_none_or(|id| e.grant_id == Some(id)))
            .filter(|e| filter.from_date.is_none_or(|d| e.timestamp >= d))
            .filter(|e| filter.to_date.is_none_or(|d| e.timestamp <= d))
            .cloned()
            .collect();

        // Most recent first
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);

        Ok(results.into_iter().skip(offset).take(limit).collect())
    }
}
