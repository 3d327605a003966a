//! Lifecycle event hook for the notification collaborator.
//!
//! The engine emits abstract events as plain data; it does not format
//! messages or pick delivery channels.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kestrel_core::{ResourceId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{ExpiryUrgency, GrantId, PermissionLevel, RequestId};

/// An abstract lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A permission request was created.
    RequestCreated {
        /// The request.
        request_id: RequestId,
        /// Who requested.
        requester_id: UserId,
        /// The target resource.
        resource_id: ResourceId,
        /// The requested level.
        level: PermissionLevel,
    },
    /// A permission request was approved.
    RequestApproved {
        /// The request.
        request_id: RequestId,
        /// The activated grant.
        grant_id: GrantId,
        /// Whether the rule table approved it without review.
        auto_approved: bool,
    },
    /// A permission request was rejected.
    RequestRejected {
        /// The request.
        request_id: RequestId,
        /// The recorded reason, surfaced to the requester.
        reason: String,
    },
    /// An active grant is approaching expiry.
    GrantExpiring {
        /// The grant.
        grant_id: GrantId,
        /// When it expires.
        expires_at: DateTime<Utc>,
        /// How soon.
        urgency: ExpiryUrgency,
    },
    /// A grant was revoked.
    GrantRevoked {
        /// The grant.
        grant_id: GrantId,
        /// Who revoked it.
        revoked_by: UserId,
        /// The recorded reason, surfaced to the affected requester.
        reason: String,
    },
}

/// Trait for notification delivery backends.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one lifecycle event.
    async fn publish(&self, event: LifecycleEvent) -> Result<()>;
}

/// In-memory event sink for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Arc<RwLock<Vec<LifecycleEvent>>>,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get the count of published events.
    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    /// All published events, in publish order.
    pub async fn all(&self) -> Vec<LifecycleEvent> {
        self.events.read().await.clone()
    }

    /// Clear all events (for testing).
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait::async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, event: LifecycleEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_preserves_order() {
        let sink = InMemoryEventSink::new();
        let request_id = RequestId::new();
        sink.publish(LifecycleEvent::RequestCreated {
            request_id,
            requester_id: UserId::new(),
            resource_id: ResourceId::new(),
            level: PermissionLevel::Viewer,
        })
        .await
        .unwrap();
        sink.publish(LifecycleEvent::RequestRejected {
            request_id,
            reason: "not needed".to_string(),
        })
        .await
        .unwrap();

        let events = sink.all().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LifecycleEvent::RequestCreated { .. }));
        assert!(matches!(events[1], LifecycleEvent::RequestRejected { .. }));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LifecycleEvent::GrantRevoked {
            grant_id: GrantId::new(),
            revoked_by: UserId::new(),
            reason: "offboarding".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "grant_revoked");
        assert_eq!(json["reason"], "offboarding");
    }
}
