//! Integration tests for the permission request lifecycle.

mod common;

use kestrel_core::UserId;
use kestrel_governance::audit::AuditEventFilter;
use kestrel_governance::events::LifecycleEvent;
use kestrel_governance::types::{Actor, PermissionLevel, RequestStatus, Role};
use kestrel_governance::{AuditAction, AuditStore, GovernanceError, GrantStatus};

use common::TestContext;

#[tokio::test]
async fn test_auto_approval_activates_grant_immediately() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let request = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Viewer),
        )
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Approved);
    assert!(request.auto_approved);
    assert!(request.processed_by.is_none());
    assert!(request
        .processing_notes
        .as_deref()
        .unwrap()
        .contains("auto-approval"));

    let grant = ctx
        .grants
        .get(request.grant_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(grant.status, GrantStatus::Active);
    assert_eq!(grant.request_id, Some(request.id));
    assert_eq!(
        grant.expires_at,
        grant.granted_at + chrono::Duration::days(30)
    );

    let published = ctx.events.all().await;
    assert!(published.iter().any(|e| matches!(
        e,
        LifecycleEvent::RequestApproved {
            auto_approved: true,
            ..
        }
    )));
}

#[tokio::test]
async fn test_elevated_level_requires_admin_approval() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let request = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Editor),
        )
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert!(!request.auto_approved);
    assert_eq!(request.required_approver_role, Some(Role::Admin));
    assert!(request.grant_id.is_none());

    // A requester-ranked approver is refused
    let weak = Actor::new(UserId::new(), Role::Requester);
    let err = ctx
        .requests
        .approve(request.id, &weak, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InsufficientPrivilege { .. }));

    // An admin succeeds
    let admin = Actor::new(UserId::new(), Role::Admin);
    let approved = ctx
        .requests
        .approve(request.id, &admin, Some("approved for Q3 audit".to_string()))
        .await
        .unwrap();

    assert_eq!(approved.status, RequestStatus::Approved);
    assert!(!approved.auto_approved);
    assert_eq!(approved.processed_by, Some(admin.user_id));

    let grant = ctx
        .grants
        .get(approved.grant_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(grant.status, GrantStatus::Active);
    assert_eq!(grant.level, PermissionLevel::Editor);
}

#[tokio::test]
async fn test_concurrent_identical_creates_yield_one_winner() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    // Editor level stays pending, so both calls race on the pending tuple
    let input = TestContext::request_input(resource_id, PermissionLevel::Editor);
    let (first, second) = tokio::join!(
        ctx.requests.create(&requester, input.clone()),
        ctx.requests.create(&requester, input),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(GovernanceError::DuplicateRequest)
    )));
}

#[tokio::test]
async fn test_create_refused_without_resource_access() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let stranger = kestrel_governance::User::new(UserId::new(), Role::Requester);

    let err = ctx
        .requests
        .create(
            &stranger,
            TestContext::request_input(resource_id, PermissionLevel::Viewer),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::AccessDenied(r) if r == resource_id));
}

#[tokio::test]
async fn test_create_refused_for_short_justification() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let mut input = TestContext::request_input(resource_id, PermissionLevel::Viewer);
    input.justification = "need it".to_string();

    let err = ctx.requests.create(&requester, input).await.unwrap_err();
    assert!(matches!(err, GovernanceError::JustificationTooShort));
}

#[tokio::test]
async fn test_create_refused_for_non_positive_duration() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let mut input = TestContext::request_input(resource_id, PermissionLevel::Viewer);
    input.duration_days = 0;

    let err = ctx.requests.create(&requester, input).await.unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidDuration(0)));
}

#[tokio::test]
async fn test_active_grant_blocks_new_request_until_revoked() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    // Viewer level auto-approves, leaving an active grant for the tuple
    let approved = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Viewer),
        )
        .await
        .unwrap();

    let err = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Viewer),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::DuplicateRequest));

    // Revoking the grant frees the tuple again
    let admin = Actor::new(UserId::new(), Role::Admin);
    ctx.grants
        .revoke(approved.grant_id.unwrap(), &admin, "access review")
        .await
        .unwrap();

    ctx.requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Viewer),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reject_requires_reason_and_records_it() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let request = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Editor),
        )
        .await
        .unwrap();

    let admin = Actor::new(UserId::new(), Role::Admin);
    let err = ctx
        .requests
        .reject(request.id, &admin, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::MissingReason(_)));

    let rejected = ctx
        .requests
        .reject(request.id, &admin, "no business need on this property")
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(
        rejected.processing_notes.as_deref(),
        Some("no business need on this property")
    );

    let published = ctx.events.all().await;
    assert!(published.iter().any(|e| matches!(
        e,
        LifecycleEvent::RequestRejected { reason, .. } if reason.contains("business need")
    )));
}

#[tokio::test]
async fn test_self_approval_refused() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let request = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Editor),
        )
        .await
        .unwrap();

    // Even with admin rank, the requester cannot process their own request
    let self_as_admin = Actor::new(requester.id, Role::Admin);
    let err = ctx
        .requests
        .approve(request.id, &self_as_admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::SelfApprovalNotAllowed));

    let err = ctx
        .requests
        .reject(request.id, &self_as_admin, "changed my mind")
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::SelfApprovalNotAllowed));
}

#[tokio::test]
async fn test_cancel_only_while_pending_and_only_by_owner_or_above() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let request = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Editor),
        )
        .await
        .unwrap();

    // A peer at the same rank cannot cancel someone else's request
    let peer = Actor::new(UserId::new(), Role::Requester);
    let err = ctx.requests.cancel(request.id, &peer).await.unwrap_err();
    assert!(matches!(err, GovernanceError::InsufficientPrivilege { .. }));

    // The requester can
    let owner = Actor::new(requester.id, Role::Requester);
    let cancelled = ctx.requests.cancel(request.id, &owner).await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    // Terminal states cannot be cancelled again
    let err = ctx.requests.cancel(request.id, &owner).await.unwrap_err();
    assert!(matches!(err, GovernanceError::RequestNotPending(_)));
}

#[tokio::test]
async fn test_outranking_actor_may_cancel() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let request = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Editor),
        )
        .await
        .unwrap();

    let manager = Actor::new(UserId::new(), Role::Manager);
    let cancelled = ctx.requests.cancel(request.id, &manager).await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
}

#[tokio::test]
async fn test_delete_permitted_only_while_pending() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;
    let owner = Actor::new(requester.id, Role::Requester);

    let pending = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Editor),
        )
        .await
        .unwrap();
    ctx.requests.delete(pending.id, &owner).await.unwrap();
    assert!(ctx.requests.get(pending.id).await.unwrap().is_none());

    // An approved request is retained for audit
    let approved = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Viewer),
        )
        .await
        .unwrap();
    let err = ctx.requests.delete(approved.id, &owner).await.unwrap_err();
    assert!(matches!(err, GovernanceError::RequestNotPending(_)));
    assert!(ctx.requests.get(approved.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_audit_trail_distinguishes_auto_from_manual_approval() {
    let ctx = TestContext::new();
    let resource_id = ctx.add_resource("Web Property").await;
    let requester = ctx.user_with_access(Role::Requester, resource_id).await;

    let auto = ctx
        .requests
        .create(
            &requester,
            TestContext::request_input(resource_id, PermissionLevel::Viewer),
        )
        .await
        .unwrap();

    let mut manual_input = TestContext::request_input(resource_id, PermissionLevel::Editor);
    manual_input.target_principal = "editor@example.com".to_string();
    let manual = ctx.requests.create(&requester, manual_input).await.unwrap();
    let admin = Actor::new(UserId::new(), Role::Admin);
    ctx.requests.approve(manual.id, &admin, None).await.unwrap();

    let auto_events = ctx
        .audit
        .query_events(AuditEventFilter {
            request_id: Some(auto.id),
            action: Some(AuditAction::RequestAutoApproved),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(auto_events.len(), 1);
    assert!(auto_events[0].before_state.is_some());
    assert!(auto_events[0].after_state.is_some());

    let manual_events = ctx
        .audit
        .query_events(AuditEventFilter {
            request_id: Some(manual.id),
            action: Some(AuditAction::RequestApproved),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(manual_events.len(), 1);
    assert_eq!(manual_events[0].actor_id, admin.user_id);
}
