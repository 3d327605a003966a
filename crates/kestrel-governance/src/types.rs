//! Type definitions for the access governance domain.
//!
//! Includes newtype wrappers for IDs, enums for domain values, and the
//! role hierarchy operations built on [`Role`].

use chrono::{DateTime, Utc};
use kestrel_core::{ResourceId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{GovernanceError, Result};

// ============================================================================
// ID Types (Newtype Pattern)
// ============================================================================

/// Unique identifier for a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random RequestId.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<RequestId> for Uuid {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// Unique identifier for a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(pub Uuid);

impl GrantId {
    /// Create a new random GrantId.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GrantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<GrantId> for Uuid {
    fn from(id: GrantId) -> Self {
        id.0
    }
}

/// Unique identifier for a resource assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(pub Uuid);

impl AssignmentId {
    /// Create a new random AssignmentId.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AssignmentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<AssignmentId> for Uuid {
    fn from(id: AssignmentId) -> Self {
        id.0
    }
}

// ============================================================================
// Roles
// ============================================================================

/// A ranked identity classification governing what actions a user may perform.
///
/// Roles form a strict total order: every pair of distinct roles compares
/// unequal, and the declaration order below is the rank order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only visibility into the dashboard.
    Viewer,
    /// May request access on their own behalf.
    Requester,
    /// Manages a team's requests and assignments.
    Manager,
    /// Administers resources and approves elevated access.
    Admin,
    /// Unrestricted administration, including role management.
    SuperAdmin,
}

impl Role {
    /// Every defined role, in rank order.
    pub const ALL: [Role; 5] = [
        Role::Viewer,
        Role::Requester,
        Role::Manager,
        Role::Admin,
        Role::SuperAdmin,
    ];

    /// Numeric rank of this role. Higher means more privileged.
    #[must_use]
    pub fn level(&self) -> u8 {
        match self {
            Self::Viewer => 1,
            Self::Requester => 2,
            Self::Manager => 3,
            Self::Admin => 4,
            Self::SuperAdmin => 5,
        }
    }

    /// True iff this role ranks strictly above `other`.
    #[must_use]
    pub fn outranks(&self, other: Role) -> bool {
        self.level() > other.level()
    }

    /// True iff this role ranks at or above `other`.
    #[must_use]
    pub fn meets(&self, other: Role) -> bool {
        self.level() >= other.level()
    }

    /// All roles strictly below this one, i.e. the roles this role may
    /// grant or revoke.
    #[must_use]
    pub fn manageable_roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.outranks(*r))
            .collect()
    }

    /// Parse a role from its wire name.
    ///
    /// Fails with [`GovernanceError::UnknownRole`] for any value outside
    /// the defined enum.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "viewer" => Ok(Self::Viewer),
            "requester" => Ok(Self::Requester),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(GovernanceError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viewer => write!(f, "viewer"),
            Self::Requester => write!(f, "requester"),
            Self::Manager => write!(f, "manager"),
            Self::Admin => write!(f, "admin"),
            Self::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

// ============================================================================
// Permission Levels
// ============================================================================

/// The granted access tier on a specific resource.
///
/// Distinct from [`Role`]: a permission level describes what the target
/// principal may do on the external resource, not what the user may do in
/// kestrel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Read-only access to reports.
    Viewer,
    /// Read access plus analysis tooling.
    Analyst,
    /// Analyst access plus audience and campaign management.
    Marketer,
    /// Full configuration access short of user management.
    Editor,
    /// Full control of the resource, including its user roster.
    Administrator,
}

impl PermissionLevel {
    /// Every defined permission level.
    pub const ALL: [PermissionLevel; 5] = [
        PermissionLevel::Viewer,
        PermissionLevel::Analyst,
        PermissionLevel::Marketer,
        PermissionLevel::Editor,
        PermissionLevel::Administrator,
    ];
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viewer => write!(f, "viewer"),
            Self::Analyst => write!(f, "analyst"),
            Self::Marketer => write!(f, "marketer"),
            Self::Editor => write!(f, "editor"),
            Self::Administrator => write!(f, "administrator"),
        }
    }
}

// ============================================================================
// Status Enums
// ============================================================================

/// Status of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; a grant has been activated.
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// Cancelled by the requester.
    Cancelled,
}

impl RequestStatus {
    /// Check if the request can still be actioned.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check if the request is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    /// Grant is live on the external resource.
    Active,
    /// Grant lapsed at its expiry time.
    Expired,
    /// Grant was revoked before expiry.
    Revoked,
}

impl GrantStatus {
    /// Check if the grant is live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the grant is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked)
    }
}

impl fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// Status of a resource assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Assignment grants access.
    Active,
    /// Assignment no longer grants access.
    Inactive,
    /// Assignment is an explicit deny: it vetoes access to the pair even
    /// when a role tier would otherwise allow it.
    Suspended,
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Status of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource is live and may be acted on.
    Active,
    /// Resource is inactive; no access regardless of assignments.
    Inactive,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// Urgency classification for a grant approaching expiry.
///
/// Used for reporting and alerting only, never for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryUrgency {
    /// Expires in under one day.
    Critical,
    /// Expires in under three days.
    High,
    /// Expires in under seven days.
    Medium,
    /// No imminent expiry.
    None,
}

impl fmt::Display for ExpiryUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::None => write!(f, "none"),
        }
    }
}

// ============================================================================
// Actor & User Context
// ============================================================================

/// Authenticated actor context handed in by the API layer.
///
/// The engine trusts this value verbatim; authentication happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub user_id: UserId,
    /// The actor's role.
    pub role: Role,
}

impl Actor {
    /// Create an actor context.
    #[must_use]
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// A scoped role assignment held beyond the user's primary role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRoleAssignment {
    /// The assigned role.
    pub role: Role,
    /// Resource the role is scoped to, or `None` for an org-wide assignment.
    pub resource_id: Option<ResourceId>,
    /// When the assignment lapses, if time-bounded.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ScopedRoleAssignment {
    /// True iff the assignment is still in effect at `now`.
    #[must_use]
    pub fn in_effect(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|e| e > now)
    }
}

/// A user as seen by the engine: identity, primary role, status, and any
/// scoped role assignments supplied by the identity subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque identity reference.
    pub id: UserId,
    /// Primary role.
    pub role: Role,
    /// Whether the account is active.
    pub active: bool,
    /// Time-bounded role overrides beyond the primary role.
    pub scoped_roles: Vec<ScopedRoleAssignment>,
}

impl User {
    /// Create a user with no scoped role assignments.
    #[must_use]
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            active: true,
            scoped_roles: Vec::new(),
        }
    }

    /// The user's effective org-wide role at `now`: the highest rank among
    /// the primary role and unexpired assignments with no resource scope.
    #[must_use]
    pub fn effective_role(&self, now: DateTime<Utc>) -> Role {
        self.scoped_roles
            .iter()
            .filter(|s| s.resource_id.is_none() && s.in_effect(now))
            .map(|s| s.role)
            .fold(self.role, Role::max)
    }

    /// Actor context derived from this user's effective role.
    #[must_use]
    pub fn as_actor(&self, now: DateTime<Utc>) -> Actor {
        Actor::new(self.id, self.effective_role(now))
    }
}
