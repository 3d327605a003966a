//! Error types for the access governance engine.
//!
//! Every failure is returned as a typed result for the API layer to
//! translate into a user-facing response; nothing is silently swallowed.
//! The classification helpers (`is_not_found`, `is_conflict`, ...) are the
//! contract that layer maps onto HTTP status codes.

use thiserror::Error;

use crate::types::{GrantId, GrantStatus, PermissionLevel, RequestId, Role};
use kestrel_core::ResourceId;

/// Governance engine error type.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// A role value outside the defined enum.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// The approval rule table has no entry for a permission level.
    ///
    /// A configuration defect, not a user mistake: surfaced at table
    /// construction so a deployment with an undefined policy never serves
    /// requests.
    #[error("no approval rule configured for permission level {0}")]
    MissingRule(PermissionLevel),

    /// The requester has no access to the target resource.
    #[error("access denied to resource {0}")]
    AccessDenied(ResourceId),

    /// An active request or grant already exists for the same
    /// (requester, resource, target principal) tuple.
    #[error("an active request or grant already exists for this target")]
    DuplicateRequest,

    /// The request is not in a state that permits the operation.
    #[error("request {0} is not pending")]
    RequestNotPending(RequestId),

    /// The grant is not in a state that permits the operation.
    #[error("grant {id} is not active (status: {status})")]
    GrantNotActive {
        /// The grant.
        id: GrantId,
        /// Its current status.
        status: GrantStatus,
    },

    /// The grant has not yet reached its expiry time.
    #[error("grant {0} has not reached its expiry time")]
    GrantNotExpiredYet(GrantId),

    /// The actor's role does not meet the required rank.
    #[error("insufficient privilege: {actual} does not meet required rank {required}")]
    InsufficientPrivilege {
        /// Rank the operation requires.
        required: Role,
        /// The actor's rank.
        actual: Role,
    },

    /// An actor attempted to lower their own privilege.
    #[error("actors may not lower their own role")]
    SelfDemotion,

    /// A requester attempted to process their own request.
    #[error("requesters may not approve or reject their own requests")]
    SelfApprovalNotAllowed,

    /// A duration that is not strictly positive.
    #[error("invalid duration: {0} days")]
    InvalidDuration(i64),

    /// A rejection or revocation submitted without a reason.
    #[error("a reason is required to {0}")]
    MissingReason(&'static str),

    /// Business justification below the minimum length.
    #[error("business justification is too short")]
    JustificationTooShort,

    /// Permission request not found.
    #[error("permission request not found: {0}")]
    RequestNotFound(RequestId),

    /// Permission grant not found.
    #[error("permission grant not found: {0}")]
    GrantNotFound(GrantId),
}

impl GovernanceError {
    /// True for lookup failures (HTTP 404).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RequestNotFound(_) | Self::GrantNotFound(_))
    }

    /// True for uniqueness conflicts (HTTP 409).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::DuplicateRequest)
    }

    /// True for authorization failures (HTTP 403).
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied(_)
                | Self::InsufficientPrivilege { .. }
                | Self::SelfDemotion
                | Self::SelfApprovalNotAllowed
        )
    }

    /// True for lifecycle-state guards (HTTP 412).
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(
            self,
            Self::RequestNotPending(_) | Self::GrantNotActive { .. } | Self::GrantNotExpiredYet(_)
        )
    }
}

/// Result type alias for governance operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;
