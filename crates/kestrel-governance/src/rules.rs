//! Auto-approval rule table and evaluation.
//!
//! The table maps each permission level to two role thresholds: the rank at
//! which a request for that level is approved without review, and the
//! minimum rank of a human approver otherwise. The table is an immutable
//! value validated at construction and passed explicitly into the engine,
//! never ambient state, so alternate policies are trivially testable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{GovernanceError, Result};
use crate::types::{PermissionLevel, Role};

/// Thresholds for one permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    /// Requesters at or above this rank are approved without review.
    pub auto_approve_min_role: Role,
    /// Minimum rank of the approver when review is required.
    pub manual_approve_min_role: Role,
}

/// The complete approval policy: one [`ApprovalRule`] per permission level.
///
/// Construction fails closed with [`GovernanceError::MissingRule`] when any
/// defined level lacks an entry, so the per-request path can never hit an
/// undefined policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRuleTable {
    rules: BTreeMap<PermissionLevel, ApprovalRule>,
}

impl ApprovalRuleTable {
    /// Build a table from per-level rules, verifying totality.
    pub fn from_rules(rules: BTreeMap<PermissionLevel, ApprovalRule>) -> Result<Self> {
        for level in PermissionLevel::ALL {
            if !rules.contains_key(&level) {
                tracing::error!(%level, "approval rule table is missing a permission level");
                return Err(GovernanceError::MissingRule(level));
            }
        }
        Ok(Self { rules })
    }

    /// The rule for `level`. Total by construction.
    #[must_use]
    pub fn rule(&self, level: PermissionLevel) -> ApprovalRule {
        // Construction verified totality over PermissionLevel::ALL.
        self.rules[&level]
    }
}

impl Default for ApprovalRuleTable {
    /// The shipped policy: read-tier levels self-serve for requesters,
    /// configuration tiers require admin sign-off.
    fn default() -> Self {
        let rules = BTreeMap::from([
            (
                PermissionLevel::Viewer,
                ApprovalRule {
                    auto_approve_min_role: Role::Requester,
                    manual_approve_min_role: Role::Manager,
                },
            ),
            (
                PermissionLevel::Analyst,
                ApprovalRule {
                    auto_approve_min_role: Role::Manager,
                    manual_approve_min_role: Role::Manager,
                },
            ),
            (
                PermissionLevel::Marketer,
                ApprovalRule {
                    auto_approve_min_role: Role::Manager,
                    manual_approve_min_role: Role::Manager,
                },
            ),
            (
                PermissionLevel::Editor,
                ApprovalRule {
                    auto_approve_min_role: Role::Admin,
                    manual_approve_min_role: Role::Admin,
                },
            ),
            (
                PermissionLevel::Administrator,
                ApprovalRule {
                    auto_approve_min_role: Role::SuperAdmin,
                    manual_approve_min_role: Role::Admin,
                },
            ),
        ]);
        Self { rules }
    }
}

/// Disposition of a new request, with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Whether the request is approved without review.
    pub auto_approved: bool,
    /// Minimum approver rank when review is required.
    pub required_approver_role: Option<Role>,
    /// Which rule fired, recorded so auto-approvals are distinguishable
    /// from manual ones in history.
    pub reason: String,
}

/// Pure evaluation of (requester role, permission level) against the table.
#[derive(Debug, Clone)]
pub struct AutoApprovalEngine {
    table: ApprovalRuleTable,
}

impl AutoApprovalEngine {
    /// Create an engine over a validated table.
    #[must_use]
    pub fn new(table: ApprovalRuleTable) -> Self {
        Self { table }
    }

    /// Decide the initial disposition of a request.
    #[must_use]
    pub fn evaluate(&self, requester_role: Role, level: PermissionLevel) -> ApprovalDecision {
        let rule = self.table.rule(level);
        if requester_role.meets(rule.auto_approve_min_role) {
            ApprovalDecision {
                auto_approved: true,
                required_approver_role: None,
                reason: format!(
                    "role {requester_role} meets auto-approval threshold {} for level {level}",
                    rule.auto_approve_min_role
                ),
            }
        } else {
            ApprovalDecision {
                auto_approved: false,
                required_approver_role: Some(rule.manual_approve_min_role),
                reason: format!(
                    "level {level} requires approval from {} or above",
                    rule.manual_approve_min_role
                ),
            }
        }
    }
}
