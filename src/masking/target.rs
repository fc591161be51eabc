//! Policy targets and targeting strategies
//!
//! A masking policy is attached to PUBLIC, to a role with a priority, or to a
//! single user. When several attachments cover the same column the highest
//! PRIORITY wins: public (none) < analyst_role (10) < admin_role (20).

use crate::masking::templates::DEFAULT_TEMPLATE_ROLE;
use serde::{Deserialize, Serialize};

pub const PUBLIC_ROLE: &str = "public";
pub const ANALYST_ROLE: &str = "analyst_role";
pub const ADMIN_ROLE: &str = "admin_role";

pub const ANALYST_PRIORITY: u32 = 10;
pub const ADMIN_PRIORITY: u32 = 20;

/// Deterministic policy name for a role-based attachment
pub fn policy_name(table: &str, column: &str, role: &str) -> String {
    format!("mask_{}_{}_{}", table, column, role)
}

/// Deterministic policy name for a user-based attachment; the prefix keeps it
/// disjoint from role-based names
pub fn user_policy_name(table: &str, column: &str, user: &str) -> String {
    format!("umask_{}_{}_{}", table, column, user)
}

/// Who a single policy is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyTarget {
    Public,
    Role { name: String, priority: u32 },
    User { name: String },
}

impl PolicyTarget {
    /// Role target with the conventional priority for its name
    pub fn role(name: &str) -> Self {
        if name.eq_ignore_ascii_case(PUBLIC_ROLE) {
            return PolicyTarget::Public;
        }
        let priority = if name == ADMIN_ROLE {
            ADMIN_PRIORITY
        } else {
            ANALYST_PRIORITY
        };
        PolicyTarget::Role {
            name: name.to_string(),
            priority,
        }
    }

    /// Role, user name, or `public`
    pub fn label(&self) -> &str {
        match self {
            PolicyTarget::Public => PUBLIC_ROLE,
            PolicyTarget::Role { name, .. } | PolicyTarget::User { name } => name,
        }
    }

    /// Registry key used to pick the masking expression
    pub fn template_key(&self) -> &str {
        match self {
            PolicyTarget::Public => PUBLIC_ROLE,
            PolicyTarget::Role { name, .. } => name,
            PolicyTarget::User { .. } => DEFAULT_TEMPLATE_ROLE,
        }
    }

    pub fn priority(&self) -> Option<u32> {
        match self {
            PolicyTarget::Role { priority, .. } => Some(*priority),
            PolicyTarget::Public | PolicyTarget::User { .. } => None,
        }
    }

    /// Grantee as listed in the warehouse attachment catalog
    pub fn grantee(&self) -> &str {
        self.label()
    }

    pub fn policy_name(&self, table: &str, column: &str) -> String {
        match self {
            PolicyTarget::User { name } => user_policy_name(table, column, name),
            _ => policy_name(table, column, self.label()),
        }
    }

    /// Roles below admin priority evaluate the policy against the column
    /// (`USING (<column>)`); admin-level roles see the raw value and do not.
    pub fn binds_column(&self) -> bool {
        matches!(self, PolicyTarget::Role { priority, .. } if *priority < ADMIN_PRIORITY)
    }
}

/// A role entry in a role-based strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleTarget {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl RoleTarget {
    pub fn new(role: &str, priority: Option<u32>) -> Self {
        Self {
            role: role.to_string(),
            priority,
        }
    }

    fn to_target(&self) -> PolicyTarget {
        match (PolicyTarget::role(&self.role), self.priority) {
            (PolicyTarget::Role { name, .. }, Some(priority)) => PolicyTarget::Role { name, priority },
            (target, _) => target,
        }
    }
}

/// Which set of targets a run attaches policies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetingStrategy {
    RoleBased { roles: Vec<RoleTarget> },
    /// An empty list means every database user
    UserBased { users: Vec<String> },
}

impl TargetingStrategy {
    /// public, analyst_role (10), admin_role (20)
    pub fn default_roles() -> Self {
        TargetingStrategy::RoleBased {
            roles: vec![
                RoleTarget::new(PUBLIC_ROLE, None),
                RoleTarget::new(ANALYST_ROLE, Some(ANALYST_PRIORITY)),
                RoleTarget::new(ADMIN_ROLE, Some(ADMIN_PRIORITY)),
            ],
        }
    }

    /// Targets in the configured order; user-based strategies with no users
    /// resolve to an empty list here and are expanded by the orchestrator
    pub fn targets(&self) -> Vec<PolicyTarget> {
        match self {
            TargetingStrategy::RoleBased { roles } => roles.iter().map(RoleTarget::to_target).collect(),
            TargetingStrategy::UserBased { users } => users
                .iter()
                .map(|name| PolicyTarget::User { name: name.clone() })
                .collect(),
        }
    }

    pub fn needs_user_discovery(&self) -> bool {
        matches!(self, TargetingStrategy::UserBased { users } if users.is_empty())
    }
}

impl Default for TargetingStrategy {
    fn default() -> Self {
        Self::default_roles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_policy_name_is_deterministic() {
        assert_eq!(policy_name("customer", "SSN", "admin_role"), "mask_customer_SSN_admin_role");
        assert_eq!(
            policy_name("customer", "SSN", "admin_role"),
            policy_name("customer", "SSN", "admin_role")
        );
    }

    #[test]
    fn test_policy_names_are_distinct_per_triple() {
        let tables = ["customer", "orders"];
        let columns = ["email", "phone", "ssn"];
        let roles = ["public", "analyst_role", "admin_role"];

        let mut names = HashSet::new();
        for t in tables {
            for c in columns {
                for r in roles {
                    assert!(names.insert(policy_name(t, c, r)), "duplicate name for {}/{}/{}", t, c, r);
                }
            }
        }
        assert_eq!(names.len(), 18);
    }

    #[test]
    fn test_user_names_never_collide_with_role_names() {
        let role = PolicyTarget::role("bob").policy_name("customer", "email");
        let user = PolicyTarget::User { name: "bob".into() }.policy_name("customer", "email");
        assert_ne!(role, user);
        assert_eq!(user, "umask_customer_email_bob");
    }

    #[test]
    fn test_default_strategy_priorities() {
        let targets = TargetingStrategy::default().targets();
        assert_eq!(
            targets,
            vec![
                PolicyTarget::Public,
                PolicyTarget::Role { name: "analyst_role".into(), priority: 10 },
                PolicyTarget::Role { name: "admin_role".into(), priority: 20 },
            ]
        );

        let priorities: Vec<u32> = targets.iter().map(|t| t.priority().unwrap_or(0)).collect();
        assert!(priorities.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_role_defaults() {
        assert_eq!(PolicyTarget::role("PUBLIC"), PolicyTarget::Public);
        assert_eq!(PolicyTarget::role("admin_role").priority(), Some(20));
        assert_eq!(PolicyTarget::role("support_role").priority(), Some(10));
        assert_eq!(
            RoleTarget::new("support_role", Some(15)).to_target().priority(),
            Some(15)
        );
        // public never carries a priority
        assert_eq!(RoleTarget::new("public", Some(5)).to_target(), PolicyTarget::Public);
    }

    #[test]
    fn test_binds_column() {
        assert!(!PolicyTarget::Public.binds_column());
        assert!(PolicyTarget::role("analyst_role").binds_column());
        assert!(!PolicyTarget::role("admin_role").binds_column());
        assert!(!PolicyTarget::User { name: "bob".into() }.binds_column());
    }

    #[test]
    fn test_user_strategy() {
        let strategy = TargetingStrategy::UserBased { users: vec!["analyst_user".into()] };
        assert_eq!(strategy.targets()[0].template_key(), DEFAULT_TEMPLATE_ROLE);
        assert!(!strategy.needs_user_discovery());
        assert!(TargetingStrategy::UserBased { users: vec![] }.needs_user_discovery());
    }

    #[test]
    fn test_strategy_deserializes_from_request_json() {
        let strategy: TargetingStrategy = serde_json::from_value(serde_json::json!({
            "type": "role_based",
            "roles": [{ "role": "public" }, { "role": "admin_role", "priority": 20 }]
        }))
        .unwrap();
        assert_eq!(strategy.targets().len(), 2);
    }
}
