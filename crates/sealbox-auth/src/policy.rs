//! Role and permission gating.
//!
//! Operations declare an [`AccessPolicy`]; the guard evaluates it against
//! the authenticated client's role and permission sets. The wildcard role
//! `*` in the client's set passes any role check. Permission checks run in
//! `any` mode by default (intersection) or `all` mode (containment).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("requires one of roles: {0}")]
    MissingRole(String),
    #[error("requires permissions: {0}")]
    MissingPermissions(String),
}

/// The wildcard role granting every role check.
pub const WILDCARD: &str = "*";

/// Declarative access requirements for one operation.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// `false` = any listed permission suffices; `true` = all are required.
    pub require_all_permissions: bool,
}

impl AccessPolicy {
    /// No roles or permissions required beyond a valid token.
    pub fn token_only() -> Self {
        Self::default()
    }

    pub fn roles(roles: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn permissions(permissions: &[&str], require_all: bool) -> Self {
        Self {
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            require_all_permissions: require_all,
            ..Self::default()
        }
    }

    /// Evaluate this policy against a client's role and permission sets.
    pub fn check(
        &self,
        client_roles: &[String],
        client_permissions: &[String],
    ) -> Result<(), PolicyError> {
        if !self.roles.is_empty() {
            let wildcard = client_roles.iter().any(|r| r == WILDCARD);
            let intersects = self.roles.iter().any(|r| client_roles.contains(r));
            if !wildcard && !intersects {
                return Err(PolicyError::MissingRole(self.roles.join(", ")));
            }
        }

        if !self.permissions.is_empty() {
            let ok = if self.require_all_permissions {
                self.permissions
                    .iter()
                    .all(|p| client_permissions.contains(p))
            } else {
                self.permissions
                    .iter()
                    .any(|p| client_permissions.contains(p))
            };
            if !ok {
                return Err(PolicyError::MissingPermissions(self.permissions.join(", ")));
            }
        }

        Ok(())
    }
}
