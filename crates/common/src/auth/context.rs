use crate::auth::OrgRole;
use crate::domain::{DomainError, DomainResult};

/// Acting user resolved from an authenticated request by the (out-of-scope)
/// auth layer: identity, home organization, role.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    pub organization_id: Option<String>,
    pub role: OrgRole,
}

impl UserContext {
    pub fn new(user_id: &str, organization_id: Option<&str>, role: OrgRole) -> Self {
        Self {
            user_id: user_id.to_string(),
            organization_id: organization_id.map(str::to_string),
            role,
        }
    }

    /// A caller with no organization context is always an error, never a
    /// silent allow.
    pub fn require_organization(&self) -> DomainResult<&str> {
        self.organization_id.as_deref().ok_or_else(|| {
            DomainError::OrganizationAccessDenied(format!(
                "user {} has no organization context",
                self.user_id
            ))
        })
    }
}
