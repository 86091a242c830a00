use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("Organization already exists: {0}")]
    OrganizationAlreadyExists(String),

    #[error("Organization has no parent: {0}")]
    NoParentOrganization(String),

    #[error("Cyclic organization hierarchy detected at: {0}")]
    CyclicHierarchy(String),

    #[error("RAG feature not in catalog: {0}")]
    FeatureNotFound(String),

    #[error("Feature toggle not found for organization {0}: {1}")]
    FeatureToggleNotFound(String, String),

    #[error("Quota record not found for organization: {0}")]
    QuotaNotFound(String),

    #[error(
        "Quota exceeded for organization {organization_id}: {quota_kind} at {current}/{max}, requested {requested}"
    )]
    QuotaExceeded {
        organization_id: String,
        quota_kind: String,
        current: i32,
        max: i32,
        requested: i32,
    },

    #[error("Duplicate context item: {0}")]
    DuplicateContextItem(String),

    #[error("Context item not found: {0}")]
    ContextItemNotFound(String),

    #[error("Sharing request not found: {0}")]
    SharingRequestNotFound(String),

    #[error("Sharing request already resolved: {0}")]
    SharingRequestAlreadyResolved(String),

    #[error("Isolation policy not found: {0}")]
    IsolationPolicyNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Organization access denied: {0}")]
    OrganizationAccessDenied(String),

    #[error("Feature access denied: {0}")]
    FeatureAccessDenied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
