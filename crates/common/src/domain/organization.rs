use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant. Organizations form a tree through `parent_organization_id`;
/// ancestry walks must defend against cyclic parent pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub parent_organization_id: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input to create an organization (ID generated by the service layer)
#[derive(Debug, Clone)]
pub struct CreateOrganizationRepoInput {
    pub id: String,
    pub name: String,
    pub parent_organization_id: Option<String>,
}

/// Input to rename an organization
#[derive(Debug, Clone)]
pub struct UpdateOrganizationRepoInput {
    pub organization_id: String,
    pub name: String,
}

/// Repository trait for organization persistence
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait OrganizationRepository: Send + Sync {
    async fn create_organization(
        &self,
        input: CreateOrganizationRepoInput,
    ) -> DomainResult<Organization>;

    async fn get_organization(&self, organization_id: &str) -> DomainResult<Option<Organization>>;

    async fn list_organizations(&self) -> DomainResult<Vec<Organization>>;

    async fn list_child_organizations(&self, parent_id: &str) -> DomainResult<Vec<Organization>>;

    async fn list_organization_ids(&self) -> DomainResult<Vec<String>>;

    async fn update_organization(
        &self,
        input: UpdateOrganizationRepoInput,
    ) -> DomainResult<Organization>;

    /// Repoint (or clear) the parent pointer. Cycle validation happens in the
    /// service layer before this is called.
    async fn set_parent_organization(
        &self,
        organization_id: &str,
        parent_organization_id: Option<&str>,
    ) -> DomainResult<()>;

    /// Soft delete (sets `deleted_at`)
    async fn delete_organization(&self, organization_id: &str) -> DomainResult<()>;
}
