use std::collections::HashSet;
use std::sync::Arc;

use common::auth::{AccessEvaluator, OrgRole, UserContext};
use common::domain::{
    CreateOrganizationRepoInput, DomainError, DomainResult, Organization, OrganizationRepository,
    UpdateOrganizationRepoInput,
};
use garde::Validate;
use tracing::{debug, instrument};

/// Request to create a tenant, optionally under an existing parent
#[derive(Debug, Clone, Validate)]
pub struct CreateOrganizationRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1, max = 255))]
    pub name: String,
    #[garde(inner(length(min = 1)))]
    pub parent_organization_id: Option<String>,
}

/// Request addressing one organization
#[derive(Debug, Clone, Validate)]
pub struct OrganizationRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
}

/// Request to list every organization (system admin only)
#[derive(Debug, Clone, Validate)]
pub struct ListOrganizationsRequest {
    #[garde(skip)]
    pub user: UserContext,
}

/// Request to rename an organization
#[derive(Debug, Clone, Validate)]
pub struct UpdateOrganizationRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1, max = 255))]
    pub name: String,
}

/// Request to repoint (or clear) an organization's parent
#[derive(Debug, Clone, Validate)]
pub struct SetParentOrganizationRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(inner(length(min = 1)))]
    pub parent_organization_id: Option<String>,
}

/// Tenant lifecycle: creation, hierarchy wiring, rename, soft delete.
/// Hierarchy mutations validate against cycles before touching the store.
pub struct OrganizationService {
    organizations: Arc<dyn OrganizationRepository>,
    evaluator: Arc<dyn AccessEvaluator>,
}

impl OrganizationService {
    pub fn new(
        organizations: Arc<dyn OrganizationRepository>,
        evaluator: Arc<dyn AccessEvaluator>,
    ) -> Self {
        Self {
            organizations,
            evaluator,
        }
    }

    /// Reject a parent assignment whose ancestor chain passes back through
    /// `organization_id`.
    async fn ensure_acyclic(
        &self,
        organization_id: &str,
        new_parent_id: &str,
    ) -> DomainResult<()> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut current_id = new_parent_id.to_string();

        loop {
            if current_id == organization_id {
                return Err(DomainError::CyclicHierarchy(organization_id.to_string()));
            }
            if !visited.insert(current_id.clone()) {
                // Pre-existing loop upstream of the new parent
                return Err(DomainError::CyclicHierarchy(current_id));
            }

            let org = self
                .organizations
                .get_organization(&current_id)
                .await?
                .ok_or_else(|| DomainError::OrganizationNotFound(current_id.clone()))?;

            match org.parent_organization_id {
                Some(parent_id) => current_id = parent_id,
                None => return Ok(()),
            }
        }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_organization(
        &self,
        request: CreateOrganizationRequest,
    ) -> DomainResult<Organization> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::SystemAdmin)
            .await?;

        if let Some(parent_id) = &request.parent_organization_id {
            self.organizations
                .get_organization(parent_id)
                .await?
                .ok_or_else(|| DomainError::OrganizationNotFound(parent_id.clone()))?;
        }

        let organization = self
            .organizations
            .create_organization(CreateOrganizationRepoInput {
                id: xid::new().to_string(),
                name: request.name.clone(),
                parent_organization_id: request.parent_organization_id.clone(),
            })
            .await?;

        debug!(organization_id = %organization.id, "organization created");
        Ok(organization)
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn get_organization(
        &self,
        request: OrganizationRequest,
    ) -> DomainResult<Organization> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        self.organizations
            .get_organization(&request.organization_id)
            .await?
            .ok_or_else(|| DomainError::OrganizationNotFound(request.organization_id.clone()))
    }

    #[instrument(skip(self, request))]
    pub async fn list_organizations(
        &self,
        request: ListOrganizationsRequest,
    ) -> DomainResult<Vec<Organization>> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::SystemAdmin)
            .await?;

        self.organizations.list_organizations().await
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn list_child_organizations(
        &self,
        request: OrganizationRequest,
    ) -> DomainResult<Vec<Organization>> {
        common::garde::validate(&request)?;

        if !self
            .evaluator
            .can_access_organization_hierarchy(&request.user, &request.organization_id)
            .await
        {
            return Err(DomainError::OrganizationAccessDenied(format!(
                "user {} cannot inspect the hierarchy of organization {}",
                request.user.user_id, request.organization_id
            )));
        }

        self.organizations
            .list_child_organizations(&request.organization_id)
            .await
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn update_organization(
        &self,
        request: UpdateOrganizationRequest,
    ) -> DomainResult<Organization> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let organization = self
            .organizations
            .update_organization(UpdateOrganizationRepoInput {
                organization_id: request.organization_id.clone(),
                name: request.name.clone(),
            })
            .await?;

        debug!("organization renamed");
        Ok(organization)
    }

    /// Repoint the parent. Clearing the parent always succeeds; setting one
    /// requires the parent to exist and must not create a cycle.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn set_parent_organization(
        &self,
        request: SetParentOrganizationRequest,
    ) -> DomainResult<()> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::SystemAdmin)
            .await?;

        self.organizations
            .get_organization(&request.organization_id)
            .await?
            .ok_or_else(|| DomainError::OrganizationNotFound(request.organization_id.clone()))?;

        if let Some(parent_id) = &request.parent_organization_id {
            self.organizations
                .get_organization(parent_id)
                .await?
                .ok_or_else(|| DomainError::OrganizationNotFound(parent_id.clone()))?;
            self.ensure_acyclic(&request.organization_id, parent_id).await?;
        }

        self.organizations
            .set_parent_organization(
                &request.organization_id,
                request.parent_organization_id.as_deref(),
            )
            .await?;

        debug!(parent = ?request.parent_organization_id, "parent reassigned");
        Ok(())
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn delete_organization(&self, request: OrganizationRequest) -> DomainResult<()> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::SystemAdmin)
            .await?;

        self.organizations
            .get_organization(&request.organization_id)
            .await?
            .ok_or_else(|| DomainError::OrganizationNotFound(request.organization_id.clone()))?;

        self.organizations
            .delete_organization(&request.organization_id)
            .await?;

        debug!("organization soft-deleted");
        Ok(())
    }
}
