use std::sync::Arc;

use common::auth::{AccessEvaluator, OrgRole, UserContext};
use common::domain::{
    CreateIsolationPolicyRepoInput, DomainError, DomainResult, IsolationPolicy,
    IsolationPolicyRepository, UpdateIsolationPolicyRepoInput,
};
use garde::Validate;
use tracing::{debug, instrument};

/// Request to create an isolation policy for an organization
#[derive(Debug, Clone, Validate)]
pub struct CreateIsolationPolicyRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub policy_type: String,
    #[garde(length(min = 1, max = 255))]
    pub policy_name: String,
    #[garde(skip)]
    pub policy_rules: serde_json::Value,
}

/// Request addressing one policy
#[derive(Debug, Clone, Validate)]
pub struct IsolationPolicyRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub policy_id: String,
}

/// Request to list an organization's policies
#[derive(Debug, Clone, Validate)]
pub struct ListIsolationPoliciesRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
}

/// Request to patch a policy; `None` fields are untouched
#[derive(Debug, Clone, Validate)]
pub struct UpdateIsolationPolicyRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub policy_id: String,
    #[garde(inner(length(min = 1, max = 255)))]
    pub policy_name: Option<String>,
    #[garde(skip)]
    pub policy_rules: Option<serde_json::Value>,
}

/// CRUD over per-organization isolation policies, org-admin gated.
/// Policies are stored and served; enforcement lives with the callers.
pub struct IsolationPolicyService {
    policies: Arc<dyn IsolationPolicyRepository>,
    evaluator: Arc<dyn AccessEvaluator>,
}

impl IsolationPolicyService {
    pub fn new(
        policies: Arc<dyn IsolationPolicyRepository>,
        evaluator: Arc<dyn AccessEvaluator>,
    ) -> Self {
        Self { policies, evaluator }
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, policy_type = %request.policy_type))]
    pub async fn create_isolation_policy(
        &self,
        request: CreateIsolationPolicyRequest,
    ) -> DomainResult<IsolationPolicy> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let policy = self
            .policies
            .insert_policy(CreateIsolationPolicyRepoInput {
                id: xid::new().to_string(),
                organization_id: request.organization_id.clone(),
                policy_type: request.policy_type.clone(),
                policy_name: request.policy_name.clone(),
                policy_rules: request.policy_rules.clone(),
            })
            .await?;

        debug!(policy_id = %policy.id, "isolation policy created");
        Ok(policy)
    }

    #[instrument(skip(self, request), fields(policy_id = %request.policy_id))]
    pub async fn get_isolation_policy(
        &self,
        request: IsolationPolicyRequest,
    ) -> DomainResult<IsolationPolicy> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;

        let policy = self
            .policies
            .get_policy(&request.policy_id)
            .await?
            .ok_or_else(|| DomainError::IsolationPolicyNotFound(request.policy_id.clone()))?;

        self.evaluator
            .require_organization_access(&request.user, &policy.organization_id)
            .await?;

        Ok(policy)
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn list_isolation_policies(
        &self,
        request: ListIsolationPoliciesRequest,
    ) -> DomainResult<Vec<IsolationPolicy>> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        self.policies.list_policies(&request.organization_id).await
    }

    #[instrument(skip(self, request), fields(policy_id = %request.policy_id))]
    pub async fn update_isolation_policy(
        &self,
        request: UpdateIsolationPolicyRequest,
    ) -> DomainResult<()> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;

        let existing = self
            .policies
            .get_policy(&request.policy_id)
            .await?
            .ok_or_else(|| DomainError::IsolationPolicyNotFound(request.policy_id.clone()))?;
        self.evaluator
            .require_organization_access(&request.user, &existing.organization_id)
            .await?;

        let updated = self
            .policies
            .update_policy(UpdateIsolationPolicyRepoInput {
                policy_id: request.policy_id.clone(),
                policy_name: request.policy_name.clone(),
                policy_rules: request.policy_rules.clone(),
            })
            .await?;
        if updated == 0 {
            return Err(DomainError::IsolationPolicyNotFound(request.policy_id.clone()));
        }

        debug!("isolation policy updated");
        Ok(())
    }

    #[instrument(skip(self, request), fields(policy_id = %request.policy_id))]
    pub async fn delete_isolation_policy(
        &self,
        request: IsolationPolicyRequest,
    ) -> DomainResult<()> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;

        let existing = self
            .policies
            .get_policy(&request.policy_id)
            .await?
            .ok_or_else(|| DomainError::IsolationPolicyNotFound(request.policy_id.clone()))?;
        self.evaluator
            .require_organization_access(&request.user, &existing.organization_id)
            .await?;

        let deleted = self.policies.delete_policy(&request.policy_id).await?;
        if deleted == 0 {
            return Err(DomainError::IsolationPolicyNotFound(request.policy_id.clone()));
        }

        debug!("isolation policy deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::auth::MockAccessEvaluator;
    use common::domain::MockIsolationPolicyRepository;

    fn policy(id: &str, org_id: &str) -> IsolationPolicy {
        IsolationPolicy {
            id: id.to_string(),
            organization_id: org_id.to_string(),
            policy_type: "data_residency".to_string(),
            policy_name: "EU data residency".to_string(),
            policy_rules: serde_json::json!({"region": "eu-west-1"}),
            created_at: None,
            updated_at: None,
        }
    }

    fn admin(org_id: &str) -> UserContext {
        UserContext::new("admin-1", Some(org_id), OrgRole::OrgAdmin)
    }

    fn permissive_evaluator() -> MockAccessEvaluator {
        let mut eval = MockAccessEvaluator::new();
        eval.expect_require_role()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        eval.expect_require_organization_access()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        eval
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let mut policies = MockIsolationPolicyRepository::new();
        policies
            .expect_insert_policy()
            .withf(|input| !input.id.is_empty() && input.policy_type == "data_residency")
            .times(1)
            .returning(|input| {
                Box::pin(async move {
                    Ok(IsolationPolicy {
                        id: input.id,
                        organization_id: input.organization_id,
                        policy_type: input.policy_type,
                        policy_name: input.policy_name,
                        policy_rules: input.policy_rules,
                        created_at: None,
                        updated_at: None,
                    })
                })
            });

        let service =
            IsolationPolicyService::new(Arc::new(policies), Arc::new(permissive_evaluator()));
        let created = service
            .create_isolation_policy(CreateIsolationPolicyRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                policy_type: "data_residency".to_string(),
                policy_name: "EU data residency".to_string(),
                policy_rules: serde_json::json!({"region": "eu-west-1"}),
            })
            .await
            .unwrap();

        assert!(!created.id.is_empty());
    }

    #[tokio::test]
    async fn test_requires_org_admin() {
        let policies = MockIsolationPolicyRepository::new();
        let mut eval = MockAccessEvaluator::new();
        eval.expect_require_role().returning(|user, min_role| {
            let denied = user.role < min_role;
            Box::pin(async move {
                if denied {
                    Err(DomainError::PermissionDenied("role too low".to_string()))
                } else {
                    Ok(())
                }
            })
        });

        let service = IsolationPolicyService::new(Arc::new(policies), Arc::new(eval));
        let result = service
            .list_isolation_policies(ListIsolationPoliciesRequest {
                user: UserContext::new("user-1", Some("org-1"), OrgRole::Manager),
                organization_id: "org-1".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_get_missing_policy() {
        let mut policies = MockIsolationPolicyRepository::new();
        policies
            .expect_get_policy()
            .returning(|_| Box::pin(async { Ok(None) }));

        let service =
            IsolationPolicyService::new(Arc::new(policies), Arc::new(permissive_evaluator()));
        let result = service
            .get_isolation_policy(IsolationPolicyRequest {
                user: admin("org-1"),
                policy_id: "pol-404".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::IsolationPolicyNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_patches_named_fields() {
        let mut policies = MockIsolationPolicyRepository::new();
        policies
            .expect_get_policy()
            .returning(|id| {
                let id = id.to_string();
                Box::pin(async move { Ok(Some(policy(&id, "org-1"))) })
            });
        policies
            .expect_update_policy()
            .withf(|input| input.policy_name == Some("Renamed".to_string()) && input.policy_rules.is_none())
            .times(1)
            .returning(|_| Box::pin(async { Ok(1) }));

        let service =
            IsolationPolicyService::new(Arc::new(policies), Arc::new(permissive_evaluator()));
        service
            .update_isolation_policy(UpdateIsolationPolicyRequest {
                user: admin("org-1"),
                policy_id: "pol-1".to_string(),
                policy_name: Some("Renamed".to_string()),
                policy_rules: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_policy_after_get() {
        let mut policies = MockIsolationPolicyRepository::new();
        policies
            .expect_get_policy()
            .returning(|id| {
                let id = id.to_string();
                Box::pin(async move { Ok(Some(policy(&id, "org-1"))) })
            });
        policies
            .expect_delete_policy()
            .returning(|_| Box::pin(async { Ok(0) }));

        let service =
            IsolationPolicyService::new(Arc::new(policies), Arc::new(permissive_evaluator()));
        let result = service
            .delete_isolation_policy(IsolationPolicyRequest {
                user: admin("org-1"),
                policy_id: "pol-1".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::IsolationPolicyNotFound(_))));
    }
}
