use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::auth::{OrgRole, UserContext};
use crate::domain::{
    DomainError, DomainResult, FeatureCatalogRepository, FeatureToggleRepository,
    OrganizationRepository,
};

/// Role- and tenancy-scoped access decisions.
///
/// Predicate methods (`can_*`) never propagate repository failures: a store
/// that cannot be consulted denies. The `require_*` guards convert a denial
/// into the matching error kind so a transport layer can map permission,
/// organization, and feature denials separately.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AccessEvaluator: Send + Sync {
    fn has_role(&self, user: &UserContext, min_role: OrgRole) -> bool;

    /// System admins reach every organization; everyone else only their own.
    /// With `check_parent`, also true when the target's parent is the user's
    /// organization (one level only).
    async fn can_access_organization(
        &self,
        user: &UserContext,
        target_organization_id: &str,
        check_parent: bool,
    ) -> bool;

    /// Explicit toggle wins; an absent toggle falls back to the catalog's
    /// `default_enabled`.
    async fn can_access_rag_feature(
        &self,
        user: &UserContext,
        rag_feature: &str,
        organization_id: &str,
    ) -> bool;

    async fn can_manage_rag_features(&self, user: &UserContext, organization_id: &str) -> bool;

    async fn can_view_rag_features(&self, user: &UserContext) -> bool;

    async fn can_use_rag_feature(
        &self,
        user: &UserContext,
        rag_feature: &str,
        organization_id: &str,
    ) -> bool;

    async fn can_access_organization_hierarchy(
        &self,
        user: &UserContext,
        organization_id: &str,
    ) -> bool;

    /// All organization ids for system admins (empty on store failure),
    /// otherwise the singleton of the user's own organization.
    async fn get_accessible_organizations(&self, user: &UserContext) -> HashSet<String>;

    async fn require_role(&self, user: &UserContext, min_role: OrgRole) -> DomainResult<()>;

    async fn require_organization_access(
        &self,
        user: &UserContext,
        target_organization_id: &str,
    ) -> DomainResult<()>;

    async fn require_feature_access(
        &self,
        user: &UserContext,
        rag_feature: &str,
        organization_id: &str,
    ) -> DomainResult<()>;
}

/// Evaluator backed by the organization, toggle, and catalog repositories
pub struct RoleAccessEvaluator {
    organizations: Arc<dyn OrganizationRepository>,
    toggles: Arc<dyn FeatureToggleRepository>,
    catalog: Arc<dyn FeatureCatalogRepository>,
}

impl RoleAccessEvaluator {
    pub fn new(
        organizations: Arc<dyn OrganizationRepository>,
        toggles: Arc<dyn FeatureToggleRepository>,
        catalog: Arc<dyn FeatureCatalogRepository>,
    ) -> Self {
        Self {
            organizations,
            toggles,
            catalog,
        }
    }

    fn is_own_organization(user: &UserContext, organization_id: &str) -> bool {
        user.organization_id.as_deref() == Some(organization_id)
    }
}

#[async_trait]
impl AccessEvaluator for RoleAccessEvaluator {
    fn has_role(&self, user: &UserContext, min_role: OrgRole) -> bool {
        user.role >= min_role
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    async fn can_access_organization(
        &self,
        user: &UserContext,
        target_organization_id: &str,
        check_parent: bool,
    ) -> bool {
        if user.role == OrgRole::SystemAdmin {
            return true;
        }
        if Self::is_own_organization(user, target_organization_id) {
            return true;
        }
        if !check_parent {
            return false;
        }

        // One level only: the target's parent must be the user's organization.
        // A store failure denies rather than propagating.
        match self.organizations.get_organization(target_organization_id).await {
            Ok(Some(target)) => {
                target.parent_organization_id.is_some()
                    && target.parent_organization_id == user.organization_id
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, organization_id = %target_organization_id, "organization lookup failed, denying access");
                false
            }
        }
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    async fn can_access_rag_feature(
        &self,
        user: &UserContext,
        rag_feature: &str,
        organization_id: &str,
    ) -> bool {
        if user.role == OrgRole::SystemAdmin {
            return true;
        }
        if !Self::is_own_organization(user, organization_id) {
            return false;
        }

        match self.toggles.get_toggle(organization_id, rag_feature).await {
            Ok(Some(toggle)) => toggle.enabled,
            Ok(None) => match self.catalog.get_entry(rag_feature).await {
                Ok(Some(entry)) => entry.default_enabled,
                Ok(None) => false,
                Err(e) => {
                    warn!(error = %e, rag_feature, "catalog lookup failed, denying access");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, rag_feature, "toggle lookup failed, denying access");
                false
            }
        }
    }

    async fn can_manage_rag_features(&self, user: &UserContext, organization_id: &str) -> bool {
        if user.role == OrgRole::SystemAdmin {
            return true;
        }
        user.role >= OrgRole::OrgAdmin && Self::is_own_organization(user, organization_id)
    }

    async fn can_view_rag_features(&self, user: &UserContext) -> bool {
        user.role >= OrgRole::Manager
    }

    async fn can_use_rag_feature(
        &self,
        user: &UserContext,
        rag_feature: &str,
        organization_id: &str,
    ) -> bool {
        user.role >= OrgRole::Salesperson
            && self
                .can_access_rag_feature(user, rag_feature, organization_id)
                .await
    }

    async fn can_access_organization_hierarchy(
        &self,
        user: &UserContext,
        organization_id: &str,
    ) -> bool {
        if user.role == OrgRole::SystemAdmin {
            return true;
        }
        user.role >= OrgRole::Manager && Self::is_own_organization(user, organization_id)
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    async fn get_accessible_organizations(&self, user: &UserContext) -> HashSet<String> {
        if user.role == OrgRole::SystemAdmin {
            return match self.organizations.list_organization_ids().await {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!(error = %e, "organization id listing failed, returning empty set");
                    HashSet::new()
                }
            };
        }

        let mut accessible = HashSet::new();
        if let Some(org_id) = &user.organization_id {
            accessible.insert(org_id.clone());
        }
        accessible
    }

    async fn require_role(&self, user: &UserContext, min_role: OrgRole) -> DomainResult<()> {
        if self.has_role(user, min_role) {
            return Ok(());
        }
        debug!(user_id = %user.user_id, role = user.role.as_str(), required = min_role.as_str(), "role check failed");
        Err(DomainError::PermissionDenied(format!(
            "user {} has role {} but {} is required",
            user.user_id,
            user.role.as_str(),
            min_role.as_str()
        )))
    }

    async fn require_organization_access(
        &self,
        user: &UserContext,
        target_organization_id: &str,
    ) -> DomainResult<()> {
        if self
            .can_access_organization(user, target_organization_id, false)
            .await
        {
            return Ok(());
        }
        Err(DomainError::OrganizationAccessDenied(format!(
            "user {} cannot access organization {}",
            user.user_id, target_organization_id
        )))
    }

    async fn require_feature_access(
        &self,
        user: &UserContext,
        rag_feature: &str,
        organization_id: &str,
    ) -> DomainResult<()> {
        if self
            .can_access_rag_feature(user, rag_feature, organization_id)
            .await
        {
            return Ok(());
        }
        Err(DomainError::FeatureAccessDenied(format!(
            "user {} cannot access feature {} in organization {}",
            user.user_id, rag_feature, organization_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        FeatureCatalogEntry, FeatureToggle, MockFeatureCatalogRepository,
        MockFeatureToggleRepository, MockOrganizationRepository, Organization,
    };

    fn org(id: &str, parent: Option<&str>) -> Organization {
        Organization {
            id: id.to_string(),
            name: format!("Org {}", id),
            parent_organization_id: parent.map(str::to_string),
            deleted_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn toggle(org_id: &str, feature: &str, enabled: bool) -> FeatureToggle {
        FeatureToggle {
            organization_id: org_id.to_string(),
            rag_feature: feature.to_string(),
            enabled,
            is_inherited: false,
            inherited_from: None,
            category: "intelligence".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    fn evaluator(
        orgs: MockOrganizationRepository,
        toggles: MockFeatureToggleRepository,
        catalog: MockFeatureCatalogRepository,
    ) -> RoleAccessEvaluator {
        RoleAccessEvaluator::new(Arc::new(orgs), Arc::new(toggles), Arc::new(catalog))
    }

    fn empty_evaluator() -> RoleAccessEvaluator {
        evaluator(
            MockOrganizationRepository::new(),
            MockFeatureToggleRepository::new(),
            MockFeatureCatalogRepository::new(),
        )
    }

    #[test]
    fn test_has_role_rank_comparison() {
        let eval = empty_evaluator();
        let manager = UserContext::new("u1", Some("org-1"), OrgRole::Manager);
        assert!(eval.has_role(&manager, OrgRole::Salesperson));
        assert!(eval.has_role(&manager, OrgRole::Manager));
        assert!(!eval.has_role(&manager, OrgRole::OrgAdmin));
    }

    #[tokio::test]
    async fn test_system_admin_accesses_any_organization() {
        let eval = empty_evaluator();
        let admin = UserContext::new("u1", None, OrgRole::SystemAdmin);
        assert!(eval.can_access_organization(&admin, "org-x", false).await);
    }

    #[tokio::test]
    async fn test_same_organization_access() {
        let eval = empty_evaluator();
        let user = UserContext::new("u1", Some("org-1"), OrgRole::User);
        assert!(eval.can_access_organization(&user, "org-1", false).await);
        assert!(!eval.can_access_organization(&user, "org-2", false).await);
    }

    #[tokio::test]
    async fn test_parent_access_one_level() {
        let mut orgs = MockOrganizationRepository::new();
        orgs.expect_get_organization()
            .returning(|_| Box::pin(async { Ok(Some(org("org-child", Some("org-1")))) }));
        let eval = evaluator(
            orgs,
            MockFeatureToggleRepository::new(),
            MockFeatureCatalogRepository::new(),
        );

        let user = UserContext::new("u1", Some("org-1"), OrgRole::Manager);
        assert!(eval.can_access_organization(&user, "org-child", true).await);
        // check_parent off: same lookup is denied
        assert!(!eval.can_access_organization(&user, "org-child", false).await);
    }

    #[tokio::test]
    async fn test_parent_access_store_error_denies() {
        let mut orgs = MockOrganizationRepository::new();
        orgs.expect_get_organization().returning(|_| {
            Box::pin(async { Err(DomainError::RepositoryError(anyhow::anyhow!("down"))) })
        });
        let eval = evaluator(
            orgs,
            MockFeatureToggleRepository::new(),
            MockFeatureCatalogRepository::new(),
        );

        let user = UserContext::new("u1", Some("org-1"), OrgRole::Manager);
        assert!(!eval.can_access_organization(&user, "org-child", true).await);
    }

    #[tokio::test]
    async fn test_feature_access_explicit_toggle_wins() {
        let mut toggles = MockFeatureToggleRepository::new();
        toggles
            .expect_get_toggle()
            .returning(|_, _| Box::pin(async { Ok(Some(toggle("org-1", "sales_intelligence", false))) }));
        let eval = evaluator(
            MockOrganizationRepository::new(),
            toggles,
            MockFeatureCatalogRepository::new(),
        );

        let user = UserContext::new("u1", Some("org-1"), OrgRole::Manager);
        assert!(
            !eval
                .can_access_rag_feature(&user, "sales_intelligence", "org-1")
                .await
        );
    }

    #[tokio::test]
    async fn test_feature_access_catalog_default_fallback() {
        let mut toggles = MockFeatureToggleRepository::new();
        toggles
            .expect_get_toggle()
            .returning(|_, _| Box::pin(async { Ok(None) }));
        let mut catalog = MockFeatureCatalogRepository::new();
        catalog.expect_get_entry().returning(|_| {
            Box::pin(async {
                Ok(Some(FeatureCatalogEntry {
                    rag_feature: "call_summaries".to_string(),
                    default_enabled: true,
                    category: "intelligence".to_string(),
                    max_features: 5,
                }))
            })
        });
        let eval = evaluator(MockOrganizationRepository::new(), toggles, catalog);

        let user = UserContext::new("u1", Some("org-1"), OrgRole::User);
        assert!(
            eval.can_access_rag_feature(&user, "call_summaries", "org-1")
                .await
        );
    }

    #[tokio::test]
    async fn test_feature_access_unknown_feature_denied() {
        let mut toggles = MockFeatureToggleRepository::new();
        toggles
            .expect_get_toggle()
            .returning(|_, _| Box::pin(async { Ok(None) }));
        let mut catalog = MockFeatureCatalogRepository::new();
        catalog
            .expect_get_entry()
            .returning(|_| Box::pin(async { Ok(None) }));
        let eval = evaluator(MockOrganizationRepository::new(), toggles, catalog);

        let user = UserContext::new("u1", Some("org-1"), OrgRole::User);
        assert!(!eval.can_access_rag_feature(&user, "nonexistent", "org-1").await);
    }

    #[tokio::test]
    async fn test_feature_access_cross_org_denied() {
        let eval = empty_evaluator();
        let user = UserContext::new("u1", Some("org-1"), OrgRole::OrgAdmin);
        assert!(
            !eval
                .can_access_rag_feature(&user, "sales_intelligence", "org-2")
                .await
        );
    }

    #[tokio::test]
    async fn test_manage_requires_org_admin_in_own_org() {
        let eval = empty_evaluator();
        let manager = UserContext::new("u1", Some("org-1"), OrgRole::Manager);
        let org_admin = UserContext::new("u2", Some("org-1"), OrgRole::OrgAdmin);
        assert!(!eval.can_manage_rag_features(&manager, "org-1").await);
        assert!(eval.can_manage_rag_features(&org_admin, "org-1").await);
        assert!(!eval.can_manage_rag_features(&org_admin, "org-2").await);
    }

    #[tokio::test]
    async fn test_view_allowed_for_manager_tier_anywhere() {
        let eval = empty_evaluator();
        let manager = UserContext::new("u1", Some("org-1"), OrgRole::Manager);
        let salesperson = UserContext::new("u2", Some("org-1"), OrgRole::Salesperson);
        assert!(eval.can_view_rag_features(&manager).await);
        assert!(!eval.can_view_rag_features(&salesperson).await);
    }

    #[tokio::test]
    async fn test_accessible_organizations_system_admin() {
        let mut orgs = MockOrganizationRepository::new();
        orgs.expect_list_organization_ids().returning(|| {
            Box::pin(async { Ok(vec!["org-1".to_string(), "org-2".to_string()]) })
        });
        let eval = evaluator(
            orgs,
            MockFeatureToggleRepository::new(),
            MockFeatureCatalogRepository::new(),
        );

        let admin = UserContext::new("u1", None, OrgRole::SystemAdmin);
        let accessible = eval.get_accessible_organizations(&admin).await;
        assert_eq!(accessible.len(), 2);
        assert!(accessible.contains("org-2"));
    }

    #[tokio::test]
    async fn test_accessible_organizations_store_error_empty() {
        let mut orgs = MockOrganizationRepository::new();
        orgs.expect_list_organization_ids().returning(|| {
            Box::pin(async { Err(DomainError::RepositoryError(anyhow::anyhow!("down"))) })
        });
        let eval = evaluator(
            orgs,
            MockFeatureToggleRepository::new(),
            MockFeatureCatalogRepository::new(),
        );

        let admin = UserContext::new("u1", None, OrgRole::SystemAdmin);
        assert!(eval.get_accessible_organizations(&admin).await.is_empty());
    }

    #[tokio::test]
    async fn test_accessible_organizations_regular_user() {
        let eval = empty_evaluator();
        let user = UserContext::new("u1", Some("org-1"), OrgRole::User);
        let accessible = eval.get_accessible_organizations(&user).await;
        assert_eq!(accessible.len(), 1);
        assert!(accessible.contains("org-1"));

        let orphan = UserContext::new("u2", None, OrgRole::User);
        assert!(eval.get_accessible_organizations(&orphan).await.is_empty());
    }

    #[tokio::test]
    async fn test_require_guards_distinct_error_kinds() {
        let mut toggles = MockFeatureToggleRepository::new();
        toggles
            .expect_get_toggle()
            .returning(|_, _| Box::pin(async { Ok(None) }));
        let mut catalog = MockFeatureCatalogRepository::new();
        catalog
            .expect_get_entry()
            .returning(|_| Box::pin(async { Ok(None) }));
        let eval = evaluator(MockOrganizationRepository::new(), toggles, catalog);

        let user = UserContext::new("u1", Some("org-1"), OrgRole::Manager);
        assert!(matches!(
            eval.require_role(&user, OrgRole::OrgAdmin).await,
            Err(DomainError::PermissionDenied(_))
        ));
        assert!(matches!(
            eval.require_organization_access(&user, "org-2").await,
            Err(DomainError::OrganizationAccessDenied(_))
        ));
        assert!(matches!(
            eval.require_feature_access(&user, "nonexistent", "org-1").await,
            Err(DomainError::FeatureAccessDenied(_))
        ));
    }
}
