use std::collections::HashSet;
use std::sync::Arc;

use common::auth::{AccessEvaluator, UserContext};
use common::domain::{
    DomainError, DomainResult, FeatureCatalogRepository, FeatureToggle, FeatureToggleRepository,
    Organization, OrganizationRepository, UpsertToggleRepoInput,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

// ============================================================================
// Service Request Types
// ============================================================================

/// Request to enable a RAG feature for an organization
#[derive(Debug, Clone, Validate)]
pub struct GrantFeatureRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
}

/// Request to disable a RAG feature for an organization
#[derive(Debug, Clone, Validate)]
pub struct RevokeFeatureRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
}

/// Request to read feature state for an organization
#[derive(Debug, Clone, Validate)]
pub struct FeatureReadRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
}

/// Request to inspect one feature of an organization
#[derive(Debug, Clone, Validate)]
pub struct FeatureInspectRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
}

// ============================================================================
// Result Types
// ============================================================================

/// A feature setting contributed by an ancestor organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritedFeature {
    pub rag_feature: String,
    pub enabled: bool,
    pub inherited_from: String,
}

/// Where an effective feature setting came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    Own,
    Inherited,
}

/// A feature setting after override resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveFeature {
    pub rag_feature: String,
    pub enabled: bool,
    pub source: FeatureSource,
    pub inherited_from: Option<String>,
}

/// Ordered ancestry from the organization up to its topmost ancestor
#[derive(Debug, Clone)]
pub struct InheritanceChain {
    pub chain: Vec<Organization>,
    pub is_at_top: bool,
}

/// Outcome of a `can_enable_feature` check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableCheck {
    pub can_enable: bool,
    pub reason: Option<String>,
}

pub const REASON_FEATURE_NOT_IN_CATALOG: &str = "feature_not_in_catalog";
pub const REASON_ALREADY_ENABLED: &str = "already_enabled";
pub const REASON_PARENT_FEATURE_DISABLED: &str = "parent_feature_disabled";
pub const REASON_MAX_FEATURES_REACHED: &str = "max_features_reached";

/// Comparison of an organization's own setting against its inherited value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideStatus {
    pub is_override: bool,
    pub own_value: Option<bool>,
    pub inherited_value: Option<bool>,
}

/// Domain service for tenant feature toggles and hierarchy inheritance.
///
/// Inheritance resolves over the full ancestry chain, nearest ancestor wins;
/// an organization's own toggle always overrides anything inherited.
pub struct TenantFeatureService {
    organizations: Arc<dyn OrganizationRepository>,
    toggles: Arc<dyn FeatureToggleRepository>,
    catalog: Arc<dyn FeatureCatalogRepository>,
    evaluator: Arc<dyn AccessEvaluator>,
}

impl TenantFeatureService {
    pub fn new(
        organizations: Arc<dyn OrganizationRepository>,
        toggles: Arc<dyn FeatureToggleRepository>,
        catalog: Arc<dyn FeatureCatalogRepository>,
        evaluator: Arc<dyn AccessEvaluator>,
    ) -> Self {
        Self {
            organizations,
            toggles,
            catalog,
            evaluator,
        }
    }

    /// Walk from the organization to its topmost ancestor (inclusive).
    /// Fails fast with `CyclicHierarchy` when a parent pointer loops.
    async fn ancestor_chain(&self, organization_id: &str) -> DomainResult<Vec<Organization>> {
        let mut chain = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current_id = organization_id.to_string();

        loop {
            if !visited.insert(current_id.clone()) {
                return Err(DomainError::CyclicHierarchy(current_id));
            }

            let org = self
                .organizations
                .get_organization(&current_id)
                .await?
                .ok_or_else(|| DomainError::OrganizationNotFound(current_id.clone()))?;

            let parent = org.parent_organization_id.clone();
            chain.push(org);

            match parent {
                Some(parent_id) => current_id = parent_id,
                None => break,
            }
        }

        Ok(chain)
    }

    /// Nearest-ancestor-wins merge of all ancestors' toggle rows
    async fn resolve_inherited(&self, organization_id: &str) -> DomainResult<Vec<InheritedFeature>> {
        let chain = self.ancestor_chain(organization_id).await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut inherited = Vec::new();

        for ancestor in chain.iter().skip(1) {
            let toggles = self.toggles.list_toggles(&ancestor.id).await?;
            for toggle in toggles {
                if seen.insert(toggle.rag_feature.clone()) {
                    inherited.push(InheritedFeature {
                        rag_feature: toggle.rag_feature,
                        enabled: toggle.enabled,
                        inherited_from: ancestor.id.clone(),
                    });
                }
            }
        }

        Ok(inherited)
    }

    async fn require_manage(&self, user: &UserContext, organization_id: &str) -> DomainResult<()> {
        if self
            .evaluator
            .can_manage_rag_features(user, organization_id)
            .await
        {
            return Ok(());
        }
        Err(DomainError::PermissionDenied(format!(
            "user {} cannot manage features of organization {}",
            user.user_id, organization_id
        )))
    }

    async fn require_view(&self, user: &UserContext) -> DomainResult<()> {
        if self.evaluator.can_view_rag_features(user).await {
            return Ok(());
        }
        Err(DomainError::PermissionDenied(format!(
            "user {} cannot view feature configuration",
            user.user_id
        )))
    }

    /// Enable a catalog feature for an organization (explicit own toggle)
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, rag_feature = %request.rag_feature))]
    pub async fn grant_tenant_access(
        &self,
        request: GrantFeatureRequest,
    ) -> DomainResult<FeatureToggle> {
        common::garde::validate(&request)?;
        self.require_manage(&request.user, &request.organization_id)
            .await?;

        let entry = self
            .catalog
            .get_entry(&request.rag_feature)
            .await?
            .ok_or_else(|| DomainError::FeatureNotFound(request.rag_feature.clone()))?;

        let toggle = self
            .toggles
            .upsert_toggle(UpsertToggleRepoInput {
                organization_id: request.organization_id.clone(),
                rag_feature: request.rag_feature.clone(),
                enabled: true,
                is_inherited: false,
                inherited_from: None,
                category: entry.category,
            })
            .await?;

        debug!(rag_feature = %request.rag_feature, "tenant access granted");
        Ok(toggle)
    }

    /// Disable a feature for an organization. The toggle row is kept and
    /// flipped off, never deleted.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, rag_feature = %request.rag_feature))]
    pub async fn revoke_tenant_access(
        &self,
        request: RevokeFeatureRequest,
    ) -> DomainResult<FeatureToggle> {
        common::garde::validate(&request)?;
        self.require_manage(&request.user, &request.organization_id)
            .await?;

        let entry = self
            .catalog
            .get_entry(&request.rag_feature)
            .await?
            .ok_or_else(|| DomainError::FeatureNotFound(request.rag_feature.clone()))?;

        let toggle = self
            .toggles
            .upsert_toggle(UpsertToggleRepoInput {
                organization_id: request.organization_id.clone(),
                rag_feature: request.rag_feature.clone(),
                enabled: false,
                is_inherited: false,
                inherited_from: None,
                category: entry.category,
            })
            .await?;

        debug!(rag_feature = %request.rag_feature, "tenant access revoked");
        Ok(toggle)
    }

    /// Feature settings contributed by ancestors. Empty for organizations
    /// without a parent.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn get_inherited_features(
        &self,
        request: FeatureReadRequest,
    ) -> DomainResult<Vec<InheritedFeature>> {
        common::garde::validate(&request)?;
        self.require_view(&request.user).await?;

        self.resolve_inherited(&request.organization_id).await
    }

    /// Own toggles unioned with inherited settings; the organization's own
    /// setting wins on collision.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn get_effective_features(
        &self,
        request: FeatureReadRequest,
    ) -> DomainResult<Vec<EffectiveFeature>> {
        common::garde::validate(&request)?;
        self.require_view(&request.user).await?;

        let own = self.toggles.list_toggles(&request.organization_id).await?;
        let own_keys: HashSet<String> = own.iter().map(|t| t.rag_feature.clone()).collect();

        let mut effective: Vec<EffectiveFeature> = own
            .into_iter()
            .map(|toggle| EffectiveFeature {
                rag_feature: toggle.rag_feature,
                enabled: toggle.enabled,
                source: FeatureSource::Own,
                inherited_from: None,
            })
            .collect();

        for inherited in self.resolve_inherited(&request.organization_id).await? {
            if !own_keys.contains(&inherited.rag_feature) {
                effective.push(EffectiveFeature {
                    rag_feature: inherited.rag_feature,
                    enabled: inherited.enabled,
                    source: FeatureSource::Inherited,
                    inherited_from: Some(inherited.inherited_from),
                });
            }
        }

        debug!(count = effective.len(), "effective features resolved");
        Ok(effective)
    }

    /// Ordered ancestry for an organization
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn get_inheritance_chain(
        &self,
        request: FeatureReadRequest,
    ) -> DomainResult<InheritanceChain> {
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

        let chain = self.ancestor_chain(&request.organization_id).await?;
        let is_at_top = chain
            .first()
            .map(|org| org.parent_organization_id.is_none())
            .unwrap_or(true);

        Ok(InheritanceChain { chain, is_at_top })
    }

    /// Whether the feature could be enabled right now, and if not, why
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, rag_feature = %request.rag_feature))]
    pub async fn can_enable_feature(
        &self,
        request: FeatureInspectRequest,
    ) -> DomainResult<EnableCheck> {
        common::garde::validate(&request)?;
        self.require_view(&request.user).await?;

        let Some(entry) = self.catalog.get_entry(&request.rag_feature).await? else {
            return Ok(EnableCheck {
                can_enable: false,
                reason: Some(REASON_FEATURE_NOT_IN_CATALOG.to_string()),
            });
        };

        let own = self
            .toggles
            .get_toggle(&request.organization_id, &request.rag_feature)
            .await?;
        if own.as_ref().is_some_and(|t| t.enabled) {
            return Ok(EnableCheck {
                can_enable: false,
                reason: Some(REASON_ALREADY_ENABLED.to_string()),
            });
        }

        let org = self
            .organizations
            .get_organization(&request.organization_id)
            .await?
            .ok_or_else(|| DomainError::OrganizationNotFound(request.organization_id.clone()))?;

        // A child cannot be more permissive than its parent: the parent must
        // have the feature explicitly enabled.
        if let Some(parent_id) = &org.parent_organization_id {
            let parent_toggle = self
                .toggles
                .get_toggle(parent_id, &request.rag_feature)
                .await?;
            if !parent_toggle.is_some_and(|t| t.enabled) {
                return Ok(EnableCheck {
                    can_enable: false,
                    reason: Some(REASON_PARENT_FEATURE_DISABLED.to_string()),
                });
            }
        }

        let enabled_in_category = self
            .toggles
            .count_enabled_in_category(&request.organization_id, &entry.category)
            .await?;
        if enabled_in_category >= i64::from(entry.max_features) {
            return Ok(EnableCheck {
                can_enable: false,
                reason: Some(REASON_MAX_FEATURES_REACHED.to_string()),
            });
        }

        Ok(EnableCheck {
            can_enable: true,
            reason: None,
        })
    }

    /// Compare the organization's own setting with the nearest inherited one
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, rag_feature = %request.rag_feature))]
    pub async fn get_override_status(
        &self,
        request: FeatureInspectRequest,
    ) -> DomainResult<OverrideStatus> {
        common::garde::validate(&request)?;
        self.require_view(&request.user).await?;

        let own_value = self
            .toggles
            .get_toggle(&request.organization_id, &request.rag_feature)
            .await?
            .map(|t| t.enabled);

        let inherited_value = self
            .resolve_inherited(&request.organization_id)
            .await?
            .into_iter()
            .find(|f| f.rag_feature == request.rag_feature)
            .map(|f| f.enabled);

        let is_override = match (own_value, inherited_value) {
            (Some(own), Some(inherited)) => own != inherited,
            _ => false,
        };

        Ok(OverrideStatus {
            is_override,
            own_value,
            inherited_value,
        })
    }
}
