use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-organization enabled/disabled record for a RAG feature.
/// Unique per (organization, feature); toggled rather than hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureToggle {
    pub organization_id: String,
    pub rag_feature: String,
    pub enabled: bool,
    pub is_inherited: bool,
    pub inherited_from: Option<String>,
    pub category: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Read-only catalog entry describing a RAG feature.
/// `max_features` caps how many features of the entry's category one
/// organization may have enabled at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCatalogEntry {
    pub rag_feature: String,
    pub default_enabled: bool,
    pub category: String,
    pub max_features: i32,
}

/// Input to create or replace a feature toggle
#[derive(Debug, Clone)]
pub struct UpsertToggleRepoInput {
    pub organization_id: String,
    pub rag_feature: String,
    pub enabled: bool,
    pub is_inherited: bool,
    pub inherited_from: Option<String>,
    pub category: String,
}

/// Repository trait for feature toggle persistence
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait FeatureToggleRepository: Send + Sync {
    async fn get_toggle(
        &self,
        organization_id: &str,
        rag_feature: &str,
    ) -> DomainResult<Option<FeatureToggle>>;

    async fn list_toggles(&self, organization_id: &str) -> DomainResult<Vec<FeatureToggle>>;

    async fn upsert_toggle(&self, input: UpsertToggleRepoInput) -> DomainResult<FeatureToggle>;

    /// Flip an existing toggle. Returns the number of rows affected (zero when
    /// no toggle exists for the pair).
    async fn set_enabled(
        &self,
        organization_id: &str,
        rag_feature: &str,
        enabled: bool,
    ) -> DomainResult<u64>;

    async fn count_enabled_in_category(
        &self,
        organization_id: &str,
        category: &str,
    ) -> DomainResult<i64>;
}

/// Repository trait for the read-only feature catalog
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait FeatureCatalogRepository: Send + Sync {
    async fn get_entry(&self, rag_feature: &str) -> DomainResult<Option<FeatureCatalogEntry>>;

    async fn list_entries(&self) -> DomainResult<Vec<FeatureCatalogEntry>>;
}
