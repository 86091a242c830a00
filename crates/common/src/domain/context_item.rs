use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Knowledge-base entry scoped to one organization and RAG feature.
/// `item_id` is caller-supplied and unique within the (org, feature) scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub organization_id: String,
    pub rag_feature: String,
    pub item_id: String,
    pub item_type: String,
    pub title: String,
    pub content: String,
    pub priority: i32,
    pub confidence_score: f64,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Platform-wide knowledge-base entry, not scoped to an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalContextItem {
    pub item_id: String,
    pub item_type: String,
    pub title: String,
    pub content: String,
    pub priority: i32,
    pub confidence_score: f64,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateContextItemRepoInput {
    pub organization_id: String,
    pub rag_feature: String,
    pub item_id: String,
    pub item_type: String,
    pub title: String,
    pub content: String,
    pub priority: i32,
    pub confidence_score: f64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct CreateGlobalContextItemRepoInput {
    pub item_id: String,
    pub item_type: String,
    pub title: String,
    pub content: String,
    pub priority: i32,
    pub confidence_score: f64,
    pub status: String,
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateContextItemRepoInput {
    pub organization_id: String,
    pub rag_feature: String,
    pub item_id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub priority: Option<i32>,
    pub confidence_score: Option<f64>,
    pub status: Option<String>,
}

/// Repository trait for context item persistence
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ContextItemRepository: Send + Sync {
    /// Insert; a duplicate `item_id` within the scope maps to
    /// `DomainError::DuplicateContextItem`.
    async fn insert_item(&self, input: CreateContextItemRepoInput) -> DomainResult<ContextItem>;

    async fn get_item(
        &self,
        organization_id: &str,
        rag_feature: &str,
        item_id: &str,
    ) -> DomainResult<Option<ContextItem>>;

    async fn update_item(&self, input: UpdateContextItemRepoInput) -> DomainResult<u64>;

    async fn delete_item(
        &self,
        organization_id: &str,
        rag_feature: &str,
        item_id: &str,
    ) -> DomainResult<u64>;

    async fn list_items(
        &self,
        organization_id: &str,
        rag_feature: &str,
    ) -> DomainResult<Vec<ContextItem>>;

    async fn insert_global_item(
        &self,
        input: CreateGlobalContextItemRepoInput,
    ) -> DomainResult<GlobalContextItem>;

    async fn get_global_item(&self, item_id: &str) -> DomainResult<Option<GlobalContextItem>>;
}
