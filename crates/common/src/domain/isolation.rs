use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-organization isolation policy record. Plain CRUD data; nothing in the
/// core enforces the rules beyond lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationPolicy {
    pub id: String,
    pub organization_id: String,
    pub policy_type: String,
    pub policy_name: String,
    pub policy_rules: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateIsolationPolicyRepoInput {
    pub id: String,
    pub organization_id: String,
    pub policy_type: String,
    pub policy_name: String,
    pub policy_rules: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct UpdateIsolationPolicyRepoInput {
    pub policy_id: String,
    pub policy_name: Option<String>,
    pub policy_rules: Option<serde_json::Value>,
}

/// Repository trait for isolation policy persistence
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IsolationPolicyRepository: Send + Sync {
    async fn insert_policy(
        &self,
        input: CreateIsolationPolicyRepoInput,
    ) -> DomainResult<IsolationPolicy>;

    async fn get_policy(&self, policy_id: &str) -> DomainResult<Option<IsolationPolicy>>;

    async fn list_policies(&self, organization_id: &str) -> DomainResult<Vec<IsolationPolicy>>;

    async fn update_policy(&self, input: UpdateIsolationPolicyRepoInput) -> DomainResult<u64>;

    async fn delete_policy(&self, policy_id: &str) -> DomainResult<u64>;
}
