use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a sharing request: `Pending` is the only non-terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingStatus {
    Pending,
    Approved,
    Rejected,
}

impl SharingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharingStatus::Pending => "pending",
            SharingStatus::Approved => "approved",
            SharingStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<SharingStatus> {
        match value {
            "pending" => Some(SharingStatus::Pending),
            "approved" => Some(SharingStatus::Approved),
            "rejected" => Some(SharingStatus::Rejected),
            _ => None,
        }
    }
}

/// One organization offering a context item to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingRequest {
    pub id: String,
    pub source_organization_id: String,
    pub target_organization_id: String,
    pub item_id: String,
    pub rag_feature: String,
    pub shared_by: String,
    pub status: SharingStatus,
    pub reason: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateSharingRequestRepoInput {
    pub id: String,
    pub source_organization_id: String,
    pub target_organization_id: String,
    pub item_id: String,
    pub rag_feature: String,
    pub shared_by: String,
}

/// Repository trait for sharing request persistence
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SharingRequestRepository: Send + Sync {
    async fn insert_request(
        &self,
        input: CreateSharingRequestRepoInput,
    ) -> DomainResult<SharingRequest>;

    async fn get_request(&self, request_id: &str) -> DomainResult<Option<SharingRequest>>;

    /// Transition a request out of `pending`. The update is guarded on the
    /// current status, so a request can be resolved at most once; returns the
    /// number of rows affected.
    async fn resolve_request(
        &self,
        request_id: &str,
        status: SharingStatus,
        resolved_by: &str,
        reason: Option<&str>,
    ) -> DomainResult<u64>;

    async fn list_pending_for_target(
        &self,
        target_organization_id: &str,
        rag_feature: Option<&str>,
    ) -> DomainResult<Vec<SharingRequest>>;
}
