use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of a user action. Never mutated after creation; only
/// read, exported, or bulk-deleted by retention cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub organization_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Equality and date-range filters plus pagination for audit reads
#[derive(Debug, Clone)]
pub struct AuditLogFilter {
    pub organization_id: String,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditLogFilter {
    pub fn for_organization(organization_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            user_id: None,
            action: None,
            resource_type: None,
            start_time: None,
            end_time: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// One page of audit entries; `has_more = offset + limit < total_count`
#[derive(Debug, Clone)]
pub struct AuditLogPage {
    pub entries: Vec<AuditLogEntry>,
    pub total_count: i64,
    pub has_more: bool,
}

/// Repository trait for audit log persistence
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AuditLogRepository: Send + Sync {
    async fn append_entry(&self, entry: AuditLogEntry) -> DomainResult<()>;

    async fn query_entries(&self, filter: AuditLogFilter) -> DomainResult<AuditLogPage>;

    /// Delete entries older than the cutoff; returns the deleted row count
    async fn delete_entries_before(
        &self,
        organization_id: &str,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<u64>;
}
