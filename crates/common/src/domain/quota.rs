use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default ceilings applied when a quota row is lazily created
pub const DEFAULT_MAX_CONTEXT_ITEMS: i32 = 1000;
pub const DEFAULT_MAX_GLOBAL_ACCESS: i32 = 10;
pub const DEFAULT_MAX_SHARING_REQUESTS: i32 = 50;

/// The three tracked usage categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    ContextItems,
    GlobalAccess,
    SharingRequests,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::ContextItems => "context_items",
            QuotaKind::GlobalAccess => "global_access",
            QuotaKind::SharingRequests => "sharing_requests",
        }
    }
}

/// Direction of a usage adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaOperation {
    Increment,
    Decrement,
}

/// One row per organization tracking numeric usage ceilings.
/// Invariant: every `current_*` counter stays >= 0 (decrements clamp at zero).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationQuota {
    pub organization_id: String,
    pub max_context_items: i32,
    pub current_context_items: i32,
    pub max_global_access: i32,
    pub current_global_access: i32,
    pub max_sharing_requests: i32,
    pub current_sharing_requests: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrganizationQuota {
    pub fn current(&self, kind: QuotaKind) -> i32 {
        match kind {
            QuotaKind::ContextItems => self.current_context_items,
            QuotaKind::GlobalAccess => self.current_global_access,
            QuotaKind::SharingRequests => self.current_sharing_requests,
        }
    }

    pub fn max(&self, kind: QuotaKind) -> i32 {
        match kind {
            QuotaKind::ContextItems => self.max_context_items,
            QuotaKind::GlobalAccess => self.max_global_access,
            QuotaKind::SharingRequests => self.max_sharing_requests,
        }
    }

    /// True when adding `quantity` would push usage past the ceiling
    pub fn would_exceed(&self, kind: QuotaKind, quantity: i32) -> bool {
        self.current(kind) + quantity > self.max(kind)
    }
}

/// Repository trait for quota persistence
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait QuotaRepository: Send + Sync {
    /// Fetch the organization's quota row, creating it with defaults when absent
    async fn get_or_create_quota(&self, organization_id: &str) -> DomainResult<OrganizationQuota>;

    /// Apply an increment or clamped decrement as one atomic statement.
    /// Returns the number of rows affected (zero when the row is missing).
    async fn adjust_usage(
        &self,
        organization_id: &str,
        kind: QuotaKind,
        quantity: i32,
        operation: QuotaOperation,
    ) -> DomainResult<u64>;

    /// Zero one counter, or all of them when `kind` is `None`.
    /// Returns the number of counters reset.
    async fn reset_usage(
        &self,
        organization_id: &str,
        kind: Option<QuotaKind>,
    ) -> DomainResult<u64>;
}
