use crate::domain::{
    DomainError, DomainResult, OrganizationQuota, QuotaKind, QuotaOperation, QuotaRepository,
    DEFAULT_MAX_CONTEXT_ITEMS, DEFAULT_MAX_GLOBAL_ACCESS, DEFAULT_MAX_SHARING_REQUESTS,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const QUOTA_COLUMNS: &str = "organization_id, max_context_items, current_context_items, \
     max_global_access, current_global_access, max_sharing_requests, current_sharing_requests, \
     created_at, updated_at";

fn quota_from_row(row: &Row) -> OrganizationQuota {
    OrganizationQuota {
        organization_id: row.get("organization_id"),
        max_context_items: row.get("max_context_items"),
        current_context_items: row.get("current_context_items"),
        max_global_access: row.get("max_global_access"),
        current_global_access: row.get("current_global_access"),
        max_sharing_requests: row.get("max_sharing_requests"),
        current_sharing_requests: row.get("current_sharing_requests"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

/// Column pair backing one quota kind. Values come from `QuotaKind`, never
/// from caller input, so interpolating them into SQL is safe.
fn columns_for(kind: QuotaKind) -> (&'static str, &'static str) {
    match kind {
        QuotaKind::ContextItems => ("current_context_items", "max_context_items"),
        QuotaKind::GlobalAccess => ("current_global_access", "max_global_access"),
        QuotaKind::SharingRequests => ("current_sharing_requests", "max_sharing_requests"),
    }
}

/// PostgreSQL implementation of QuotaRepository trait
#[derive(Clone)]
pub struct PostgresQuotaRepository {
    client: PostgresClient,
}

impl PostgresQuotaRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuotaRepository for PostgresQuotaRepository {
    #[instrument(skip(self))]
    async fn get_or_create_quota(&self, organization_id: &str) -> DomainResult<OrganizationQuota> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        // Lazy creation: insert defaults on first read, returning the
        // existing row when one is already present.
        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO organization_quotas
                         (organization_id, max_context_items, current_context_items,
                          max_global_access, current_global_access,
                          max_sharing_requests, current_sharing_requests,
                          created_at, updated_at)
                     VALUES ($1, $2, 0, $3, 0, $4, 0, $5, $5)
                     ON CONFLICT (organization_id) DO UPDATE
                         SET organization_id = EXCLUDED.organization_id
                     RETURNING {QUOTA_COLUMNS}"
                ),
                &[
                    &organization_id,
                    &DEFAULT_MAX_CONTEXT_ITEMS,
                    &DEFAULT_MAX_GLOBAL_ACCESS,
                    &DEFAULT_MAX_SHARING_REQUESTS,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(quota_from_row(&row))
    }

    #[instrument(skip(self))]
    async fn adjust_usage(
        &self,
        organization_id: &str,
        kind: QuotaKind,
        quantity: i32,
        operation: QuotaOperation,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let (current_column, _) = columns_for(kind);

        // One atomic statement; decrements clamp at zero so counters never go
        // negative even under concurrent adjustments.
        let query = match operation {
            QuotaOperation::Increment => format!(
                "UPDATE organization_quotas
                 SET {current_column} = {current_column} + $1, updated_at = $2
                 WHERE organization_id = $3"
            ),
            QuotaOperation::Decrement => format!(
                "UPDATE organization_quotas
                 SET {current_column} = GREATEST(0, {current_column} - $1), updated_at = $2
                 WHERE organization_id = $3"
            ),
        };

        let rows_affected = conn
            .execute(&query, &[&quantity, &now, &organization_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(
            organization_id,
            kind = kind.as_str(),
            quantity,
            rows_affected,
            "quota usage adjusted"
        );

        Ok(rows_affected)
    }

    #[instrument(skip(self))]
    async fn reset_usage(
        &self,
        organization_id: &str,
        kind: Option<QuotaKind>,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let (query, reset_count) = match kind {
            Some(kind) => {
                let (current_column, _) = columns_for(kind);
                (
                    format!(
                        "UPDATE organization_quotas
                         SET {current_column} = 0, updated_at = $1
                         WHERE organization_id = $2"
                    ),
                    1,
                )
            }
            None => (
                "UPDATE organization_quotas
                 SET current_context_items = 0,
                     current_global_access = 0,
                     current_sharing_requests = 0,
                     updated_at = $1
                 WHERE organization_id = $2"
                    .to_string(),
                3,
            ),
        };

        let rows_affected = conn
            .execute(&query, &[&now, &organization_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if rows_affected == 0 {
            // No row yet means nothing to reset; still idempotent success
            return Ok(0);
        }

        Ok(reset_count)
    }
}
