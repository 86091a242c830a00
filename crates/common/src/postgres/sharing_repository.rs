use crate::domain::{
    CreateSharingRequestRepoInput, DomainError, DomainResult, SharingRequest,
    SharingRequestRepository, SharingStatus,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const REQUEST_COLUMNS: &str = "id, source_organization_id, target_organization_id, item_id, \
     rag_feature, shared_by, status, reason, resolved_by, created_at, resolved_at";

fn request_from_row(row: &Row) -> DomainResult<SharingRequest> {
    let status: String = row.get("status");
    let status = SharingStatus::parse(&status).ok_or_else(|| {
        DomainError::RepositoryError(anyhow::anyhow!("unknown sharing status: {}", status))
    })?;

    Ok(SharingRequest {
        id: row.get("id"),
        source_organization_id: row.get("source_organization_id"),
        target_organization_id: row.get("target_organization_id"),
        item_id: row.get("item_id"),
        rag_feature: row.get("rag_feature"),
        shared_by: row.get("shared_by"),
        status,
        reason: row.get("reason"),
        resolved_by: row.get("resolved_by"),
        created_at: Some(row.get("created_at")),
        resolved_at: row.get("resolved_at"),
    })
}

/// PostgreSQL implementation of SharingRequestRepository trait
#[derive(Clone)]
pub struct PostgresSharingRequestRepository {
    client: PostgresClient,
}

impl PostgresSharingRequestRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SharingRequestRepository for PostgresSharingRequestRepository {
    #[instrument(skip(self, input), fields(request_id = %input.id))]
    async fn insert_request(
        &self,
        input: CreateSharingRequestRepoInput,
    ) -> DomainResult<SharingRequest> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let status = SharingStatus::Pending.as_str();

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO context_sharing_requests
                         (id, source_organization_id, target_organization_id, item_id,
                          rag_feature, shared_by, status, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     RETURNING {REQUEST_COLUMNS}"
                ),
                &[
                    &input.id,
                    &input.source_organization_id,
                    &input.target_organization_id,
                    &input.item_id,
                    &input.rag_feature,
                    &input.shared_by,
                    &status,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(request_id = %input.id, "sharing request created");
        request_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn get_request(&self, request_id: &str) -> DomainResult<Option<SharingRequest>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!("SELECT {REQUEST_COLUMNS} FROM context_sharing_requests WHERE id = $1"),
                &[&request_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(request_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn resolve_request(
        &self,
        request_id: &str,
        status: SharingStatus,
        resolved_by: &str,
        reason: Option<&str>,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let status_str = status.as_str();

        // The status guard makes the transition single-shot: a request that
        // is already terminal affects zero rows.
        let rows_affected = conn
            .execute(
                "UPDATE context_sharing_requests
                 SET status = $1, resolved_by = $2, reason = $3, resolved_at = $4
                 WHERE id = $5 AND status = 'pending'",
                &[&status_str, &resolved_by, &reason, &now, &request_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(request_id, status = status_str, rows_affected, "sharing request resolved");
        Ok(rows_affected)
    }

    #[instrument(skip(self))]
    async fn list_pending_for_target(
        &self,
        target_organization_id: &str,
        rag_feature: Option<&str>,
    ) -> DomainResult<Vec<SharingRequest>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = match rag_feature {
            Some(feature) => {
                conn.query(
                    &format!(
                        "SELECT {REQUEST_COLUMNS} FROM context_sharing_requests
                         WHERE target_organization_id = $1 AND status = 'pending'
                               AND rag_feature = $2
                         ORDER BY created_at"
                    ),
                    &[&target_organization_id, &feature],
                )
                .await
            }
            None => {
                conn.query(
                    &format!(
                        "SELECT {REQUEST_COLUMNS} FROM context_sharing_requests
                         WHERE target_organization_id = $1 AND status = 'pending'
                         ORDER BY created_at"
                    ),
                    &[&target_organization_id],
                )
                .await
            }
        }
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows.iter().map(request_from_row).collect()
    }
}
