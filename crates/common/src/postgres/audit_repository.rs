use crate::domain::{
    AuditLogEntry, AuditLogFilter, AuditLogPage, AuditLogRepository, DomainError, DomainResult,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const AUDIT_COLUMNS: &str = "id, user_id, organization_id, action, resource_type, resource_id, \
     details, ip_address, user_agent, created_at";

fn entry_from_row(row: &Row) -> AuditLogEntry {
    AuditLogEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        organization_id: row.get("organization_id"),
        action: row.get("action"),
        resource_type: row.get("resource_type"),
        resource_id: row.get("resource_id"),
        details: row.get("details"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL implementation of AuditLogRepository trait
#[derive(Clone)]
pub struct PostgresAuditLogRepository {
    client: PostgresClient,
}

impl PostgresAuditLogRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Shared WHERE-clause assembly for the count and page queries
    fn build_conditions<'a>(
        filter: &'a AuditLogFilter,
    ) -> (Vec<String>, Vec<&'a (dyn ToSql + Sync)>) {
        let mut conditions = vec!["organization_id = $1".to_string()];
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&filter.organization_id];
        let mut index = 2;

        if let Some(user_id) = &filter.user_id {
            conditions.push(format!("user_id = ${index}"));
            params.push(user_id);
            index += 1;
        }
        if let Some(action) = &filter.action {
            conditions.push(format!("action = ${index}"));
            params.push(action);
            index += 1;
        }
        if let Some(resource_type) = &filter.resource_type {
            conditions.push(format!("resource_type = ${index}"));
            params.push(resource_type);
            index += 1;
        }
        if let Some(start_time) = &filter.start_time {
            conditions.push(format!("created_at >= ${index}"));
            params.push(start_time);
            index += 1;
        }
        if let Some(end_time) = &filter.end_time {
            conditions.push(format!("created_at <= ${index}"));
            params.push(end_time);
        }

        (conditions, params)
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    #[instrument(skip(self, entry), fields(entry_id = %entry.id, action = %entry.action))]
    async fn append_entry(&self, entry: AuditLogEntry) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO audit_logs
                 (id, user_id, organization_id, action, resource_type, resource_id,
                  details, ip_address, user_agent, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &entry.id,
                &entry.user_id,
                &entry.organization_id,
                &entry.action,
                &entry.resource_type,
                &entry.resource_id,
                &entry.details,
                &entry.ip_address,
                &entry.user_agent,
                &entry.created_at,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(entry_id = %entry.id, "audit entry appended");
        Ok(())
    }

    #[instrument(skip(self, filter), fields(organization_id = %filter.organization_id))]
    async fn query_entries(&self, filter: AuditLogFilter) -> DomainResult<AuditLogPage> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let (conditions, params) = Self::build_conditions(&filter);
        let where_clause = conditions.join(" AND ");

        let count_row = conn
            .query_one(
                &format!("SELECT COUNT(*) AS total FROM audit_logs WHERE {where_clause}"),
                &params,
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        let total_count: i64 = count_row.get("total");

        let limit_index = params.len() + 1;
        let offset_index = params.len() + 2;
        let mut page_params = params;
        page_params.push(&filter.limit);
        page_params.push(&filter.offset);

        let rows = conn
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_logs
                     WHERE {where_clause}
                     ORDER BY created_at DESC
                     LIMIT ${limit_index} OFFSET ${offset_index}"
                ),
                &page_params,
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let entries: Vec<AuditLogEntry> = rows.iter().map(entry_from_row).collect();
        let has_more = filter.offset + filter.limit < total_count;

        Ok(AuditLogPage {
            entries,
            total_count,
            has_more,
        })
    }

    #[instrument(skip(self))]
    async fn delete_entries_before(
        &self,
        organization_id: &str,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let deleted = conn
            .execute(
                "DELETE FROM audit_logs WHERE organization_id = $1 AND created_at < $2",
                &[&organization_id, &cutoff],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(organization_id, deleted, "old audit entries removed");
        Ok(deleted)
    }
}
