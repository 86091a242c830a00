use crate::domain::{
    CreateIsolationPolicyRepoInput, DomainError, DomainResult, IsolationPolicy,
    IsolationPolicyRepository, UpdateIsolationPolicyRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const POLICY_COLUMNS: &str =
    "id, organization_id, policy_type, policy_name, policy_rules, created_at, updated_at";

fn policy_from_row(row: &Row) -> IsolationPolicy {
    IsolationPolicy {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        policy_type: row.get("policy_type"),
        policy_name: row.get("policy_name"),
        policy_rules: row.get("policy_rules"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

/// PostgreSQL implementation of IsolationPolicyRepository trait
#[derive(Clone)]
pub struct PostgresIsolationPolicyRepository {
    client: PostgresClient,
}

impl PostgresIsolationPolicyRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IsolationPolicyRepository for PostgresIsolationPolicyRepository {
    #[instrument(skip(self, input), fields(policy_id = %input.id))]
    async fn insert_policy(
        &self,
        input: CreateIsolationPolicyRepoInput,
    ) -> DomainResult<IsolationPolicy> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO isolation_policies
                         (id, organization_id, policy_type, policy_name, policy_rules,
                          created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $6)
                     RETURNING {POLICY_COLUMNS}"
                ),
                &[
                    &input.id,
                    &input.organization_id,
                    &input.policy_type,
                    &input.policy_name,
                    &input.policy_rules,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(policy_id = %input.id, "isolation policy created");
        Ok(policy_from_row(&row))
    }

    #[instrument(skip(self))]
    async fn get_policy(&self, policy_id: &str) -> DomainResult<Option<IsolationPolicy>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!("SELECT {POLICY_COLUMNS} FROM isolation_policies WHERE id = $1"),
                &[&policy_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(policy_from_row))
    }

    #[instrument(skip(self))]
    async fn list_policies(&self, organization_id: &str) -> DomainResult<Vec<IsolationPolicy>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {POLICY_COLUMNS} FROM isolation_policies
                     WHERE organization_id = $1
                     ORDER BY policy_name"
                ),
                &[&organization_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(policy_from_row).collect())
    }

    #[instrument(skip(self, input), fields(policy_id = %input.policy_id))]
    async fn update_policy(&self, input: UpdateIsolationPolicyRepoInput) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let mut assignments: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut index = 1;

        if let Some(policy_name) = &input.policy_name {
            assignments.push(format!("policy_name = ${index}"));
            params.push(policy_name);
            index += 1;
        }
        if let Some(policy_rules) = &input.policy_rules {
            assignments.push(format!("policy_rules = ${index}"));
            params.push(policy_rules);
            index += 1;
        }

        if assignments.is_empty() {
            return Ok(0);
        }

        assignments.push(format!("updated_at = ${index}"));
        params.push(&now);
        index += 1;

        let query = format!(
            "UPDATE isolation_policies SET {} WHERE id = ${}",
            assignments.join(", "),
            index,
        );
        params.push(&input.policy_id);

        let rows_affected = conn
            .execute(&query, &params)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows_affected)
    }

    #[instrument(skip(self))]
    async fn delete_policy(&self, policy_id: &str) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute("DELETE FROM isolation_policies WHERE id = $1", &[&policy_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows_affected)
    }
}
