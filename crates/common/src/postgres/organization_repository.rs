use crate::domain::{
    CreateOrganizationRepoInput, DomainError, DomainResult, Organization,
    OrganizationRepository, UpdateOrganizationRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Organization row for PostgreSQL storage with timestamp metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRow {
    pub id: String,
    pub name: String,
    pub parent_organization_id: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for OrganizationRow {
    fn from(row: &Row) -> Self {
        OrganizationRow {
            id: row.get("id"),
            name: row.get("name"),
            parent_organization_id: row.get("parent_organization_id"),
            deleted_at: row.get("deleted_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            parent_organization_id: row.parent_organization_id,
            deleted_at: row.deleted_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// PostgreSQL implementation of OrganizationRepository trait
#[derive(Clone)]
pub struct PostgresOrganizationRepository {
    client: PostgresClient,
}

impl PostgresOrganizationRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

const ORGANIZATION_COLUMNS: &str =
    "id, name, parent_organization_id, deleted_at, created_at, updated_at";

#[async_trait]
impl OrganizationRepository for PostgresOrganizationRepository {
    #[instrument(skip(self), fields(organization_id = %input.id))]
    async fn create_organization(
        &self,
        input: CreateOrganizationRepoInput,
    ) -> DomainResult<Organization> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let result = conn
            .execute(
                "INSERT INTO organizations (id, name, parent_organization_id, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5)",
                &[&input.id, &input.name, &input.parent_organization_id, &now, &now],
            )
            .await;

        if let Err(e) = result {
            // PostgreSQL error code 23505 is unique_violation
            if let Some(db_err) = e.as_db_error() {
                if db_err.code().code() == "23505" {
                    return Err(DomainError::OrganizationAlreadyExists(input.id.clone()));
                }
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        debug!(organization_id = %input.id, "organization created in database");

        Ok(Organization {
            id: input.id,
            name: input.name,
            parent_organization_id: input.parent_organization_id,
            deleted_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    #[instrument(skip(self))]
    async fn get_organization(&self, organization_id: &str) -> DomainResult<Option<Organization>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {ORGANIZATION_COLUMNS} FROM organizations
                     WHERE id = $1 AND deleted_at IS NULL"
                ),
                &[&organization_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| OrganizationRow::from(&row).into()))
    }

    #[instrument(skip(self))]
    async fn list_organizations(&self) -> DomainResult<Vec<Organization>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {ORGANIZATION_COLUMNS} FROM organizations
                     WHERE deleted_at IS NULL
                     ORDER BY created_at DESC"
                ),
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| OrganizationRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_child_organizations(&self, parent_id: &str) -> DomainResult<Vec<Organization>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {ORGANIZATION_COLUMNS} FROM organizations
                     WHERE parent_organization_id = $1 AND deleted_at IS NULL
                     ORDER BY created_at DESC"
                ),
                &[&parent_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| OrganizationRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_organization_ids(&self) -> DomainResult<Vec<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id FROM organizations WHERE deleted_at IS NULL",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    #[instrument(skip(self), fields(organization_id = %input.organization_id))]
    async fn update_organization(
        &self,
        input: UpdateOrganizationRepoInput,
    ) -> DomainResult<Organization> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE organizations
                     SET name = $1, updated_at = $2
                     WHERE id = $3 AND deleted_at IS NULL
                     RETURNING {ORGANIZATION_COLUMNS}"
                ),
                &[&input.name, &now, &input.organization_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => Ok(OrganizationRow::from(&row).into()),
            None => Err(DomainError::OrganizationNotFound(
                input.organization_id.clone(),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn set_parent_organization(
        &self,
        organization_id: &str,
        parent_organization_id: Option<&str>,
    ) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let rows_affected = conn
            .execute(
                "UPDATE organizations
                 SET parent_organization_id = $1, updated_at = $2
                 WHERE id = $3 AND deleted_at IS NULL",
                &[&parent_organization_id, &now, &organization_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if rows_affected == 0 {
            return Err(DomainError::OrganizationNotFound(
                organization_id.to_string(),
            ));
        }

        debug!(organization_id, "organization parent updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_organization(&self, organization_id: &str) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let rows_affected = conn
            .execute(
                "UPDATE organizations
                 SET deleted_at = $1, updated_at = $1
                 WHERE id = $2 AND deleted_at IS NULL",
                &[&now, &organization_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if rows_affected == 0 {
            return Err(DomainError::OrganizationNotFound(
                organization_id.to_string(),
            ));
        }

        debug!(organization_id, "organization soft deleted");
        Ok(())
    }
}
