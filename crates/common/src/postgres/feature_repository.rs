use crate::domain::{
    DomainError, DomainResult, FeatureCatalogEntry, FeatureCatalogRepository, FeatureToggle,
    FeatureToggleRepository, UpsertToggleRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Feature toggle row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct FeatureToggleRow {
    pub organization_id: String,
    pub rag_feature: String,
    pub enabled: bool,
    pub is_inherited: bool,
    pub inherited_from: Option<String>,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for FeatureToggleRow {
    fn from(row: &Row) -> Self {
        FeatureToggleRow {
            organization_id: row.get("organization_id"),
            rag_feature: row.get("rag_feature"),
            enabled: row.get("enabled"),
            is_inherited: row.get("is_inherited"),
            inherited_from: row.get("inherited_from"),
            category: row.get("category"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl From<FeatureToggleRow> for FeatureToggle {
    fn from(row: FeatureToggleRow) -> Self {
        FeatureToggle {
            organization_id: row.organization_id,
            rag_feature: row.rag_feature,
            enabled: row.enabled,
            is_inherited: row.is_inherited,
            inherited_from: row.inherited_from,
            category: row.category,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

const TOGGLE_COLUMNS: &str =
    "organization_id, rag_feature, enabled, is_inherited, inherited_from, category, created_at, updated_at";

/// PostgreSQL implementation of FeatureToggleRepository trait
#[derive(Clone)]
pub struct PostgresFeatureToggleRepository {
    client: PostgresClient,
}

impl PostgresFeatureToggleRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeatureToggleRepository for PostgresFeatureToggleRepository {
    #[instrument(skip(self))]
    async fn get_toggle(
        &self,
        organization_id: &str,
        rag_feature: &str,
    ) -> DomainResult<Option<FeatureToggle>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {TOGGLE_COLUMNS} FROM rag_feature_toggles
                     WHERE organization_id = $1 AND rag_feature = $2"
                ),
                &[&organization_id, &rag_feature],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| FeatureToggleRow::from(&row).into()))
    }

    #[instrument(skip(self))]
    async fn list_toggles(&self, organization_id: &str) -> DomainResult<Vec<FeatureToggle>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {TOGGLE_COLUMNS} FROM rag_feature_toggles
                     WHERE organization_id = $1
                     ORDER BY rag_feature"
                ),
                &[&organization_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| FeatureToggleRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, rag_feature = %input.rag_feature))]
    async fn upsert_toggle(&self, input: UpsertToggleRepoInput) -> DomainResult<FeatureToggle> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO rag_feature_toggles
                         (organization_id, rag_feature, enabled, is_inherited, inherited_from, category, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                     ON CONFLICT (organization_id, rag_feature) DO UPDATE
                         SET enabled = EXCLUDED.enabled,
                             is_inherited = EXCLUDED.is_inherited,
                             inherited_from = EXCLUDED.inherited_from,
                             category = EXCLUDED.category,
                             updated_at = EXCLUDED.updated_at
                     RETURNING {TOGGLE_COLUMNS}"
                ),
                &[
                    &input.organization_id,
                    &input.rag_feature,
                    &input.enabled,
                    &input.is_inherited,
                    &input.inherited_from,
                    &input.category,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(
            organization_id = %input.organization_id,
            rag_feature = %input.rag_feature,
            enabled = input.enabled,
            "feature toggle upserted"
        );

        Ok(FeatureToggleRow::from(&row).into())
    }

    #[instrument(skip(self))]
    async fn set_enabled(
        &self,
        organization_id: &str,
        rag_feature: &str,
        enabled: bool,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let rows_affected = conn
            .execute(
                "UPDATE rag_feature_toggles
                 SET enabled = $1, updated_at = $2
                 WHERE organization_id = $3 AND rag_feature = $4",
                &[&enabled, &now, &organization_id, &rag_feature],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows_affected)
    }

    #[instrument(skip(self))]
    async fn count_enabled_in_category(
        &self,
        organization_id: &str,
        category: &str,
    ) -> DomainResult<i64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                "SELECT COUNT(*) AS enabled_count FROM rag_feature_toggles
                 WHERE organization_id = $1 AND category = $2 AND enabled = TRUE",
                &[&organization_id, &category],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.get("enabled_count"))
    }
}

/// PostgreSQL implementation of the read-only feature catalog
#[derive(Clone)]
pub struct PostgresFeatureCatalogRepository {
    client: PostgresClient,
}

impl PostgresFeatureCatalogRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

fn catalog_entry_from_row(row: &Row) -> FeatureCatalogEntry {
    FeatureCatalogEntry {
        rag_feature: row.get("rag_feature"),
        default_enabled: row.get("default_enabled"),
        category: row.get("category"),
        max_features: row.get("max_features"),
    }
}

#[async_trait]
impl FeatureCatalogRepository for PostgresFeatureCatalogRepository {
    #[instrument(skip(self))]
    async fn get_entry(&self, rag_feature: &str) -> DomainResult<Option<FeatureCatalogEntry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT rag_feature, default_enabled, category, max_features
                 FROM rag_feature_catalog
                 WHERE rag_feature = $1",
                &[&rag_feature],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(catalog_entry_from_row))
    }

    #[instrument(skip(self))]
    async fn list_entries(&self) -> DomainResult<Vec<FeatureCatalogEntry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT rag_feature, default_enabled, category, max_features
                 FROM rag_feature_catalog
                 ORDER BY rag_feature",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(catalog_entry_from_row).collect())
    }
}
