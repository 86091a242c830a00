use crate::domain::{
    ContextItem, ContextItemRepository, CreateContextItemRepoInput,
    CreateGlobalContextItemRepoInput, DomainError, DomainResult, GlobalContextItem,
    UpdateContextItemRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const ITEM_COLUMNS: &str = "organization_id, rag_feature, item_id, item_type, title, content, \
     priority, confidence_score, status, created_at, updated_at";

const GLOBAL_ITEM_COLUMNS: &str =
    "item_id, item_type, title, content, priority, confidence_score, status, created_at, updated_at";

fn item_from_row(row: &Row) -> ContextItem {
    ContextItem {
        organization_id: row.get("organization_id"),
        rag_feature: row.get("rag_feature"),
        item_id: row.get("item_id"),
        item_type: row.get("item_type"),
        title: row.get("title"),
        content: row.get("content"),
        priority: row.get("priority"),
        confidence_score: row.get("confidence_score"),
        status: row.get("status"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

fn global_item_from_row(row: &Row) -> GlobalContextItem {
    GlobalContextItem {
        item_id: row.get("item_id"),
        item_type: row.get("item_type"),
        title: row.get("title"),
        content: row.get("content"),
        priority: row.get("priority"),
        confidence_score: row.get("confidence_score"),
        status: row.get("status"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

/// PostgreSQL implementation of ContextItemRepository trait
#[derive(Clone)]
pub struct PostgresContextItemRepository {
    client: PostgresClient,
}

impl PostgresContextItemRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContextItemRepository for PostgresContextItemRepository {
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, item_id = %input.item_id))]
    async fn insert_item(&self, input: CreateContextItemRepoInput) -> DomainResult<ContextItem> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let result = conn
            .query_one(
                &format!(
                    "INSERT INTO context_items
                         (organization_id, rag_feature, item_id, item_type, title, content,
                          priority, confidence_score, status, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
                     RETURNING {ITEM_COLUMNS}"
                ),
                &[
                    &input.organization_id,
                    &input.rag_feature,
                    &input.item_id,
                    &input.item_type,
                    &input.title,
                    &input.content,
                    &input.priority,
                    &input.confidence_score,
                    &input.status,
                    &now,
                ],
            )
            .await;

        match result {
            Ok(row) => {
                debug!(item_id = %input.item_id, "context item inserted");
                Ok(item_from_row(&row))
            }
            Err(e) => {
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        return Err(DomainError::DuplicateContextItem(input.item_id.clone()));
                    }
                }
                Err(DomainError::RepositoryError(e.into()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_item(
        &self,
        organization_id: &str,
        rag_feature: &str,
        item_id: &str,
    ) -> DomainResult<Option<ContextItem>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM context_items
                     WHERE organization_id = $1 AND rag_feature = $2 AND item_id = $3"
                ),
                &[&organization_id, &rag_feature, &item_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(item_from_row))
    }

    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, item_id = %input.item_id))]
    async fn update_item(&self, input: UpdateContextItemRepoInput) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let mut assignments: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut index = 1;

        if let Some(title) = &input.title {
            assignments.push(format!("title = ${index}"));
            params.push(title);
            index += 1;
        }
        if let Some(content) = &input.content {
            assignments.push(format!("content = ${index}"));
            params.push(content);
            index += 1;
        }
        if let Some(priority) = &input.priority {
            assignments.push(format!("priority = ${index}"));
            params.push(priority);
            index += 1;
        }
        if let Some(confidence_score) = &input.confidence_score {
            assignments.push(format!("confidence_score = ${index}"));
            params.push(confidence_score);
            index += 1;
        }
        if let Some(status) = &input.status {
            assignments.push(format!("status = ${index}"));
            params.push(status);
            index += 1;
        }

        if assignments.is_empty() {
            return Ok(0);
        }

        assignments.push(format!("updated_at = ${index}"));
        params.push(&now);
        index += 1;

        let query = format!(
            "UPDATE context_items SET {}
             WHERE organization_id = ${} AND rag_feature = ${} AND item_id = ${}",
            assignments.join(", "),
            index,
            index + 1,
            index + 2,
        );
        params.push(&input.organization_id);
        params.push(&input.rag_feature);
        params.push(&input.item_id);

        let rows_affected = conn
            .execute(&query, &params)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows_affected)
    }

    #[instrument(skip(self))]
    async fn delete_item(
        &self,
        organization_id: &str,
        rag_feature: &str,
        item_id: &str,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute(
                "DELETE FROM context_items
                 WHERE organization_id = $1 AND rag_feature = $2 AND item_id = $3",
                &[&organization_id, &rag_feature, &item_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows_affected)
    }

    #[instrument(skip(self))]
    async fn list_items(
        &self,
        organization_id: &str,
        rag_feature: &str,
    ) -> DomainResult<Vec<ContextItem>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM context_items
                     WHERE organization_id = $1 AND rag_feature = $2
                     ORDER BY priority DESC, created_at DESC"
                ),
                &[&organization_id, &rag_feature],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(item_from_row).collect())
    }

    #[instrument(skip(self, input), fields(item_id = %input.item_id))]
    async fn insert_global_item(
        &self,
        input: CreateGlobalContextItemRepoInput,
    ) -> DomainResult<GlobalContextItem> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let result = conn
            .query_one(
                &format!(
                    "INSERT INTO global_context_items
                         (item_id, item_type, title, content, priority, confidence_score,
                          status, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                     RETURNING {GLOBAL_ITEM_COLUMNS}"
                ),
                &[
                    &input.item_id,
                    &input.item_type,
                    &input.title,
                    &input.content,
                    &input.priority,
                    &input.confidence_score,
                    &input.status,
                    &now,
                ],
            )
            .await;

        match result {
            Ok(row) => {
                debug!(item_id = %input.item_id, "global context item inserted");
                Ok(global_item_from_row(&row))
            }
            Err(e) => {
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        return Err(DomainError::DuplicateContextItem(input.item_id.clone()));
                    }
                }
                Err(DomainError::RepositoryError(e.into()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_global_item(&self, item_id: &str) -> DomainResult<Option<GlobalContextItem>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {GLOBAL_ITEM_COLUMNS} FROM global_context_items WHERE item_id = $1"
                ),
                &[&item_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(global_item_from_row))
    }
}
