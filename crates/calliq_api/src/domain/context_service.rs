use std::sync::Arc;

use common::auth::{AccessEvaluator, OrgRole, UserContext};
use common::domain::{
    ContextItem, ContextItemRepository, CreateContextItemRepoInput,
    CreateGlobalContextItemRepoInput, DomainError, DomainResult, GlobalContextItem, QuotaKind,
    QuotaOperation, QuotaRepository, UpdateContextItemRepoInput,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Request to add a context item to an organization's knowledge base
#[derive(Debug, Clone, Validate)]
pub struct AddContextItemRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
    #[garde(length(min = 1))]
    pub item_id: String,
    #[garde(length(min = 1))]
    pub item_type: String,
    #[garde(length(min = 1, max = 500))]
    pub title: String,
    #[garde(length(min = 1))]
    pub content: String,
    #[garde(skip)]
    pub priority: i32,
    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence_score: f64,
}

/// Request to patch an existing context item; `None` fields are untouched
#[derive(Debug, Clone, Validate)]
pub struct UpdateContextItemRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
    #[garde(length(min = 1))]
    pub item_id: String,
    #[garde(inner(length(min = 1, max = 500)))]
    pub title: Option<String>,
    #[garde(inner(length(min = 1)))]
    pub content: Option<String>,
    #[garde(skip)]
    pub priority: Option<i32>,
    #[garde(inner(range(min = 0.0, max = 1.0)))]
    pub confidence_score: Option<f64>,
    #[garde(skip)]
    pub status: Option<String>,
}

/// Request addressing one context item
#[derive(Debug, Clone, Validate)]
pub struct ContextItemKeyRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
    #[garde(length(min = 1))]
    pub item_id: String,
}

/// Request to list an organization's items for one feature
#[derive(Debug, Clone, Validate)]
pub struct ListContextItemsRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
}

/// One row of a bulk import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkImportItem {
    pub item_id: String,
    pub item_type: String,
    pub title: String,
    pub content: String,
    pub priority: i32,
    pub confidence_score: f64,
}

/// Request to import many items at once
#[derive(Debug, Clone, Validate)]
pub struct BulkImportRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
    #[garde(length(min = 1))]
    pub items: Vec<BulkImportItem>,
}

/// Per-row failure of a bulk import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkImportError {
    pub item_id: String,
    pub error: String,
}

/// Outcome of a bulk import; failed rows never abort the rest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkImportOutcome {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<BulkImportError>,
}

/// Request to add a platform-wide context item (system admin only)
#[derive(Debug, Clone, Validate)]
pub struct AddGlobalContextItemRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub item_id: String,
    #[garde(length(min = 1))]
    pub item_type: String,
    #[garde(length(min = 1, max = 500))]
    pub title: String,
    #[garde(length(min = 1))]
    pub content: String,
    #[garde(skip)]
    pub priority: i32,
    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence_score: f64,
}

const STATUS_ACTIVE: &str = "active";

/// Domain service for the per-organization knowledge base.
/// Inserts and deletes keep the `context_items` quota counter in step.
pub struct ContextItemService {
    items: Arc<dyn ContextItemRepository>,
    quotas: Arc<dyn QuotaRepository>,
    evaluator: Arc<dyn AccessEvaluator>,
}

impl ContextItemService {
    pub fn new(
        items: Arc<dyn ContextItemRepository>,
        quotas: Arc<dyn QuotaRepository>,
        evaluator: Arc<dyn AccessEvaluator>,
    ) -> Self {
        Self {
            items,
            quotas,
            evaluator,
        }
    }

    async fn reserve_items(&self, organization_id: &str, quantity: i32) -> DomainResult<()> {
        let quota = self.quotas.get_or_create_quota(organization_id).await?;
        if quota.would_exceed(QuotaKind::ContextItems, quantity) {
            return Err(DomainError::QuotaExceeded {
                organization_id: organization_id.to_string(),
                quota_kind: QuotaKind::ContextItems.as_str().to_string(),
                current: quota.current(QuotaKind::ContextItems),
                max: quota.max(QuotaKind::ContextItems),
                requested: quantity,
            });
        }
        Ok(())
    }

    /// Add one item. Checks quota up front and increments usage on success.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, rag_feature = %request.rag_feature))]
    pub async fn add_context_item(
        &self,
        request: AddContextItemRequest,
    ) -> DomainResult<ContextItem> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;
        self.evaluator
            .require_feature_access(&request.user, &request.rag_feature, &request.organization_id)
            .await?;

        self.reserve_items(&request.organization_id, 1).await?;

        let item = self
            .items
            .insert_item(CreateContextItemRepoInput {
                organization_id: request.organization_id.clone(),
                rag_feature: request.rag_feature.clone(),
                item_id: request.item_id.clone(),
                item_type: request.item_type.clone(),
                title: request.title.clone(),
                content: request.content.clone(),
                priority: request.priority,
                confidence_score: request.confidence_score,
                status: STATUS_ACTIVE.to_string(),
            })
            .await?;

        self.quotas
            .adjust_usage(
                &request.organization_id,
                QuotaKind::ContextItems,
                1,
                QuotaOperation::Increment,
            )
            .await?;

        debug!(item_id = %item.item_id, "context item added");
        Ok(item)
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, item_id = %request.item_id))]
    pub async fn get_context_item(
        &self,
        request: ContextItemKeyRequest,
    ) -> DomainResult<ContextItem> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        self.items
            .get_item(&request.organization_id, &request.rag_feature, &request.item_id)
            .await?
            .ok_or_else(|| DomainError::ContextItemNotFound(request.item_id.clone()))
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, item_id = %request.item_id))]
    pub async fn update_context_item(&self, request: UpdateContextItemRequest) -> DomainResult<()> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let updated = self
            .items
            .update_item(UpdateContextItemRepoInput {
                organization_id: request.organization_id.clone(),
                rag_feature: request.rag_feature.clone(),
                item_id: request.item_id.clone(),
                title: request.title.clone(),
                content: request.content.clone(),
                priority: request.priority,
                confidence_score: request.confidence_score,
                status: request.status.clone(),
            })
            .await?;
        if updated == 0 {
            return Err(DomainError::ContextItemNotFound(request.item_id.clone()));
        }

        debug!(item_id = %request.item_id, "context item updated");
        Ok(())
    }

    /// Remove one item and release its quota unit
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, item_id = %request.item_id))]
    pub async fn remove_context_item(&self, request: ContextItemKeyRequest) -> DomainResult<()> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let deleted = self
            .items
            .delete_item(&request.organization_id, &request.rag_feature, &request.item_id)
            .await?;
        if deleted == 0 {
            return Err(DomainError::ContextItemNotFound(request.item_id.clone()));
        }

        self.quotas
            .adjust_usage(
                &request.organization_id,
                QuotaKind::ContextItems,
                1,
                QuotaOperation::Decrement,
            )
            .await?;

        debug!(item_id = %request.item_id, "context item removed");
        Ok(())
    }

    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, rag_feature = %request.rag_feature))]
    pub async fn list_context_items(
        &self,
        request: ListContextItemsRequest,
    ) -> DomainResult<Vec<ContextItem>> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        self.items
            .list_items(&request.organization_id, &request.rag_feature)
            .await
    }

    /// Import many items; the whole batch is quota-checked up front, then
    /// rows are inserted one by one. A failed row is recorded and skipped,
    /// and only successful rows count against quota.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, count = request.items.len()))]
    pub async fn bulk_import_context_items(
        &self,
        request: BulkImportRequest,
    ) -> DomainResult<BulkImportOutcome> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;
        self.evaluator
            .require_feature_access(&request.user, &request.rag_feature, &request.organization_id)
            .await?;

        self.reserve_items(&request.organization_id, request.items.len() as i32)
            .await?;

        let mut success_count = 0;
        let mut errors = Vec::new();

        for item in &request.items {
            if !(0.0..=1.0).contains(&item.confidence_score) {
                errors.push(BulkImportError {
                    item_id: item.item_id.clone(),
                    error: "confidence_score must be between 0.0 and 1.0".to_string(),
                });
                continue;
            }

            let result = self
                .items
                .insert_item(CreateContextItemRepoInput {
                    organization_id: request.organization_id.clone(),
                    rag_feature: request.rag_feature.clone(),
                    item_id: item.item_id.clone(),
                    item_type: item.item_type.clone(),
                    title: item.title.clone(),
                    content: item.content.clone(),
                    priority: item.priority,
                    confidence_score: item.confidence_score,
                    status: STATUS_ACTIVE.to_string(),
                })
                .await;

            match result {
                Ok(_) => success_count += 1,
                Err(err) => {
                    warn!(item_id = %item.item_id, error = %err, "bulk import row failed");
                    errors.push(BulkImportError {
                        item_id: item.item_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        if success_count > 0 {
            self.quotas
                .adjust_usage(
                    &request.organization_id,
                    QuotaKind::ContextItems,
                    success_count as i32,
                    QuotaOperation::Increment,
                )
                .await?;
        }

        debug!(success_count, error_count = errors.len(), "bulk import finished");
        Ok(BulkImportOutcome {
            success_count,
            error_count: errors.len(),
            errors,
        })
    }

    /// Add a platform-wide item visible to every organization
    #[instrument(skip(self, request), fields(item_id = %request.item_id))]
    pub async fn add_global_context_item(
        &self,
        request: AddGlobalContextItemRequest,
    ) -> DomainResult<GlobalContextItem> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::SystemAdmin)
            .await?;

        let item = self
            .items
            .insert_global_item(CreateGlobalContextItemRepoInput {
                item_id: request.item_id.clone(),
                item_type: request.item_type.clone(),
                title: request.title.clone(),
                content: request.content.clone(),
                priority: request.priority,
                confidence_score: request.confidence_score,
                status: STATUS_ACTIVE.to_string(),
            })
            .await?;

        debug!(item_id = %item.item_id, "global context item added");
        Ok(item)
    }
}
