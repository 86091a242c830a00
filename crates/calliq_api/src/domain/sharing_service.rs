use std::sync::Arc;

use common::auth::{AccessEvaluator, UserContext};
use common::domain::{
    ContextItemRepository, CreateContextItemRepoInput, CreateSharingRequestRepoInput, DomainError,
    DomainResult, OrganizationRepository, QuotaKind, QuotaOperation, QuotaRepository,
    SharingRequest, SharingRequestRepository, SharingStatus,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Request to offer one context item to another organization
#[derive(Debug, Clone, Validate)]
pub struct ShareContextItemRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub source_organization_id: String,
    #[garde(length(min = 1))]
    pub target_organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
    #[garde(length(min = 1))]
    pub item_id: String,
}

/// Request to offer one context item to the parent organization
#[derive(Debug, Clone, Validate)]
pub struct ShareToParentRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub source_organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
    #[garde(length(min = 1))]
    pub item_id: String,
}

/// Request to fan one context item out to every child organization
#[derive(Debug, Clone, Validate)]
pub struct ShareToChildrenRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub source_organization_id: String,
    #[garde(length(min = 1))]
    pub rag_feature: String,
    #[garde(length(min = 1))]
    pub item_id: String,
}

/// Request to approve or reject a pending sharing request
#[derive(Debug, Clone, Validate)]
pub struct ResolveSharingRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub request_id: String,
    #[garde(inner(length(min = 1)))]
    pub reason: Option<String>,
}

/// Request to list pending approvals for an organization
#[derive(Debug, Clone, Validate)]
pub struct GetPendingApprovalsRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub target_organization_id: String,
    #[garde(inner(length(min = 1)))]
    pub rag_feature: Option<String>,
}

/// Outcome of a fan-out share
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareFanout {
    pub shared_count: usize,
    pub request_ids: Vec<String>,
}

/// Cross-tenant sharing workflow. A share creates a pending request;
/// the target organization approves (materializing a copy of the item
/// into its own knowledge base) or rejects it. Requests consume the
/// source's `sharing_requests` quota until resolved.
pub struct SharingService {
    requests: Arc<dyn SharingRequestRepository>,
    items: Arc<dyn ContextItemRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    quotas: Arc<dyn QuotaRepository>,
    evaluator: Arc<dyn AccessEvaluator>,
}

impl SharingService {
    pub fn new(
        requests: Arc<dyn SharingRequestRepository>,
        items: Arc<dyn ContextItemRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        quotas: Arc<dyn QuotaRepository>,
        evaluator: Arc<dyn AccessEvaluator>,
    ) -> Self {
        Self {
            requests,
            items,
            organizations,
            quotas,
            evaluator,
        }
    }

    async fn reserve_sharing(&self, organization_id: &str, quantity: i32) -> DomainResult<()> {
        let quota = self.quotas.get_or_create_quota(organization_id).await?;
        if quota.would_exceed(QuotaKind::SharingRequests, quantity) {
            return Err(DomainError::QuotaExceeded {
                organization_id: organization_id.to_string(),
                quota_kind: QuotaKind::SharingRequests.as_str().to_string(),
                current: quota.current(QuotaKind::SharingRequests),
                max: quota.max(QuotaKind::SharingRequests),
                requested: quantity,
            });
        }
        Ok(())
    }

    async fn require_source_item(
        &self,
        organization_id: &str,
        rag_feature: &str,
        item_id: &str,
    ) -> DomainResult<()> {
        self.items
            .get_item(organization_id, rag_feature, item_id)
            .await?
            .ok_or_else(|| DomainError::ContextItemNotFound(item_id.to_string()))?;
        Ok(())
    }

    async fn insert_pending(
        &self,
        user: &UserContext,
        source: &str,
        target: &str,
        rag_feature: &str,
        item_id: &str,
    ) -> DomainResult<SharingRequest> {
        self.requests
            .insert_request(CreateSharingRequestRepoInput {
                id: xid::new().to_string(),
                source_organization_id: source.to_string(),
                target_organization_id: target.to_string(),
                item_id: item_id.to_string(),
                rag_feature: rag_feature.to_string(),
                shared_by: user.user_id.clone(),
            })
            .await
    }

    /// Offer one item to a specific organization
    #[instrument(skip(self, request), fields(source = %request.source_organization_id, target = %request.target_organization_id))]
    pub async fn share_context_item(
        &self,
        request: ShareContextItemRequest,
    ) -> DomainResult<SharingRequest> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.source_organization_id)
            .await?;

        self.require_source_item(
            &request.source_organization_id,
            &request.rag_feature,
            &request.item_id,
        )
        .await?;
        self.reserve_sharing(&request.source_organization_id, 1).await?;

        let sharing_request = self
            .insert_pending(
                &request.user,
                &request.source_organization_id,
                &request.target_organization_id,
                &request.rag_feature,
                &request.item_id,
            )
            .await?;

        self.quotas
            .adjust_usage(
                &request.source_organization_id,
                QuotaKind::SharingRequests,
                1,
                QuotaOperation::Increment,
            )
            .await?;

        debug!(request_id = %sharing_request.id, "sharing request created");
        Ok(sharing_request)
    }

    /// Offer one item upward to the parent organization
    #[instrument(skip(self, request), fields(source = %request.source_organization_id))]
    pub async fn share_to_parent_organization(
        &self,
        request: ShareToParentRequest,
    ) -> DomainResult<SharingRequest> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.source_organization_id)
            .await?;

        let org = self
            .organizations
            .get_organization(&request.source_organization_id)
            .await?
            .ok_or_else(|| {
                DomainError::OrganizationNotFound(request.source_organization_id.clone())
            })?;
        let parent_id = org.parent_organization_id.ok_or_else(|| {
            DomainError::NoParentOrganization(request.source_organization_id.clone())
        })?;

        self.share_context_item(ShareContextItemRequest {
            user: request.user,
            source_organization_id: request.source_organization_id,
            target_organization_id: parent_id,
            rag_feature: request.rag_feature,
            item_id: request.item_id,
        })
        .await
    }

    /// Fan one item out to every direct child. Zero children is a success
    /// with nothing shared; the whole batch is quota-checked up front.
    #[instrument(skip(self, request), fields(source = %request.source_organization_id))]
    pub async fn share_to_children_organizations(
        &self,
        request: ShareToChildrenRequest,
    ) -> DomainResult<ShareFanout> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.source_organization_id)
            .await?;

        let children = self
            .organizations
            .list_child_organizations(&request.source_organization_id)
            .await?;
        if children.is_empty() {
            debug!("no child organizations, nothing shared");
            return Ok(ShareFanout {
                shared_count: 0,
                request_ids: Vec::new(),
            });
        }

        self.require_source_item(
            &request.source_organization_id,
            &request.rag_feature,
            &request.item_id,
        )
        .await?;
        self.reserve_sharing(&request.source_organization_id, children.len() as i32)
            .await?;

        let mut request_ids = Vec::with_capacity(children.len());
        for child in &children {
            let sharing_request = self
                .insert_pending(
                    &request.user,
                    &request.source_organization_id,
                    &child.id,
                    &request.rag_feature,
                    &request.item_id,
                )
                .await?;
            request_ids.push(sharing_request.id);
        }

        self.quotas
            .adjust_usage(
                &request.source_organization_id,
                QuotaKind::SharingRequests,
                request_ids.len() as i32,
                QuotaOperation::Increment,
            )
            .await?;

        debug!(shared_count = request_ids.len(), "fanned out to children");
        Ok(ShareFanout {
            shared_count: request_ids.len(),
            request_ids,
        })
    }

    /// Approve a pending request: the item is copied into the target
    /// organization's knowledge base and the source's pending-share quota
    /// unit is released.
    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn approve_sharing_request(
        &self,
        request: ResolveSharingRequest,
    ) -> DomainResult<SharingRequest> {
        common::garde::validate(&request)?;

        let pending = self
            .requests
            .get_request(&request.request_id)
            .await?
            .ok_or_else(|| DomainError::SharingRequestNotFound(request.request_id.clone()))?;

        self.evaluator
            .require_organization_access(&request.user, &pending.target_organization_id)
            .await?;

        let resolved = self
            .requests
            .resolve_request(
                &request.request_id,
                SharingStatus::Approved,
                &request.user.user_id,
                request.reason.as_deref(),
            )
            .await?;
        if resolved == 0 {
            // Status guard failed: the request was resolved by someone else
            return Err(DomainError::SharingRequestAlreadyResolved(
                request.request_id.clone(),
            ));
        }

        let source_item = self
            .items
            .get_item(
                &pending.source_organization_id,
                &pending.rag_feature,
                &pending.item_id,
            )
            .await?;

        match source_item {
            Some(item) => {
                let copy = self
                    .items
                    .insert_item(CreateContextItemRepoInput {
                        organization_id: pending.target_organization_id.clone(),
                        rag_feature: item.rag_feature,
                        item_id: item.item_id,
                        item_type: item.item_type,
                        title: item.title,
                        content: item.content,
                        priority: item.priority,
                        confidence_score: item.confidence_score,
                        status: item.status,
                    })
                    .await;
                match copy {
                    Ok(_) => {
                        self.quotas
                            .adjust_usage(
                                &pending.target_organization_id,
                                QuotaKind::ContextItems,
                                1,
                                QuotaOperation::Increment,
                            )
                            .await?;
                    }
                    // The target already holds an identical item id; the
                    // approval itself stands.
                    Err(DomainError::DuplicateContextItem(item_id)) => {
                        warn!(item_id = %item_id, "target already has the shared item");
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                warn!(item_id = %pending.item_id, "source item vanished before approval");
            }
        }

        self.quotas
            .adjust_usage(
                &pending.source_organization_id,
                QuotaKind::SharingRequests,
                1,
                QuotaOperation::Decrement,
            )
            .await?;

        debug!("sharing request approved");
        self.requests
            .get_request(&request.request_id)
            .await?
            .ok_or_else(|| DomainError::SharingRequestNotFound(request.request_id.clone()))
    }

    /// Reject a pending request and release the source's quota unit
    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn reject_sharing_request(
        &self,
        request: ResolveSharingRequest,
    ) -> DomainResult<SharingRequest> {
        common::garde::validate(&request)?;

        let pending = self
            .requests
            .get_request(&request.request_id)
            .await?
            .ok_or_else(|| DomainError::SharingRequestNotFound(request.request_id.clone()))?;

        self.evaluator
            .require_organization_access(&request.user, &pending.target_organization_id)
            .await?;

        let resolved = self
            .requests
            .resolve_request(
                &request.request_id,
                SharingStatus::Rejected,
                &request.user.user_id,
                request.reason.as_deref(),
            )
            .await?;
        if resolved == 0 {
            return Err(DomainError::SharingRequestAlreadyResolved(
                request.request_id.clone(),
            ));
        }

        self.quotas
            .adjust_usage(
                &pending.source_organization_id,
                QuotaKind::SharingRequests,
                1,
                QuotaOperation::Decrement,
            )
            .await?;

        debug!("sharing request rejected");
        self.requests
            .get_request(&request.request_id)
            .await?
            .ok_or_else(|| DomainError::SharingRequestNotFound(request.request_id.clone()))
    }

    /// Pending requests addressed to an organization, optionally scoped to
    /// one RAG feature
    #[instrument(skip(self, request), fields(target = %request.target_organization_id))]
    pub async fn get_pending_approvals(
        &self,
        request: GetPendingApprovalsRequest,
    ) -> DomainResult<Vec<SharingRequest>> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.target_organization_id)
            .await?;

        self.requests
            .list_pending_for_target(
                &request.target_organization_id,
                request.rag_feature.as_deref(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::auth::{MockAccessEvaluator, OrgRole};
    use common::domain::{
        ContextItem, MockContextItemRepository, MockOrganizationRepository, MockQuotaRepository,
        MockSharingRequestRepository, Organization, OrganizationQuota, DEFAULT_MAX_CONTEXT_ITEMS,
        DEFAULT_MAX_GLOBAL_ACCESS,
    };

    fn quota(current_sharing_requests: i32, max_sharing_requests: i32) -> OrganizationQuota {
        OrganizationQuota {
            organization_id: "org-a".to_string(),
            max_context_items: DEFAULT_MAX_CONTEXT_ITEMS,
            current_context_items: 0,
            max_global_access: DEFAULT_MAX_GLOBAL_ACCESS,
            current_global_access: 0,
            max_sharing_requests,
            current_sharing_requests,
            created_at: None,
            updated_at: None,
        }
    }

    fn sharing_request(id: &str, status: SharingStatus) -> SharingRequest {
        SharingRequest {
            id: id.to_string(),
            source_organization_id: "org-a".to_string(),
            target_organization_id: "org-b".to_string(),
            item_id: "item-1".to_string(),
            rag_feature: "sales_intelligence".to_string(),
            shared_by: "user-123".to_string(),
            status,
            reason: None,
            resolved_by: None,
            created_at: None,
            resolved_at: None,
        }
    }

    fn source_item() -> ContextItem {
        ContextItem {
            organization_id: "org-a".to_string(),
            rag_feature: "sales_intelligence".to_string(),
            item_id: "item-1".to_string(),
            item_type: "objection_handling".to_string(),
            title: "Pricing objections".to_string(),
            content: "Lead with value".to_string(),
            priority: 1,
            confidence_score: 0.9,
            status: "active".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    fn org(id: &str, parent: Option<&str>) -> Organization {
        Organization {
            id: id.to_string(),
            name: format!("Org {}", id),
            parent_organization_id: parent.map(str::to_string),
            deleted_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn manager(org_id: &str) -> UserContext {
        UserContext::new("user-123", Some(org_id), OrgRole::Manager)
    }

    fn permissive_evaluator() -> MockAccessEvaluator {
        let mut eval = MockAccessEvaluator::new();
        eval.expect_require_organization_access()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        eval
    }

    struct Fixture {
        requests: MockSharingRequestRepository,
        items: MockContextItemRepository,
        organizations: MockOrganizationRepository,
        quotas: MockQuotaRepository,
        evaluator: MockAccessEvaluator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                requests: MockSharingRequestRepository::new(),
                items: MockContextItemRepository::new(),
                organizations: MockOrganizationRepository::new(),
                quotas: MockQuotaRepository::new(),
                evaluator: permissive_evaluator(),
            }
        }

        fn service(self) -> SharingService {
            SharingService::new(
                Arc::new(self.requests),
                Arc::new(self.items),
                Arc::new(self.organizations),
                Arc::new(self.quotas),
                Arc::new(self.evaluator),
            )
        }
    }

    #[tokio::test]
    async fn test_share_creates_pending_request() {
        let mut fixture = Fixture::new();
        fixture
            .items
            .expect_get_item()
            .returning(|_, _, _| Box::pin(async { Ok(Some(source_item())) }));
        fixture
            .quotas
            .expect_get_or_create_quota()
            .returning(|_| Box::pin(async { Ok(quota(0, 50)) }));
        fixture.requests.expect_insert_request().returning(|input| {
            Box::pin(async move {
                Ok(SharingRequest {
                    id: input.id,
                    source_organization_id: input.source_organization_id,
                    target_organization_id: input.target_organization_id,
                    item_id: input.item_id,
                    rag_feature: input.rag_feature,
                    shared_by: input.shared_by,
                    status: SharingStatus::Pending,
                    reason: None,
                    resolved_by: None,
                    created_at: None,
                    resolved_at: None,
                })
            })
        });
        fixture
            .quotas
            .expect_adjust_usage()
            .withf(|_, kind, _, operation| {
                *kind == QuotaKind::SharingRequests && *operation == QuotaOperation::Increment
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));

        let service = fixture.service();
        let created = service
            .share_context_item(ShareContextItemRequest {
                user: manager("org-a"),
                source_organization_id: "org-a".to_string(),
                target_organization_id: "org-b".to_string(),
                rag_feature: "sales_intelligence".to_string(),
                item_id: "item-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(created.status, SharingStatus::Pending);
        assert!(!created.id.is_empty());
    }

    #[tokio::test]
    async fn test_share_missing_item_rejected() {
        let mut fixture = Fixture::new();
        fixture
            .items
            .expect_get_item()
            .returning(|_, _, _| Box::pin(async { Ok(None) }));
        fixture.requests.expect_insert_request().never();

        let service = fixture.service();
        let result = service
            .share_context_item(ShareContextItemRequest {
                user: manager("org-a"),
                source_organization_id: "org-a".to_string(),
                target_organization_id: "org-b".to_string(),
                rag_feature: "sales_intelligence".to_string(),
                item_id: "item-1".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::ContextItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_share_blocked_by_quota() {
        let mut fixture = Fixture::new();
        fixture
            .items
            .expect_get_item()
            .returning(|_, _, _| Box::pin(async { Ok(Some(source_item())) }));
        fixture
            .quotas
            .expect_get_or_create_quota()
            .returning(|_| Box::pin(async { Ok(quota(50, 50)) }));
        fixture.requests.expect_insert_request().never();

        let service = fixture.service();
        let result = service
            .share_context_item(ShareContextItemRequest {
                user: manager("org-a"),
                source_organization_id: "org-a".to_string(),
                target_organization_id: "org-b".to_string(),
                rag_feature: "sales_intelligence".to_string(),
                item_id: "item-1".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn test_share_to_parent_without_parent_fails() {
        let mut fixture = Fixture::new();
        fixture
            .organizations
            .expect_get_organization()
            .returning(|_| Box::pin(async { Ok(Some(org("org-a", None))) }));

        let service = fixture.service();
        let result = service
            .share_to_parent_organization(ShareToParentRequest {
                user: manager("org-a"),
                source_organization_id: "org-a".to_string(),
                rag_feature: "sales_intelligence".to_string(),
                item_id: "item-1".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::NoParentOrganization(_))));
    }

    #[tokio::test]
    async fn test_share_to_children_with_no_children() {
        let mut fixture = Fixture::new();
        fixture
            .organizations
            .expect_list_child_organizations()
            .returning(|_| Box::pin(async { Ok(vec![]) }));
        fixture.requests.expect_insert_request().never();
        fixture.quotas.expect_get_or_create_quota().never();

        let service = fixture.service();
        let fanout = service
            .share_to_children_organizations(ShareToChildrenRequest {
                user: manager("org-a"),
                source_organization_id: "org-a".to_string(),
                rag_feature: "sales_intelligence".to_string(),
                item_id: "item-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(fanout.shared_count, 0);
        assert!(fanout.request_ids.is_empty());
    }

    #[tokio::test]
    async fn test_share_to_children_fans_out() {
        let mut fixture = Fixture::new();
        fixture
            .organizations
            .expect_list_child_organizations()
            .returning(|_| {
                Box::pin(async {
                    Ok(vec![org("org-b", Some("org-a")), org("org-c", Some("org-a"))])
                })
            });
        fixture
            .items
            .expect_get_item()
            .returning(|_, _, _| Box::pin(async { Ok(Some(source_item())) }));
        fixture
            .quotas
            .expect_get_or_create_quota()
            .returning(|_| Box::pin(async { Ok(quota(0, 50)) }));
        fixture.requests.expect_insert_request().times(2).returning(|input| {
            Box::pin(async move {
                Ok(SharingRequest {
                    id: input.id,
                    source_organization_id: input.source_organization_id,
                    target_organization_id: input.target_organization_id,
                    item_id: input.item_id,
                    rag_feature: input.rag_feature,
                    shared_by: input.shared_by,
                    status: SharingStatus::Pending,
                    reason: None,
                    resolved_by: None,
                    created_at: None,
                    resolved_at: None,
                })
            })
        });
        fixture
            .quotas
            .expect_adjust_usage()
            .withf(|_, _, quantity, _| *quantity == 2)
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));

        let service = fixture.service();
        let fanout = service
            .share_to_children_organizations(ShareToChildrenRequest {
                user: manager("org-a"),
                source_organization_id: "org-a".to_string(),
                rag_feature: "sales_intelligence".to_string(),
                item_id: "item-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(fanout.shared_count, 2);
        assert_eq!(fanout.request_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_approve_materializes_item_into_target() {
        let mut fixture = Fixture::new();
        fixture.requests.expect_get_request().returning(|id| {
            let id = id.to_string();
            Box::pin(async move { Ok(Some(sharing_request(&id, SharingStatus::Pending))) })
        });
        fixture
            .requests
            .expect_resolve_request()
            .withf(|_, status, _, _| *status == SharingStatus::Approved)
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));
        fixture
            .items
            .expect_get_item()
            .returning(|_, _, _| Box::pin(async { Ok(Some(source_item())) }));
        fixture
            .items
            .expect_insert_item()
            .withf(|input| input.organization_id == "org-b")
            .times(1)
            .returning(|input| {
                Box::pin(async move {
                    Ok(ContextItem {
                        organization_id: input.organization_id,
                        rag_feature: input.rag_feature,
                        item_id: input.item_id,
                        item_type: input.item_type,
                        title: input.title,
                        content: input.content,
                        priority: input.priority,
                        confidence_score: input.confidence_score,
                        status: input.status,
                        created_at: None,
                        updated_at: None,
                    })
                })
            });
        // Target gains a context item, source releases a sharing unit
        fixture
            .quotas
            .expect_adjust_usage()
            .withf(|org_id, kind, _, operation| {
                org_id == "org-b"
                    && *kind == QuotaKind::ContextItems
                    && *operation == QuotaOperation::Increment
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));
        fixture
            .quotas
            .expect_adjust_usage()
            .withf(|org_id, kind, _, operation| {
                org_id == "org-a"
                    && *kind == QuotaKind::SharingRequests
                    && *operation == QuotaOperation::Decrement
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));

        let service = fixture.service();
        service
            .approve_sharing_request(ResolveSharingRequest {
                user: manager("org-b"),
                request_id: "req-1".to_string(),
                reason: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_approve_already_resolved() {
        let mut fixture = Fixture::new();
        fixture.requests.expect_get_request().returning(|id| {
            let id = id.to_string();
            Box::pin(async move { Ok(Some(sharing_request(&id, SharingStatus::Approved))) })
        });
        fixture
            .requests
            .expect_resolve_request()
            .returning(|_, _, _, _| Box::pin(async { Ok(0) }));

        let service = fixture.service();
        let result = service
            .approve_sharing_request(ResolveSharingRequest {
                user: manager("org-b"),
                request_id: "req-1".to_string(),
                reason: None,
            })
            .await;

        assert!(matches!(
            result,
            Err(DomainError::SharingRequestAlreadyResolved(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_duplicate_item_in_target_still_succeeds() {
        let mut fixture = Fixture::new();
        fixture.requests.expect_get_request().returning(|id| {
            let id = id.to_string();
            Box::pin(async move { Ok(Some(sharing_request(&id, SharingStatus::Pending))) })
        });
        fixture
            .requests
            .expect_resolve_request()
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));
        fixture
            .items
            .expect_get_item()
            .returning(|_, _, _| Box::pin(async { Ok(Some(source_item())) }));
        fixture.items.expect_insert_item().returning(|input| {
            Box::pin(async move { Err(DomainError::DuplicateContextItem(input.item_id)) })
        });
        // Only the source-side decrement happens
        fixture
            .quotas
            .expect_adjust_usage()
            .withf(|org_id, kind, _, _| org_id == "org-a" && *kind == QuotaKind::SharingRequests)
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));

        let service = fixture.service();
        service
            .approve_sharing_request(ResolveSharingRequest {
                user: manager("org-b"),
                request_id: "req-1".to_string(),
                reason: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reject_releases_source_quota() {
        let mut fixture = Fixture::new();
        fixture.requests.expect_get_request().returning(|id| {
            let id = id.to_string();
            Box::pin(async move { Ok(Some(sharing_request(&id, SharingStatus::Pending))) })
        });
        fixture
            .requests
            .expect_resolve_request()
            .withf(|_, status, _, reason| {
                *status == SharingStatus::Rejected && reason == &Some("not relevant")
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));
        fixture
            .quotas
            .expect_adjust_usage()
            .withf(|org_id, kind, _, operation| {
                org_id == "org-a"
                    && *kind == QuotaKind::SharingRequests
                    && *operation == QuotaOperation::Decrement
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));

        let service = fixture.service();
        service
            .reject_sharing_request(ResolveSharingRequest {
                user: manager("org-b"),
                request_id: "req-1".to_string(),
                reason: Some("not relevant".to_string()),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_unknown_request() {
        let mut fixture = Fixture::new();
        fixture
            .requests
            .expect_get_request()
            .returning(|_| Box::pin(async { Ok(None) }));

        let service = fixture.service();
        let result = service
            .reject_sharing_request(ResolveSharingRequest {
                user: manager("org-b"),
                request_id: "req-404".to_string(),
                reason: None,
            })
            .await;

        assert!(matches!(result, Err(DomainError::SharingRequestNotFound(_))));
    }

    #[tokio::test]
    async fn test_pending_approvals_scoped_to_feature() {
        let mut fixture = Fixture::new();
        fixture
            .requests
            .expect_list_pending_for_target()
            .withf(|target, feature| target == "org-b" && feature == &Some("sales_intelligence"))
            .times(1)
            .returning(|_, _| {
                Box::pin(async { Ok(vec![sharing_request("req-1", SharingStatus::Pending)]) })
            });

        let service = fixture.service();
        let pending = service
            .get_pending_approvals(GetPendingApprovalsRequest {
                user: manager("org-b"),
                target_organization_id: "org-b".to_string(),
                rag_feature: Some("sales_intelligence".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(pending.len(), 1);
    }
}
