use std::sync::Arc;

use common::auth::{AccessEvaluator, OrgRole, UserContext};
use common::domain::{
    DomainError, DomainResult, OrganizationQuota, QuotaKind, QuotaOperation, QuotaRepository,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Request to check headroom before consuming quota
#[derive(Debug, Clone, Validate)]
pub struct CheckQuotaRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(skip)]
    pub kind: QuotaKind,
    #[garde(range(min = 1))]
    pub quantity: i32,
}

/// Request to record consumed or released quota
#[derive(Debug, Clone, Validate)]
pub struct UpdateQuotaUsageRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(skip)]
    pub kind: QuotaKind,
    #[garde(range(min = 1))]
    pub quantity: i32,
    #[garde(skip)]
    pub operation: QuotaOperation,
}

/// Request to zero one or all usage counters
#[derive(Debug, Clone, Validate)]
pub struct ResetQuotaUsageRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(skip)]
    pub kind: Option<QuotaKind>,
}

/// Request to read an organization's quota row
#[derive(Debug, Clone, Validate)]
pub struct GetQuotaRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
}

/// Snapshot of a quota check. `quota_exceeded` mirrors the negation of
/// `within_quota` so callers can branch on either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub within_quota: bool,
    pub quota_exceeded: bool,
    pub current: i32,
    pub max: i32,
}

/// Domain service wrapping the per-organization usage counters
pub struct QuotaService {
    quotas: Arc<dyn QuotaRepository>,
    evaluator: Arc<dyn AccessEvaluator>,
}

impl QuotaService {
    pub fn new(quotas: Arc<dyn QuotaRepository>, evaluator: Arc<dyn AccessEvaluator>) -> Self {
        Self { quotas, evaluator }
    }

    /// Quota row for an organization, lazily created with defaults
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn get_quota(&self, request: GetQuotaRequest) -> DomainResult<OrganizationQuota> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        self.quotas
            .get_or_create_quota(&request.organization_id)
            .await
    }

    /// Whether `quantity` more units fit under the ceiling. Never mutates.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, kind = %request.kind.as_str()))]
    pub async fn check_quota_limits(&self, request: CheckQuotaRequest) -> DomainResult<QuotaCheck> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let quota = self
            .quotas
            .get_or_create_quota(&request.organization_id)
            .await?;

        let within_quota = !quota.would_exceed(request.kind, request.quantity);
        debug!(
            current = quota.current(request.kind),
            max = quota.max(request.kind),
            within_quota,
            "quota checked"
        );

        Ok(QuotaCheck {
            within_quota,
            quota_exceeded: !within_quota,
            current: quota.current(request.kind),
            max: quota.max(request.kind),
        })
    }

    /// Record consumed (increment) or released (decrement, clamped at zero)
    /// usage. Increments past the ceiling fail with `QuotaExceeded`.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, kind = %request.kind.as_str()))]
    pub async fn update_quota_usage(&self, request: UpdateQuotaUsageRequest) -> DomainResult<()> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let quota = self
            .quotas
            .get_or_create_quota(&request.organization_id)
            .await?;

        if request.operation == QuotaOperation::Increment
            && quota.would_exceed(request.kind, request.quantity)
        {
            return Err(DomainError::QuotaExceeded {
                organization_id: request.organization_id.clone(),
                quota_kind: request.kind.as_str().to_string(),
                current: quota.current(request.kind),
                max: quota.max(request.kind),
                requested: request.quantity,
            });
        }

        let updated = self
            .quotas
            .adjust_usage(
                &request.organization_id,
                request.kind,
                request.quantity,
                request.operation,
            )
            .await?;
        if updated == 0 {
            return Err(DomainError::QuotaNotFound(request.organization_id.clone()));
        }

        debug!(quantity = request.quantity, "quota usage updated");
        Ok(())
    }

    /// Zero one counter, or every counter when `kind` is absent.
    /// Org-admin only. Returns the number of counters reset.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn reset_quota_usage(&self, request: ResetQuotaUsageRequest) -> DomainResult<u64> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let reset = self
            .quotas
            .reset_usage(&request.organization_id, request.kind)
            .await?;
        if reset == 0 {
            return Err(DomainError::QuotaNotFound(request.organization_id.clone()));
        }

        debug!(counters_reset = reset, "quota usage reset");
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::auth::MockAccessEvaluator;
    use common::domain::{MockQuotaRepository, DEFAULT_MAX_GLOBAL_ACCESS, DEFAULT_MAX_SHARING_REQUESTS};

    fn quota(current_context_items: i32, max_context_items: i32) -> OrganizationQuota {
        OrganizationQuota {
            organization_id: "org-1".to_string(),
            max_context_items,
            current_context_items,
            max_global_access: DEFAULT_MAX_GLOBAL_ACCESS,
            current_global_access: 0,
            max_sharing_requests: DEFAULT_MAX_SHARING_REQUESTS,
            current_sharing_requests: 0,
            created_at: None,
            updated_at: None,
        }
    }

    fn admin(org_id: &str) -> UserContext {
        UserContext::new("user-123", Some(org_id), OrgRole::OrgAdmin)
    }

    fn permissive_evaluator() -> MockAccessEvaluator {
        let mut eval = MockAccessEvaluator::new();
        eval.expect_require_organization_access()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        eval.expect_require_role()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        eval
    }

    #[tokio::test]
    async fn test_check_within_quota() {
        let mut quotas = MockQuotaRepository::new();
        quotas
            .expect_get_or_create_quota()
            .returning(|_| Box::pin(async { Ok(quota(5, 10)) }));

        let service = QuotaService::new(Arc::new(quotas), Arc::new(permissive_evaluator()));
        let check = service
            .check_quota_limits(CheckQuotaRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                kind: QuotaKind::ContextItems,
                quantity: 5,
            })
            .await
            .unwrap();

        assert!(check.within_quota);
        assert!(!check.quota_exceeded);
        assert_eq!(check.current, 5);
        assert_eq!(check.max, 10);
    }

    #[tokio::test]
    async fn test_check_exceeded_at_ceiling() {
        let mut quotas = MockQuotaRepository::new();
        quotas
            .expect_get_or_create_quota()
            .returning(|_| Box::pin(async { Ok(quota(10, 10)) }));

        let service = QuotaService::new(Arc::new(quotas), Arc::new(permissive_evaluator()));
        let check = service
            .check_quota_limits(CheckQuotaRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                kind: QuotaKind::ContextItems,
                quantity: 1,
            })
            .await
            .unwrap();

        assert!(check.quota_exceeded);
    }

    #[tokio::test]
    async fn test_increment_past_ceiling_rejected() {
        let mut quotas = MockQuotaRepository::new();
        quotas
            .expect_get_or_create_quota()
            .returning(|_| Box::pin(async { Ok(quota(10, 10)) }));
        quotas.expect_adjust_usage().never();

        let service = QuotaService::new(Arc::new(quotas), Arc::new(permissive_evaluator()));
        let result = service
            .update_quota_usage(UpdateQuotaUsageRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                kind: QuotaKind::ContextItems,
                quantity: 1,
                operation: QuotaOperation::Increment,
            })
            .await;

        assert!(matches!(result, Err(DomainError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn test_decrement_skips_ceiling_check() {
        let mut quotas = MockQuotaRepository::new();
        quotas
            .expect_get_or_create_quota()
            .returning(|_| Box::pin(async { Ok(quota(10, 10)) }));
        quotas
            .expect_adjust_usage()
            .withf(|_, _, quantity, operation| {
                *quantity == 3 && *operation == QuotaOperation::Decrement
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(1) }));

        let service = QuotaService::new(Arc::new(quotas), Arc::new(permissive_evaluator()));
        service
            .update_quota_usage(UpdateQuotaUsageRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                kind: QuotaKind::ContextItems,
                quantity: 3,
                operation: QuotaOperation::Decrement,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_zero_quantity_invalid() {
        let quotas = MockQuotaRepository::new();
        let service = QuotaService::new(Arc::new(quotas), Arc::new(permissive_evaluator()));

        let result = service
            .update_quota_usage(UpdateQuotaUsageRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                kind: QuotaKind::ContextItems,
                quantity: 0,
                operation: QuotaOperation::Increment,
            })
            .await;

        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_reset_requires_org_admin() {
        let quotas = MockQuotaRepository::new();
        let mut eval = MockAccessEvaluator::new();
        eval.expect_require_role().returning(|user, min_role| {
            let denied = user.role < min_role;
            Box::pin(async move {
                if denied {
                    Err(DomainError::PermissionDenied("role too low".to_string()))
                } else {
                    Ok(())
                }
            })
        });

        let service = QuotaService::new(Arc::new(quotas), Arc::new(eval));
        let result = service
            .reset_quota_usage(ResetQuotaUsageRequest {
                user: UserContext::new("user-123", Some("org-1"), OrgRole::Salesperson),
                organization_id: "org-1".to_string(),
                kind: None,
            })
            .await;

        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_reset_all_counters() {
        let mut quotas = MockQuotaRepository::new();
        quotas
            .expect_reset_usage()
            .withf(|_, kind| kind.is_none())
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(3) }));

        let service = QuotaService::new(Arc::new(quotas), Arc::new(permissive_evaluator()));
        let reset = service
            .reset_quota_usage(ResetQuotaUsageRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                kind: None,
            })
            .await
            .unwrap();

        assert_eq!(reset, 3);
    }

    #[tokio::test]
    async fn test_reset_missing_row_is_not_found() {
        let mut quotas = MockQuotaRepository::new();
        quotas
            .expect_reset_usage()
            .returning(|_, _| Box::pin(async { Ok(0) }));

        let service = QuotaService::new(Arc::new(quotas), Arc::new(permissive_evaluator()));
        let result = service
            .reset_quota_usage(ResetQuotaUsageRequest {
                user: admin("org-1"),
                organization_id: "org-1".to_string(),
                kind: Some(QuotaKind::ContextItems),
            })
            .await;

        assert!(matches!(result, Err(DomainError::QuotaNotFound(_))));
    }
}
