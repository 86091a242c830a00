use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::auth::{AccessEvaluator, OrgRole, UserContext};
use common::domain::{
    AuditLogEntry, AuditLogFilter, AuditLogPage, AuditLogRepository, DomainError, DomainResult,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Failed logins at or above this count within the window raise an alert
const FAILED_LOGIN_ALERT_THRESHOLD: usize = 4;
const ACTION_LOGIN_FAILED: &str = "login_failed";

/// Request to record one audit entry
#[derive(Debug, Clone, Validate)]
pub struct LogActionRequest {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub action: String,
    #[garde(length(min = 1))]
    pub resource_type: String,
    #[garde(length(min = 1))]
    pub resource_id: String,
    #[garde(skip)]
    pub details: serde_json::Value,
    #[garde(skip)]
    pub ip_address: Option<String>,
    #[garde(skip)]
    pub user_agent: Option<String>,
}

/// Request to read a filtered page of audit entries
#[derive(Debug, Clone, Validate)]
pub struct GetAuditLogsRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(inner(length(min = 1)))]
    pub user_id: Option<String>,
    #[garde(inner(length(min = 1)))]
    pub action: Option<String>,
    #[garde(inner(length(min = 1)))]
    pub resource_type: Option<String>,
    #[garde(skip)]
    pub start_time: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub end_time: Option<DateTime<Utc>>,
    #[garde(range(min = 1, max = 1000))]
    pub limit: i64,
    #[garde(range(min = 0))]
    pub offset: i64,
}

/// Serialization format for audit exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
    Xlsx,
}

/// Request to export an organization's audit trail
#[derive(Debug, Clone, Validate)]
pub struct ExportAuditLogsRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(skip)]
    pub format: ExportFormat,
    #[garde(skip)]
    pub start_time: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Request for aggregate statistics over a time window
#[derive(Debug, Clone, Validate)]
pub struct AuditStatisticsRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(skip)]
    pub start_time: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Request for one user's activity summary
#[derive(Debug, Clone, Validate)]
pub struct UserActivitySummaryRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(length(min = 1))]
    pub target_user_id: String,
    #[garde(range(min = 1, max = 365))]
    pub days: i64,
}

/// Request to scan recent entries for suspicious patterns
#[derive(Debug, Clone, Validate)]
pub struct SecurityAlertsRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(range(min = 1, max = 168))]
    pub window_hours: i64,
}

/// Request to purge entries older than the retention window
#[derive(Debug, Clone, Validate)]
pub struct CleanupOldLogsRequest {
    #[garde(skip)]
    pub user: UserContext,
    #[garde(length(min = 1))]
    pub organization_id: String,
    #[garde(range(min = 1))]
    pub retention_days: i64,
}

/// Aggregate counts over a set of audit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_entries: i64,
    pub action_counts: HashMap<String, i64>,
    pub resource_type_counts: HashMap<String, i64>,
    pub unique_users: usize,
}

/// Per-user activity rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivitySummary {
    pub user_id: String,
    pub total_actions: i64,
    pub active_days: usize,
    pub action_counts: HashMap<String, i64>,
    pub last_action_at: Option<DateTime<Utc>>,
}

/// One detected suspicious pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub alert_type: String,
    pub user_id: String,
    pub count: usize,
}

/// Append-only audit trail over user actions.
/// Writes never fail a caller's business operation at the service layer;
/// they surface repository errors directly so callers can decide.
pub struct AuditService {
    logs: Arc<dyn AuditLogRepository>,
    evaluator: Arc<dyn AccessEvaluator>,
}

impl AuditService {
    pub fn new(logs: Arc<dyn AuditLogRepository>, evaluator: Arc<dyn AccessEvaluator>) -> Self {
        Self { logs, evaluator }
    }

    /// Record one entry. Timestamp and id are assigned here, never by the
    /// caller.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, action = %request.action))]
    pub async fn log_action(&self, request: LogActionRequest) -> DomainResult<()> {
        common::garde::validate(&request)?;

        self.logs
            .append_entry(AuditLogEntry {
                id: xid::new().to_string(),
                user_id: Some(request.user_id.clone()),
                organization_id: request.organization_id.clone(),
                action: request.action.clone(),
                resource_type: request.resource_type.clone(),
                resource_id: request.resource_id.clone(),
                details: request.details.clone(),
                ip_address: request.ip_address.clone(),
                user_agent: request.user_agent.clone(),
                created_at: Some(Utc::now()),
            })
            .await?;

        debug!(action = %request.action, "audit entry recorded");
        Ok(())
    }

    /// Filtered, paginated page of an organization's audit trail
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn get_audit_logs(&self, request: GetAuditLogsRequest) -> DomainResult<AuditLogPage> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::Manager)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        self.logs
            .query_entries(AuditLogFilter {
                organization_id: request.organization_id.clone(),
                user_id: request.user_id.clone(),
                action: request.action.clone(),
                resource_type: request.resource_type.clone(),
                start_time: request.start_time,
                end_time: request.end_time,
                limit: request.limit,
                offset: request.offset,
            })
            .await
    }

    async fn collect_entries(
        &self,
        organization_id: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<AuditLogEntry>> {
        let mut filter = AuditLogFilter::for_organization(organization_id);
        filter.start_time = start_time;
        filter.end_time = end_time;
        filter.limit = 1000;

        let mut entries = Vec::new();
        loop {
            let page = self.logs.query_entries(filter.clone()).await?;
            entries.extend(page.entries);
            if !page.has_more {
                break;
            }
            filter.offset += filter.limit;
        }
        Ok(entries)
    }

    /// Serialize the matching entries. An empty window still succeeds with a
    /// placeholder document.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, format = ?request.format))]
    pub async fn export_audit_logs(&self, request: ExportAuditLogsRequest) -> DomainResult<String> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::Manager)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        if request.format == ExportFormat::Xlsx {
            return Err(DomainError::ValidationError(
                "xlsx export is not supported".to_string(),
            ));
        }

        let entries = self
            .collect_entries(&request.organization_id, request.start_time, request.end_time)
            .await?;

        if entries.is_empty() {
            return Ok(match request.format {
                ExportFormat::Json => "[]".to_string(),
                _ => "No data found".to_string(),
            });
        }

        match request.format {
            ExportFormat::Json => {
                serde_json::to_string_pretty(&entries).map_err(|e| anyhow::Error::from(e).into())
            }
            ExportFormat::Csv => Ok(render_csv(&entries)),
            ExportFormat::Xlsx => unreachable!("rejected above"),
        }
    }

    /// Aggregate action, resource, and user counts for a window
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn get_audit_statistics(
        &self,
        request: AuditStatisticsRequest,
    ) -> DomainResult<AuditStatistics> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::Manager)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let entries = self
            .collect_entries(&request.organization_id, request.start_time, request.end_time)
            .await?;

        let mut action_counts: HashMap<String, i64> = HashMap::new();
        let mut resource_type_counts: HashMap<String, i64> = HashMap::new();
        let mut users: HashSet<&str> = HashSet::new();

        for entry in &entries {
            *action_counts.entry(entry.action.clone()).or_insert(0) += 1;
            *resource_type_counts
                .entry(entry.resource_type.clone())
                .or_insert(0) += 1;
            if let Some(user_id) = entry.user_id.as_deref() {
                if !user_id.is_empty() {
                    users.insert(user_id);
                }
            }
        }

        Ok(AuditStatistics {
            total_entries: entries.len() as i64,
            action_counts,
            resource_type_counts,
            unique_users: users.len(),
        })
    }

    /// Rollup of one user's recent actions. Entries with no timestamp count
    /// toward totals but not toward active days.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, target_user_id = %request.target_user_id))]
    pub async fn get_user_activity_summary(
        &self,
        request: UserActivitySummaryRequest,
    ) -> DomainResult<UserActivitySummary> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::Manager)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let start = Utc::now() - Duration::days(request.days);
        let mut filter = AuditLogFilter::for_organization(&request.organization_id);
        filter.user_id = Some(request.target_user_id.clone());
        filter.start_time = Some(start);
        filter.limit = 1000;

        let mut entries = Vec::new();
        loop {
            let page = self.logs.query_entries(filter.clone()).await?;
            entries.extend(page.entries);
            if !page.has_more {
                break;
            }
            filter.offset += filter.limit;
        }

        let mut action_counts: HashMap<String, i64> = HashMap::new();
        let mut days: HashSet<String> = HashSet::new();
        let mut last_action_at: Option<DateTime<Utc>> = None;

        for entry in &entries {
            *action_counts.entry(entry.action.clone()).or_insert(0) += 1;
            if let Some(ts) = entry.created_at {
                days.insert(ts.format("%Y-%m-%d").to_string());
                if last_action_at.map_or(true, |last| ts > last) {
                    last_action_at = Some(ts);
                }
            }
        }

        Ok(UserActivitySummary {
            user_id: request.target_user_id,
            total_actions: entries.len() as i64,
            active_days: days.len(),
            action_counts,
            last_action_at,
        })
    }

    /// Flag users with repeated failed logins inside the window
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id))]
    pub async fn check_security_alerts(
        &self,
        request: SecurityAlertsRequest,
    ) -> DomainResult<Vec<SecurityAlert>> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let start = Utc::now() - Duration::hours(request.window_hours);
        let mut filter = AuditLogFilter::for_organization(&request.organization_id);
        filter.action = Some(ACTION_LOGIN_FAILED.to_string());
        filter.start_time = Some(start);
        filter.limit = 1000;

        let page = self.logs.query_entries(filter).await?;

        let mut failures_by_user: HashMap<String, usize> = HashMap::new();
        for entry in &page.entries {
            if let Some(user_id) = entry.user_id.as_deref() {
                *failures_by_user.entry(user_id.to_string()).or_insert(0) += 1;
            }
        }

        let mut alerts: Vec<SecurityAlert> = failures_by_user
            .into_iter()
            .filter(|(_, count)| *count >= FAILED_LOGIN_ALERT_THRESHOLD)
            .map(|(user_id, count)| SecurityAlert {
                alert_type: "multiple_failed_logins".to_string(),
                user_id,
                count,
            })
            .collect();
        alerts.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        debug!(alert_count = alerts.len(), "security scan finished");
        Ok(alerts)
    }

    /// Purge entries older than the retention window; org-admin only
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, retention_days = request.retention_days))]
    pub async fn cleanup_old_logs(&self, request: CleanupOldLogsRequest) -> DomainResult<u64> {
        common::garde::validate(&request)?;
        self.evaluator
            .require_role(&request.user, OrgRole::OrgAdmin)
            .await?;
        self.evaluator
            .require_organization_access(&request.user, &request.organization_id)
            .await?;

        let cutoff = Utc::now() - Duration::days(request.retention_days);
        let deleted = self
            .logs
            .delete_entries_before(&request.organization_id, cutoff)
            .await?;

        debug!(deleted, "old audit entries purged");
        Ok(deleted)
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_csv(entries: &[AuditLogEntry]) -> String {
    let mut out = String::from(
        "id,user_id,organization_id,action,resource_type,resource_id,ip_address,created_at\n",
    );
    for entry in entries {
        let created_at = entry
            .created_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            csv_escape(&entry.id),
            csv_escape(entry.user_id.as_deref().unwrap_or("")),
            csv_escape(&entry.organization_id),
            csv_escape(&entry.action),
            csv_escape(&entry.resource_type),
            csv_escape(&entry.resource_id),
            csv_escape(entry.ip_address.as_deref().unwrap_or("")),
            created_at,
        ));
    }
    out
}
