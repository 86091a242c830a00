use serde::{Deserialize, Serialize};

/// Role hierarchy, ascending. Variant order matters: `Ord` is derived, so
/// rank comparisons are plain `>=` on the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    User,
    Salesperson,
    Manager,
    OrgAdmin,
    SystemAdmin,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::User => "user",
            OrgRole::Salesperson => "salesperson",
            OrgRole::Manager => "manager",
            OrgRole::OrgAdmin => "org_admin",
            OrgRole::SystemAdmin => "system_admin",
        }
    }

    /// Parse a stored role string. Unknown or missing roles fall back to the
    /// least-privileged rank.
    pub fn parse(value: &str) -> OrgRole {
        match value {
            "salesperson" => OrgRole::Salesperson,
            "manager" => OrgRole::Manager,
            "org_admin" => OrgRole::OrgAdmin,
            "system_admin" => OrgRole::SystemAdmin,
            _ => OrgRole::User,
        }
    }
}
