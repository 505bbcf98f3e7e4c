use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::{ApiError, ApiResult};

/// The static permission list. Each API handler requires exactly one of these.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
pub enum Permission {
    #[strum(serialize = "institutions:read")]
    #[serde(rename = "institutions:read")]
    InstitutionsRead,
    #[strum(serialize = "institutions:write")]
    #[serde(rename = "institutions:write")]
    InstitutionsWrite,
    #[strum(serialize = "branches:read")]
    #[serde(rename = "branches:read")]
    BranchesRead,
    #[strum(serialize = "branches:write")]
    #[serde(rename = "branches:write")]
    BranchesWrite,
    #[strum(serialize = "employees:read")]
    #[serde(rename = "employees:read")]
    EmployeesRead,
    #[strum(serialize = "employees:write")]
    #[serde(rename = "employees:write")]
    EmployeesWrite,
    #[strum(serialize = "documents:read")]
    #[serde(rename = "documents:read")]
    DocumentsRead,
    #[strum(serialize = "documents:write")]
    #[serde(rename = "documents:write")]
    DocumentsWrite,
    #[strum(serialize = "subscriptions:read")]
    #[serde(rename = "subscriptions:read")]
    SubscriptionsRead,
    #[strum(serialize = "subscriptions:write")]
    #[serde(rename = "subscriptions:write")]
    SubscriptionsWrite,
    #[strum(serialize = "advances:read")]
    #[serde(rename = "advances:read")]
    AdvancesRead,
    #[strum(serialize = "advances:write")]
    #[serde(rename = "advances:write")]
    AdvancesWrite,
    #[strum(serialize = "advances:approve")]
    #[serde(rename = "advances:approve")]
    AdvancesApprove,
    #[strum(serialize = "compensations:read")]
    #[serde(rename = "compensations:read")]
    CompensationsRead,
    #[strum(serialize = "compensations:write")]
    #[serde(rename = "compensations:write")]
    CompensationsWrite,
    #[strum(serialize = "payroll:read")]
    #[serde(rename = "payroll:read")]
    PayrollRead,
    #[strum(serialize = "payroll:run")]
    #[serde(rename = "payroll:run")]
    PayrollRun,
    #[strum(serialize = "leave:read")]
    #[serde(rename = "leave:read")]
    LeaveRead,
    #[strum(serialize = "leave:write")]
    #[serde(rename = "leave:write")]
    LeaveWrite,
    #[strum(serialize = "leave:approve")]
    #[serde(rename = "leave:approve")]
    LeaveApprove,
    #[strum(serialize = "forms:read")]
    #[serde(rename = "forms:read")]
    FormsRead,
    #[strum(serialize = "forms:write")]
    #[serde(rename = "forms:write")]
    FormsWrite,
    #[strum(serialize = "users:manage")]
    #[serde(rename = "users:manage")]
    UsersManage,
}

impl Permission {
    pub fn all() -> BTreeSet<Permission> {
        Permission::iter().collect()
    }
}

/// Parses user-supplied permission strings, rejecting anything outside the static list.
pub fn parse_permissions(raw: &[String]) -> ApiResult<BTreeSet<Permission>> {
    raw.iter()
        .map(|p| {
            p.trim()
                .parse::<Permission>()
                .map_err(|_| ApiError::validation(format!("Unknown permission: {p}")))
        })
        .collect()
}

/// Stored permission strings that no longer parse are skipped rather than failing the request.
pub fn parse_stored_permissions(raw: &[String]) -> BTreeSet<Permission> {
    raw.iter().filter_map(|p| p.parse().ok()).collect()
}

pub fn to_strings(perms: &BTreeSet<Permission>) -> Vec<String> {
    perms.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip_through_strum_and_serde() {
        assert_eq!(Permission::AdvancesApprove.to_string(), "advances:approve");
        assert_eq!("payroll:run".parse::<Permission>().unwrap(), Permission::PayrollRun);
        assert_eq!(
            serde_json::to_string(&Permission::UsersManage).unwrap(),
            "\"users:manage\""
        );
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let err = parse_permissions(&["employees:read".into(), "payroll:delete".into()]).unwrap_err();
        assert!(err.to_string().contains("payroll:delete"));
    }

    #[test]
    fn stored_garbage_is_ignored() {
        let perms = parse_stored_permissions(&["forms:read".into(), "legacy:thing".into()]);
        assert_eq!(perms.into_iter().collect::<Vec<_>>(), vec![Permission::FormsRead]);
    }

    #[test]
    fn all_covers_every_variant() {
        assert_eq!(Permission::all().len(), 23);
    }
}
