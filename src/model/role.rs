use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::model::permission::Permission;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Accountant = 3,
    Viewer = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Accountant),
            4 => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Permissions a role carries before any per-user grants.
    pub fn default_permissions(self) -> BTreeSet<Permission> {
        use Permission::*;
        match self {
            Role::Admin => Permission::all(),
            Role::Hr => [
                InstitutionsRead,
                BranchesRead,
                BranchesWrite,
                EmployeesRead,
                EmployeesWrite,
                DocumentsRead,
                DocumentsWrite,
                SubscriptionsRead,
                AdvancesRead,
                AdvancesWrite,
                CompensationsRead,
                LeaveRead,
                LeaveWrite,
                LeaveApprove,
                FormsRead,
                FormsWrite,
            ]
            .into_iter()
            .collect(),
            Role::Accountant => [
                InstitutionsRead,
                BranchesRead,
                EmployeesRead,
                SubscriptionsRead,
                SubscriptionsWrite,
                AdvancesRead,
                AdvancesApprove,
                CompensationsRead,
                CompensationsWrite,
                PayrollRead,
                PayrollRun,
                LeaveRead,
            ]
            .into_iter()
            .collect(),
            Role::Viewer => [
                InstitutionsRead,
                BranchesRead,
                EmployeesRead,
                DocumentsRead,
                SubscriptionsRead,
                LeaveRead,
                FormsRead,
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Role defaults plus the user's stored grants. Admin always holds everything.
    pub fn effective_permissions(self, granted: &BTreeSet<Permission>) -> BTreeSet<Permission> {
        let mut perms = self.default_permissions();
        if self != Role::Admin {
            perms.extend(granted.iter().copied());
        }
        perms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for role in [Role::Admin, Role::Hr, Role::Accountant, Role::Viewer] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(9), None);
    }

    #[test]
    fn admin_holds_every_permission() {
        assert_eq!(
            Role::Admin.effective_permissions(&BTreeSet::new()),
            Permission::all()
        );
    }

    #[test]
    fn grants_extend_role_defaults() {
        let granted = [Permission::PayrollRun].into_iter().collect();
        let perms = Role::Viewer.effective_permissions(&granted);
        assert!(perms.contains(&Permission::PayrollRun));
        assert!(perms.contains(&Permission::EmployeesRead));
        assert!(!perms.contains(&Permission::EmployeesWrite));
    }

    #[test]
    fn viewer_cannot_write() {
        let perms = Role::Viewer.default_permissions();
        assert!(perms.iter().all(|p| p.as_ref().ends_with(":read")));
    }

    #[test]
    fn role_names_are_snake_case() {
        assert_eq!(Role::Accountant.to_string(), "accountant");
        assert_eq!("hr".parse::<Role>().unwrap(), Role::Hr);
    }
}
