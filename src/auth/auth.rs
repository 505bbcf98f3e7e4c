use std::collections::BTreeSet;

use crate::error::ApiError;
use crate::model::{permission::Permission, role::Role};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// The caller, placed in the request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthUser>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(ApiError::Unauthorized("Missing token").into())),
        }
    }
}

impl AuthUser {
    pub fn can(&self, permission: Permission) -> bool {
        self.role == Role::Admin || self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("Missing permission: {permission}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            permissions: role.default_permissions(),
        }
    }

    #[test]
    fn admin_passes_every_check() {
        let admin = user(Role::Admin);
        assert!(admin.require(Permission::UsersManage).is_ok());
        assert!(admin.require(Permission::PayrollRun).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let viewer = user(Role::Viewer);
        assert!(viewer.require(Permission::EmployeesRead).is_ok());
        let err = viewer.require(Permission::PayrollRun).unwrap_err();
        assert_eq!(err.to_string(), "Missing permission: payroll:run");
    }
}
