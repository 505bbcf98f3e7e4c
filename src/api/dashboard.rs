use actix_web::{HttpResponse, web};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::ApiResult,
    model::{
        payroll::{PAYROLL_RUN_COLUMNS, PayrollRun},
        permission::Permission,
    },
};

/// Days ahead counted as "expiring soon".
const EXPIRY_WINDOW_DAYS: u32 = 30;

#[derive(Serialize, ToSchema)]
pub struct DashboardSummary {
    pub institutions: i64,
    pub branches: i64,
    pub active_employees: i64,
    pub pending_advances: i64,
    pub pending_leave_requests: i64,
    pub expiring_documents: i64,
    pub expiring_subscriptions: i64,
    pub latest_payroll_run: Option<PayrollRun>,
}

async fn count(pool: &MySqlPool, sql: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
}

async fn count_expiring(pool: &MySqlPool, table: &str, column: &str) -> Result<i64, sqlx::Error> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} BETWEEN CURDATE() AND CURDATE() + INTERVAL ? DAY",
        table, column
    );
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(EXPIRY_WINDOW_DAYS)
        .fetch_one(pool)
        .await
}

/// Dashboard counters
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses((status = 200, description = "Headline counts", body = DashboardSummary)),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn summary(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesRead)?;

    let pool = pool.get_ref();
    let (institutions, branches, active_employees, pending_advances, pending_leave_requests) =
        futures::try_join!(
            count(pool, "SELECT COUNT(*) FROM institutions"),
            count(pool, "SELECT COUNT(*) FROM branches"),
            count(pool, "SELECT COUNT(*) FROM employees WHERE status = 'active'"),
            count(pool, "SELECT COUNT(*) FROM advances WHERE status = 'pending'"),
            count(pool, "SELECT COUNT(*) FROM leave_requests WHERE status = 'pending'"),
        )?;

    let (expiring_documents, expiring_subscriptions) = futures::try_join!(
        count_expiring(pool, "documents", "expiry_date"),
        count_expiring(pool, "subscriptions", "end_date"),
    )?;

    let latest_payroll_run = sqlx::query_as::<_, PayrollRun>(&format!(
        "SELECT {} FROM payroll_runs ORDER BY month DESC, id DESC LIMIT 1",
        PAYROLL_RUN_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    Ok(HttpResponse::Ok().json(DashboardSummary {
        institutions,
        branches,
        active_employees,
        pending_advances,
        pending_leave_requests,
        expiring_documents,
        expiring_subscriptions,
        latest_payroll_run,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_app_with_user;
    use crate::model::role::Role;
    use actix_web::{http::StatusCode, test as actix_test};
    use std::collections::BTreeSet;

    #[actix_web::test]
    async fn needs_employee_read() {
        let mut user = crate::api::test_support::user_with_role(Role::Viewer);
        user.permissions = BTreeSet::new();
        let app = test_app_with_user!(user, |cfg| {
            cfg.route("/api/dashboard", web::get().to(summary));
        });
        let req = actix_test::TestRequest::get().uri("/api/dashboard").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
