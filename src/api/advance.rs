use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::employee::find_employee,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        advance::{ADVANCE_COLUMNS, Advance, AdvanceStatus, monthly_deduction},
        permission::Permission,
    },
    utils::{
        db_utils::Filters,
        pagination::{PageParams, fetch_page},
        validation::{month, require_max_len, require_positive, round2},
    },
};

const MAX_INSTALLMENTS: u32 = 60;

#[derive(Deserialize, ToSchema)]
pub struct CreateAdvance {
    #[schema(example = 12)]
    pub employee_id: u64,
    #[schema(example = 500.0)]
    pub amount: f64,
    #[schema(example = 2)]
    pub installments: u32,
    /// First payroll month the installments are deducted from
    #[serde(deserialize_with = "month::deserialize")]
    #[schema(value_type = String, example = "2026-02")]
    pub start_month: NaiveDate,
    pub reason: Option<String>,
}

impl CreateAdvance {
    fn validate(&self) -> ApiResult<()> {
        require_positive("amount", self.amount)?;
        if !(1..=MAX_INSTALLMENTS).contains(&self.installments) {
            return Err(ApiError::validation(format!(
                "installments must be between 1 and {MAX_INSTALLMENTS}"
            )));
        }
        if let Some(reason) = &self.reason {
            require_max_len("reason", reason, 512)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdvanceFilter {
    pub employee_id: Option<u64>,
    pub status: Option<AdvanceStatus>,
}

pub async fn find_advance(pool: &MySqlPool, id: u64) -> ApiResult<Advance> {
    sqlx::query_as::<_, Advance>(&format!(
        "SELECT {} FROM advances WHERE id = ?",
        ADVANCE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, advance_id = id, "Failed to fetch advance");
        ApiError::Internal
    })?
    .ok_or(ApiError::NotFound("Advance"))
}

/// List advances
#[utoipa::path(
    get,
    path = "/api/advances",
    params(PageParams, AdvanceFilter),
    responses((status = 200, description = "Paginated advance list", body = AdvanceList)),
    security(("bearer_auth" = [])),
    tag = "Advance"
)]
pub async fn list_advances(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<AdvanceFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AdvancesRead)?;

    let mut filters = Filters::new();
    filters.eq("employee_id", query.employee_id);
    filters.eq("status", query.status.map(|s| s.to_string()));

    let list = fetch_page::<Advance>(
        pool.get_ref(),
        &format!("SELECT {} FROM advances", ADVANCE_COLUMNS),
        "advances",
        &filters,
        "id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Request a salary advance
#[utoipa::path(
    post,
    path = "/api/advances",
    request_body = CreateAdvance,
    responses(
        (status = 201, description = "Advance created as pending", body = Advance),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Advance"
)]
pub async fn create_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAdvance>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AdvancesWrite)?;
    payload.validate()?;

    find_employee(pool.get_ref(), payload.employee_id).await?;

    let amount = round2(payload.amount);
    let result = sqlx::query(
        r#"
        INSERT INTO advances
        (employee_id, amount, installments, monthly_deduction, remaining_amount, start_month, status, reason)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(amount)
    .bind(payload.installments)
    .bind(monthly_deduction(amount, payload.installments))
    .bind(amount)
    .bind(payload.start_month)
    .bind(AdvanceStatus::Pending.as_ref())
    .bind(&payload.reason)
    .execute(pool.get_ref())
    .await?;

    let advance = find_advance(pool.get_ref(), result.last_insert_id()).await?;
    info!(
        advance_id = advance.id,
        employee_id = advance.employee_id,
        amount,
        user_id = auth.user_id,
        "Advance requested"
    );

    Ok(HttpResponse::Created().json(advance))
}

/// Get advance by ID
#[utoipa::path(
    get,
    path = "/api/advances/{id}",
    params(("id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, description = "Advance found", body = Advance),
        (status = 404, description = "Advance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Advance"
)]
pub async fn get_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AdvancesRead)?;

    let advance = find_advance(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(advance))
}

/// Moves a pending advance to `decision`. The status guard sits in the UPDATE
/// itself so two reviewers racing cannot both win.
async fn review_advance(
    pool: &MySqlPool,
    id: u64,
    reviewer: u64,
    decision: AdvanceStatus,
) -> ApiResult<Advance> {
    let result = sqlx::query(
        r#"
        UPDATE advances
        SET status = ?, reviewed_by = ?, reviewed_at = NOW()
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(decision.as_ref())
    .bind(reviewer)
    .bind(id)
    .bind(AdvanceStatus::Pending.as_ref())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let current = find_advance(pool, id).await?;
        warn!(advance_id = id, status = %current.status, "Advance review refused");
        return Err(ApiError::conflict(format!(
            "Advance is already {}",
            current.status
        )));
    }

    info!(advance_id = id, reviewer, status = %decision, "Advance reviewed");
    find_advance(pool, id).await
}

/// Approve a pending advance
#[utoipa::path(
    put,
    path = "/api/advances/{id}/approve",
    params(("id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, description = "Advance approved", body = Advance),
        (status = 404, description = "Advance not found"),
        (status = 409, description = "Advance is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Advance"
)]
pub async fn approve_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AdvancesApprove)?;

    let advance = review_advance(
        pool.get_ref(),
        path.into_inner(),
        auth.user_id,
        AdvanceStatus::Approved,
    )
    .await?;
    Ok(HttpResponse::Ok().json(advance))
}

/// Reject a pending advance
#[utoipa::path(
    put,
    path = "/api/advances/{id}/reject",
    params(("id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, description = "Advance rejected", body = Advance),
        (status = 404, description = "Advance not found"),
        (status = 409, description = "Advance is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Advance"
)]
pub async fn reject_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AdvancesApprove)?;

    let advance = review_advance(
        pool.get_ref(),
        path.into_inner(),
        auth.user_id,
        AdvanceStatus::Rejected,
    )
    .await?;
    Ok(HttpResponse::Ok().json(advance))
}

/// Delete a pending advance
#[utoipa::path(
    delete,
    path = "/api/advances/{id}",
    params(("id" = u64, Path, description = "Advance ID")),
    responses(
        (status = 200, description = "Advance deleted", body = Object, example = json!({
            "message": "Advance deleted"
        })),
        (status = 404, description = "Advance not found"),
        (status = 409, description = "Advance is no longer pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Advance"
)]
pub async fn delete_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AdvancesWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM advances WHERE id = ? AND status = ?")
        .bind(id)
        .bind(AdvanceStatus::Pending.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        let current = find_advance(pool.get_ref(), id).await?;
        return Err(ApiError::conflict(format!(
            "Only pending advances can be deleted (status: {})",
            current.status
        )));
    }

    info!(advance_id = id, user_id = auth.user_id, "Advance deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Advance deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_app_with_user, user_with_role};
    use crate::model::role::Role;
    use actix_web::{http::StatusCode, test as actix_test};

    fn payload(amount: f64, installments: u32) -> serde_json::Value {
        json!({
            "employee_id": 12,
            "amount": amount,
            "installments": installments,
            "start_month": "2026-02"
        })
    }

    #[test]
    fn start_month_is_normalized() {
        let body: CreateAdvance = serde_json::from_value(json!({
            "employee_id": 1,
            "amount": 500.0,
            "installments": 2,
            "start_month": "2026-02-17"
        }))
        .unwrap();
        assert_eq!(body.start_month, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    }

    #[test]
    fn installment_bounds() {
        for (n, ok) in [(0, false), (1, true), (60, true), (61, false)] {
            let body: CreateAdvance = serde_json::from_value(payload(100.0, n)).unwrap();
            assert_eq!(body.validate().is_ok(), ok, "installments = {n}");
        }
    }

    #[actix_web::test]
    async fn zero_amount_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/advances", web::post().to(create_advance));
        });
        for amount in [0.0, 0.004] {
            let req = actix_test::TestRequest::post()
                .uri("/api/advances")
                .set_json(payload(amount, 2))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "amount = {amount}");
            let body: serde_json::Value = actix_test::read_body_json(resp).await;
            assert_eq!(body["message"], "amount must be at least 0.01");
        }
    }

    #[actix_web::test]
    async fn bad_start_month_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/advances", web::post().to(create_advance));
        });
        let mut body = payload(500.0, 2);
        body["start_month"] = json!("February");
        let req = actix_test::TestRequest::post()
            .uri("/api/advances")
            .set_json(body)
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn hr_cannot_approve() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/advances/{id}/approve", web::put().to(approve_advance));
        });
        let req = actix_test::TestRequest::put()
            .uri("/api/advances/3/approve")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
