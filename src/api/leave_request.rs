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
        leave_request::{LEAVE_COLUMNS, LeaveRequest, LeaveStatus, LeaveType, leave_days},
        permission::Permission,
    },
    utils::{
        db_utils::Filters,
        pagination::{PageParams, fetch_page},
        validation::{require_date_order, require_max_len},
    },
};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeaveRequest {
    #[schema(example = 12)]
    pub employee_id: u64,
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = Date, example = "2026-03-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2026-03-03")]
    pub end_date: NaiveDate,
    #[schema(example = "Flu")]
    pub reason: Option<String>,
}

impl CreateLeaveRequest {
    fn validate(&self) -> ApiResult<()> {
        require_date_order("start_date", self.start_date, "end_date", self.end_date)?;
        if let Some(reason) = &self.reason {
            require_max_len("reason", reason, 512)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaveFilter {
    pub employee_id: Option<u64>,
    pub status: Option<LeaveStatus>,
    pub leave_type: Option<LeaveType>,
}

pub async fn find_leave(pool: &MySqlPool, id: u64) -> ApiResult<LeaveRequest> {
    sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {} FROM leave_requests WHERE id = ?",
        LEAVE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, leave_id = id, "Failed to fetch leave request");
        ApiError::Internal
    })?
    .ok_or(ApiError::NotFound("Leave request"))
}

/// List leave requests
#[utoipa::path(
    get,
    path = "/api/leave",
    params(PageParams, LeaveFilter),
    responses((status = 200, description = "Paginated leave requests", body = LeaveList)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<LeaveFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveRead)?;

    let mut filters = Filters::new();
    filters.eq("employee_id", query.employee_id);
    filters.eq("status", query.status.map(|s| s.to_string()));
    filters.eq("leave_type", query.leave_type.map(|t| t.to_string()));

    let list = fetch_page::<LeaveRequest>(
        pool.get_ref(),
        &format!("SELECT {} FROM leave_requests", LEAVE_COLUMNS),
        "leave_requests",
        &filters,
        "start_date DESC, id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create leave request
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body = CreateLeaveRequest,
    responses(
        (status = 201, description = "Leave request created as pending", body = LeaveRequest),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeaveRequest>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveWrite)?;
    payload.validate()?;

    find_employee(pool.get_ref(), payload.employee_id).await?;

    let days = leave_days(payload.start_date, payload.end_date);
    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (employee_id, leave_type, start_date, end_date, days, status, reason)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(days)
    .bind(LeaveStatus::Pending.as_ref())
    .bind(&payload.reason)
    .execute(pool.get_ref())
    .await?;

    let leave = find_leave(pool.get_ref(), result.last_insert_id()).await?;
    info!(
        leave_id = leave.id,
        employee_id = leave.employee_id,
        days,
        user_id = auth.user_id,
        "Leave requested"
    );

    Ok(HttpResponse::Created().json(leave))
}

/// Get leave request by ID
#[utoipa::path(
    get,
    path = "/api/leave/{id}",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveRead)?;

    let leave = find_leave(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(leave))
}

async fn review_leave(
    pool: &MySqlPool,
    id: u64,
    reviewer: u64,
    decision: LeaveStatus,
) -> ApiResult<LeaveRequest> {
    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, reviewed_by = ?, reviewed_at = NOW()
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(decision.as_ref())
    .bind(reviewer)
    .bind(id)
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let current = find_leave(pool, id).await?;
        warn!(leave_id = id, status = %current.status, "Leave review refused");
        return Err(ApiError::conflict(format!(
            "Leave request is already {}",
            current.status
        )));
    }

    info!(leave_id = id, reviewer, status = %decision, "Leave request reviewed");
    find_leave(pool, id).await
}

/// Approve leave request
#[utoipa::path(
    put,
    path = "/api/leave/{id}/approve",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave approved", body = LeaveRequest),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveApprove)?;

    let leave = review_leave(
        pool.get_ref(),
        path.into_inner(),
        auth.user_id,
        LeaveStatus::Approved,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Reject leave request
#[utoipa::path(
    put,
    path = "/api/leave/{id}/reject",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveRequest),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveApprove)?;

    let leave = review_leave(
        pool.get_ref(),
        path.into_inner(),
        auth.user_id,
        LeaveStatus::Rejected,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Delete a pending leave request
#[utoipa::path(
    delete,
    path = "/api/leave/{id}",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request deleted", body = Object, example = json!({
            "message": "Leave request deleted"
        })),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request is no longer pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn delete_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM leave_requests WHERE id = ? AND status = ?")
        .bind(id)
        .bind(LeaveStatus::Pending.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        let current = find_leave(pool.get_ref(), id).await?;
        return Err(ApiError::conflict(format!(
            "Only pending leave requests can be deleted (status: {})",
            current.status
        )));
    }

    info!(leave_id = id, user_id = auth.user_id, "Leave request deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Leave request deleted" })))
}
