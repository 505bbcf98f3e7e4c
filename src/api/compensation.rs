use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::employee::find_employee,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        compensation::{COMPENSATION_COLUMNS, Compensation, CompensationKind},
        permission::Permission,
    },
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{PageParams, fetch_page},
        validation::{month, month_option, require_positive, round2},
    },
};

#[derive(Deserialize, ToSchema)]
pub struct CreateCompensation {
    #[schema(example = 12)]
    pub employee_id: u64,
    pub kind: CompensationKind,
    #[schema(example = 350.0)]
    pub amount: f64,
    #[serde(deserialize_with = "month::deserialize")]
    #[schema(value_type = String, example = "2026-02")]
    pub month: NaiveDate,
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateCompensation {
    pub kind: Option<CompensationKind>,
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "month_option::deserialize")]
    #[schema(value_type = Option<String>, example = "2026-03")]
    pub month: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CompensationFilter {
    pub employee_id: Option<u64>,
    /// `YYYY-MM`
    #[serde(default, deserialize_with = "month_option::deserialize")]
    #[param(value_type = Option<String>)]
    pub month: Option<NaiveDate>,
    pub kind: Option<CompensationKind>,
}

pub async fn find_compensation(pool: &MySqlPool, id: u64) -> ApiResult<Compensation> {
    sqlx::query_as::<_, Compensation>(&format!(
        "SELECT {} FROM compensations WHERE id = ?",
        COMPENSATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, compensation_id = id, "Failed to fetch compensation");
        ApiError::Internal
    })?
    .ok_or(ApiError::NotFound("Compensation"))
}

/// Lines already consumed by a payroll run are frozen.
fn ensure_unapplied(compensation: &Compensation) -> ApiResult<()> {
    match compensation.payroll_run_id {
        Some(run_id) => Err(ApiError::conflict(format!(
            "Compensation was applied by payroll run {run_id}"
        ))),
        None => Ok(()),
    }
}

/// List compensations
#[utoipa::path(
    get,
    path = "/api/compensations",
    params(PageParams, CompensationFilter),
    responses((status = 200, description = "Paginated compensation list", body = CompensationList)),
    security(("bearer_auth" = [])),
    tag = "Compensation"
)]
pub async fn list_compensations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<CompensationFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::CompensationsRead)?;

    let mut filters = Filters::new();
    filters.eq("employee_id", query.employee_id);
    filters.eq("month", query.month);
    filters.eq("kind", query.kind.map(|k| k.to_string()));

    let list = fetch_page::<Compensation>(
        pool.get_ref(),
        &format!("SELECT {} FROM compensations", COMPENSATION_COLUMNS),
        "compensations",
        &filters,
        "month DESC, id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create compensation
#[utoipa::path(
    post,
    path = "/api/compensations",
    request_body = CreateCompensation,
    responses(
        (status = 201, description = "Compensation created", body = Compensation),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Compensation"
)]
pub async fn create_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCompensation>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::CompensationsWrite)?;
    require_positive("amount", payload.amount)?;

    find_employee(pool.get_ref(), payload.employee_id).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO compensations (employee_id, kind, amount, month, description)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.kind.as_ref())
    .bind(round2(payload.amount))
    .bind(payload.month)
    .bind(&payload.description)
    .execute(pool.get_ref())
    .await?;

    let compensation = find_compensation(pool.get_ref(), result.last_insert_id()).await?;
    info!(
        compensation_id = compensation.id,
        kind = %payload.kind,
        user_id = auth.user_id,
        "Compensation created"
    );

    Ok(HttpResponse::Created().json(compensation))
}

/// Get compensation by ID
#[utoipa::path(
    get,
    path = "/api/compensations/{id}",
    params(("id" = u64, Path, description = "Compensation ID")),
    responses(
        (status = 200, description = "Compensation found", body = Compensation),
        (status = 404, description = "Compensation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Compensation"
)]
pub async fn get_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::CompensationsRead)?;

    let compensation = find_compensation(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(compensation))
}

/// Update compensation
#[utoipa::path(
    put,
    path = "/api/compensations/{id}",
    params(("id" = u64, Path, description = "Compensation ID")),
    request_body = UpdateCompensation,
    responses(
        (status = 200, description = "Compensation updated", body = Compensation),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Compensation not found"),
        (status = 409, description = "Already applied by a payroll run")
    ),
    security(("bearer_auth" = [])),
    tag = "Compensation"
)]
pub async fn update_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateCompensation>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::CompensationsWrite)?;

    let body = payload.into_inner();
    if let Some(amount) = body.amount {
        require_positive("amount", amount)?;
    }

    let update = SqlUpdate::new("compensations")
        .set("kind", body.kind.map(|k| k.to_string()))
        .set("amount", body.amount.map(round2))
        .set("month", body.month)
        .set("description", body.description);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let id = path.into_inner();
    let affected = update
        .guard("payroll_run_id IS NULL")
        .execute(pool.get_ref(), id)
        .await?;

    let compensation = find_compensation(pool.get_ref(), id).await?;
    if affected == 0 {
        ensure_unapplied(&compensation)?;
    }
    Ok(HttpResponse::Ok().json(compensation))
}

/// Delete compensation
#[utoipa::path(
    delete,
    path = "/api/compensations/{id}",
    params(("id" = u64, Path, description = "Compensation ID")),
    responses(
        (status = 200, description = "Compensation deleted", body = Object, example = json!({
            "message": "Compensation deleted"
        })),
        (status = 404, description = "Compensation not found"),
        (status = 409, description = "Already applied by a payroll run")
    ),
    security(("bearer_auth" = [])),
    tag = "Compensation"
)]
pub async fn delete_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::CompensationsWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM compensations WHERE id = ? AND payroll_run_id IS NULL")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        ensure_unapplied(&find_compensation(pool.get_ref(), id).await?)?;
        return Err(ApiError::NotFound("Compensation"));
    }

    info!(compensation_id = id, user_id = auth.user_id, "Compensation deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Compensation deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_app_with_user, user_with_role};
    use crate::model::role::Role;
    use actix_web::{http::StatusCode, test as actix_test};
    use chrono::Utc;

    fn compensation(payroll_run_id: Option<u64>) -> Compensation {
        Compensation {
            id: 1,
            employee_id: 1,
            kind: "bonus".into(),
            amount: 100.0,
            month: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            description: None,
            payroll_run_id,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn applied_lines_are_frozen() {
        assert!(ensure_unapplied(&compensation(None)).is_ok());
        assert!(matches!(
            ensure_unapplied(&compensation(Some(7))),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn month_serializes_as_year_month() {
        let value = serde_json::to_value(compensation(None)).unwrap();
        assert_eq!(value["month"], "2026-02");
    }

    #[actix_web::test]
    async fn unknown_kind_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Accountant), |cfg| {
            cfg.route("/api/compensations", web::post().to(create_compensation));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/compensations")
            .set_json(json!({
                "employee_id": 1,
                "kind": "commission",
                "amount": 10.0,
                "month": "2026-02"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn negative_amount_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Accountant), |cfg| {
            cfg.route("/api/compensations", web::post().to(create_compensation));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/compensations")
            .set_json(json!({
                "employee_id": 1,
                "kind": "deduction",
                "amount": -10.0,
                "month": "2026-02"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn sub_cent_amount_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Accountant), |cfg| {
            cfg.route("/api/compensations", web::post().to(create_compensation))
                .route("/api/compensations/{id}", web::put().to(update_compensation));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/compensations")
            .set_json(json!({
                "employee_id": 1,
                "kind": "bonus",
                "amount": 0.004,
                "month": "2026-02"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::put()
            .uri("/api/compensations/1")
            .set_json(json!({ "amount": 0.004 }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "amount must be at least 0.01");
    }

    #[actix_web::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn applied_line_is_not_updated() {
        let pool = crate::api::test_support::live_pool().await;
        let tag = uuid::Uuid::new_v4().to_simple().to_string();

        let institution_id = sqlx::query("INSERT INTO institutions (name) VALUES (?)")
            .bind(format!("Comp {tag}"))
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();
        let employee_id = sqlx::query(
            "INSERT INTO employees (institution_id, employee_code, full_name, basic_salary, hire_date) \
             VALUES (?, ?, 'Frozen Line', 3000, '2025-01-01')",
        )
        .bind(institution_id)
        .bind(format!("C-{tag}"))
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();
        let run_id = sqlx::query("INSERT INTO payroll_runs (month, institution_id) VALUES ('2026-02-01', ?)")
            .bind(institution_id)
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();
        let compensation_id = sqlx::query(
            "INSERT INTO compensations (employee_id, kind, amount, month, payroll_run_id) \
             VALUES (?, 'bonus', 100, '2026-02-01', ?)",
        )
        .bind(employee_id)
        .bind(run_id)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();

        let affected = SqlUpdate::new("compensations")
            .set("amount", Some(999.0))
            .guard("payroll_run_id IS NULL")
            .execute(&pool, compensation_id)
            .await
            .unwrap();
        assert_eq!(affected, 0);

        let stored = find_compensation(&pool, compensation_id).await.unwrap();
        assert_eq!(stored.amount, 100.0);
        assert!(matches!(ensure_unapplied(&stored), Err(ApiError::Conflict(_))));
    }

    #[actix_web::test]
    async fn viewer_cannot_list() {
        let app = test_app_with_user!(user_with_role(Role::Viewer), |cfg| {
            cfg.route("/api/compensations", web::get().to(list_compensations));
        });
        let req = actix_test::TestRequest::get()
            .uri("/api/compensations?month=2026-02")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
