use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::institution::find_institution,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{branch::Branch, permission::Permission},
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{PageParams, fetch_page},
        validation::{require_max_len, require_non_empty},
    },
};

const SELECT_BRANCH: &str =
    "SELECT id, institution_id, name, city, address, created_at FROM branches";

#[derive(Deserialize, ToSchema)]
pub struct CreateBranch {
    #[schema(example = 1)]
    pub institution_id: u64,
    #[schema(example = "Jeddah Branch")]
    pub name: String,
    #[schema(example = "Jeddah")]
    pub city: Option<String>,
    pub address: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateBranch {
    pub name: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BranchFilter {
    pub institution_id: Option<u64>,
}

fn validate_name(name: &str) -> ApiResult<()> {
    require_non_empty("name", name)?;
    require_max_len("name", name, 255)
}

pub async fn find_branch(pool: &MySqlPool, id: u64) -> ApiResult<Branch> {
    sqlx::query_as::<_, Branch>(&format!("{} WHERE id = ?", SELECT_BRANCH))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!(error = %e, branch_id = id, "Failed to fetch branch");
            ApiError::Internal
        })?
        .ok_or(ApiError::NotFound("Branch"))
}

/// List branches
#[utoipa::path(
    get,
    path = "/api/branches",
    params(PageParams, BranchFilter),
    responses((status = 200, description = "Paginated branch list", body = BranchList)),
    security(("bearer_auth" = [])),
    tag = "Branch"
)]
pub async fn list_branches(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<BranchFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::BranchesRead)?;

    let mut filters = Filters::new();
    filters.eq("institution_id", query.institution_id);

    let list = fetch_page::<Branch>(
        pool.get_ref(),
        SELECT_BRANCH,
        "branches",
        &filters,
        "institution_id ASC, name ASC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create branch
#[utoipa::path(
    post,
    path = "/api/branches",
    request_body = CreateBranch,
    responses(
        (status = 201, description = "Branch created", body = Branch),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Institution not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Branch"
)]
pub async fn create_branch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateBranch>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::BranchesWrite)?;
    validate_name(&payload.name)?;

    find_institution(pool.get_ref(), payload.institution_id).await?;

    let result = sqlx::query(
        "INSERT INTO branches (institution_id, name, city, address) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.institution_id)
    .bind(payload.name.trim())
    .bind(&payload.city)
    .bind(&payload.address)
    .execute(pool.get_ref())
    .await?;

    let branch = find_branch(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(branch))
}

/// Get branch by ID
#[utoipa::path(
    get,
    path = "/api/branches/{id}",
    params(("id" = u64, Path, description = "Branch ID")),
    responses(
        (status = 200, description = "Branch found", body = Branch),
        (status = 404, description = "Branch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Branch"
)]
pub async fn get_branch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::BranchesRead)?;

    let branch = find_branch(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(branch))
}

/// Update branch
#[utoipa::path(
    put,
    path = "/api/branches/{id}",
    params(("id" = u64, Path, description = "Branch ID")),
    request_body = UpdateBranch,
    responses(
        (status = 200, description = "Branch updated", body = Branch),
        (status = 404, description = "Branch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Branch"
)]
pub async fn update_branch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateBranch>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::BranchesWrite)?;

    let body = payload.into_inner();
    if let Some(name) = &body.name {
        validate_name(name)?;
    }

    let update = SqlUpdate::new("branches")
        .set("name", body.name.map(|n| n.trim().to_string()))
        .set("city", body.city)
        .set("address", body.address);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let id = path.into_inner();
    find_branch(pool.get_ref(), id).await?;
    update.execute(pool.get_ref(), id).await?;

    let branch = find_branch(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(branch))
}

/// Delete branch. Employees of the branch stay, with their branch cleared.
#[utoipa::path(
    delete,
    path = "/api/branches/{id}",
    params(("id" = u64, Path, description = "Branch ID")),
    responses(
        (status = 200, description = "Branch deleted", body = Object, example = json!({
            "message": "Branch deleted",
            "detached_employees": 4
        })),
        (status = 404, description = "Branch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Branch"
)]
pub async fn delete_branch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::BranchesWrite)?;

    let id = path.into_inner();
    let mut tx = pool.begin().await?;

    let detached = sqlx::query("UPDATE employees SET branch_id = NULL WHERE branch_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let deleted = sqlx::query("DELETE FROM branches WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        tx.rollback().await?;
        return Err(ApiError::NotFound("Branch"));
    }

    tx.commit().await?;
    info!(branch_id = id, detached, user_id = auth.user_id, "Branch deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Branch deleted",
        "detached_employees": detached
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_app_with_user, user_with_role};
    use crate::model::role::Role;
    use actix_web::{http::StatusCode, test as actix_test};

    #[actix_web::test]
    async fn blank_name_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/branches", web::post().to(create_branch));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/branches")
            .set_json(json!({ "institution_id": 1, "name": "   " }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn missing_institution_id_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/branches", web::post().to(create_branch));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/branches")
            .set_json(json!({ "name": "Dammam" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn accountant_cannot_delete() {
        let app = test_app_with_user!(user_with_role(Role::Accountant), |cfg| {
            cfg.route("/api/branches/{id}", web::delete().to(delete_branch));
        });
        let req = actix_test::TestRequest::delete().uri("/api/branches/3").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn non_numeric_id_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Admin), |cfg| {
            cfg.route("/api/branches/{id}", web::get().to(get_branch));
        });
        let req = actix_test::TestRequest::get().uri("/api/branches/abc").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    /// Runs against a real MySQL database: `TEST_DATABASE_URL=mysql://... cargo test -- --ignored`
    #[actix_web::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn delete_detaches_employees() {
        let pool = crate::api::test_support::live_pool().await;
        let tag = uuid::Uuid::new_v4().to_simple().to_string();

        let institution_id = sqlx::query("INSERT INTO institutions (name) VALUES (?)")
            .bind(format!("Branch test {tag}"))
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();
        let branch_id = sqlx::query("INSERT INTO branches (institution_id, name) VALUES (?, 'Jeddah')")
            .bind(institution_id)
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();

        let mut employees = Vec::new();
        for n in 0..2 {
            let inserted = sqlx::query(
                r#"
                INSERT INTO employees (institution_id, branch_id, employee_code, full_name, hire_date)
                VALUES (?, ?, ?, 'Branch Member', '2025-01-01')
                "#,
            )
            .bind(institution_id)
            .bind(branch_id)
            .bind(format!("BR{n}-{tag}"))
            .execute(&pool)
            .await
            .unwrap();
            employees.push(inserted.last_insert_id());
        }

        let user = crate::api::test_support::admin();
        let app = actix_test::init_service(
            actix_web::App::new()
                .app_data(web::Data::new(pool.clone()))
                .wrap_fn(move |req, srv| {
                    use actix_web::HttpMessage;
                    use actix_web::dev::Service;
                    req.extensions_mut().insert(user.clone());
                    srv.call(req)
                })
                .route("/api/branches/{id}", web::delete().to(delete_branch)),
        )
        .await;

        let req = actix_test::TestRequest::delete()
            .uri(&format!("/api/branches/{branch_id}"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["detached_employees"], 2);

        for employee_id in employees {
            let branch: Option<u64> =
                sqlx::query_scalar("SELECT branch_id FROM employees WHERE id = ?")
                    .bind(employee_id)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(branch, None);
        }

        let remaining = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM branches WHERE id = ?")
            .bind(branch_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        let req = actix_test::TestRequest::delete()
            .uri(&format!("/api/branches/{branch_id}"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
