use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{employee::find_employee, institution::find_institution},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        form::{FORM_COLUMNS, Form, FormStatus, FormType},
        permission::Permission,
    },
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{PageParams, fetch_page},
        validation::{require_max_len, require_non_empty},
    },
};

#[derive(Deserialize, ToSchema)]
pub struct CreateForm {
    pub employee_id: Option<u64>,
    pub institution_id: Option<u64>,
    pub form_type: FormType,
    #[schema(example = "Salary certificate for bank")]
    pub title: String,
    /// Template fields; must be a JSON object
    #[schema(value_type = Object, example = json!({ "bank": "Al Rajhi", "language": "ar" }))]
    pub data: Option<Value>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateForm {
    pub form_type: Option<FormType>,
    pub title: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FormFilter {
    pub employee_id: Option<u64>,
    pub institution_id: Option<u64>,
    pub form_type: Option<FormType>,
    pub status: Option<FormStatus>,
}

fn validate_title(title: &str) -> ApiResult<()> {
    require_non_empty("title", title)?;
    require_max_len("title", title, 255)
}

fn require_object(data: &Value) -> ApiResult<()> {
    if !data.is_object() {
        return Err(ApiError::validation("data must be a JSON object"));
    }
    Ok(())
}

fn ensure_draft(form: &Form) -> ApiResult<()> {
    if form.status != FormStatus::Draft.as_ref() {
        return Err(ApiError::conflict("Issued forms cannot be changed"));
    }
    Ok(())
}

pub async fn find_form(pool: &MySqlPool, id: u64) -> ApiResult<Form> {
    sqlx::query_as::<_, Form>(&format!("SELECT {} FROM forms WHERE id = ?", FORM_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!(error = %e, form_id = id, "Failed to fetch form");
            ApiError::Internal
        })?
        .ok_or(ApiError::NotFound("Form"))
}

/// List forms
#[utoipa::path(
    get,
    path = "/api/forms",
    params(PageParams, FormFilter),
    responses((status = 200, description = "Paginated form list", body = FormList)),
    security(("bearer_auth" = [])),
    tag = "Form"
)]
pub async fn list_forms(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<FormFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::FormsRead)?;

    let mut filters = Filters::new();
    filters.eq("employee_id", query.employee_id);
    filters.eq("institution_id", query.institution_id);
    filters.eq("form_type", query.form_type.map(|t| t.to_string()));
    filters.eq("status", query.status.map(|s| s.to_string()));

    let list = fetch_page::<Form>(
        pool.get_ref(),
        &format!("SELECT {} FROM forms", FORM_COLUMNS),
        "forms",
        &filters,
        "id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create form
#[utoipa::path(
    post,
    path = "/api/forms",
    request_body = CreateForm,
    responses(
        (status = 201, description = "Draft form created", body = Form),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee or institution not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Form"
)]
pub async fn create_form(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateForm>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::FormsWrite)?;

    let body = payload.into_inner();
    validate_title(&body.title)?;
    let data = body.data.unwrap_or_else(|| json!({}));
    require_object(&data)?;

    if let Some(employee_id) = body.employee_id {
        find_employee(pool.get_ref(), employee_id).await?;
    }
    if let Some(institution_id) = body.institution_id {
        find_institution(pool.get_ref(), institution_id).await?;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO forms (employee_id, institution_id, form_type, title, data, status, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(body.employee_id)
    .bind(body.institution_id)
    .bind(body.form_type.as_ref())
    .bind(body.title.trim())
    .bind(sqlx::types::Json(data))
    .bind(FormStatus::Draft.as_ref())
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?;

    let form = find_form(pool.get_ref(), result.last_insert_id()).await?;
    info!(form_id = form.id, form_type = %body.form_type, user_id = auth.user_id, "Form created");

    Ok(HttpResponse::Created().json(form))
}

/// Get form by ID
#[utoipa::path(
    get,
    path = "/api/forms/{id}",
    params(("id" = u64, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Form found", body = Form),
        (status = 404, description = "Form not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Form"
)]
pub async fn get_form(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::FormsRead)?;

    let form = find_form(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(form))
}

/// Update a draft form
#[utoipa::path(
    put,
    path = "/api/forms/{id}",
    params(("id" = u64, Path, description = "Form ID")),
    request_body = UpdateForm,
    responses(
        (status = 200, description = "Form updated", body = Form),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Form not found"),
        (status = 409, description = "Form already issued")
    ),
    security(("bearer_auth" = [])),
    tag = "Form"
)]
pub async fn update_form(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateForm>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::FormsWrite)?;

    let body = payload.into_inner();
    if let Some(title) = &body.title {
        validate_title(title)?;
    }
    if let Some(data) = &body.data {
        require_object(data)?;
    }

    let update = SqlUpdate::new("forms")
        .set("form_type", body.form_type.map(|t| t.to_string()))
        .set("title", body.title.map(|t| t.trim().to_string()))
        .set("data", body.data);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let id = path.into_inner();
    let affected = update
        .guard("status = 'draft'")
        .execute(pool.get_ref(), id)
        .await?;

    let form = find_form(pool.get_ref(), id).await?;
    if affected == 0 {
        ensure_draft(&form)?;
    }
    Ok(HttpResponse::Ok().json(form))
}

/// Issue a draft form
#[utoipa::path(
    put,
    path = "/api/forms/{id}/issue",
    params(("id" = u64, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Form issued", body = Form),
        (status = 404, description = "Form not found"),
        (status = 409, description = "Form already issued")
    ),
    security(("bearer_auth" = [])),
    tag = "Form"
)]
pub async fn issue_form(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::FormsWrite)?;

    let id = path.into_inner();
    let result =
        sqlx::query("UPDATE forms SET status = ?, issued_at = NOW() WHERE id = ? AND status = ?")
            .bind(FormStatus::Issued.as_ref())
            .bind(id)
            .bind(FormStatus::Draft.as_ref())
            .execute(pool.get_ref())
            .await?;

    if result.rows_affected() == 0 {
        ensure_draft(&find_form(pool.get_ref(), id).await?)?;
    }

    info!(form_id = id, user_id = auth.user_id, "Form issued");
    let form = find_form(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(form))
}

/// Delete a draft form
#[utoipa::path(
    delete,
    path = "/api/forms/{id}",
    params(("id" = u64, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Form deleted", body = Object, example = json!({
            "message": "Form deleted"
        })),
        (status = 404, description = "Form not found"),
        (status = 409, description = "Form already issued")
    ),
    security(("bearer_auth" = [])),
    tag = "Form"
)]
pub async fn delete_form(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::FormsWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM forms WHERE id = ? AND status = ?")
        .bind(id)
        .bind(FormStatus::Draft.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        ensure_draft(&find_form(pool.get_ref(), id).await?)?;
        return Err(ApiError::NotFound("Form"));
    }

    info!(form_id = id, user_id = auth.user_id, "Form deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Form deleted" })))
}
