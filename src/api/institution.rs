use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{institution::Institution, permission::Permission},
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{PageParams, fetch_page},
        validation::{require_email, require_max_len, require_non_empty},
    },
};

const SELECT_INSTITUTION: &str =
    "SELECT id, name, commercial_registration, phone, email, address, created_at FROM institutions";

#[derive(Deserialize, ToSchema)]
pub struct CreateInstitution {
    #[schema(example = "Al Noor Contracting")]
    pub name: String,
    #[schema(example = "1010123456")]
    pub commercial_registration: Option<String>,
    #[schema(example = "+966112345678")]
    pub phone: Option<String>,
    #[schema(example = "info@alnoor.sa")]
    pub email: Option<String>,
    pub address: Option<String>,
}

impl CreateInstitution {
    fn validate(&self) -> ApiResult<()> {
        require_non_empty("name", &self.name)?;
        require_max_len("name", &self.name, 255)?;
        if let Some(email) = &self.email {
            require_email("email", email)?;
        }
        Ok(())
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateInstitution {
    pub name: Option<String>,
    pub commercial_registration: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl UpdateInstitution {
    fn validate(&self) -> ApiResult<()> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
            require_max_len("name", name, 255)?;
        }
        if let Some(email) = &self.email {
            require_email("email", email)?;
        }
        Ok(())
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InstitutionFilter {
    /// Matches name or commercial registration number
    pub search: Option<String>,
}

pub async fn find_institution(pool: &MySqlPool, id: u64) -> ApiResult<Institution> {
    sqlx::query_as::<_, Institution>(&format!("{} WHERE id = ?", SELECT_INSTITUTION))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!(error = %e, institution_id = id, "Failed to fetch institution");
            ApiError::Internal
        })?
        .ok_or(ApiError::NotFound("Institution"))
}

/// List institutions
#[utoipa::path(
    get,
    path = "/api/institutions",
    params(PageParams, InstitutionFilter),
    responses(
        (status = 200, description = "Paginated institution list", body = InstitutionList),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Institution"
)]
pub async fn list_institutions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<InstitutionFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::InstitutionsRead)?;

    let mut filters = Filters::new();
    filters.search(&["name", "commercial_registration"], query.search.as_deref());

    let list = fetch_page::<Institution>(
        pool.get_ref(),
        SELECT_INSTITUTION,
        "institutions",
        &filters,
        "name ASC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create institution
#[utoipa::path(
    post,
    path = "/api/institutions",
    request_body = CreateInstitution,
    responses(
        (status = 201, description = "Institution created", body = Institution),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Commercial registration already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Institution"
)]
pub async fn create_institution(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateInstitution>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::InstitutionsWrite)?;
    payload.validate()?;

    let result = sqlx::query(
        r#"
        INSERT INTO institutions (name, commercial_registration, phone, email, address)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.commercial_registration)
    .bind(&payload.phone)
    .bind(&payload.email)
    .bind(&payload.address)
    .execute(pool.get_ref())
    .await?;

    let institution = find_institution(pool.get_ref(), result.last_insert_id()).await?;
    info!(institution_id = institution.id, user_id = auth.user_id, "Institution created");

    Ok(HttpResponse::Created().json(institution))
}

/// Get institution by ID
#[utoipa::path(
    get,
    path = "/api/institutions/{id}",
    params(("id" = u64, Path, description = "Institution ID")),
    responses(
        (status = 200, description = "Institution found", body = Institution),
        (status = 404, description = "Institution not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Institution"
)]
pub async fn get_institution(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::InstitutionsRead)?;

    let institution = find_institution(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(institution))
}

/// Update institution
#[utoipa::path(
    put,
    path = "/api/institutions/{id}",
    params(("id" = u64, Path, description = "Institution ID")),
    request_body = UpdateInstitution,
    responses(
        (status = 200, description = "Institution updated", body = Institution),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Institution not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Institution"
)]
pub async fn update_institution(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateInstitution>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::InstitutionsWrite)?;
    payload.validate()?;

    let id = path.into_inner();
    let body = payload.into_inner();
    let update = SqlUpdate::new("institutions")
        .set("name", body.name.map(|n| n.trim().to_string()))
        .set("commercial_registration", body.commercial_registration)
        .set("phone", body.phone)
        .set("email", body.email)
        .set("address", body.address);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    // rows_affected is 0 when values are unchanged, so existence is checked explicitly
    find_institution(pool.get_ref(), id).await?;
    update.execute(pool.get_ref(), id).await?;

    let institution = find_institution(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(institution))
}

/// Delete institution
#[utoipa::path(
    delete,
    path = "/api/institutions/{id}",
    params(("id" = u64, Path, description = "Institution ID")),
    responses(
        (status = 200, description = "Institution deleted", body = Object, example = json!({
            "message": "Institution deleted"
        })),
        (status = 404, description = "Institution not found"),
        (status = 409, description = "Institution still has employees")
    ),
    security(("bearer_auth" = [])),
    tag = "Institution"
)]
pub async fn delete_institution(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::InstitutionsWrite)?;

    let id = path.into_inner();

    let employees = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE institution_id = ?")
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;

    if employees > 0 {
        return Err(ApiError::conflict(format!(
            "Institution still has {employees} employee(s)"
        )));
    }

    let result = sqlx::query("DELETE FROM institutions WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Institution"));
    }

    info!(institution_id = id, user_id = auth.user_id, "Institution deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "Institution deleted" })))
}
