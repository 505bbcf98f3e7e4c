use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{auth::AuthUser, password::hash_password},
    error::{ApiError, ApiResult},
    model::{
        permission::{Permission, parse_permissions, to_strings},
        role::Role,
        user::{USER_COLUMNS, User, UserResponse},
    },
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{ListResponse, PageParams, fetch_page},
        permission_cache,
        validation::require_max_len,
    },
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "hr.manager")]
    pub username: String,
    #[schema(example = "s3cure-pass")]
    pub password: String,
    pub full_name: Option<String>,
    #[schema(value_type = String, example = "hr")]
    pub role: Role,
    /// Extra grants on top of the role defaults
    #[serde(default)]
    #[schema(example = json!(["payroll:read"]))]
    pub permissions: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUser {
    pub full_name: Option<String>,
    #[schema(value_type = Option<String>, example = "accountant")]
    pub role: Option<Role>,
    pub permissions: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetPassword {
    #[schema(example = "n3w-s3cure-pass")]
    pub password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilter {
    /// Matches username or full name
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_username(username: &str) -> ApiResult<()> {
    let len = username.trim().chars().count();
    if !(3..=64).contains(&len) {
        return Err(ApiError::validation("username must be 3 to 64 characters"));
    }
    if username.trim().chars().any(char::is_whitespace) {
        return Err(ApiError::validation("username must not contain spaces"));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn hash(password: &str) -> ApiResult<String> {
    hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ApiError::Internal
    })
}

async fn find_user(pool: &MySqlPool, id: u64) -> ApiResult<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = id, "Failed to fetch user");
            ApiError::Internal
        })?
        .ok_or(ApiError::NotFound("User"))
}

async fn revoke_refresh_tokens(pool: &MySqlPool, user_id: u64) -> ApiResult<()> {
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ? AND revoked = FALSE")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn username_taken(e: sqlx::Error) -> ApiError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::conflict("Username already taken")
        }
        _ => ApiError::from(e),
    }
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    params(PageParams, UserFilter),
    responses((status = 200, description = "Paginated user list", body = UserList)),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<UserFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;

    let mut filters = Filters::new();
    filters.search(&["username", "full_name"], query.search.as_deref());
    filters.eq("is_active", query.is_active);

    let rows = fetch_page::<User>(
        pool.get_ref(),
        &format!("SELECT {} FROM users", USER_COLUMNS),
        "users",
        &filters,
        "username ASC",
        &page,
    )
    .await?;

    let list = ListResponse {
        data: rows.data.into_iter().map(UserResponse::from).collect(),
        page: rows.page,
        per_page: rows.per_page,
        total: rows.total,
    };

    Ok(HttpResponse::Ok().json(list))
}

/// Create user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation failed or unknown permission"),
        (status = 409, description = "Username already taken")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;

    validate_username(&payload.username)?;
    validate_password(&payload.password)?;
    if let Some(name) = &payload.full_name {
        require_max_len("full_name", name, 255)?;
    }
    let granted = parse_permissions(&payload.permissions)?;

    let hashed = hash(&payload.password)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password, full_name, role_id, permissions, is_active)
        VALUES (?, ?, ?, ?, ?, TRUE)
        "#,
    )
    .bind(payload.username.trim())
    .bind(hashed)
    .bind(&payload.full_name)
    .bind(payload.role.id())
    .bind(sqlx::types::Json(to_strings(&granted)))
    .execute(pool.get_ref())
    .await
    .map_err(username_taken)?;

    let user = find_user(pool.get_ref(), result.last_insert_id()).await?;
    info!(new_user_id = user.id, role = %payload.role, user_id = auth.user_id, "User created");

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// Get user by ID
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;

    let user = find_user(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Update user role, permissions, name or active flag
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation failed or unknown permission"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Cannot deactivate yourself")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;

    let id = path.into_inner();
    let body = payload.into_inner();

    if id == auth.user_id && body.is_active == Some(false) {
        return Err(ApiError::conflict("You cannot deactivate your own account"));
    }
    if let Some(name) = &body.full_name {
        require_max_len("full_name", name, 255)?;
    }
    let permissions = match &body.permissions {
        Some(raw) => Some(Value::from(to_strings(&parse_permissions(raw)?))),
        None => None,
    };

    let update = SqlUpdate::new("users")
        .set("full_name", body.full_name)
        .set("role_id", body.role.map(|r| r.id() as u32))
        .set("permissions", permissions)
        .set("is_active", body.is_active);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    find_user(pool.get_ref(), id).await?;
    update.execute(pool.get_ref(), id).await?;

    if body.is_active == Some(false) {
        revoke_refresh_tokens(pool.get_ref(), id).await?;
    }
    permission_cache::invalidate(id).await;

    info!(target_user_id = id, user_id = auth.user_id, "User updated");
    let user = find_user(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Set a user's password
#[utoipa::path(
    put,
    path = "/api/users/{id}/password",
    params(("id" = u64, Path, description = "User ID")),
    request_body = SetPassword,
    responses(
        (status = 200, description = "Password changed; existing refresh tokens revoked", body = Object, example = json!({
            "message": "Password updated"
        })),
        (status = 400, description = "Password too short"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn set_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SetPassword>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;
    validate_password(&payload.password)?;

    let id = path.into_inner();
    find_user(pool.get_ref(), id).await?;

    let hashed = hash(&payload.password)?;
    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed)
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    revoke_refresh_tokens(pool.get_ref(), id).await?;
    permission_cache::invalidate(id).await;

    info!(target_user_id = id, user_id = auth.user_id, "Password changed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Password updated" })))
}

/// Delete user
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = Object, example = json!({
            "message": "User deleted"
        })),
        (status = 404, description = "User not found"),
        (status = 409, description = "Cannot delete yourself")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;

    let id = path.into_inner();
    if id == auth.user_id {
        warn!(user_id = id, "Refused self deletion");
        return Err(ApiError::conflict("You cannot delete your own account"));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("User"));
    }

    permission_cache::invalidate(id).await;
    info!(target_user_id = id, user_id = auth.user_id, "User deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted" })))
}
