use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::institution::find_institution,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        permission::Permission,
        subscription::{SUBSCRIPTION_COLUMNS, Subscription, SubscriptionStatus},
    },
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{PageParams, fetch_page},
        validation::{
            require_date_order, require_max_len, require_non_empty, require_non_negative, round2,
        },
    },
};

#[derive(Deserialize, ToSchema)]
pub struct CreateSubscription {
    #[schema(example = 1)]
    pub institution_id: u64,
    #[schema(example = "Government services portal")]
    pub name: String,
    pub provider: Option<String>,
    #[schema(value_type = String, format = Date, example = "2026-01-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2026-12-31")]
    pub end_date: NaiveDate,
    #[serde(default)]
    #[schema(example = 1200.0)]
    pub cost: f64,
    pub status: Option<SubscriptionStatus>,
}

impl CreateSubscription {
    fn validate(&self) -> ApiResult<()> {
        require_non_empty("name", &self.name)?;
        require_max_len("name", &self.name, 255)?;
        require_non_negative("cost", self.cost)?;
        require_date_order("start_date", self.start_date, "end_date", self.end_date)
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSubscription {
    pub name: Option<String>,
    pub provider: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    pub cost: Option<f64>,
    pub status: Option<SubscriptionStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubscriptionFilter {
    pub institution_id: Option<u64>,
    pub status: Option<SubscriptionStatus>,
    /// Only subscriptions ending between today and today + N days
    pub expiring_within_days: Option<u32>,
}

pub async fn find_subscription(pool: &MySqlPool, id: u64) -> ApiResult<Subscription> {
    sqlx::query_as::<_, Subscription>(&format!(
        "SELECT {} FROM subscriptions WHERE id = ?",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, subscription_id = id, "Failed to fetch subscription");
        ApiError::Internal
    })?
    .ok_or(ApiError::NotFound("Subscription"))
}

/// List subscriptions
#[utoipa::path(
    get,
    path = "/api/subscriptions",
    params(PageParams, SubscriptionFilter),
    responses((status = 200, description = "Paginated subscription list", body = SubscriptionList)),
    security(("bearer_auth" = [])),
    tag = "Subscription"
)]
pub async fn list_subscriptions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<SubscriptionFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SubscriptionsRead)?;

    let mut filters = Filters::new();
    filters.eq("institution_id", query.institution_id);
    filters.eq("status", query.status.map(|s| s.to_string()));
    if let Some(days) = query.expiring_within_days {
        filters.push(
            "end_date BETWEEN CURDATE() AND CURDATE() + INTERVAL ? DAY",
            vec![days.into()],
        );
    }

    let list = fetch_page::<Subscription>(
        pool.get_ref(),
        &format!("SELECT {} FROM subscriptions", SUBSCRIPTION_COLUMNS),
        "subscriptions",
        &filters,
        "end_date ASC, id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create subscription
#[utoipa::path(
    post,
    path = "/api/subscriptions",
    request_body = CreateSubscription,
    responses(
        (status = 201, description = "Subscription created", body = Subscription),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Institution not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscription"
)]
pub async fn create_subscription(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSubscription>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SubscriptionsWrite)?;
    payload.validate()?;

    find_institution(pool.get_ref(), payload.institution_id).await?;

    let status = payload.status.unwrap_or(SubscriptionStatus::Active);
    let result = sqlx::query(
        r#"
        INSERT INTO subscriptions (institution_id, name, provider, start_date, end_date, cost, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.institution_id)
    .bind(payload.name.trim())
    .bind(&payload.provider)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(round2(payload.cost))
    .bind(status.as_ref())
    .execute(pool.get_ref())
    .await?;

    let subscription = find_subscription(pool.get_ref(), result.last_insert_id()).await?;
    info!(subscription_id = subscription.id, user_id = auth.user_id, "Subscription created");

    Ok(HttpResponse::Created().json(subscription))
}

/// Get subscription by ID
#[utoipa::path(
    get,
    path = "/api/subscriptions/{id}",
    params(("id" = u64, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription found", body = Subscription),
        (status = 404, description = "Subscription not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscription"
)]
pub async fn get_subscription(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SubscriptionsRead)?;

    let subscription = find_subscription(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(subscription))
}

/// Update subscription
#[utoipa::path(
    put,
    path = "/api/subscriptions/{id}",
    params(("id" = u64, Path, description = "Subscription ID")),
    request_body = UpdateSubscription,
    responses(
        (status = 200, description = "Subscription updated", body = Subscription),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Subscription not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscription"
)]
pub async fn update_subscription(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateSubscription>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SubscriptionsWrite)?;

    let body = payload.into_inner();
    if let Some(name) = &body.name {
        require_non_empty("name", name)?;
        require_max_len("name", name, 255)?;
    }
    if let Some(cost) = body.cost {
        require_non_negative("cost", cost)?;
    }

    let update = SqlUpdate::new("subscriptions")
        .set("name", body.name.map(|n| n.trim().to_string()))
        .set("provider", body.provider)
        .set("start_date", body.start_date)
        .set("end_date", body.end_date)
        .set("cost", body.cost.map(round2))
        .set("status", body.status.map(|s| s.to_string()));

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let id = path.into_inner();
    let current = find_subscription(pool.get_ref(), id).await?;
    require_date_order(
        "start_date",
        body.start_date.unwrap_or(current.start_date),
        "end_date",
        body.end_date.unwrap_or(current.end_date),
    )?;

    update.execute(pool.get_ref(), id).await?;

    let subscription = find_subscription(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(subscription))
}

/// Delete subscription
#[utoipa::path(
    delete,
    path = "/api/subscriptions/{id}",
    params(("id" = u64, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription deleted", body = Object, example = json!({
            "message": "Subscription deleted"
        })),
        (status = 404, description = "Subscription not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscription"
)]
pub async fn delete_subscription(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SubscriptionsWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Subscription"));
    }

    info!(subscription_id = id, user_id = auth.user_id, "Subscription deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Subscription deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_app_with_user, user_with_role};
    use crate::model::role::Role;
    use actix_web::{http::StatusCode, test as actix_test};

    #[actix_web::test]
    async fn end_before_start_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Accountant), |cfg| {
            cfg.route("/api/subscriptions", web::post().to(create_subscription));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/subscriptions")
            .set_json(json!({
                "institution_id": 1,
                "name": "Muqeem",
                "start_date": "2026-06-01",
                "end_date": "2026-05-31",
                "cost": 100.0
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "start_date cannot be after end_date");
    }

    #[actix_web::test]
    async fn negative_cost_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Accountant), |cfg| {
            cfg.route("/api/subscriptions", web::post().to(create_subscription));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/subscriptions")
            .set_json(json!({
                "institution_id": 1,
                "name": "Muqeem",
                "start_date": "2026-01-01",
                "end_date": "2026-12-31",
                "cost": -5
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn hr_cannot_create() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/subscriptions", web::post().to(create_subscription));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/subscriptions")
            .set_json(json!({
                "institution_id": 1,
                "name": "Muqeem",
                "start_date": "2026-01-01",
                "end_date": "2026-12-31"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
