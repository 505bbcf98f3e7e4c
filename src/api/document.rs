use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{employee::find_employee, institution::find_institution},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        document::{DOCUMENT_COLUMNS, Document},
        permission::Permission,
    },
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{PageParams, fetch_page},
        validation::{double_option, require_date_order, require_max_len, require_non_empty},
    },
};

#[derive(Deserialize, ToSchema)]
pub struct CreateDocument {
    pub institution_id: Option<u64>,
    #[schema(example = 12)]
    pub employee_id: Option<u64>,
    #[schema(example = "iqama")]
    pub doc_type: String,
    #[schema(example = "2456789012")]
    pub doc_number: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub issue_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = Date, example = "2027-03-14")]
    pub expiry_date: Option<NaiveDate>,
    pub file_url: Option<String>,
    pub notes: Option<String>,
}

impl CreateDocument {
    fn validate(&self) -> ApiResult<()> {
        if self.institution_id.is_none() && self.employee_id.is_none() {
            return Err(ApiError::validation(
                "institution_id or employee_id is required",
            ));
        }
        validate_doc_type(&self.doc_type)?;
        check_dates(self.issue_date, self.expiry_date)
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateDocument {
    pub doc_type: Option<String>,
    pub doc_number: Option<String>,
    /// `null` clears the date
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = Date)]
    pub issue_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = Date)]
    pub expiry_date: Option<Option<NaiveDate>>,
    pub file_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentFilter {
    pub institution_id: Option<u64>,
    pub employee_id: Option<u64>,
    pub doc_type: Option<String>,
    /// Only documents whose expiry falls between today and today + N days
    pub expiring_within_days: Option<u32>,
}

fn validate_doc_type(doc_type: &str) -> ApiResult<()> {
    require_non_empty("doc_type", doc_type)?;
    require_max_len("doc_type", doc_type, 64)
}

fn check_dates(issue: Option<NaiveDate>, expiry: Option<NaiveDate>) -> ApiResult<()> {
    match (issue, expiry) {
        (Some(issue), Some(expiry)) => require_date_order("issue_date", issue, "expiry_date", expiry),
        _ => Ok(()),
    }
}

pub async fn find_document(pool: &MySqlPool, id: u64) -> ApiResult<Document> {
    sqlx::query_as::<_, Document>(&format!(
        "SELECT {} FROM documents WHERE id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, document_id = id, "Failed to fetch document");
        ApiError::Internal
    })?
    .ok_or(ApiError::NotFound("Document"))
}

/// List documents
#[utoipa::path(
    get,
    path = "/api/documents",
    params(PageParams, DocumentFilter),
    responses((status = 200, description = "Paginated document list", body = DocumentList)),
    security(("bearer_auth" = [])),
    tag = "Document"
)]
pub async fn list_documents(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<DocumentFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::DocumentsRead)?;

    let mut filters = Filters::new();
    filters.eq("institution_id", query.institution_id);
    filters.eq("employee_id", query.employee_id);
    filters.eq("doc_type", query.doc_type.clone());
    if let Some(days) = query.expiring_within_days {
        filters.push(
            "expiry_date BETWEEN CURDATE() AND CURDATE() + INTERVAL ? DAY",
            vec![days.into()],
        );
    }

    // soonest expiry first, undated papers last
    let list = fetch_page::<Document>(
        pool.get_ref(),
        &format!("SELECT {} FROM documents", DOCUMENT_COLUMNS),
        "documents",
        &filters,
        "expiry_date IS NULL, expiry_date ASC, id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create document
#[utoipa::path(
    post,
    path = "/api/documents",
    request_body = CreateDocument,
    responses(
        (status = 201, description = "Document created", body = Document),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Institution or employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Document"
)]
pub async fn create_document(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDocument>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::DocumentsWrite)?;
    payload.validate()?;

    if let Some(institution_id) = payload.institution_id {
        find_institution(pool.get_ref(), institution_id).await?;
    }
    if let Some(employee_id) = payload.employee_id {
        find_employee(pool.get_ref(), employee_id).await?;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO documents
        (institution_id, employee_id, doc_type, doc_number, issue_date, expiry_date, file_url, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.institution_id)
    .bind(payload.employee_id)
    .bind(payload.doc_type.trim())
    .bind(&payload.doc_number)
    .bind(payload.issue_date)
    .bind(payload.expiry_date)
    .bind(&payload.file_url)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?;

    let document = find_document(pool.get_ref(), result.last_insert_id()).await?;
    info!(document_id = document.id, user_id = auth.user_id, "Document created");

    Ok(HttpResponse::Created().json(document))
}

/// Get document by ID
#[utoipa::path(
    get,
    path = "/api/documents/{id}",
    params(("id" = u64, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document found", body = Document),
        (status = 404, description = "Document not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Document"
)]
pub async fn get_document(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::DocumentsRead)?;

    let document = find_document(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(document))
}

/// Update document
#[utoipa::path(
    put,
    path = "/api/documents/{id}",
    params(("id" = u64, Path, description = "Document ID")),
    request_body = UpdateDocument,
    responses(
        (status = 200, description = "Document updated", body = Document),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Document not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Document"
)]
pub async fn update_document(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateDocument>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::DocumentsWrite)?;

    let body = payload.into_inner();
    if let Some(doc_type) = &body.doc_type {
        validate_doc_type(doc_type)?;
    }

    let update = SqlUpdate::new("documents")
        .set("doc_type", body.doc_type.map(|t| t.trim().to_string()))
        .set("doc_number", body.doc_number)
        .set_nullable("issue_date", body.issue_date)
        .set_nullable("expiry_date", body.expiry_date)
        .set("file_url", body.file_url)
        .set("notes", body.notes);

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let id = path.into_inner();
    let current = find_document(pool.get_ref(), id).await?;

    // the order check applies to the dates as they will be stored
    let issue = body.issue_date.unwrap_or(current.issue_date);
    let expiry = body.expiry_date.unwrap_or(current.expiry_date);
    check_dates(issue, expiry)?;

    update.execute(pool.get_ref(), id).await?;

    let document = find_document(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(document))
}

/// Delete document
#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    params(("id" = u64, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document deleted", body = Object, example = json!({
            "message": "Document deleted"
        })),
        (status = 404, description = "Document not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Document"
)]
pub async fn delete_document(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::DocumentsWrite)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Document"));
    }

    info!(document_id = id, user_id = auth.user_id, "Document deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Document deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_app_with_user, user_with_role};
    use crate::model::role::Role;
    use actix_web::{http::StatusCode, test as actix_test};

    #[test]
    fn document_needs_an_owner() {
        let body: CreateDocument =
            serde_json::from_value(json!({ "doc_type": "passport" })).unwrap();
        assert!(body.validate().is_err());

        let body: CreateDocument =
            serde_json::from_value(json!({ "doc_type": "passport", "employee_id": 4 })).unwrap();
        assert!(body.validate().is_ok());
    }

    #[test]
    fn expiry_before_issue_is_rejected() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
        assert!(check_dates(d("2026-05-01"), d("2026-04-30")).is_err());
        assert!(check_dates(d("2026-05-01"), d("2026-05-01")).is_ok());
        assert!(check_dates(None, d("2026-04-30")).is_ok());
    }

    #[actix_web::test]
    async fn create_without_owner_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/documents", web::post().to(create_document));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/documents")
            .set_json(json!({ "doc_type": "iqama", "expiry_date": "2027-01-01" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "institution_id or employee_id is required");
    }

    #[actix_web::test]
    async fn viewer_cannot_delete() {
        let app = test_app_with_user!(user_with_role(Role::Viewer), |cfg| {
            cfg.route("/api/documents/{id}", web::delete().to(delete_document));
        });
        let req = actix_test::TestRequest::delete().uri("/api/documents/9").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn negative_expiring_filter_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Viewer), |cfg| {
            cfg.route("/api/documents", web::get().to(list_documents));
        });
        let req = actix_test::TestRequest::get()
            .uri("/api/documents?expiring_within_days=-3")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
