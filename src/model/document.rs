use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// An institution or employee paper (iqama, passport, CR certificate, contract...) with its expiry.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Document {
    pub id: u64,
    pub institution_id: Option<u64>,
    pub employee_id: Option<u64>,
    #[schema(example = "iqama")]
    pub doc_type: String,
    pub doc_number: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub issue_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = Date)]
    pub expiry_date: Option<NaiveDate>,
    pub file_url: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

pub const DOCUMENT_COLUMNS: &str = "id, institution_id, employee_id, doc_type, doc_number, \
    issue_date, expiry_date, file_url, notes, created_at";
