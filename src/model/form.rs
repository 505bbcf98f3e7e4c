use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    SalaryCertificate,
    ExperienceLetter,
    Clearance,
    Warning,
    Custom,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Draft,
    Issued,
}

/// An HR letter or form; `data` holds the free-form fields the template renders.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Form {
    pub id: u64,
    pub employee_id: Option<u64>,
    pub institution_id: Option<u64>,
    #[schema(example = "salary_certificate")]
    pub form_type: String,
    #[schema(example = "Salary certificate for bank")]
    pub title: String,
    #[schema(value_type = Object)]
    pub data: sqlx::types::Json<Value>,
    #[schema(example = "draft")]
    pub status: String,
    pub created_by: Option<u64>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub issued_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

pub const FORM_COLUMNS: &str = "id, employee_id, institution_id, form_type, title, data, \
    status, created_by, issued_at, created_at";
