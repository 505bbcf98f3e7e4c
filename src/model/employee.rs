use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    OnLeave,
    Terminated,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "institution_id": 1,
        "branch_id": 2,
        "employee_code": "EMP-001",
        "full_name": "Omar Haddad",
        "national_id": "2456789012",
        "nationality": "Jordanian",
        "job_title": "Site Engineer",
        "phone": "+966501234567",
        "email": "omar@alnoor.sa",
        "hire_date": "2024-01-01",
        "basic_salary": 6000.0,
        "housing_allowance": 1500.0,
        "transport_allowance": 500.0,
        "other_allowances": 0.0,
        "status": "active",
        "created_at": "2024-01-01T00:00:00Z"
    })
)]
pub struct Employee {
    pub id: u64,
    pub institution_id: u64,
    pub branch_id: Option<u64>,
    pub employee_code: String,
    pub full_name: String,
    pub national_id: Option<String>,
    pub nationality: Option<String>,
    pub job_title: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[schema(value_type = String, format = Date)]
    pub hire_date: NaiveDate,
    pub basic_salary: f64,
    pub housing_allowance: f64,
    pub transport_allowance: f64,
    pub other_allowances: f64,
    #[schema(example = "active")]
    pub status: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

pub const EMPLOYEE_COLUMNS: &str = "id, institution_id, branch_id, employee_code, full_name, \
    national_id, nationality, job_title, phone, email, hire_date, basic_salary, \
    housing_allowance, transport_allowance, other_allowances, status, created_at";
