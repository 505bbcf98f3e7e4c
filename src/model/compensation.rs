use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::utils::validation::month;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CompensationKind {
    Bonus,
    Overtime,
    Allowance,
    Deduction,
}

impl CompensationKind {
    /// Deductions lower net pay; every other kind raises gross pay.
    pub fn is_deduction(self) -> bool {
        self == CompensationKind::Deduction
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Compensation {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "overtime")]
    pub kind: String,
    #[schema(example = 350.0)]
    pub amount: f64,
    #[serde(serialize_with = "month::serialize")]
    #[schema(value_type = String, example = "2026-02")]
    pub month: NaiveDate,
    pub description: Option<String>,
    /// Set once a payroll run has applied this line
    pub payroll_run_id: Option<u64>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

pub const COMPENSATION_COLUMNS: &str =
    "id, employee_id, kind, amount, month, description, payroll_run_id, created_at";
