use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
    Emergency,
    Maternity,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "sick")]
    pub leave_type: String,
    #[schema(value_type = String, format = Date)]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date)]
    pub end_date: NaiveDate,
    #[schema(example = 3)]
    pub days: u32,
    #[schema(example = "pending")]
    pub status: String,
    pub reason: Option<String>,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

pub const LEAVE_COLUMNS: &str = "id, employee_id, leave_type, start_date, end_date, days, \
    status, reason, reviewed_by, reviewed_at, created_at";

/// Inclusive day count; callers validate `start <= end` first.
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> u32 {
    ((end - start).num_days() + 1).max(0) as u32
}

/// Days of `[start, end]` that fall inside `[window_start, window_end]`.
pub fn overlap_days(
    start: NaiveDate,
    end: NaiveDate,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> u32 {
    let from = start.max(window_start);
    let to = end.min(window_end);
    if from > to {
        0
    } else {
        leave_days(from, to)
    }
}
