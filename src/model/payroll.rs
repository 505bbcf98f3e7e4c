use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::utils::validation::{month, round2};

/// Unpaid leave is priced at basic salary / 30 per day regardless of month length.
pub const DAYS_PER_PAY_MONTH: f64 = 30.0;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayrollRunStatus {
    Draft,
    Processed,
    Paid,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollRun {
    pub id: u64,
    /// `null` means the run covers every institution
    pub institution_id: Option<u64>,
    #[serde(serialize_with = "month::serialize")]
    #[schema(value_type = String, example = "2026-02")]
    pub month: NaiveDate,
    #[schema(example = "processed")]
    pub status: String,
    pub employee_count: u32,
    pub total_gross: f64,
    pub total_deductions: f64,
    pub total_net: f64,
    pub created_by: Option<u64>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub processed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

pub const PAYROLL_RUN_COLUMNS: &str = "id, institution_id, month, status, employee_count, \
    total_gross, total_deductions, total_net, created_by, processed_at, created_at";

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollEntry {
    pub id: u64,
    pub payroll_run_id: u64,
    pub employee_id: u64,
    pub employee_code: String,
    pub full_name: String,
    pub basic_salary: f64,
    pub allowances: f64,
    pub additions: f64,
    pub compensation_deductions: f64,
    pub advance_deduction: f64,
    pub unpaid_leave_deduction: f64,
    pub gross_pay: f64,
    pub total_deductions: f64,
    pub net_pay: f64,
}

/// Everything the payroll run gathers for one employee before computing pay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayInputs {
    pub basic_salary: f64,
    pub housing_allowance: f64,
    pub transport_allowance: f64,
    pub other_allowances: f64,
    pub additions: f64,
    pub compensation_deductions: f64,
    pub advance_deduction: f64,
    pub unpaid_leave_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayBreakdown {
    pub basic_salary: f64,
    pub allowances: f64,
    pub additions: f64,
    pub compensation_deductions: f64,
    pub advance_deduction: f64,
    pub unpaid_leave_deduction: f64,
    pub gross_pay: f64,
    pub total_deductions: f64,
    pub net_pay: f64,
}

pub fn compute_pay(inputs: &PayInputs) -> PayBreakdown {
    let allowances =
        round2(inputs.housing_allowance + inputs.transport_allowance + inputs.other_allowances);
    let unpaid_leave_deduction =
        round2(inputs.basic_salary / DAYS_PER_PAY_MONTH * inputs.unpaid_leave_days as f64);

    let gross_pay = round2(inputs.basic_salary + allowances + inputs.additions);
    let total_deductions = round2(
        inputs.compensation_deductions + inputs.advance_deduction + unpaid_leave_deduction,
    );

    PayBreakdown {
        basic_salary: round2(inputs.basic_salary),
        allowances,
        additions: round2(inputs.additions),
        compensation_deductions: round2(inputs.compensation_deductions),
        advance_deduction: round2(inputs.advance_deduction),
        unpaid_leave_deduction,
        gross_pay,
        total_deductions,
        net_pay: round2(gross_pay - total_deductions),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTotals {
    pub employee_count: u32,
    pub total_gross: f64,
    pub total_deductions: f64,
    pub total_net: f64,
}

impl RunTotals {
    pub fn add(&mut self, pay: &PayBreakdown) {
        self.employee_count += 1;
        self.total_gross = round2(self.total_gross + pay.gross_pay);
        self.total_deductions = round2(self.total_deductions + pay.total_deductions);
        self.total_net = round2(self.total_net + pay.net_pay);
    }
}
