use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::utils::validation::{month, round2};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdvanceStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "employee_id": 12,
    "amount": 500.0,
    "installments": 2,
    "monthly_deduction": 250.0,
    "remaining_amount": 500.0,
    "paid_installments": 0,
    "start_month": "2026-02",
    "status": "pending",
    "reason": "Family emergency",
    "reviewed_by": null,
    "reviewed_at": null,
    "created_at": "2026-01-20T08:00:00Z"
}))]
pub struct Advance {
    pub id: u64,
    pub employee_id: u64,
    pub amount: f64,
    pub installments: u32,
    pub monthly_deduction: f64,
    pub remaining_amount: f64,
    pub paid_installments: u32,
    #[serde(serialize_with = "month::serialize")]
    #[schema(value_type = String, example = "2026-02")]
    pub start_month: NaiveDate,
    pub status: String,
    pub reason: Option<String>,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

pub const ADVANCE_COLUMNS: &str = "id, employee_id, amount, installments, monthly_deduction, \
    remaining_amount, paid_installments, start_month, status, reason, reviewed_by, \
    reviewed_at, created_at";

/// Fixed monthly installment for a new advance.
pub fn monthly_deduction(amount: f64, installments: u32) -> f64 {
    round2(amount / installments.max(1) as f64)
}

/// The repayment state of an approved advance, as read during payroll processing.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AdvanceBalance {
    pub id: u64,
    pub employee_id: u64,
    pub installments: u32,
    pub paid_installments: u32,
    pub monthly_deduction: f64,
    pub remaining_amount: f64,
}

impl AdvanceBalance {
    /// Amount due this month. The last scheduled installment sweeps the remainder
    /// so cent rounding never leaves a residue behind.
    pub fn next_installment(&self) -> f64 {
        if self.remaining_amount <= 0.0 {
            return 0.0;
        }
        if self.paid_installments + 1 >= self.installments {
            return round2(self.remaining_amount);
        }
        round2(self.monthly_deduction.min(self.remaining_amount))
    }

    /// State after deducting `next_installment`.
    pub fn after_installment(&self) -> AdvanceBalance {
        let deduction = self.next_installment();
        AdvanceBalance {
            paid_installments: self.paid_installments + 1,
            remaining_amount: round2((self.remaining_amount - deduction).max(0.0)),
            ..self.clone()
        }
    }

    pub fn is_settled(&self) -> bool {
        self.remaining_amount <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_balance(amount: f64, installments: u32) -> AdvanceBalance {
        AdvanceBalance {
            id: 1,
            employee_id: 1,
            installments,
            paid_installments: 0,
            monthly_deduction: monthly_deduction(amount, installments),
            remaining_amount: amount,
        }
    }

    #[test]
    fn five_hundred_over_two_is_two_fifty() {
        assert_eq!(monthly_deduction(500.0, 2), 250.0);

        let first = new_balance(500.0, 2);
        assert_eq!(first.next_installment(), 250.0);
        let second = first.after_installment();
        assert_eq!(second.remaining_amount, 250.0);
        assert_eq!(second.next_installment(), 250.0);
        let done = second.after_installment();
        assert!(done.is_settled());
        assert_eq!(done.paid_installments, 2);
    }

    #[test]
    fn last_installment_absorbs_rounding() {
        let mut balance = new_balance(100.0, 3);
        let mut deductions = Vec::new();
        while !balance.is_settled() {
            deductions.push(balance.next_installment());
            balance = balance.after_installment();
        }
        assert_eq!(deductions, vec![33.33, 33.33, 33.34]);
    }

    #[test]
    fn settled_advance_deducts_nothing() {
        let balance = AdvanceBalance {
            remaining_amount: 0.0,
            paid_installments: 4,
            ..new_balance(400.0, 4)
        };
        assert_eq!(balance.next_installment(), 0.0);
    }

    #[test]
    fn partially_prepaid_advance_never_overdeducts() {
        let balance = AdvanceBalance {
            remaining_amount: 80.0,
            ..new_balance(1000.0, 10)
        };
        assert_eq!(balance.next_installment(), 80.0);
        assert!(balance.after_installment().is_settled());
    }
}
