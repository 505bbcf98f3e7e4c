use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::institution::find_institution,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        advance::{AdvanceBalance, AdvanceStatus},
        compensation::CompensationKind,
        employee::{EMPLOYEE_COLUMNS, Employee, EmployeeStatus},
        leave_request::{LeaveStatus, LeaveType, overlap_days},
        payroll::{
            PAYROLL_RUN_COLUMNS, PayInputs, PayrollEntry, PayrollRun, PayrollRunStatus, RunTotals,
            compute_pay,
        },
        permission::Permission,
    },
    utils::{
        db_utils::{Filters, SqlValue, bind_value},
        pagination::{PageParams, fetch_page},
        validation::{format_month, month, month_end, month_option, round2},
    },
};

#[derive(Deserialize, ToSchema)]
pub struct CreatePayrollRun {
    #[serde(deserialize_with = "month::deserialize")]
    #[schema(value_type = String, example = "2026-02")]
    pub month: NaiveDate,
    /// Omit to cover every institution
    pub institution_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayrollRunFilter {
    /// `YYYY-MM`
    #[serde(default, deserialize_with = "month_option::deserialize")]
    #[param(value_type = Option<String>)]
    pub month: Option<NaiveDate>,
    pub status: Option<PayrollRunStatus>,
    pub institution_id: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct PayrollRunDetail {
    #[serde(flatten)]
    pub run: PayrollRun,
    pub entries: Vec<PayrollEntry>,
}

/// An unapplied compensation line of the run month.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PendingCompensation {
    id: u64,
    employee_id: u64,
    kind: String,
    amount: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct UnpaidLeave {
    employee_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

const SELECT_ENTRIES: &str = r#"
    SELECT pe.id, pe.payroll_run_id, pe.employee_id, e.employee_code, e.full_name,
           pe.basic_salary, pe.allowances, pe.additions, pe.compensation_deductions,
           pe.advance_deduction, pe.unpaid_leave_deduction, pe.gross_pay,
           pe.total_deductions, pe.net_pay
    FROM payroll_entries pe
    JOIN employees e ON e.id = pe.employee_id
    WHERE pe.payroll_run_id = ?
    ORDER BY e.employee_code
"#;

pub async fn find_run(pool: &MySqlPool, id: u64) -> ApiResult<PayrollRun> {
    sqlx::query_as::<_, PayrollRun>(&format!(
        "SELECT {} FROM payroll_runs WHERE id = ?",
        PAYROLL_RUN_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, payroll_run_id = id, "Failed to fetch payroll run");
        ApiError::Internal
    })?
    .ok_or(ApiError::NotFound("Payroll run"))
}

async fn load_detail(pool: &MySqlPool, id: u64) -> ApiResult<PayrollRunDetail> {
    let run = find_run(pool, id).await?;
    let entries = sqlx::query_as::<_, PayrollEntry>(SELECT_ENTRIES)
        .bind(id)
        .fetch_all(pool)
        .await?;
    Ok(PayrollRunDetail { run, entries })
}

/// Sums everything one employee is owed or owes for the month.
fn gather_inputs(
    employee: &Employee,
    compensations: &[PendingCompensation],
    advances: &[AdvanceBalance],
    unpaid_leave_days: u32,
) -> PayInputs {
    let mut additions = 0.0;
    let mut compensation_deductions = 0.0;
    for line in compensations {
        match line.kind.parse::<CompensationKind>() {
            Ok(kind) if kind.is_deduction() => compensation_deductions += line.amount,
            Ok(_) => additions += line.amount,
            Err(_) => warn!(compensation_id = line.id, kind = %line.kind, "Skipping unknown compensation kind"),
        }
    }

    PayInputs {
        basic_salary: employee.basic_salary,
        housing_allowance: employee.housing_allowance,
        transport_allowance: employee.transport_allowance,
        other_allowances: employee.other_allowances,
        additions: round2(additions),
        compensation_deductions: round2(compensation_deductions),
        advance_deduction: round2(advances.iter().map(AdvanceBalance::next_installment).sum()),
        unpaid_leave_days,
    }
}

fn group_by_employee<T, F: Fn(&T) -> u64>(rows: Vec<T>, key: F) -> HashMap<u64, Vec<T>> {
    let mut map: HashMap<u64, Vec<T>> = HashMap::new();
    for row in rows {
        map.entry(key(&row)).or_default().push(row);
    }
    map
}

async fn mark_compensations_applied(
    tx: &mut Transaction<'_, MySql>,
    run_id: u64,
    ids: &[u64],
) -> Result<(), sqlx::Error> {
    if ids.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "UPDATE compensations SET payroll_run_id = ? WHERE id IN ({})",
        placeholders
    );
    let mut query = sqlx::query(&sql).bind(run_id);
    for id in ids {
        query = bind_value(query, SqlValue::from(*id));
    }
    query.execute(&mut **tx).await?;
    Ok(())
}

/// Computes every entry of a draft run and moves it to `processed`, all in one transaction.
#[instrument(skip(pool))]
pub async fn process(pool: &MySqlPool, run_id: u64) -> ApiResult<PayrollRunDetail> {
    let mut tx = pool.begin().await?;

    let run = sqlx::query_as::<_, PayrollRun>(&format!(
        "SELECT {} FROM payroll_runs WHERE id = ? FOR UPDATE",
        PAYROLL_RUN_COLUMNS
    ))
    .bind(run_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ApiError::NotFound("Payroll run"))?;

    if run.status != PayrollRunStatus::Draft.as_ref() {
        return Err(ApiError::conflict(format!(
            "Payroll run is already {}",
            run.status
        )));
    }

    let month_start = run.month;
    let last_day = month_end(month_start);

    let mut employee_sql = format!(
        "SELECT {} FROM employees e WHERE e.status = ? AND e.hire_date <= ?",
        EMPLOYEE_COLUMNS
    );
    if run.institution_id.is_some() {
        employee_sql.push_str(" AND e.institution_id = ?");
    }
    // Employees already paid for this month by another run are skipped.
    employee_sql.push_str(
        " AND NOT EXISTS (SELECT 1 FROM payroll_entries pe \
         JOIN payroll_runs pr ON pr.id = pe.payroll_run_id \
         WHERE pe.employee_id = e.id AND pr.month = ? AND pr.id <> ?) \
         ORDER BY e.id",
    );

    let mut employee_query = sqlx::query_as::<_, Employee>(&employee_sql)
        .bind(EmployeeStatus::Active.as_ref())
        .bind(last_day);
    if let Some(institution_id) = run.institution_id {
        employee_query = employee_query.bind(institution_id);
    }
    let employees = employee_query
        .bind(month_start)
        .bind(run.id)
        .fetch_all(&mut *tx)
        .await?;

    let compensations = sqlx::query_as::<_, PendingCompensation>(
        r#"
        SELECT id, employee_id, kind, amount
        FROM compensations
        WHERE month = ? AND payroll_run_id IS NULL
        FOR UPDATE
        "#,
    )
    .bind(month_start)
    .fetch_all(&mut *tx)
    .await?;
    let mut compensations = group_by_employee(compensations, |c| c.employee_id);

    let advances = sqlx::query_as::<_, AdvanceBalance>(
        r#"
        SELECT id, employee_id, installments, paid_installments, monthly_deduction, remaining_amount
        FROM advances
        WHERE status = ? AND remaining_amount > 0 AND start_month <= ?
        FOR UPDATE
        "#,
    )
    .bind(AdvanceStatus::Approved.as_ref())
    .bind(month_start)
    .fetch_all(&mut *tx)
    .await?;
    let mut advances = group_by_employee(advances, |a| a.employee_id);

    let leave = sqlx::query_as::<_, UnpaidLeave>(
        r#"
        SELECT employee_id, start_date, end_date
        FROM leave_requests
        WHERE status = ? AND leave_type = ? AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(LeaveStatus::Approved.as_ref())
    .bind(LeaveType::Unpaid.as_ref())
    .bind(last_day)
    .bind(month_start)
    .fetch_all(&mut *tx)
    .await?;
    let leave = group_by_employee(leave, |l| l.employee_id);

    let mut totals = RunTotals::default();
    let mut applied_compensations = Vec::new();

    for employee in &employees {
        let lines = compensations.remove(&employee.id).unwrap_or_default();
        let balances = advances.remove(&employee.id).unwrap_or_default();
        let unpaid_days = leave
            .get(&employee.id)
            .map(|spans| {
                spans
                    .iter()
                    .map(|l| overlap_days(l.start_date, l.end_date, month_start, last_day))
                    .sum()
            })
            .unwrap_or(0);

        let pay = compute_pay(&gather_inputs(employee, &lines, &balances, unpaid_days));

        sqlx::query(
            r#"
            INSERT INTO payroll_entries
            (payroll_run_id, employee_id, basic_salary, allowances, additions,
             compensation_deductions, advance_deduction, unpaid_leave_deduction,
             gross_pay, total_deductions, net_pay)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id)
        .bind(employee.id)
        .bind(pay.basic_salary)
        .bind(pay.allowances)
        .bind(pay.additions)
        .bind(pay.compensation_deductions)
        .bind(pay.advance_deduction)
        .bind(pay.unpaid_leave_deduction)
        .bind(pay.gross_pay)
        .bind(pay.total_deductions)
        .bind(pay.net_pay)
        .execute(&mut *tx)
        .await?;

        for balance in &balances {
            let next = balance.after_installment();
            let status = if next.is_settled() {
                AdvanceStatus::Completed
            } else {
                AdvanceStatus::Approved
            };
            sqlx::query(
                "UPDATE advances SET remaining_amount = ?, paid_installments = ?, status = ? WHERE id = ?",
            )
            .bind(next.remaining_amount)
            .bind(next.paid_installments)
            .bind(status.as_ref())
            .bind(next.id)
            .execute(&mut *tx)
            .await?;
            debug!(advance_id = next.id, remaining = next.remaining_amount, %status, "Advance installment applied");
        }

        applied_compensations.extend(lines.iter().map(|c| c.id));
        totals.add(&pay);
    }

    mark_compensations_applied(&mut tx, run.id, &applied_compensations).await?;

    sqlx::query(
        r#"
        UPDATE payroll_runs
        SET status = ?, employee_count = ?, total_gross = ?, total_deductions = ?,
            total_net = ?, processed_at = NOW()
        WHERE id = ?
        "#,
    )
    .bind(PayrollRunStatus::Processed.as_ref())
    .bind(totals.employee_count)
    .bind(totals.total_gross)
    .bind(totals.total_deductions)
    .bind(totals.total_net)
    .bind(run.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        payroll_run_id = run.id,
        month = %format_month(&month_start),
        employees = totals.employee_count,
        total_net = totals.total_net,
        "Payroll run processed"
    );

    load_detail(pool, run_id).await
}

/// List payroll runs
#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PageParams, PayrollRunFilter),
    responses((status = 200, description = "Paginated payroll runs", body = PayrollRunList)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_runs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<PayrollRunFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::PayrollRead)?;

    let mut filters = Filters::new();
    filters.eq("month", query.month);
    filters.eq("status", query.status.map(|s| s.to_string()));
    filters.eq("institution_id", query.institution_id);

    let list = fetch_page::<PayrollRun>(
        pool.get_ref(),
        &format!("SELECT {} FROM payroll_runs", PAYROLL_RUN_COLUMNS),
        "payroll_runs",
        &filters,
        "month DESC, id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// An all-institutions run and an institution run would pay the same people twice.
fn overlap_conflict(month: &NaiveDate) -> ApiError {
    ApiError::conflict(format!(
        "A payroll run covering {} already exists for these employees",
        format_month(month)
    ))
}

/// Create a draft payroll run
#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = CreatePayrollRun,
    responses(
        (status = 201, description = "Draft run created", body = PayrollRun),
        (status = 400, description = "Invalid month"),
        (status = 404, description = "Institution not found"),
        (status = 409, description = "A run already covers this month and scope")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_run(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePayrollRun>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::PayrollRun)?;

    if let Some(institution_id) = payload.institution_id {
        find_institution(pool.get_ref(), institution_id).await?;
    }

    let mut tx = pool.begin().await?;

    // Locking read so a concurrent create for the same month waits here.
    let overlapping = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM payroll_runs
        WHERE month = ? AND (? IS NULL OR institution_id IS NULL OR institution_id = ?)
        FOR UPDATE
        "#,
    )
    .bind(payload.month)
    .bind(payload.institution_id)
    .bind(payload.institution_id)
    .fetch_one(&mut *tx)
    .await?;

    if overlapping > 0 {
        return Err(overlap_conflict(&payload.month));
    }

    let result = sqlx::query(
        "INSERT INTO payroll_runs (institution_id, month, status, created_by) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.institution_id)
    .bind(payload.month)
    .bind(PayrollRunStatus::Draft.as_ref())
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => overlap_conflict(&payload.month),
        _ => ApiError::from(e),
    })?;
    tx.commit().await?;

    let run = find_run(pool.get_ref(), result.last_insert_id()).await?;
    info!(payroll_run_id = run.id, month = %format_month(&run.month), user_id = auth.user_id, "Payroll run created");

    Ok(HttpResponse::Created().json(run))
}

/// Get payroll run with its entries
#[utoipa::path(
    get,
    path = "/api/payroll/{id}",
    params(("id" = u64, Path, description = "Payroll run ID")),
    responses(
        (status = 200, description = "Run and entries", body = PayrollRunDetail),
        (status = 404, description = "Payroll run not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_run(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::PayrollRead)?;

    let detail = load_detail(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Process a draft payroll run
#[utoipa::path(
    put,
    path = "/api/payroll/{id}/process",
    params(("id" = u64, Path, description = "Payroll run ID")),
    responses(
        (status = 200, description = "Run processed", body = PayrollRunDetail),
        (status = 404, description = "Payroll run not found"),
        (status = 409, description = "Run is not a draft")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn process_run(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::PayrollRun)?;

    let run_id = path.into_inner();
    info!(payroll_run_id = run_id, user_id = auth.user_id, "Processing payroll run");

    let detail = process(pool.get_ref(), run_id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Mark a processed run as paid
#[utoipa::path(
    put,
    path = "/api/payroll/{id}/paid",
    params(("id" = u64, Path, description = "Payroll run ID")),
    responses(
        (status = 200, description = "Run marked paid", body = PayrollRun),
        (status = 404, description = "Payroll run not found"),
        (status = 409, description = "Run is not processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn mark_paid(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::PayrollRun)?;

    let id = path.into_inner();
    let result = sqlx::query("UPDATE payroll_runs SET status = ? WHERE id = ? AND status = ?")
        .bind(PayrollRunStatus::Paid.as_ref())
        .bind(id)
        .bind(PayrollRunStatus::Processed.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        let run = find_run(pool.get_ref(), id).await?;
        return Err(ApiError::conflict(format!(
            "Only processed runs can be marked paid (status: {})",
            run.status
        )));
    }

    info!(payroll_run_id = id, user_id = auth.user_id, "Payroll run marked paid");
    let run = find_run(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(run))
}

/// Delete a draft payroll run
#[utoipa::path(
    delete,
    path = "/api/payroll/{id}",
    params(("id" = u64, Path, description = "Payroll run ID")),
    responses(
        (status = 200, description = "Run deleted", body = Object, example = json!({
            "message": "Payroll run deleted"
        })),
        (status = 404, description = "Payroll run not found"),
        (status = 409, description = "Run is not a draft")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn delete_run(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::PayrollRun)?;

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM payroll_runs WHERE id = ? AND status = ?")
        .bind(id)
        .bind(PayrollRunStatus::Draft.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        let run = find_run(pool.get_ref(), id).await?;
        return Err(ApiError::conflict(format!(
            "Only draft runs can be deleted (status: {})",
            run.status
        )));
    }

    info!(payroll_run_id = id, user_id = auth.user_id, "Payroll run deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Payroll run deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_app_with_user, user_with_role};
    use crate::model::advance::monthly_deduction;
    use crate::model::role::Role;
    use actix_web::{http::StatusCode, test as actix_test};
    use chrono::Utc;

    fn employee(basic: f64, housing: f64) -> Employee {
        Employee {
            id: 7,
            institution_id: 1,
            branch_id: None,
            employee_code: "EMP-007".into(),
            full_name: "Sara Khalil".into(),
            national_id: None,
            nationality: None,
            job_title: None,
            phone: None,
            email: None,
            hire_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            basic_salary: basic,
            housing_allowance: housing,
            transport_allowance: 0.0,
            other_allowances: 0.0,
            status: "active".into(),
            created_at: Utc::now(),
        }
    }

    fn line(id: u64, kind: &str, amount: f64) -> PendingCompensation {
        PendingCompensation {
            id,
            employee_id: 7,
            kind: kind.into(),
            amount,
        }
    }

    #[test]
    fn compensations_split_into_additions_and_deductions() {
        let lines = [
            line(1, "bonus", 200.0),
            line(2, "overtime", 150.5),
            line(3, "deduction", 75.0),
            line(4, "allowance", 20.0),
        ];
        let inputs = gather_inputs(&employee(5000.0, 1000.0), &lines, &[], 0);
        assert_eq!(inputs.additions, 370.5);
        assert_eq!(inputs.compensation_deductions, 75.0);

        let pay = compute_pay(&inputs);
        assert_eq!(pay.gross_pay, 6370.5);
        assert_eq!(pay.net_pay, 6295.5);
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let inputs = gather_inputs(&employee(1000.0, 0.0), &[line(9, "gift", 50.0)], &[], 0);
        assert_eq!(inputs.additions, 0.0);
        assert_eq!(inputs.compensation_deductions, 0.0);
    }

    #[test]
    fn advances_and_unpaid_leave_reduce_net() {
        let advance = AdvanceBalance {
            id: 3,
            employee_id: 7,
            installments: 2,
            paid_installments: 0,
            monthly_deduction: monthly_deduction(500.0, 2),
            remaining_amount: 500.0,
        };
        let inputs = gather_inputs(&employee(3000.0, 0.0), &[], &[advance], 3);
        assert_eq!(inputs.advance_deduction, 250.0);

        let pay = compute_pay(&inputs);
        assert_eq!(pay.unpaid_leave_deduction, 300.0);
        assert_eq!(pay.total_deductions, 550.0);
        assert_eq!(pay.net_pay, 2450.0);
    }

    #[test]
    fn rows_group_by_employee() {
        let grouped = group_by_employee(
            vec![line(1, "bonus", 1.0), line(2, "bonus", 2.0)],
            |c| c.employee_id,
        );
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&7].len(), 2);
    }

    #[test]
    fn detail_flattens_run_fields() {
        let detail = PayrollRunDetail {
            run: PayrollRun {
                id: 4,
                institution_id: None,
                month: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                status: "draft".into(),
                employee_count: 0,
                total_gross: 0.0,
                total_deductions: 0.0,
                total_net: 0.0,
                created_by: Some(1),
                processed_at: None,
                created_at: Utc::now(),
            },
            entries: vec![],
        };
        let value = serde_json::to_value(detail).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["month"], "2026-02");
        assert!(value["entries"].as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn invalid_month_is_400() {
        let app = test_app_with_user!(user_with_role(Role::Accountant), |cfg| {
            cfg.route("/api/payroll", web::post().to(create_run));
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/payroll")
            .set_json(json!({ "month": "2026-13" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn hr_cannot_process() {
        let app = test_app_with_user!(user_with_role(Role::Hr), |cfg| {
            cfg.route("/api/payroll/{id}/process", web::put().to(process_run));
        });
        let req = actix_test::TestRequest::put()
            .uri("/api/payroll/1/process")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn viewer_cannot_read_payroll() {
        let app = test_app_with_user!(user_with_role(Role::Viewer), |cfg| {
            cfg.route("/api/payroll", web::get().to(list_runs));
        });
        let req = actix_test::TestRequest::get().uri("/api/payroll").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    /// Runs against a real MySQL database: `TEST_DATABASE_URL=mysql://... cargo test -- --ignored`
    #[actix_web::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn processing_applies_advances_compensations_and_leave() {
        let pool = crate::api::test_support::live_pool().await;
        let tag = uuid::Uuid::new_v4().to_simple().to_string();

        let institution_id = sqlx::query("INSERT INTO institutions (name) VALUES (?)")
            .bind(format!("Payroll test {tag}"))
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();
        let employee_id = sqlx::query(
            r#"
            INSERT INTO employees
            (institution_id, employee_code, full_name, hire_date, basic_salary, housing_allowance)
            VALUES (?, ?, 'Payroll Tester', '2025-06-01', 4500, 1000)
            "#,
        )
        .bind(institution_id)
        .bind(format!("PT-{tag}"))
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();

        sqlx::query(
            "INSERT INTO compensations (employee_id, kind, amount, month) VALUES (?, 'bonus', 200, '2026-03-01'), (?, 'deduction', 50, '2026-03-01')",
        )
        .bind(employee_id)
        .bind(employee_id)
        .execute(&pool)
        .await
        .unwrap();
        let advance_id = sqlx::query(
            r#"
            INSERT INTO advances
            (employee_id, amount, installments, monthly_deduction, remaining_amount, start_month, status)
            VALUES (?, 100, 3, 33.33, 33.34, '2026-01-01', 'approved')
            "#,
        )
        .bind(employee_id)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();
        sqlx::query("UPDATE advances SET paid_installments = 2 WHERE id = ?")
            .bind(advance_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            INSERT INTO leave_requests (employee_id, leave_type, start_date, end_date, days, status)
            VALUES (?, 'unpaid', '2026-02-27', '2026-03-02', 4, 'approved')
            "#,
        )
        .bind(employee_id)
        .execute(&pool)
        .await
        .unwrap();

        let run_id = sqlx::query(
            "INSERT INTO payroll_runs (institution_id, month, status) VALUES (?, '2026-03-01', 'draft')",
        )
        .bind(institution_id)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();

        let detail = process(&pool, run_id).await.unwrap();
        assert_eq!(detail.run.status, "processed");
        assert_eq!(detail.entries.len(), 1);

        let entry = &detail.entries[0];
        assert_eq!(entry.gross_pay, 5700.0);
        assert_eq!(entry.advance_deduction, 33.34);
        // 1 and 2 March only
        assert_eq!(entry.unpaid_leave_deduction, 300.0);
        assert_eq!(entry.total_deductions, 383.34);
        assert_eq!(entry.net_pay, 5316.66);

        let (status, remaining) = sqlx::query_as::<_, (String, f64)>(
            "SELECT status, remaining_amount FROM advances WHERE id = ?",
        )
        .bind(advance_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, "completed");
        assert_eq!(remaining, 0.0);

        let unapplied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM compensations WHERE employee_id = ? AND payroll_run_id IS NULL",
        )
        .bind(employee_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(unapplied, 0);

        assert!(matches!(process(&pool, run_id).await, Err(ApiError::Conflict(_))));
    }

    #[actix_web::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn overlapping_runs_never_pay_twice() {
        let pool = crate::api::test_support::live_pool().await;
        let id = uuid::Uuid::new_v4();
        let tag = id.to_simple().to_string();
        let bytes = id.as_bytes();
        // A month no other test uses, so runs of other tests cannot interfere.
        let month = NaiveDate::from_ymd_opt(
            2100 + i32::from(u16::from_be_bytes([bytes[0], bytes[1]]) % 800),
            u32::from(bytes[2] % 12) + 1,
            1,
        )
        .unwrap();

        let mut institutions = Vec::new();
        for name in ["Overlap A", "Overlap B"] {
            let inserted = sqlx::query("INSERT INTO institutions (name) VALUES (?)")
                .bind(format!("{name} {tag}"))
                .execute(&pool)
                .await
                .unwrap();
            institutions.push(inserted.last_insert_id());
        }
        let (home, other) = (institutions[0], institutions[1]);

        let employee_id = sqlx::query(
            r#"
            INSERT INTO employees (institution_id, employee_code, full_name, hire_date, basic_salary)
            VALUES (?, ?, 'Paid Once', '2025-01-01', 3000)
            "#,
        )
        .bind(home)
        .bind(format!("OV-{tag}"))
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();

        let create = |institution_id: Option<u64>| {
            create_run(
                crate::api::test_support::admin(),
                web::Data::new(pool.clone()),
                web::Json(CreatePayrollRun {
                    month,
                    institution_id,
                }),
            )
        };

        // Institution run first: an all-institutions run for the month is refused.
        let created = create(Some(home)).await.unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert!(matches!(create(None).await, Err(ApiError::Conflict(_))));

        let home_run: u64 = sqlx::query_scalar(
            "SELECT id FROM payroll_runs WHERE month = ? AND institution_id = ?",
        )
        .bind(month)
        .bind(home)
        .fetch_one(&pool)
        .await
        .unwrap();

        // Employee already has an entry for the month in another run.
        let other_run = sqlx::query(
            "INSERT INTO payroll_runs (institution_id, month, status) VALUES (?, ?, 'processed')",
        )
        .bind(other)
        .bind(month)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();
        sqlx::query(
            r#"
            INSERT INTO payroll_entries
            (payroll_run_id, employee_id, basic_salary, allowances, additions, compensation_deductions,
             advance_deduction, unpaid_leave_deduction, gross_pay, total_deductions, net_pay)
            VALUES (?, ?, 3000, 0, 0, 0, 0, 0, 3000, 0, 3000)
            "#,
        )
        .bind(other_run)
        .bind(employee_id)
        .execute(&pool)
        .await
        .unwrap();

        let detail = process(&pool, home_run).await.unwrap();
        assert!(detail.entries.is_empty());
        assert_eq!(detail.run.employee_count, 0);

        // All-institutions run first: an institution run for the month is refused.
        sqlx::query("DELETE FROM payroll_runs WHERE month = ?")
            .bind(month)
            .execute(&pool)
            .await
            .unwrap();
        let global_run = sqlx::query("INSERT INTO payroll_runs (month, status) VALUES (?, 'draft')")
            .bind(month)
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();
        assert!(matches!(create(Some(other)).await, Err(ApiError::Conflict(_))));

        sqlx::query("DELETE FROM payroll_runs WHERE id = ?")
            .bind(global_run)
            .execute(&pool)
            .await
            .unwrap();
    }
}
