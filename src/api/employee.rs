use crate::{
    api::{branch::find_branch, institution::find_institution},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        employee::{EMPLOYEE_COLUMNS, Employee, EmployeeStatus},
        permission::Permission,
    },
    utils::{
        db_utils::{Filters, SqlUpdate},
        pagination::{PageParams, fetch_page},
        validation::{
            double_option, require_email, require_max_len, require_non_empty, require_non_negative,
            round2,
        },
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = 1)]
    pub institution_id: u64,
    #[schema(example = 2)]
    pub branch_id: Option<u64>,
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "Omar Haddad")]
    pub full_name: String,
    pub national_id: Option<String>,
    pub nationality: Option<String>,
    #[schema(example = "Site Engineer")]
    pub job_title: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "omar@alnoor.sa")]
    pub email: Option<String>,
    #[schema(example = "2026-01-01", value_type = String, format = Date)]
    pub hire_date: NaiveDate,
    #[schema(example = 6000.0)]
    pub basic_salary: f64,
    #[serde(default)]
    pub housing_allowance: f64,
    #[serde(default)]
    pub transport_allowance: f64,
    #[serde(default)]
    pub other_allowances: f64,
    pub status: Option<EmployeeStatus>,
}

impl CreateEmployee {
    fn validate(&self) -> ApiResult<()> {
        require_non_empty("employee_code", &self.employee_code)?;
        require_max_len("employee_code", &self.employee_code, 64)?;
        require_non_empty("full_name", &self.full_name)?;
        require_max_len("full_name", &self.full_name, 255)?;
        if let Some(email) = &self.email {
            require_email("email", email)?;
        }
        require_non_negative("basic_salary", self.basic_salary)?;
        require_non_negative("housing_allowance", self.housing_allowance)?;
        require_non_negative("transport_allowance", self.transport_allowance)?;
        require_non_negative("other_allowances", self.other_allowances)?;
        Ok(())
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateEmployee {
    /// `null` detaches the employee from its branch
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>)]
    pub branch_id: Option<Option<u64>>,
    pub employee_code: Option<String>,
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub nationality: Option<String>,
    pub job_title: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub hire_date: Option<NaiveDate>,
    pub basic_salary: Option<f64>,
    pub housing_allowance: Option<f64>,
    pub transport_allowance: Option<f64>,
    pub other_allowances: Option<f64>,
    pub status: Option<EmployeeStatus>,
}

impl UpdateEmployee {
    fn validate(&self) -> ApiResult<()> {
        if let Some(code) = &self.employee_code {
            require_non_empty("employee_code", code)?;
            require_max_len("employee_code", code, 64)?;
        }
        if let Some(name) = &self.full_name {
            require_non_empty("full_name", name)?;
            require_max_len("full_name", name, 255)?;
        }
        if let Some(email) = &self.email {
            require_email("email", email)?;
        }
        for (field, value) in [
            ("basic_salary", self.basic_salary),
            ("housing_allowance", self.housing_allowance),
            ("transport_allowance", self.transport_allowance),
            ("other_allowances", self.other_allowances),
        ] {
            if let Some(v) = value {
                require_non_negative(field, v)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeFilter {
    pub institution_id: Option<u64>,
    pub branch_id: Option<u64>,
    pub status: Option<EmployeeStatus>,
    /// Matches name, employee code or national id
    pub search: Option<String>,
}

pub async fn find_employee(pool: &MySqlPool, id: u64) -> ApiResult<Employee> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {} FROM employees WHERE id = ?",
        EMPLOYEE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, employee_id = id, "Failed to fetch employee");
        ApiError::Internal
    })?
    .ok_or(ApiError::NotFound("Employee"))
}

/// A branch may only hold employees of its own institution.
async fn check_branch_belongs(pool: &MySqlPool, branch_id: u64, institution_id: u64) -> ApiResult<()> {
    let branch = find_branch(pool, branch_id).await?;
    if branch.institution_id != institution_id {
        return Err(ApiError::validation(
            "branch_id belongs to a different institution",
        ));
    }
    Ok(())
}

/// List employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(PageParams, EmployeeFilter),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeList),
        (status = 400, description = "Invalid filter")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    page: web::Query<PageParams>,
    query: web::Query<EmployeeFilter>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesRead)?;

    let mut filters = Filters::new();
    filters.eq("institution_id", query.institution_id);
    filters.eq("branch_id", query.branch_id);
    filters.eq("status", query.status.map(|s| s.to_string()));
    filters.search(
        &["full_name", "employee_code", "national_id"],
        query.search.as_deref(),
    );

    let list = fetch_page::<Employee>(
        pool.get_ref(),
        &format!("SELECT {} FROM employees", EMPLOYEE_COLUMNS),
        "employees",
        &filters,
        "id DESC",
        &page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(list))
}

/// Create employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Institution or branch not found"),
        (status = 409, description = "Employee code already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesWrite)?;
    payload.validate()?;

    find_institution(pool.get_ref(), payload.institution_id).await?;
    if let Some(branch_id) = payload.branch_id {
        check_branch_belongs(pool.get_ref(), branch_id, payload.institution_id).await?;
    }

    let status = payload.status.unwrap_or(EmployeeStatus::Active);

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (institution_id, branch_id, employee_code, full_name, national_id, nationality,
         job_title, phone, email, hire_date, basic_salary, housing_allowance,
         transport_allowance, other_allowances, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.institution_id)
    .bind(payload.branch_id)
    .bind(payload.employee_code.trim())
    .bind(payload.full_name.trim())
    .bind(&payload.national_id)
    .bind(&payload.nationality)
    .bind(&payload.job_title)
    .bind(&payload.phone)
    .bind(&payload.email)
    .bind(payload.hire_date)
    .bind(round2(payload.basic_salary))
    .bind(round2(payload.housing_allowance))
    .bind(round2(payload.transport_allowance))
    .bind(round2(payload.other_allowances))
    .bind(status.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if !matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
            error!(error = %e, "Failed to create employee");
        }
        ApiError::from(e)
    })?;

    let employee = find_employee(pool.get_ref(), result.last_insert_id()).await?;
    info!(employee_id = employee.id, user_id = auth.user_id, "Employee created");

    Ok(HttpResponse::Created().json(employee))
}

/// Get employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesRead)?;

    let employee = find_employee(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Update employee
#[utoipa::path(
    put,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee code already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesWrite)?;
    payload.validate()?;

    let id = path.into_inner();
    let body = payload.into_inner();

    let update = SqlUpdate::new("employees")
        .set_nullable("branch_id", body.branch_id)
        .set("employee_code", body.employee_code.map(|c| c.trim().to_string()))
        .set("full_name", body.full_name.map(|n| n.trim().to_string()))
        .set("national_id", body.national_id)
        .set("nationality", body.nationality)
        .set("job_title", body.job_title)
        .set("phone", body.phone)
        .set("email", body.email)
        .set("hire_date", body.hire_date)
        .set("basic_salary", body.basic_salary.map(round2))
        .set("housing_allowance", body.housing_allowance.map(round2))
        .set("transport_allowance", body.transport_allowance.map(round2))
        .set("other_allowances", body.other_allowances.map(round2))
        .set("status", body.status.map(|s| s.to_string()));

    if update.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let current = find_employee(pool.get_ref(), id).await?;
    if let Some(Some(branch_id)) = body.branch_id {
        check_branch_belongs(pool.get_ref(), branch_id, current.institution_id).await?;
    }

    update.execute(pool.get_ref(), id).await?;

    let employee = find_employee(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Delete employee
#[utoipa::path(
    delete,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee has payroll history")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesWrite)?;

    let employee_id = path.into_inner();

    let payroll_rows =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payroll_entries WHERE employee_id = ?")
            .bind(employee_id)
            .fetch_one(pool.get_ref())
            .await?;

    if payroll_rows > 0 {
        return Err(ApiError::conflict(
            "Employee has payroll history; set status to terminated instead",
        ));
    }

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to delete employee");
            ApiError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Employee"));
    }

    info!(employee_id, user_id = auth.user_id, "Employee deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
