use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool, mysql::MySqlRow};
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};

use crate::model::{
    advance::Advance, branch::Branch, compensation::Compensation, document::Document,
    employee::Employee, form::Form, institution::Institution, leave_request::LeaveRequest,
    payroll::PayrollRun, subscription::Subscription, user::UserResponse,
};
use crate::utils::db_utils::{Filters, bind_value_as, bind_value_scalar};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page (1..=100)
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        (self.page() as u64 - 1) * self.per_page() as u64
    }
}

#[derive(Serialize, ToSchema)]
#[aliases(
    InstitutionList = ListResponse<Institution>,
    BranchList = ListResponse<Branch>,
    EmployeeList = ListResponse<Employee>,
    DocumentList = ListResponse<Document>,
    SubscriptionList = ListResponse<Subscription>,
    AdvanceList = ListResponse<Advance>,
    CompensationList = ListResponse<Compensation>,
    PayrollRunList = ListResponse<PayrollRun>,
    LeaveList = ListResponse<LeaveRequest>,
    FormList = ListResponse<Form>,
    UserList = ListResponse<UserResponse>
)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

/// Runs the COUNT and the paged SELECT for a list endpoint.
///
/// `select` is everything up to and including the FROM table, `table` is used for the count.
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    select: &str,
    table: &str,
    filters: &Filters,
    order_by: &str,
    params: &PageParams,
) -> Result<ListResponse<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM {} {}", table, where_clause);
    debug!(sql = %count_sql, bindings = ?filters.values(), "Counting rows");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for value in filters.values() {
        count_query = bind_value_scalar(count_query, value);
    }
    let total = count_query.fetch_one(pool).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count rows");
        e
    })?;

    let data_sql = format!(
        "{} {} ORDER BY {} LIMIT ? OFFSET ?",
        select, where_clause, order_by
    );
    debug!(sql = %data_sql, page = params.page(), per_page = params.per_page(), "Fetching page");

    let mut data_query = sqlx::query_as::<_, T>(&data_sql);
    for value in filters.values() {
        data_query = bind_value_as(data_query, value);
    }
    let data = data_query
        .bind(params.per_page() as u64)
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!(error = %e, sql = %data_sql, "Failed to fetch rows");
            e
        })?;

    Ok(ListResponse {
        data,
        page: params.page(),
        per_page: params.per_page(),
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let params = PageParams { page: None, per_page: None };
        assert_eq!((params.page(), params.per_page(), params.offset()), (1, 20, 0));

        let params = PageParams { page: Some(0), per_page: Some(1000) };
        assert_eq!((params.page(), params.per_page()), (1, 100));

        let params = PageParams { page: Some(3), per_page: Some(0) };
        assert_eq!((params.per_page(), params.offset()), (1, 2));
    }

    #[test]
    fn offset_follows_page() {
        let params = PageParams { page: Some(4), per_page: Some(25) };
        assert_eq!(params.offset(), 75);
    }
}
