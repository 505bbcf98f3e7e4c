use crate::api::{
    advance::CreateAdvance,
    branch::{CreateBranch, UpdateBranch},
    compensation::{CreateCompensation, UpdateCompensation},
    dashboard::DashboardSummary,
    document::{CreateDocument, UpdateDocument},
    employee::{CreateEmployee, UpdateEmployee},
    form::{CreateForm, UpdateForm},
    institution::{CreateInstitution, UpdateInstitution},
    leave_request::CreateLeaveRequest,
    payroll::{CreatePayrollRun, PayrollRunDetail},
    subscription::{CreateSubscription, UpdateSubscription},
    user::{CreateUser, SetPassword, UpdateUser},
};
use crate::model::{
    advance::{Advance, AdvanceStatus},
    branch::Branch,
    compensation::{Compensation, CompensationKind},
    document::Document,
    employee::{Employee, EmployeeStatus},
    form::{Form, FormStatus, FormType},
    institution::Institution,
    leave_request::{LeaveRequest, LeaveStatus, LeaveType},
    payroll::{PayrollEntry, PayrollRun, PayrollRunStatus},
    subscription::{Subscription, SubscriptionStatus},
    user::UserResponse,
};
use crate::models::{LoginReqDto, TokenPair};
use crate::utils::pagination::{
    AdvanceList, BranchList, CompensationList, DocumentList, EmployeeList, FormList,
    InstitutionList, LeaveList, PayrollRunList, SubscriptionList, UserList,
};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Admin API",
        version = "1.0.0",
        description = r#"
## HR administration backend

Manages institutions and their branches, employees and their documents,
institution subscriptions, salary advances, compensations, monthly payroll
runs, leave requests and HR forms.

### Security
Every `/api` endpoint needs a JWT access token (`Authorization: Bearer ...`)
obtained from `/auth/login`. Each endpoint checks one permission such as
`employees:write` or `payroll:run`; roles carry default permissions and
users may hold extra grants.

### Response format
- Lists return `{data, page, per_page, total}`
- Errors return `{"message": "..."}`
- Months are written `YYYY-MM`
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::dashboard::summary,

        crate::api::institution::list_institutions,
        crate::api::institution::create_institution,
        crate::api::institution::get_institution,
        crate::api::institution::update_institution,
        crate::api::institution::delete_institution,

        crate::api::branch::list_branches,
        crate::api::branch::create_branch,
        crate::api::branch::get_branch,
        crate::api::branch::update_branch,
        crate::api::branch::delete_branch,

        crate::api::employee::list_employees,
        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::document::list_documents,
        crate::api::document::create_document,
        crate::api::document::get_document,
        crate::api::document::update_document,
        crate::api::document::delete_document,

        crate::api::subscription::list_subscriptions,
        crate::api::subscription::create_subscription,
        crate::api::subscription::get_subscription,
        crate::api::subscription::update_subscription,
        crate::api::subscription::delete_subscription,

        crate::api::advance::list_advances,
        crate::api::advance::create_advance,
        crate::api::advance::get_advance,
        crate::api::advance::approve_advance,
        crate::api::advance::reject_advance,
        crate::api::advance::delete_advance,

        crate::api::compensation::list_compensations,
        crate::api::compensation::create_compensation,
        crate::api::compensation::get_compensation,
        crate::api::compensation::update_compensation,
        crate::api::compensation::delete_compensation,

        crate::api::payroll::list_runs,
        crate::api::payroll::create_run,
        crate::api::payroll::get_run,
        crate::api::payroll::process_run,
        crate::api::payroll::mark_paid,
        crate::api::payroll::delete_run,

        crate::api::leave_request::list_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::delete_leave,

        crate::api::form::list_forms,
        crate::api::form::create_form,
        crate::api::form::get_form,
        crate::api::form::update_form,
        crate::api::form::issue_form,
        crate::api::form::delete_form,

        crate::api::user::list_users,
        crate::api::user::create_user,
        crate::api::user::get_user,
        crate::api::user::update_user,
        crate::api::user::set_password,
        crate::api::user::delete_user
    ),
    components(
        schemas(
            LoginReqDto,
            TokenPair,
            DashboardSummary,
            Institution,
            InstitutionList,
            CreateInstitution,
            UpdateInstitution,
            Branch,
            BranchList,
            CreateBranch,
            UpdateBranch,
            Employee,
            EmployeeList,
            EmployeeStatus,
            CreateEmployee,
            UpdateEmployee,
            Document,
            DocumentList,
            CreateDocument,
            UpdateDocument,
            Subscription,
            SubscriptionList,
            SubscriptionStatus,
            CreateSubscription,
            UpdateSubscription,
            Advance,
            AdvanceList,
            AdvanceStatus,
            CreateAdvance,
            Compensation,
            CompensationList,
            CompensationKind,
            CreateCompensation,
            UpdateCompensation,
            PayrollRun,
            PayrollRunList,
            PayrollRunStatus,
            PayrollEntry,
            PayrollRunDetail,
            CreatePayrollRun,
            LeaveRequest,
            LeaveList,
            LeaveType,
            LeaveStatus,
            CreateLeaveRequest,
            Form,
            FormList,
            FormType,
            FormStatus,
            CreateForm,
            UpdateForm,
            UserResponse,
            UserList,
            CreateUser,
            UpdateUser,
            SetPassword
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token rotation and current user"),
        (name = "Dashboard", description = "Headline counters"),
        (name = "Institution", description = "Institutions (companies)"),
        (name = "Branch", description = "Institution branches"),
        (name = "Employee", description = "Employee records"),
        (name = "Document", description = "Institution and employee documents"),
        (name = "Subscription", description = "Institution subscriptions"),
        (name = "Advance", description = "Salary advances and their approval"),
        (name = "Compensation", description = "Bonuses, overtime, allowances and deductions"),
        (name = "Payroll", description = "Monthly payroll runs"),
        (name = "Leave", description = "Leave requests and their approval"),
        (name = "Form", description = "HR letters and forms"),
        (name = "User", description = "Back-office users and permissions"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
