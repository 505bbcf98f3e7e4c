use crate::{
    api::{
        advance, branch, compensation, dashboard, document, employee, form, institution,
        leave_request, payroll, subscription, user,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;

type LimiterConfig = GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-IP limiter settings. Built once in `main`; every worker's `Governor`
/// shares the same underlying state through the config.
#[derive(Clone)]
pub struct RateLimits {
    login: LimiterConfig,
    refresh: LimiterConfig,
    protected: LimiterConfig,
}

impl RateLimits {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            login: limiter_config(config.rate_login_per_min)?,
            refresh: limiter_config(config.rate_refresh_per_min)?,
            protected: limiter_config(config.rate_protected_per_min)?,
        })
    }
}

fn limiter_config(requests_per_min: u32) -> anyhow::Result<LimiterConfig> {
    let per_min = requests_per_min.max(1);
    GovernorConfigBuilder::default()
        .milliseconds_per_request((60_000 / per_min as u64).max(1))
        .burst_size(per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min} per minute"))
}

/// `/{id}` plus GET/PUT/DELETE on a CRUD resource.
macro_rules! crud {
    ($scope:literal, $module:ident, $list:ident, $create:ident, $get:ident, $update:ident, $delete:ident) => {
        web::scope($scope)
            .service(
                web::resource("")
                    .route(web::get().to($module::$list))
                    .route(web::post().to($module::$create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to($module::$get))
                    .route(web::put().to($module::$update))
                    .route(web::delete().to($module::$delete)),
            )
    };
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limits: &RateLimits) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(Governor::new(&limits.login))
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(Governor::new(&limits.refresh))
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(Governor::new(&limits.login))
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(Governor::new(&limits.protected))
            .route("/me", web::get().to(handlers::me))
            .route("/dashboard", web::get().to(dashboard::summary))
            .service(crud!(
                "/institutions",
                institution,
                list_institutions,
                create_institution,
                get_institution,
                update_institution,
                delete_institution
            ))
            .service(crud!(
                "/branches",
                branch,
                list_branches,
                create_branch,
                get_branch,
                update_branch,
                delete_branch
            ))
            .service(crud!(
                "/employees",
                employee,
                list_employees,
                create_employee,
                get_employee,
                update_employee,
                delete_employee
            ))
            .service(crud!(
                "/documents",
                document,
                list_documents,
                create_document,
                get_document,
                update_document,
                delete_document
            ))
            .service(crud!(
                "/subscriptions",
                subscription,
                list_subscriptions,
                create_subscription,
                get_subscription,
                update_subscription,
                delete_subscription
            ))
            .service(crud!(
                "/compensations",
                compensation,
                list_compensations,
                create_compensation,
                get_compensation,
                update_compensation,
                delete_compensation
            ))
            .service(
                web::scope("/advances")
                    .service(
                        web::resource("")
                            .route(web::get().to(advance::list_advances))
                            .route(web::post().to(advance::create_advance)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(advance::get_advance))
                            .route(web::delete().to(advance::delete_advance)),
                    )
                    .route("/{id}/approve", web::put().to(advance::approve_advance))
                    .route("/{id}/reject", web::put().to(advance::reject_advance)),
            )
            .service(
                web::scope("/payroll")
                    .service(
                        web::resource("")
                            .route(web::get().to(payroll::list_runs))
                            .route(web::post().to(payroll::create_run)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payroll::get_run))
                            .route(web::delete().to(payroll::delete_run)),
                    )
                    .route("/{id}/process", web::put().to(payroll::process_run))
                    .route("/{id}/paid", web::put().to(payroll::mark_paid)),
            )
            .service(
                web::scope("/leave")
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::list_leave))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(leave_request::get_leave))
                            .route(web::delete().to(leave_request::delete_leave)),
                    )
                    .route("/{id}/approve", web::put().to(leave_request::approve_leave))
                    .route("/{id}/reject", web::put().to(leave_request::reject_leave)),
            )
            .service(
                crud!(
                    "/forms",
                    form,
                    list_forms,
                    create_form,
                    get_form,
                    update_form,
                    delete_form
                )
                .route("/{id}/issue", web::put().to(form::issue_form)),
            )
            .service(
                crud!(
                    "/users",
                    user,
                    list_users,
                    create_user,
                    get_user,
                    update_user,
                    delete_user
                )
                .route("/{id}/password", web::put().to(user::set_password)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_config;
    use actix_web::{App, http::StatusCode, test as actix_test};

    #[test]
    fn zero_rate_is_clamped_instead_of_failing() {
        assert!(limiter_config(0).is_ok());
        assert!(limiter_config(100_000).is_ok());
    }

    #[actix_web::test]
    async fn protected_scope_requires_a_token() {
        let config = test_config();
        let limits = RateLimits::from_config(&config).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(crate::api::test_support::lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, &config, &limits)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/api/institutions")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
