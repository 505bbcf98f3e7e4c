//! Shared helpers for handler tests. The pool is lazy and points nowhere, so only
//! code paths that return before touching the database can be exercised.

use actix_web::web;
use sqlx::{MySqlPool, mysql::MySqlPoolOptions};

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{json_error_handler, path_error_handler, query_error_handler};
use crate::model::role::Role;

pub fn lazy_pool() -> MySqlPool {
    MySqlPoolOptions::new()
        .connect_lazy("mysql://nobody@127.0.0.1:1/none")
        .expect("lazy pool")
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "SERVER_ADDR" => Some("127.0.0.1:0".into()),
        "DATABASE_URL" => Some("mysql://nobody@127.0.0.1:1/none".into()),
        "JWT_SECRET" => Some("test-secret".into()),
        _ => None,
    })
    .expect("test config")
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(json_error_handler)
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(query_error_handler)
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(path_error_handler)
}

pub fn user_with_role(role: Role) -> AuthUser {
    AuthUser {
        user_id: 1,
        username: format!("test.{role}"),
        role,
        permissions: role.default_permissions(),
    }
}

pub fn admin() -> AuthUser {
    user_with_role(Role::Admin)
}

/// Builds a test service with `$user` already authenticated and the routes added by `$configure`.
macro_rules! test_app_with_user {
    ($user:expr, $configure:expr) => {{
        let user: $crate::auth::auth::AuthUser = $user;
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($crate::api::test_support::lazy_pool()))
                .app_data(actix_web::web::Data::new($crate::api::test_support::test_config()))
                .app_data($crate::api::test_support::json_config())
                .app_data($crate::api::test_support::query_config())
                .app_data($crate::api::test_support::path_config())
                .wrap_fn(move |req, srv| {
                    use actix_web::HttpMessage;
                    use actix_web::dev::Service;
                    req.extensions_mut().insert(user.clone());
                    srv.call(req)
                })
                .configure($configure),
        )
        .await
    }};
}

pub(crate) use test_app_with_user;

/// Pool on the database named by `TEST_DATABASE_URL`, migrated. Used by `#[ignore]`d tests only.
pub async fn live_pool() -> MySqlPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = MySqlPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrate test database");
    pool
}
