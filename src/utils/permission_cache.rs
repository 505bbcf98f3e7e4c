use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::OnceCell;
use sqlx::MySqlPool;
use tracing::debug;

use crate::model::permission::{Permission, parse_stored_permissions};
use crate::model::role::Role;

const DEFAULT_TTL_SECS: u64 = 60;
const MAX_CAPACITY: u64 = 10_000;

/// What the auth middleware needs to know about a user on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccess {
    pub username: String,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
    pub is_active: bool,
}

/// user_id => access. Entries expire after the configured TTL and are
/// dropped eagerly whenever a user is changed through the API.
static ACCESS_CACHE: OnceCell<Cache<u64, Arc<UserAccess>>> = OnceCell::new();

/// Sets the TTL. Only the first call wins; later calls are ignored.
pub fn init(ttl_secs: u64) {
    let _ = ACCESS_CACHE.set(build(ttl_secs));
}

fn build(ttl_secs: u64) -> Cache<u64, Arc<UserAccess>> {
    Cache::builder()
        .max_capacity(MAX_CAPACITY)
        .time_to_live(Duration::from_secs(ttl_secs.max(1)))
        .build()
}

fn cache() -> &'static Cache<u64, Arc<UserAccess>> {
    ACCESS_CACHE.get_or_init(|| build(DEFAULT_TTL_SECS))
}

pub async fn invalidate(user_id: u64) {
    cache().invalidate(&user_id).await;
}

pub async fn insert(user_id: u64, access: UserAccess) -> Arc<UserAccess> {
    let access = Arc::new(access);
    cache().insert(user_id, access.clone()).await;
    access
}

#[derive(sqlx::FromRow)]
struct AccessRow {
    username: String,
    role_id: u8,
    permissions: sqlx::types::Json<Vec<String>>,
    is_active: bool,
}

/// Cached lookup; `Ok(None)` when the user no longer exists or has an unknown role.
pub async fn get_access(pool: &MySqlPool, user_id: u64) -> Result<Option<Arc<UserAccess>>, sqlx::Error> {
    if let Some(hit) = cache().get(&user_id).await {
        return Ok(Some(hit));
    }

    debug!(user_id, "Permission cache miss");

    let row = sqlx::query_as::<_, AccessRow>(
        "SELECT username, role_id, permissions, is_active FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let Some(role) = Role::from_id(row.role_id) else {
        return Ok(None);
    };

    let access = UserAccess {
        username: row.username,
        role,
        permissions: role.effective_permissions(&parse_stored_permissions(&row.permissions.0)),
        is_active: row.is_active,
    };

    Ok(Some(insert(user_id, access).await))
}
