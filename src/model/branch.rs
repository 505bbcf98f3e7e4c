use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Branch {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1)]
    pub institution_id: u64,
    #[schema(example = "Jeddah Branch")]
    pub name: String,
    #[schema(example = "Jeddah")]
    pub city: Option<String>,
    pub address: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}
