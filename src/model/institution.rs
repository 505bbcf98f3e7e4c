use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Al Noor Contracting",
    "commercial_registration": "1010123456",
    "phone": "+966112345678",
    "email": "info@alnoor.sa",
    "address": "King Fahd Rd, Riyadh",
    "created_at": "2026-01-01T00:00:00Z"
}))]
pub struct Institution {
    pub id: u64,
    pub name: String,
    pub commercial_registration: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}
