pub mod db_utils;
pub mod pagination;
pub mod permission_cache;
pub mod validation;
