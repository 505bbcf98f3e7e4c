use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serializer};

use crate::error::{ApiError, ApiResult};

pub fn require_non_empty(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub fn require_max_len(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Money amount that is still positive once rounded to cents.
pub fn require_positive(field: &str, value: f64) -> ApiResult<()> {
    if !value.is_finite() || round2(value) <= 0.0 {
        return Err(ApiError::validation(format!("{field} must be at least 0.01")));
    }
    Ok(())
}

pub fn require_non_negative(field: &str, value: f64) -> ApiResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::validation(format!("{field} must not be negative")));
    }
    Ok(())
}

/// Shape check only: `local@domain.tld`, no whitespace.
pub fn require_email(field: &str, value: &str) -> ApiResult<()> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::validation(format!("{field} must be a valid email address")));
    }
    Ok(())
}

pub fn require_date_order(
    start_field: &str,
    start: NaiveDate,
    end_field: &str,
    end: NaiveDate,
) -> ApiResult<()> {
    if start > end {
        return Err(ApiError::validation(format!(
            "{start_field} cannot be after {end_field}"
        )));
    }
    Ok(())
}

/// Rounds a money amount to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// ===============================
/// Month (YYYY-MM) handling
/// ===============================

/// Accepts `YYYY-MM` or `YYYY-MM-DD`; always returns the first day of the month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
        .and_then(|d| d.with_day(1))
}

pub fn format_month(date: &NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Last calendar day of the month starting at `month`.
pub fn month_end(month: NaiveDate) -> NaiveDate {
    let (year, next) = if month.month() == 12 {
        (month.year() + 1, 1)
    } else {
        (month.year(), month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, next, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(month)
}

pub mod month {
    use super::*;

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_month(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        parse_month(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid month '{raw}', expected YYYY-MM")))
    }
}

pub mod month_option {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_month(&raw).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid month '{raw}', expected YYYY-MM"))
            }),
            None => Ok(None),
        }
    }
}

/// Lets update payloads tell "field absent" (`None`) from "field is null" (`Some(None)`).
pub fn double_option<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}
