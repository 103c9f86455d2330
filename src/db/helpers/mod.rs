use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveTime};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn format_time(value: NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_time(value: Option<String>, field: &str) -> Result<Option<NaiveTime>> {
    match value {
        Some(raw) => NaiveTime::parse_from_str(&raw, TIME_FORMAT)
            .map(Some)
            .with_context(|| format!("failed to parse {field}")),
        None => Ok(None),
    }
}
