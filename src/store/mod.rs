use std::{future::Future, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use crate::{
    error::ScanError,
    models::{Admission, EmployeeId, OvertimeRecord, ScanApplied},
};

pub mod http;

pub use http::HttpRecordStore;

/// The shared overtime record store. It is written by the approval workflow
/// and by every scanner, so it, not the caller, guarantees that concurrent
/// scans for one `(employee_id, work_date)` are applied at most once each.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read-only approval lookup.
    async fn query_admission(&self, employee_id: EmployeeId, work_date: NaiveDate) -> Result<Admission>;

    /// Advance the record by one scan. Safe to retry: the transition applied
    /// depends only on the record's current state.
    async fn apply_scan(
        &self,
        employee_id: EmployeeId,
        work_date: NaiveDate,
        now: NaiveTime,
    ) -> Result<ScanApplied>;

    async fn records_for_date(&self, work_date: NaiveDate) -> Result<Vec<OvertimeRecord>>;
}

/// Await a store call for at most `timeout`, folding transport errors and
/// expiry into a persistence failure.
pub async fn bounded<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T, ScanError>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ScanError::PersistenceFailure(format!("{what} failed: {err:#}"))),
        Err(_) => Err(ScanError::PersistenceFailure(format!(
            "{what} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}
