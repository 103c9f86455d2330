use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};

use crate::{
    db::{
        helpers::{format_date, format_time, parse_date, parse_optional_time, to_i64, to_u64},
        Database,
    },
    models::{Admission, EmployeeId, OvertimeRecord, ScanApplied},
    overtime::Transition,
    store::RecordStore,
};

fn row_to_record(row: &Row) -> Result<OvertimeRecord> {
    let employee_id: i64 = row.get("employee_id")?;
    let work_date: String = row.get("work_date")?;
    let time_in: Option<String> = row.get("time_in")?;
    let time_out: Option<String> = row.get("time_out")?;

    Ok(OvertimeRecord {
        employee_id: to_u64(employee_id, "employee_id")?,
        work_date: parse_date(&work_date, "work_date")?,
        status: row.get("status")?,
        time_in: parse_optional_time(time_in, "time_in")?,
        time_out: parse_optional_time(time_out, "time_out")?,
    })
}

fn load_record(conn: &Connection, employee_id: EmployeeId, work_date: NaiveDate) -> Result<Option<OvertimeRecord>> {
    let mut stmt = conn.prepare(
        "SELECT employee_id, work_date, status, time_in, time_out
         FROM overtime_records
         WHERE employee_id = ?1 AND work_date = ?2",
    )?;
    let mut rows = stmt.query(params![to_i64(employee_id)?, format_date(work_date)])?;
    let record = match rows.next()? {
        Some(row) => Some(row_to_record(row)?),
        None => None,
    };
    Ok(record)
}

impl Database {
    /// Approval workflow entry point: create or update the request status
    /// for one employee and date. Recorded times are left untouched.
    pub async fn set_request_status(
        &self,
        employee_id: EmployeeId,
        work_date: NaiveDate,
        status: &str,
    ) -> Result<()> {
        let status = status.trim().to_string();
        if status.is_empty() {
            bail!("request status must not be empty");
        }
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO overtime_records (employee_id, work_date, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (employee_id, work_date)
                 DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
                params![to_i64(employee_id)?, format_date(work_date), status, now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_record(&self, employee_id: EmployeeId, work_date: NaiveDate) -> Result<Option<OvertimeRecord>> {
        self.execute(move |conn| load_record(conn, employee_id, work_date))
            .await
    }

    pub async fn list_records(&self, work_date: NaiveDate) -> Result<Vec<OvertimeRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT employee_id, work_date, status, time_in, time_out
                 FROM overtime_records
                 WHERE work_date = ?1
                 ORDER BY employee_id",
            )?;
            let mut rows = stmt.query(params![format_date(work_date)])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// One scan, one immediate transaction. The conditional update makes a
    /// second writer racing on the same key a no-op instead of an overwrite.
    pub async fn record_scan(
        &self,
        employee_id: EmployeeId,
        work_date: NaiveDate,
        now: NaiveTime,
    ) -> Result<ScanApplied> {
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(mut record) = load_record(&tx, employee_id, work_date)? else {
                return Ok(ScanApplied::failed("no overtime request for this date"));
            };
            if !record.is_approved() {
                return Ok(ScanApplied::failed(format!(
                    "overtime request is {}",
                    record.status.to_lowercase()
                )));
            }

            let transition = record.plan_scan(now);
            let updated_at = Utc::now().to_rfc3339();
            let key = (to_i64(employee_id)?, format_date(work_date));
            let changed = match transition {
                Transition::SetTimeIn(at) => tx.execute(
                    "UPDATE overtime_records
                     SET time_in = ?1, updated_at = ?2
                     WHERE employee_id = ?3 AND work_date = ?4 AND time_in IS NULL",
                    params![format_time(at), updated_at, key.0, key.1],
                )?,
                Transition::SetTimeOut(at) => tx.execute(
                    "UPDATE overtime_records
                     SET time_out = ?1, updated_at = ?2
                     WHERE employee_id = ?3 AND work_date = ?4
                       AND time_in IS NOT NULL AND time_out IS NULL",
                    params![format_time(at), updated_at, key.0, key.1],
                )?,
                Transition::Unchanged => 1,
            };
            if changed != 1 {
                bail!("overtime record for employee {employee_id} changed during scan");
            }

            record.apply(transition);
            tx.commit()?;

            Ok(ScanApplied {
                outcome: transition.outcome(),
                time_in: record.time_in,
                time_out: record.time_out,
                message: None,
            })
        })
        .await
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn query_admission(&self, employee_id: EmployeeId, work_date: NaiveDate) -> Result<Admission> {
        let approved = self
            .get_record(employee_id, work_date)
            .await?
            .map(|record| record.is_approved())
            .unwrap_or(false);
        Ok(Admission { approved })
    }

    async fn apply_scan(
        &self,
        employee_id: EmployeeId,
        work_date: NaiveDate,
        now: NaiveTime,
    ) -> Result<ScanApplied> {
        self.record_scan(employee_id, work_date, now).await
    }

    async fn records_for_date(&self, work_date: NaiveDate) -> Result<Vec<OvertimeRecord>> {
        self.list_records(work_date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OvertimeStage, ScanOutcome};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn scans_walk_the_record_lifecycle() {
        let db = Database::in_memory().unwrap();
        db.set_request_status(42, day(), "Approved").await.unwrap();

        let first = db.apply_scan(42, day(), t(20, 31)).await.unwrap();
        assert_eq!(first.outcome, ScanOutcome::TimeInRecorded);
        assert_eq!(first.time_in, Some(t(20, 31)));

        let second = db.apply_scan(42, day(), t(21, 10)).await.unwrap();
        assert_eq!(second.outcome, ScanOutcome::TimeOutRecorded);
        assert_eq!(second.time_in, Some(t(20, 31)));
        assert_eq!(second.time_out, Some(t(21, 10)));

        let third = db.apply_scan(42, day(), t(21, 30)).await.unwrap();
        assert_eq!(third.outcome, ScanOutcome::AlreadyCompleted);

        let stored = db.get_record(42, day()).await.unwrap().unwrap();
        assert_eq!(stored.stage(), OvertimeStage::Completed);
        assert_eq!(stored.time_out, Some(t(21, 10)));
    }

    #[tokio::test]
    async fn unapproved_or_missing_requests_fail() {
        let db = Database::in_memory().unwrap();
        let missing = db.apply_scan(7, day(), t(20, 45)).await.unwrap();
        assert_eq!(missing.outcome, ScanOutcome::Failed);

        db.set_request_status(7, day(), "Pending").await.unwrap();
        let pending = db.apply_scan(7, day(), t(20, 45)).await.unwrap();
        assert_eq!(pending.outcome, ScanOutcome::Failed);
        assert_eq!(pending.message.as_deref(), Some("overtime request is pending"));
        assert!(!db.query_admission(7, day()).await.unwrap().approved);
    }

    #[tokio::test]
    async fn status_changes_keep_recorded_times() {
        let db = Database::in_memory().unwrap();
        db.set_request_status(42, day(), "approved").await.unwrap();
        db.apply_scan(42, day(), t(20, 31)).await.unwrap();

        db.set_request_status(42, day(), "Approve").await.unwrap();
        let record = db.get_record(42, day()).await.unwrap().unwrap();
        assert_eq!(record.status, "Approve");
        assert_eq!(record.time_in, Some(t(20, 31)));
        assert_eq!(db.list_records(day()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_one_date() {
        let db = Database::in_memory().unwrap();
        let tomorrow = day().succ_opt().unwrap();
        db.set_request_status(2, day(), "Approved").await.unwrap();
        db.set_request_status(1, day(), "Approved").await.unwrap();
        db.set_request_status(1, tomorrow, "Approved").await.unwrap();

        let records = db.records_for_date(day()).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.employee_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
