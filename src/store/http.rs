use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use log::info;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::models::{is_approved_status, Admission, EmployeeId, OvertimeRecord, ScanApplied, ScanOutcome};

use super::RecordStore;

/// Record store backed by the HR web API.
#[derive(Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize, Debug)]
struct ScanRequest {
    employee_id: EmployeeId,
    work_date: NaiveDate,
    scanned_at: String,
}

#[derive(Deserialize, Debug)]
struct AdmissionResponse {
    approved: Option<bool>,
    status: Option<String>,
}

impl AdmissionResponse {
    fn into_admission(self) -> Admission {
        let approved = match (self.approved, self.status) {
            (Some(approved), _) => approved,
            (None, Some(status)) => is_approved_status(&status),
            (None, None) => false,
        };
        Admission { approved }
    }
}

#[derive(Deserialize, Debug)]
struct ScanResponse {
    outcome: ScanOutcome,
    #[serde(default)]
    time_in: Option<String>,
    #[serde(default)]
    time_out: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ScanResponse {
    fn into_applied(self) -> Result<ScanApplied> {
        Ok(ScanApplied {
            outcome: self.outcome,
            time_in: self.time_in.as_deref().map(parse_clock).transpose()?,
            time_out: self.time_out.as_deref().map(parse_clock).transpose()?,
            message: self.message,
        })
    }
}

fn parse_clock(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .with_context(|| format!("invalid time of day '{raw}'"))
}

impl HttpRecordStore {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            headers.insert("x-api-key", HeaderValue::from_str(key).context("invalid API key header")?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn query_admission(&self, employee_id: EmployeeId, work_date: NaiveDate) -> Result<Admission> {
        let res = self
            .client
            .get(self.url("overtime/admission"))
            .query(&[
                ("employee_id", employee_id.to_string()),
                ("date", work_date.to_string()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            bail!("admission lookup failed with status: {}", res.status());
        }

        let parsed: AdmissionResponse = res.json().await?;
        Ok(parsed.into_admission())
    }

    async fn apply_scan(
        &self,
        employee_id: EmployeeId,
        work_date: NaiveDate,
        now: NaiveTime,
    ) -> Result<ScanApplied> {
        let request = ScanRequest {
            employee_id,
            work_date,
            scanned_at: now.format("%H:%M:%S").to_string(),
        };
        info!("posting overtime scan: {:?}", request);

        let res = self
            .client
            .post(self.url("overtime/scan"))
            .json(&request)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("scan rejected with status {status}: {body}"));
        }

        let parsed: ScanResponse = res.json().await?;
        parsed.into_applied()
    }

    async fn records_for_date(&self, work_date: NaiveDate) -> Result<Vec<OvertimeRecord>> {
        let res = self
            .client
            .get(self.url("overtime/records"))
            .query(&[("date", work_date.to_string())])
            .send()
            .await?;

        if !res.status().is_success() {
            bail!("record listing failed with status: {}", res.status());
        }

        Ok(res.json().await?)
    }
}
