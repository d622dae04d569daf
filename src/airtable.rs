use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::cache::SnapshotCache;
use crate::error::{ConfigError, FetchError};
use crate::models::{CaseRecord, MonthKey, UNKNOWN_CASE_TYPE};

pub const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";
pub const DEFAULT_TABLE: &str = "tblWyetzvY1weZjDv";

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_key: Option<String>,
    pub base_id: Option<String>,
    pub base_url: String,
    pub table: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<AirtableRecord>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AirtableRecord {
    #[serde(default)]
    pub fields: CaseFields,
}

/// Columns of the case table. Values stay loosely typed until `into_case`
/// because Airtable returns whatever the cell holds.
#[derive(Debug, Default, Deserialize)]
pub struct CaseFields {
    #[serde(rename = "日期", default)]
    pub date: Option<Value>,
    #[serde(rename = "患者姓名", default)]
    pub patient_name: Option<Value>,
    #[serde(rename = "科室", default)]
    pub department: Option<Value>,
    #[serde(rename = "业务类型", default)]
    pub case_type: Option<Value>,
    #[serde(rename = "分值", default)]
    pub score: Option<Value>,
    #[serde(rename = "备注", default)]
    pub note: Option<Value>,
}

impl CaseFields {
    pub fn into_case(self) -> CaseRecord {
        let raw_date = text(self.date);
        CaseRecord {
            month: MonthKey::from_raw_date(raw_date.as_deref()),
            patient_name: text(self.patient_name),
            department: text(self.department),
            case_type: text(self.case_type).unwrap_or_else(|| UNKNOWN_CASE_TYPE.to_string()),
            score: score(self.score),
            note: text(self.note),
        }
    }
}

fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| text(Some(item)))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

fn score(value: Option<Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// One page of a cursor-paginated record listing.
#[async_trait]
pub trait RecordPages {
    async fn fetch_page(&self, offset: Option<&str>) -> Result<RecordPage, FetchError>;
}

/// Follows continuation cursors until a page comes back without one. Any
/// failing page aborts the whole listing.
pub async fn collect_all<S>(source: &S) -> Result<Vec<AirtableRecord>, FetchError>
where
    S: RecordPages + ?Sized,
{
    let mut records = Vec::new();
    let mut offset: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(offset.as_deref()).await?;
        pages += 1;
        debug!(page = pages, records = page.records.len(), "fetched record page");
        records.extend(page.records);

        match page.offset {
            Some(next) if !next.is_empty() => offset = Some(next),
            _ => break,
        }
    }

    Ok(records)
}

pub async fn fetch_cases<S>(source: &S) -> Result<Vec<CaseRecord>, FetchError>
where
    S: RecordPages + ?Sized,
{
    let records = collect_all(source).await?;
    Ok(records
        .into_iter()
        .map(|record| record.fields.into_case())
        .collect())
}

pub struct AirtableClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig) -> Result<Self, FetchError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let base_id = config
            .base_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingBaseId)?;

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            url: format!(
                "{}/{}/{}",
                config.base_url.trim_end_matches('/'),
                base_id,
                config.table
            ),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl RecordPages for AirtableClient {
    async fn fetch_page(&self, offset: Option<&str>) -> Result<RecordPage, FetchError> {
        let mut request = self.http.get(&self.url).bearer_auth(&self.api_key);
        if let Some(cursor) = offset {
            request = request.query(&[("offset", cursor)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<RecordPage>().await?)
    }
}

/// Case records for the current cache window. Configuration and fetch
/// failures are reported and produce an empty set. The configuration is
/// checked before the slot is consulted, so a cached snapshot is never served
/// without credentials.
pub async fn load_cases(
    config: &AirtableConfig,
    cache: &mut SnapshotCache<CaseRecord>,
    now: DateTime<Utc>,
) -> Vec<CaseRecord> {
    let client = match AirtableClient::new(config) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "Airtable configuration is incomplete");
            eprintln!("Failed to fetch Airtable data: {err}");
            return Vec::new();
        }
    };

    let result = cache
        .get_or_fetch(now, || async move {
            let cases = fetch_cases(&client).await?;
            info!(records = cases.len(), "fetched case records from Airtable");
            Ok::<_, FetchError>(cases)
        })
        .await;

    match result {
        Ok(cases) => cases.to_vec(),
        Err(err) => {
            error!(error = %err, "failed to load case records");
            eprintln!("Failed to fetch Airtable data: {err}");
            Vec::new()
        }
    }
}
