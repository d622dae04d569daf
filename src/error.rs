use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },
    #[error("sheet `{0}` not found in workbook")]
    MissingSheet(String),
    #[error("expected {expected} columns (id, name, department, date, status, source, process type, temperature, temperature flag) but found {found}")]
    Shape { expected: usize, found: usize },
    #[error("unsupported attendance file type: {0}")]
    UnsupportedFormat(String),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Airtable API key is not configured (set AIRTABLE_API_KEY or pass --api-key)")]
    MissingApiKey,
    #[error("Airtable base id is not configured (set AIRTABLE_BASE_ID or pass --base-id)")]
    MissingBaseId,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Airtable returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("no attendance records to project from")]
    NoRecords,
    #[error("no remaining days after {last_date} to project over; make sure the data covers the month")]
    NoRemainingDays { last_date: NaiveDate },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("`{0}` is not a calendar month and cannot be exported")]
    NotACalendarMonth(String),
    #[error("no case records for {0}")]
    NoRecords(String),
    #[error("xlsx: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}
