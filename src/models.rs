use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub const MISSING_DATE_LABEL: &str = "未记录日期";
pub const INVALID_DATE_LABEL: &str = "日期格式错误";
pub const UNKNOWN_CASE_TYPE: &str = "未知类型";

/// Reference clock-in time that deviations are measured against.
pub fn target_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub clock_in: NaiveDateTime,
}

impl AttendanceRecord {
    pub fn new(clock_in: NaiveDateTime) -> Self {
        Self { clock_in }
    }

    pub fn date(&self) -> NaiveDate {
        self.clock_in.date()
    }

    pub fn weekday(&self) -> Weekday {
        self.clock_in.weekday()
    }

    /// Minutes between 08:00 on the record's own date and the clock-in.
    /// Positive means early, negative means late; partial minutes are truncated.
    pub fn deviation_minutes(&self) -> i64 {
        let target = self.date().and_time(target_time());
        (target - self.clock_in).num_minutes()
    }
}

/// Month bucket of a case record. Records without a usable date keep a
/// sentinel bucket instead of being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MonthKey {
    Month { year: i32, month: u32 },
    InvalidDate,
    MissingDate,
}

impl MonthKey {
    /// Only an exact `YYYY-MM-DD` names a month; surrounding whitespace makes
    /// the date invalid.
    pub fn from_raw_date(raw: Option<&str>) -> Self {
        match raw {
            None | Some("") => MonthKey::MissingDate,
            Some(value) => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                Ok(date) => MonthKey::Month {
                    year: date.year(),
                    month: date.month(),
                },
                Err(_) => MonthKey::InvalidDate,
            },
        }
    }

    pub fn calendar(&self) -> Option<(i32, u32)> {
        match self {
            MonthKey::Month { year, month } => Some((*year, *month)),
            _ => None,
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthKey::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            MonthKey::InvalidDate => f.write_str(INVALID_DATE_LABEL),
            MonthKey::MissingDate => f.write_str(MISSING_DATE_LABEL),
        }
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        match value {
            MISSING_DATE_LABEL => return Ok(MonthKey::MissingDate),
            INVALID_DATE_LABEL => return Ok(MonthKey::InvalidDate),
            _ => {}
        }
        NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
            .map(|date| MonthKey::Month {
                year: date.year(),
                month: date.month(),
            })
            .map_err(|_| format!("expected a month as YYYY-MM, got `{value}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub month: MonthKey,
    pub patient_name: Option<String>,
    pub department: Option<String>,
    pub case_type: String,
    pub score: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthTypeTotal {
    pub month: MonthKey,
    pub case_type: String,
    pub total_score: f64,
    pub case_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthTotal {
    pub month: MonthKey,
    pub total_score: f64,
    pub case_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseTypeSummary {
    pub case_type: String,
    pub case_count: usize,
    pub total_score: f64,
    pub avg_score: f64,
}
