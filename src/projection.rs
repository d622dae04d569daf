use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use crate::error::ProjectionError;
use crate::models::{target_time, AttendanceRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrivalGuidance {
    /// Arrive this many minutes before 08:00.
    Early(f64),
    /// Arriving this many minutes after 08:00 still meets the goal.
    Late(f64),
    OnTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub recorded_days: usize,
    pub total_deviation: i64,
    pub current_average: f64,
    pub days_left: i64,
    pub desired_avg: f64,
    pub target_total: f64,
    pub remaining_needed: f64,
    pub required_per_day: f64,
    pub arrival_time: NaiveTime,
    pub guidance: ArrivalGuidance,
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Calendar days between `last_date` and the end of its month.
pub fn days_left_in_month(last_date: NaiveDate) -> i64 {
    (last_day_of_month(last_date) - last_date).num_days()
}

/// Mean deviation needed on each remaining day so the whole-month mean lands
/// on `desired_avg`.
pub fn required_per_day(
    deviations: &[i64],
    desired_avg: f64,
    days_left: i64,
    last_date: NaiveDate,
) -> Result<f64, ProjectionError> {
    if days_left <= 0 {
        return Err(ProjectionError::NoRemainingDays { last_date });
    }
    let total: i64 = deviations.iter().sum();
    let target_total = desired_avg * (deviations.len() as i64 + days_left) as f64;
    Ok((target_total - total as f64) / days_left as f64)
}

/// 08:00 shifted by the required deviation; wraps around midnight.
pub fn arrival_time(required_per_day: f64) -> NaiveTime {
    let offset = Duration::milliseconds((required_per_day * 60_000.0).round() as i64);
    target_time() - offset
}

pub fn guidance(required_per_day: f64) -> ArrivalGuidance {
    if required_per_day > 0.0 {
        ArrivalGuidance::Early(required_per_day)
    } else if required_per_day < 0.0 {
        ArrivalGuidance::Late(-required_per_day)
    } else {
        ArrivalGuidance::OnTime
    }
}

pub fn project(records: &[AttendanceRecord], desired_avg: f64) -> Result<Projection, ProjectionError> {
    let last_date = records
        .iter()
        .map(AttendanceRecord::date)
        .max()
        .ok_or(ProjectionError::NoRecords)?;

    let deviations: Vec<i64> = records.iter().map(AttendanceRecord::deviation_minutes).collect();
    let days_left = days_left_in_month(last_date);
    let required = required_per_day(&deviations, desired_avg, days_left, last_date)?;

    let recorded_days = deviations.len();
    let total_deviation: i64 = deviations.iter().sum();
    let target_total = desired_avg * (recorded_days as i64 + days_left) as f64;

    Ok(Projection {
        recorded_days,
        total_deviation,
        current_average: total_deviation as f64 / recorded_days as f64,
        days_left,
        desired_avg,
        target_total,
        remaining_needed: target_total - total_deviation as f64,
        required_per_day: required,
        arrival_time: arrival_time(required),
        guidance: guidance(required),
    })
}
