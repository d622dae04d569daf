use std::io::{Read, Write};
use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::LoadError;
use crate::models::AttendanceRecord;

pub const SHEET_NAME: &str = "Sheet1";

/// Positional layout of the clock-in export. The sheet has no header row.
pub const COLUMNS: [&str; 9] = [
    "id",
    "name",
    "department",
    "date",
    "attendance_status",
    "data_source",
    "process_type",
    "temperature",
    "temperature_flag",
];

const DATE_COLUMN: usize = 3;

/// Sunday is not a working day and never counts towards the average.
pub const EXCLUDED_WEEKDAY: Weekday = Weekday::Sun;

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

pub fn load(path: &Path) -> Result<Vec<AttendanceRecord>, LoadError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let records = match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_workbook(path)?,
        "csv" => {
            let file = std::fs::File::open(path).map_err(|err| LoadError::Open {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
            load_csv(file)?
        }
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };

    info!(path = %path.display(), records = records.len(), "loaded attendance records");
    Ok(records)
}

pub fn load_workbook(path: &Path) -> Result<Vec<AttendanceRecord>, LoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|err| LoadError::Open {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;

    if !workbook.sheet_names().iter().any(|name| name == SHEET_NAME) {
        return Err(LoadError::MissingSheet(SHEET_NAME.to_string()));
    }

    let range = workbook
        .worksheet_range(SHEET_NAME)
        .map_err(|err| LoadError::Open {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

    let (Some((first_row, _)), Some((last_row, last_col))) = (range.start(), range.end()) else {
        return Ok(Vec::new());
    };

    // Cell positions are absolute, so a blank leading column still counts.
    check_width(last_col as usize + 1)?;

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for row in first_row..=last_row {
        let stamp = range
            .get_value((row, DATE_COLUMN as u32))
            .and_then(cell_timestamp);
        match stamp {
            Some(clock_in) => records.push(AttendanceRecord::new(clock_in)),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, "skipped rows without a parseable date");
    }
    Ok(records)
}

pub fn load_csv<R: Read>(reader: R) -> Result<Vec<AttendanceRecord>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for result in reader.records() {
        let row = result?;
        check_width(row.len())?;
        match row.get(DATE_COLUMN).and_then(parse_timestamp) {
            Some(clock_in) => records.push(AttendanceRecord::new(clock_in)),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, "skipped rows without a parseable date");
    }
    Ok(records)
}

fn check_width(found: usize) -> Result<(), LoadError> {
    if found != COLUMNS.len() {
        return Err(LoadError::Shape {
            expected: COLUMNS.len(),
            found,
        });
    }
    Ok(())
}

fn cell_timestamp(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::Empty | Data::Error(_) | Data::Bool(_) => None,
        Data::String(text) => parse_timestamp(text),
        other => other.as_datetime(),
    }
}

/// Parses the textual date forms found in clock-in exports. Date-only values
/// land on midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub fn exclude_weekday(records: Vec<AttendanceRecord>, weekday: Weekday) -> Vec<AttendanceRecord> {
    records
        .into_iter()
        .filter(|record| record.weekday() != weekday)
        .collect()
}

#[derive(Debug, Serialize)]
struct AttendanceRow {
    date: NaiveDate,
    clock_in: String,
    weekday: String,
    deviation_minutes: i64,
}

/// Writes the parsed records with their derived columns, one row per record.
pub fn write_csv<W: Write>(records: &[AttendanceRecord], writer: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(AttendanceRow {
            date: record.date(),
            clock_in: record.clock_in.format("%H:%M:%S").to_string(),
            weekday: record.weekday().to_string(),
            deviation_minutes: record.deviation_minutes(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    fn row(date: &str) -> String {
        format!("7,Avery Lee,Radiology,{date},normal,app,clock-in,36.5,no\n")
    }

    #[test]
    fn parses_common_timestamp_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(7, 52, 0))
            .expect("valid");
        assert_eq!(parse_timestamp("2024-03-04 07:52:00"), Some(expected));
        assert_eq!(parse_timestamp("2024/03/04 07:52"), Some(expected));
        assert_eq!(parse_timestamp(" 2024-03-04T07:52:00 "), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-04"),
            NaiveDate::from_ymd_opt(2024, 3, 4).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn csv_rows_with_bad_dates_are_dropped() {
        let data = [
            row("2024-03-04 07:50:00"),
            row("not a date"),
            row(""),
            row("2024-03-05 08:10:00"),
        ]
        .concat();

        let records = load_csv(data.as_bytes()).expect("loads");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].deviation_minutes(), 10);
        assert_eq!(records[1].deviation_minutes(), -10);
    }

    #[test]
    fn csv_with_wrong_column_count_is_a_shape_error() {
        let data = "7,Avery Lee,Radiology,2024-03-04 07:50:00,normal\n";
        let err = load_csv(data.as_bytes()).expect_err("shape mismatch");
        assert!(matches!(err, LoadError::Shape { expected: 9, found: 5 }));
    }

    #[test]
    fn reads_sheet1_from_workbook() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("attendance.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME).expect("name");
        let rows = [
            "2024-03-02 07:40:00",
            "2024-03-03 09:00:00",
            "garbage",
            "2024-03-04 08:05:00",
        ];
        for (idx, stamp) in rows.iter().enumerate() {
            let r = idx as u32;
            sheet.write_number(r, 0, (idx + 1) as f64).expect("id");
            for (col, value) in ["Avery Lee", "Radiology"].iter().enumerate() {
                sheet.write_string(r, (col + 1) as u16, *value).expect("cell");
            }
            sheet.write_string(r, 3, *stamp).expect("date");
            for col in 4..9u16 {
                sheet.write_string(r, col, "x").expect("cell");
            }
        }
        workbook.save(&path).expect("save");

        let records = load(&path).expect("loads");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].deviation_minutes(), 20);

        let working = exclude_weekday(records, EXCLUDED_WEEKDAY);
        assert_eq!(working.len(), 2, "2024-03-03 is a Sunday");
    }

    #[test]
    fn reads_native_datetime_cells() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("attendance.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME).expect("name");
        let stamp_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let rows = [
            "2024-03-04 08:00:00",
            "2024-03-05 08:01:00",
            "2024-03-06 07:13:00",
        ];
        for (idx, stamp) in rows.iter().enumerate() {
            let r = idx as u32;
            let clock_in = ExcelDateTime::parse_from_str(stamp).expect("datetime");
            sheet.write_number(r, 0, (idx + 1) as f64).expect("id");
            sheet.write_string(r, 1, "Avery Lee").expect("cell");
            sheet.write_string(r, 2, "Radiology").expect("cell");
            sheet
                .write_datetime_with_format(r, 3, &clock_in, &stamp_format)
                .expect("date");
            for col in 4..9u16 {
                sheet.write_string(r, col, "x").expect("cell");
            }
        }
        workbook.save(&path).expect("save");

        let records = load(&path).expect("loads");
        let deviations: Vec<i64> = records.iter().map(|r| r.deviation_minutes()).collect();
        assert_eq!(deviations, vec![0, -1, 47]);
        assert_eq!(
            records[2].date(),
            NaiveDate::from_ymd_opt(2024, 3, 6).expect("date")
        );
    }

    #[test]
    fn workbook_without_sheet1_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("attendance.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Records").expect("name");
        sheet.write_string(0, 0, "1").expect("cell");
        workbook.save(&path).expect("save");

        let err = load(&path).expect_err("missing sheet");
        assert!(matches!(err, LoadError::MissingSheet(_)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load(Path::new("attendance.txt")).expect_err("unsupported");
        assert!(matches!(err, LoadError::UnsupportedFormat(ext) if ext == "txt"));
    }

    #[test]
    fn csv_export_includes_derived_columns() {
        let records = load_csv(row("2024-03-04 07:50:00").as_bytes()).expect("loads");
        let mut out = Vec::new();
        write_csv(&records, &mut out).expect("write");

        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,clock_in,weekday,deviation_minutes");
        assert_eq!(lines[1], "2024-03-04,07:50:00,Mon,10");
    }

    #[test]
    fn excluding_a_weekday_is_idempotent() {
        let data = [
            row("2024-03-02 07:40:00"),
            row("2024-03-03 07:40:00"),
            row("2024-03-04 07:40:00"),
            row("2024-03-10 07:40:00"),
        ]
        .concat();
        let records = load_csv(data.as_bytes()).expect("loads");

        let once = exclude_weekday(records, EXCLUDED_WEEKDAY);
        let twice = exclude_weekday(once.clone(), EXCLUDED_WEEKDAY);
        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }
}
