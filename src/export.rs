//! Monthly case sheet export.
//!
//! One worksheet, a header row, one row per case in fetch order and a total
//! row directly below the data.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, FormatBorder, Workbook, XlsxError};

use crate::error::ExportError;
use crate::models::{CaseRecord, MonthKey};

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const SHEET_NAME: &str = "病例统计";
pub const HEADERS: [&str; 6] = ["序号", "患者姓名", "科室", "病例类型", "分值", "备注"];
pub const TOTAL_LABEL: &str = "总计";

const CASE_TYPE_COL: u16 = 3;
const SCORE_COL: u16 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub sequence: usize,
    pub patient_name: String,
    pub department: String,
    pub case_type: String,
    pub score: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub year: i32,
    pub month: u32,
    pub rows: Vec<ExportRow>,
    pub total_score: f64,
}

impl ExportTable {
    /// `2024-03` becomes `2024年3月份`; the month carries no leading zero.
    pub fn period_label(&self) -> String {
        format!("{}年{}月份", self.year, self.month)
    }

    pub fn file_name(&self, owner: &str) -> String {
        format!("{owner}{}病例统计.xlsx", self.period_label())
    }

    pub fn download_label(&self) -> String {
        format!("下载{}数据", self.period_label())
    }
}

pub fn build_export(records: &[CaseRecord], month: MonthKey) -> Result<ExportTable, ExportError> {
    let (year, month_number) = month
        .calendar()
        .ok_or_else(|| ExportError::NotACalendarMonth(month.to_string()))?;

    let rows: Vec<ExportRow> = records
        .iter()
        .filter(|record| record.month == month)
        .enumerate()
        .map(|(idx, record)| ExportRow {
            sequence: idx + 1,
            patient_name: record.patient_name.clone().unwrap_or_default(),
            department: record.department.clone().unwrap_or_default(),
            case_type: record.case_type.clone(),
            score: record.score,
            note: record.note.clone().unwrap_or_default(),
        })
        .collect();

    if rows.is_empty() {
        return Err(ExportError::NoRecords(month.to_string()));
    }

    let total_score = rows.iter().map(|row| row.score).sum();
    Ok(ExportTable {
        year,
        month: month_number,
        rows,
        total_score,
    })
}

fn build_workbook(table: &ExportTable) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new().set_bold().set_border(FormatBorder::Thin);
    let total_format = Format::new().set_bold();

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    worksheet.set_column_width(0, 6)?;
    worksheet.set_column_width(1, 14)?;
    worksheet.set_column_width(2, 14)?;
    worksheet.set_column_width(3, 14)?;
    worksheet.set_column_width(4, 8)?;
    worksheet.set_column_width(5, 30)?;

    for (idx, row) in table.rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        worksheet.write_number(r, 0, row.sequence as f64)?;
        worksheet.write_string(r, 1, &row.patient_name)?;
        worksheet.write_string(r, 2, &row.department)?;
        worksheet.write_string(r, CASE_TYPE_COL, &row.case_type)?;
        worksheet.write_number(r, SCORE_COL, row.score)?;
        worksheet.write_string(r, 5, &row.note)?;
    }

    let total_row = (table.rows.len() + 1) as u32;
    worksheet.write_string_with_format(total_row, CASE_TYPE_COL, TOTAL_LABEL, &total_format)?;
    worksheet.write_number_with_format(total_row, SCORE_COL, table.total_score, &total_format)?;

    Ok(workbook)
}

pub fn to_buffer(table: &ExportTable) -> Result<Vec<u8>, ExportError> {
    let mut workbook = build_workbook(table)?;
    Ok(workbook.save_to_buffer()?)
}

/// Writes the workbook into `dir` and returns the full path.
pub fn write_to_dir(table: &ExportTable, dir: &Path, owner: &str) -> Result<PathBuf, ExportError> {
    let path = dir.join(table.file_name(owner));
    std::fs::write(&path, to_buffer(table)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Data, Reader};

    const MARCH: MonthKey = MonthKey::Month { year: 2024, month: 3 };

    fn case(month: MonthKey, name: &str, score: f64, note: Option<&str>) -> CaseRecord {
        CaseRecord {
            month,
            patient_name: Some(name.to_string()),
            department: None,
            case_type: "surgery".to_string(),
            score,
            note: note.map(str::to_string),
        }
    }

    #[test]
    fn missing_fields_export_as_empty_strings() {
        let records = vec![
            case(MARCH, "Avery", 2.0, None),
            case(MARCH, "Jules", 3.5, None),
            case(MARCH, "Kiara", 1.25, None),
        ];

        let table = build_export(&records, MARCH).expect("export");
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows.iter().all(|row| row.note.is_empty()));
        assert!(table.rows.iter().all(|row| row.department.is_empty()));
        assert!((table.total_score - 6.75).abs() < 1e-9);
    }

    #[test]
    fn sequence_follows_output_position() {
        let records = vec![
            case(MARCH, "Avery", 2.0, Some("follow-up")),
            case(MonthKey::Month { year: 2024, month: 4 }, "Jules", 3.0, None),
            case(MARCH, "Kiara", 1.0, None),
        ];

        let table = build_export(&records, MARCH).expect("export");
        let sequences: Vec<usize> = table.rows.iter().map(|row| row.sequence).collect();
        let names: Vec<&str> = table.rows.iter().map(|row| row.patient_name.as_str()).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(names, vec!["Avery", "Kiara"]);
        assert_eq!(table.rows[0].note, "follow-up");
    }

    #[test]
    fn labels_use_bare_month_number() {
        let table = build_export(&[case(MARCH, "Avery", 1.0, None)], MARCH).expect("export");
        assert_eq!(table.file_name("任彬彬"), "任彬彬2024年3月份病例统计.xlsx");
        assert_eq!(table.file_name(""), "2024年3月份病例统计.xlsx");
        assert_eq!(table.download_label(), "下载2024年3月份数据");
    }

    #[test]
    fn sentinel_and_empty_months_are_rejected() {
        let records = vec![case(MonthKey::MissingDate, "Avery", 1.0, None)];
        assert!(matches!(
            build_export(&records, MonthKey::MissingDate),
            Err(ExportError::NotACalendarMonth(_))
        ));
        assert!(matches!(
            build_export(&records, MARCH),
            Err(ExportError::NoRecords(_))
        ));
    }

    #[test]
    fn written_sheet_has_header_rows_and_total() {
        let records = vec![
            case(MARCH, "Avery", 2.0, None),
            case(MARCH, "Jules", 3.0, Some("re-scan")),
        ];
        let table = build_export(&records, MARCH).expect("export");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_to_dir(&table, dir.path(), "").expect("write");

        let mut workbook = open_workbook_auto(&path).expect("open");
        let range = workbook.worksheet_range(SHEET_NAME).expect("sheet");

        assert_eq!(range.get_value((0, 0)), Some(&Data::String("序号".to_string())));
        assert_eq!(range.get_value((0, 5)), Some(&Data::String("备注".to_string())));
        assert_eq!(range.get_value((2, 5)), Some(&Data::String("re-scan".to_string())));
        assert_eq!(range.get_value((3, 3)), Some(&Data::String(TOTAL_LABEL.to_string())));
        assert_eq!(range.get_value((3, 4)), Some(&Data::Float(5.0)));
        assert_eq!(range.end(), Some((3, 5)));
    }

    #[test]
    fn buffer_is_a_zip_container() {
        let table = build_export(&[case(MARCH, "Avery", 1.0, None)], MARCH).expect("export");
        let bytes = to_buffer(&table).expect("buffer");
        assert!(bytes.starts_with(b"PK"));
    }
}
