use std::fmt::Write;

use crate::aggregate;
use crate::models::{AttendanceRecord, CaseRecord, CaseTypeSummary, MonthTotal, MonthTypeTotal};
use crate::projection::{ArrivalGuidance, Projection};

pub fn summarize_by_type(records: &[CaseRecord]) -> Vec<CaseTypeSummary> {
    let mut map: std::collections::HashMap<String, (usize, f64)> =
        std::collections::HashMap::new();

    for record in records {
        let entry = map.entry(record.case_type.clone()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.score;
    }

    let mut summaries: Vec<CaseTypeSummary> = map
        .into_iter()
        .map(|(case_type, (case_count, total_score))| CaseTypeSummary {
            case_type,
            case_count,
            total_score,
            avg_score: if case_count == 0 {
                0.0
            } else {
                total_score / case_count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.case_type.cmp(&b.case_type))
    });
    summaries
}

pub fn render_month_tables(groups: &[MonthTypeTotal], totals: &[MonthTotal]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Monthly totals");
    if totals.is_empty() {
        let _ = writeln!(output, "  (no months selected)");
    }
    for total in totals {
        let _ = writeln!(
            output,
            "  {:<12} score {:>8.2}  cases {:>4}",
            total.month.to_string(),
            total.total_score,
            total.case_count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "By case type");
    if groups.is_empty() {
        let _ = writeln!(output, "  (no months selected)");
    }
    for group in groups {
        let _ = writeln!(
            output,
            "  {:<12} {:<16} score {:>8.2}  cases {:>4}",
            group.month.to_string(),
            group.case_type,
            group.total_score,
            group.case_count
        );
    }

    output
}

pub fn build_case_report(scope: Option<&str>, records: &[CaseRecord]) -> String {
    let totals = aggregate::by_month(records);
    let groups = aggregate::by_month_and_type(records);
    let summaries = summarize_by_type(records);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all months");

    let _ = writeln!(output, "# Case Score Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} cases)",
        scope_label,
        records.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Totals");

    if totals.is_empty() {
        let _ = writeln!(output, "No cases recorded for this selection.");
    } else {
        let _ = writeln!(output, "| Month | Total score | Cases |");
        let _ = writeln!(output, "| --- | ---: | ---: |");
        for total in totals.iter() {
            let _ = writeln!(
                output,
                "| {} | {:.2} | {} |",
                total.month, total.total_score, total.case_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Case Type Mix");

    if groups.is_empty() {
        let _ = writeln!(output, "No cases recorded for this selection.");
    } else {
        let _ = writeln!(output, "| Month | Case type | Total score | Cases |");
        let _ = writeln!(output, "| --- | --- | ---: | ---: |");
        for group in groups.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {:.2} | {} |",
                group.month, group.case_type, group.total_score, group.case_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Scoring Case Types");

    if summaries.is_empty() {
        let _ = writeln!(output, "No cases recorded for this selection.");
    } else {
        for summary in summaries.iter().take(10) {
            let _ = writeln!(
                output,
                "- {}: {:.2} points across {} cases (avg {:.2})",
                summary.case_type, summary.total_score, summary.case_count, summary.avg_score
            );
        }
    }

    output
}

pub fn render_attendance_records(records: &[AttendanceRecord]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{:<12} {:<8} {:<4} {:>10}", "date", "time", "day", "deviation");
    for record in records {
        let _ = writeln!(
            output,
            "{:<12} {:<8} {:<4} {:>10}",
            record.date().to_string(),
            record.clock_in.format("%H:%M:%S").to_string(),
            record.weekday().to_string(),
            record.deviation_minutes()
        );
    }
    output
}

pub fn render_projection(projection: &Projection) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Calculation details");
    let _ = writeln!(output, "- Recorded days: {}", projection.recorded_days);
    let _ = writeln!(
        output,
        "- Total deviation: {:.2} minutes",
        projection.total_deviation as f64
    );
    let _ = writeln!(
        output,
        "- Current average: {:.2} minutes",
        projection.current_average
    );
    let _ = writeln!(output, "- Remaining days: {}", projection.days_left);
    let _ = writeln!(
        output,
        "- Target total deviation: {:.2} minutes",
        projection.target_total
    );
    let _ = writeln!(
        output,
        "- Deviation still needed: {:.2} minutes",
        projection.remaining_needed
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "To finish the month at an average of {:.2} minutes, each remaining day needs {:.2} minutes.",
        projection.desired_avg, projection.required_per_day
    );
    let _ = writeln!(
        output,
        "Clock in at about {} each day.",
        projection.arrival_time.format("%H:%M")
    );

    let guidance = match projection.guidance {
        ArrivalGuidance::Early(minutes) => format!("Arrive {minutes:.2} minutes before 08:00."),
        ArrivalGuidance::Late(minutes) => {
            format!("You can arrive up to {minutes:.2} minutes after 08:00.")
        }
        ArrivalGuidance::OnTime => "Clock in at exactly 08:00 to hit the goal.".to_string(),
    };
    let _ = writeln!(output, "{guidance}");

    output
}
