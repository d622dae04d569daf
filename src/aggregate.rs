use std::collections::{BTreeMap, BTreeSet};

use crate::models::{CaseRecord, MonthKey, MonthTotal, MonthTypeTotal};

fn month_key(record: &CaseRecord) -> MonthKey {
    record.month
}

fn month_type_key(record: &CaseRecord) -> (MonthKey, String) {
    (record.month, record.case_type.clone())
}

fn group_scores<K, F>(records: &[CaseRecord], key: F) -> BTreeMap<K, (f64, usize)>
where
    K: Ord,
    F: Fn(&CaseRecord) -> K,
{
    let mut groups: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(key(record)).or_insert((0.0, 0));
        entry.0 += record.score;
        entry.1 += 1;
    }
    groups
}

pub fn by_month_and_type(records: &[CaseRecord]) -> Vec<MonthTypeTotal> {
    group_scores(records, month_type_key)
        .into_iter()
        .map(|((month, case_type), (total_score, case_count))| MonthTypeTotal {
            month,
            case_type,
            total_score,
            case_count,
        })
        .collect()
}

pub fn by_month(records: &[CaseRecord]) -> Vec<MonthTotal> {
    group_scores(records, month_key)
        .into_iter()
        .map(|(month, (total_score, case_count))| MonthTotal {
            month,
            total_score,
            case_count,
        })
        .collect()
}

pub trait MonthScoped {
    fn month(&self) -> MonthKey;
}

impl MonthScoped for MonthTypeTotal {
    fn month(&self) -> MonthKey {
        self.month
    }
}

impl MonthScoped for MonthTotal {
    fn month(&self) -> MonthKey {
        self.month
    }
}

impl MonthScoped for CaseRecord {
    fn month(&self) -> MonthKey {
        self.month
    }
}

/// Keeps only rows whose month is selected. An empty selection keeps nothing.
pub fn filter_months<T: MonthScoped + Clone>(rows: &[T], selected: &[MonthKey]) -> Vec<T> {
    rows.iter()
        .filter(|row| selected.contains(&row.month()))
        .cloned()
        .collect()
}

pub fn available_months(records: &[CaseRecord]) -> Vec<MonthKey> {
    records
        .iter()
        .map(month_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
