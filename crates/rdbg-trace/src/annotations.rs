//! Inline hints for call and return records of one source file.

use std::collections::BTreeMap;

use crate::record::{LogRecord, RecordIndex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineHint {
    pub line: u32,
    pub label: String,
    pub index: RecordIndex,
}

/// One hint per line of `path`, taken from the latest call or return record
/// on that line. Line records carry no call metadata and are skipped.
pub fn collect(records: &[LogRecord], path: &str) -> Vec<InlineHint> {
    let mut latest: BTreeMap<u32, &LogRecord> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|record| record.location.path == path && record.call_name().is_some())
    {
        latest
            .entry(record.location.line)
            .and_modify(|current| {
                if record.index >= current.index {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    latest
        .into_iter()
        .filter_map(|(line, record)| {
            Some(InlineHint {
                line,
                label: hint_label(record)?,
                index: record.index,
            })
        })
        .collect()
}

fn hint_label(record: &LogRecord) -> Option<String> {
    if let Some(value) = &record.return_value {
        return Some(format!("#=> {value}"));
    }
    let name = record.call_name()?;
    let params = record
        .parameters
        .iter()
        .flatten()
        .map(|param| format!("{} = {}", param.name, param.value))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{name}({params})"))
}
