use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};

use crate::{BugId, BugRecord, Corpus, CoreError, TrackerSource};

pub const COLUMN_BUG_ID: &str = "Bug ID";
pub const COLUMN_SUMMARY: &str = "Summary";
pub const COLUMN_STATUS: &str = "Status";
pub const COLUMN_RESOLUTION: &str = "Resolution";
pub const COLUMN_OPENED: &str = "Opened";
pub const COLUMN_STACK_TRACE: &str = "Stack Trace";

const REQUIRED_COLUMNS: [&str; 4] = [
    COLUMN_BUG_ID,
    COLUMN_SUMMARY,
    COLUMN_RESOLUTION,
    COLUMN_OPENED,
];
const KNOWN_COLUMNS: [&str; 6] = [
    COLUMN_BUG_ID,
    COLUMN_SUMMARY,
    COLUMN_STATUS,
    COLUMN_RESOLUTION,
    COLUMN_OPENED,
    COLUMN_STACK_TRACE,
];

struct ColumnIndex {
    id: usize,
    summary: usize,
    resolution: usize,
    opened: usize,
    status: Option<usize>,
    stack_trace: Option<usize>,
    extra: Vec<(usize, String)>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, CoreError> {
        let position = |name: &str| headers.iter().position(|header| header == name);
        let required = |name: &str| {
            position(name).ok_or_else(|| {
                CoreError::Parse(format!("csv input is missing required column '{name}'"))
            })
        };

        Ok(Self {
            id: required(COLUMN_BUG_ID)?,
            summary: required(COLUMN_SUMMARY)?,
            resolution: required(COLUMN_RESOLUTION)?,
            opened: required(COLUMN_OPENED)?,
            status: position(COLUMN_STATUS),
            stack_trace: position(COLUMN_STACK_TRACE),
            extra: headers
                .iter()
                .enumerate()
                .filter(|(_, header)| !KNOWN_COLUMNS.contains(header))
                .map(|(idx, header)| (idx, header.to_owned()))
                .collect(),
        })
    }
}

/// Parses a tracker CSV export (or a snapshot written by [`write_corpus_csv`]).
pub fn read_corpus_csv(input: &str, source: TrackerSource) -> Result<Corpus, CoreError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(input.as_bytes());

    let headers = reader
        .headers()
        .cloned()
        .map_err(|error| CoreError::Parse(format!("failed to read csv headers: {error}")))?;
    let columns = ColumnIndex::from_headers(&headers)?;

    let mut records = Vec::new();
    for (row_idx, row) in reader.records().enumerate() {
        let row = row.map_err(|error| {
            CoreError::Parse(format!("failed to read csv row {}: {error}", row_idx + 1))
        })?;
        records.push(record_from_row(&row, &columns, source, row_idx + 1)?);
    }

    Ok(Corpus::new(records))
}

pub fn read_corpus_csv_file(path: &Path, source: TrackerSource) -> Result<Corpus, CoreError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|error| CoreError::file_access(path, "read csv", error))?;
    read_corpus_csv(&raw, source).map_err(|error| match error {
        CoreError::Parse(message) => CoreError::Parse(format!("{}: {message}", path.display())),
        other => other,
    })
}

fn record_from_row(
    row: &StringRecord,
    columns: &ColumnIndex,
    source: TrackerSource,
    row_number: usize,
) -> Result<BugRecord, CoreError> {
    let cell = |idx: usize| row.get(idx).unwrap_or_default().to_owned();

    let raw_id = cell(columns.id);
    if raw_id.is_empty() {
        return Err(CoreError::Parse(format!(
            "csv row {row_number} has an empty '{COLUMN_BUG_ID}'"
        )));
    }
    let id = BugId::parse(&raw_id)
        .map_err(|error| CoreError::Parse(format!("csv row {row_number}: {error}")))?;

    let stack_trace = match columns.stack_trace {
        Some(idx) => parse_flag(&cell(idx)).ok_or_else(|| {
            CoreError::Parse(format!(
                "csv row {row_number} has a non-boolean '{COLUMN_STACK_TRACE}' value"
            ))
        })?,
        None => false,
    };

    Ok(BugRecord {
        id,
        source,
        title: cell(columns.summary),
        status: columns.status.map(cell).unwrap_or_default(),
        resolution: cell(columns.resolution),
        opened: cell(columns.opened),
        stack_trace,
        extra: columns
            .extra
            .iter()
            .map(|(idx, name)| (name.clone(), cell(*idx)))
            .collect::<BTreeMap<_, _>>(),
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" => Some(false),
        "true" | "1" | "yes" => Some(true),
        _ => None,
    }
}

/// Renders `corpus` sorted by id with a fixed column order.
///
/// Canonical columns come first, then `Stack Trace` for GitHub snapshots, then
/// every extra column name in sorted order. Lines end in `\n`.
pub fn write_corpus_csv(corpus: &Corpus, source: TrackerSource) -> Result<String, CoreError> {
    let extra_columns = corpus
        .iter()
        .flat_map(|record| record.extra.keys().cloned())
        .collect::<BTreeSet<_>>();

    let mut headers = vec![
        COLUMN_BUG_ID.to_owned(),
        COLUMN_SUMMARY.to_owned(),
        COLUMN_STATUS.to_owned(),
        COLUMN_RESOLUTION.to_owned(),
        COLUMN_OPENED.to_owned(),
    ];
    let with_stack_trace = source == TrackerSource::Github;
    if with_stack_trace {
        headers.push(COLUMN_STACK_TRACE.to_owned());
    }
    headers.extend(extra_columns.iter().cloned());

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(&headers).map_err(csv_write_error)?;

    for record in corpus.sorted_by_id() {
        let mut row = vec![
            record.id.to_string(),
            record.title.clone(),
            record.status.clone(),
            record.resolution.clone(),
            record.opened.clone(),
        ];
        if with_stack_trace {
            row.push(record.stack_trace.to_string());
        }
        row.extend(
            extra_columns
                .iter()
                .map(|name| record.extra.get(name).cloned().unwrap_or_default()),
        );
        writer.write_record(&row).map_err(csv_write_error)?;
    }

    let bytes = writer.into_inner().map_err(|error| {
        CoreError::Parse(format!("failed to flush csv output: {}", error.error()))
    })?;
    String::from_utf8(bytes)
        .map_err(|error| CoreError::Parse(format!("csv output was not valid UTF-8: {error}")))
}

fn csv_write_error(error: csv::Error) -> CoreError {
    CoreError::Parse(format!("failed to encode csv row: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUGZILLA_EXPORT: &str = "\
\"Bug ID\",\"Product\",\"Component\",\"Status\",\"Resolution\",\"Summary\",\"Opened\"
112561,\"gcc\",\"target\",\"RESOLVED\",\"FIXED\",\" RISC-V: Wrong code at -O3 \",\"2023-11-15 19:34:56\"
112801,\"gcc\",\"middle-end\",\"NEW\",\"---\",\"[14 Regression] vsetvl, x\",\"2023-12-01 08:00:00\"
";

    #[test]
    fn read_corpus_csv_maps_known_columns_and_keeps_the_rest() {
        let corpus = read_corpus_csv(BUGZILLA_EXPORT, TrackerSource::Bugzilla).expect("parse");

        assert_eq!(corpus.len(), 2);
        let first = &corpus.records()[0];
        assert_eq!(first.id, BugId::new(112561));
        assert_eq!(first.title, "RISC-V: Wrong code at -O3");
        assert_eq!(first.status, "RESOLVED");
        assert_eq!(first.resolution, "FIXED");
        assert_eq!(first.opened, "2023-11-15 19:34:56");
        assert!(!first.stack_trace);
        assert_eq!(first.extra.get("Component").map(String::as_str), Some("target"));
        assert_eq!(corpus.records()[1].title, "[14 Regression] vsetvl, x");
    }

    #[test]
    fn read_corpus_csv_requires_the_canonical_columns() {
        let input = "\"Bug ID\",\"Summary\",\"Resolution\"\n1,\"x\",\"---\"\n";

        let error = read_corpus_csv(input, TrackerSource::Bugzilla).expect_err("missing Opened");

        assert_eq!(
            error,
            CoreError::Parse("csv input is missing required column 'Opened'".to_owned())
        );
    }

    #[test]
    fn read_corpus_csv_rejects_non_numeric_ids() {
        let input = "Bug ID,Summary,Resolution,Opened\nPR1,x,---,2024-01-01\n";

        let error = read_corpus_csv(input, TrackerSource::Bugzilla).expect_err("bad id");

        assert!(matches!(error, CoreError::Parse(message) if message.contains("row 1")));
    }

    #[test]
    fn write_corpus_csv_sorts_by_id_and_orders_columns() {
        let corpus = read_corpus_csv(BUGZILLA_EXPORT, TrackerSource::Bugzilla).expect("parse");
        let reversed = Corpus::new(corpus.records().iter().rev().cloned().collect());

        let output = write_corpus_csv(&reversed, TrackerSource::Bugzilla).expect("write");

        let expected = "\
Bug ID,Summary,Status,Resolution,Opened,Component,Product
112561,RISC-V: Wrong code at -O3,RESOLVED,FIXED,2023-11-15 19:34:56,target,gcc
112801,\"[14 Regression] vsetvl, x\",NEW,---,2023-12-01 08:00:00,middle-end,gcc
";
        assert_eq!(output, expected);
    }

    #[test]
    fn github_snapshots_carry_the_stack_trace_flag() {
        let corpus = Corpus::new(vec![BugRecord::new(
            73041,
            TrackerSource::Github,
            "[RISCV] crash in isel",
            "",
            "2023-11-22T10:00:00Z",
        )
        .with_status("open")
        .with_stack_trace(true)]);

        let output = write_corpus_csv(&corpus, TrackerSource::Github).expect("write");
        let reparsed = read_corpus_csv(&output, TrackerSource::Github).expect("reparse");

        assert!(output.starts_with("Bug ID,Summary,Status,Resolution,Opened,Stack Trace\n"));
        assert_eq!(reparsed, corpus);
    }
}
