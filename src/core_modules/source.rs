// THEORY:
// The engine never talks to a database or a broker. It asks an
// `ObservationSource` for the rows of one window and routes them to entities.
// `InMemorySource` is the implementation the runner uses: rows are loaded once
// from JSON lines and kept sorted by time, so a window query is one binary
// search plus a scan to the end of the window.

use crate::core_modules::cell_enumerator::CellWindow;
use crate::core_modules::observation::observation::SignalKind;
use crate::error::SourceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One observation as delivered by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub entity: String,
    pub kind: SignalKind,
    pub phenomenon_time: i32,
    pub result: i16,
}

/// Hands out already-materialized rows per window.
pub trait ObservationSource: Send + Sync {
    /// Every row whose timestamp lies in `window`, in time order.
    fn fetch(&self, window: CellWindow) -> Result<Vec<ObservationRow>, SourceError>;

    /// Names of all entities the source knows about.
    fn entities(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    rows: Vec<ObservationRow>,
}

impl InMemorySource {
    pub fn new(mut rows: Vec<ObservationRow>) -> Self {
        rows.sort_by_key(|r| r.phenomenon_time);
        Self { rows }
    }

    /// Parses one JSON object per line. Blank lines are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, SourceError> {
        let mut rows = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|source| SourceError::Parse {
                line: idx + 1,
                source,
            })?;
            rows.push(row);
        }
        Ok(Self::new(rows))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ObservationSource for InMemorySource {
    fn fetch(&self, window: CellWindow) -> Result<Vec<ObservationRow>, SourceError> {
        let from = self.rows.partition_point(|r| r.phenomenon_time < window.start);
        Ok(self.rows[from..]
            .iter()
            .take_while(|r| window.contains(r.phenomenon_time))
            .cloned()
            .collect())
    }

    fn entities(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.rows.iter().map(|r| r.entity.as_str()).collect();
        names.into_iter().map(str::to_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = r#"{"entity":"A","kind":"cycle_second","phenomenon_time":30,"result":0}
{"entity":"A","kind":"primary_signal","phenomenon_time":5,"result":3}

{"entity":"B","kind":"secondary_signal","phenomenon_time":12,"result":1}
"#;

    #[test]
    fn loads_json_lines_sorted() {
        let source = InMemorySource::from_reader(LINES.as_bytes()).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.entities(), vec!["A".to_string(), "B".to_string()]);

        let rows = source.fetch(CellWindow { start: 0, end: 30 }).unwrap();
        let times: Vec<i32> = rows.iter().map(|r| r.phenomenon_time).collect();
        assert_eq!(times, vec![5, 12]);
        assert_eq!(rows[1].kind, SignalKind::SecondarySignal);
    }

    #[test]
    fn window_end_is_exclusive() {
        let source = InMemorySource::from_reader(LINES.as_bytes()).unwrap();
        assert_eq!(source.fetch(CellWindow { start: 30, end: 31 }).unwrap().len(), 1);
        assert!(source.fetch(CellWindow { start: 31, end: 60 }).unwrap().is_empty());
    }

    #[test]
    fn fetch_returns_exactly_the_rows_inside_the_window() {
        let source = InMemorySource::from_reader(LINES.as_bytes()).unwrap();
        for window in [
            CellWindow { start: 5, end: 13 },
            CellWindow { start: 6, end: 31 },
            CellWindow { start: 30, end: 30 },
        ] {
            let rows = source.fetch(window).unwrap();
            let expected = [5, 12, 30]
                .iter()
                .filter(|&&t| window.contains(t))
                .count();
            assert_eq!(rows.len(), expected);
            assert!(rows.iter().all(|r| window.contains(r.phenomenon_time)));
        }
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let input = "{\"entity\":\"A\",\"kind\":\"cycle_second\",\"phenomenon_time\":1,\"result\":0}\nnot json\n";
        match InMemorySource::from_reader(input.as_bytes()) {
            Err(SourceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
