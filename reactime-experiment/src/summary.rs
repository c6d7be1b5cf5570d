//! Flattened one-row-per-session view used for the multi-user summary table.

use crate::recorder::SessionFile;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Column name to cell text, e.g. `"flanker.flanker_effect_ms" -> "42.5"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryRow(BTreeMap<String, String>);

impl SummaryRow {
    pub fn set(&mut self, column: impl Into<String>, value: impl ToString) {
        self.0.insert(column.into(), value.to_string());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn flatten_summary(file: &SessionFile) -> SummaryRow {
    let mut row = SummaryRow::default();
    row.set("session_start", &file.session_start);
    if let Some(end) = &file.session_end {
        row.set("session_end", end);
    }
    if let Some(p) = &file.participant {
        row.set("participant.name", &p.name);
        if let Some(age) = p.age {
            row.set("participant.age", age);
        }
        if let Some(sex) = &p.sex {
            row.set("participant.sex", sex);
        }
        if let Some(s) = p.sleepiness {
            row.set("participant.sleepiness", s);
        }
    }

    for (game, record) in &file.games {
        let s = &record.round_summary;
        row.set(format!("{game}.trials"), s.trials);
        row.set(format!("{game}.accuracy"), s.accuracy);
        row.set(format!("{game}.duration_ms"), s.duration_ms);
        if let Some(rt) = s.mean_rt_ms {
            row.set(format!("{game}.mean_rt_ms"), rt);
        }
        for (name, value) in record.derived_metrics.iter() {
            row.set(format!("{game}.{name}"), value);
        }
    }

    for task in &file.tasks {
        let prefix = task.task.game_name();
        row.set(format!("{prefix}.status"), task.status.as_str());
        for (name, value) in task.derived.iter() {
            row.set(format!("{prefix}.{name}"), value);
        }
    }
    row
}

/// Rows from many sessions; the header is the union of their columns.
#[derive(Debug, Clone, Default)]
pub struct SummaryTable {
    rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, row: SummaryRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn header(&self) -> Vec<&str> {
        let columns: BTreeSet<&str> = self.rows.iter().flat_map(SummaryRow::columns).collect();
        columns.into_iter().collect()
    }

    /// Comma-separated text with a header line; missing cells are empty.
    pub fn to_csv(&self) -> String {
        let header = self.header();
        let mut out = String::new();
        let _ = writeln!(out, "{}", join(header.iter().copied()));
        for row in &self.rows {
            let cells = header.iter().map(|c| row.get(c).unwrap_or(""));
            let _ = writeln!(out, "{}", join(cells));
        }
        out
    }
}

fn join<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    cells.map(escape).collect::<Vec<_>>().join(",")
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RoundAggregator;
    use crate::config::{RtPolicy, TaskKind};
    use crate::recorder::{ParticipantInfo, RoundRecord};
    use crate::session::{DerivedMetrics, TaskSession};

    fn session() -> SessionFile {
        let mut file = SessionFile::new(Some(ParticipantInfo {
            name: "Doe, J".into(),
            age: Some(25),
            consent: true,
            ..Default::default()
        }));
        let mut metrics = DerivedMetrics::new();
        metrics.insert("lapses", 2.0);
        file.games.insert(
            "pvt_round_1".into(),
            RoundRecord {
                game_name: "pvt_round_1".into(),
                round_summary: RoundAggregator::new(0, "pvt_round_1", RtPolicy::CorrectOnly, 0)
                    .summary(),
                raw_reaction_times: Vec::new(),
                derived_metrics: metrics,
                data_points: Vec::new(),
                started_at_ms: 0,
                ended_at_ms: 0,
            },
        );
        let mut task = TaskSession::new(TaskKind::Flanker);
        let mut derived = DerivedMetrics::new();
        derived.insert("flanker_effect_ms", 42.5);
        task.finalize(derived);
        file.tasks.push(task);
        file
    }

    #[test]
    fn flattens_round_and_task_metrics() {
        let row = flatten_summary(&session());
        assert_eq!(row.get("pvt_round_1.lapses"), Some("2"));
        assert_eq!(row.get("flanker.flanker_effect_ms"), Some("42.5"));
        assert_eq!(row.get("flanker.status"), Some("completed"));
        assert_eq!(row.get("participant.age"), Some("25"));
        assert_eq!(row.get("pvt_round_1.mean_rt_ms"), None);
    }

    #[test]
    fn csv_uses_union_of_columns() {
        let mut table = SummaryTable::new();
        table.append(flatten_summary(&session()));
        let mut sparse = SummaryRow::default();
        sparse.set("participant.name", "second");
        table.append(sparse);

        let csv = table.to_csv();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        let header: Vec<_> = lines[0].split(',').collect();
        let name_col = header.iter().position(|c| *c == "participant.name").unwrap();
        assert!(lines[1].contains("\"Doe, J\""));
        assert_eq!(lines[2].split(',').nth(name_col), Some("second"));
        assert_eq!(lines[2].matches(',').count(), header.len() - 1);
    }
}
