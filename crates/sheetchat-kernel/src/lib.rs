mod filter;
mod intent;
mod memory;
mod normalize;
mod prompt;
mod rules;
mod sheets;

pub use filter::{filter_rows, keywords, render_rows, score_row, STOP_WORDS};
pub use intent::{IntentClassifier, IntentRule};
pub use memory::ConversationMemory;
pub use normalize::{normalize, tokens};
pub use prompt::{sample_context, truncate_chars, PromptBuilder, PromptContext};
pub use rules::{
    apply_filters, detect_filters, executive_summary, most_recent, parse_date, parse_number,
    Answer, ColumnFilter, ExecutiveSummary, RuleEngine, RuleOutcome, LIST_LIMIT,
};
pub use sheets::{detect_sheet, SheetProfile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let wanted = column.trim();
        self.cells
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(_, v)| v.as_str())
    }

    pub fn joined(&self) -> String {
        self.values().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn from_records(columns: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(|c| c.trim().to_string()).collect();
        let rows = records
            .into_iter()
            .filter(|record| record.iter().any(|v| !v.trim().is_empty()))
            .map(|record| {
                let mut values = record.into_iter();
                Row::new(
                    columns
                        .iter()
                        .map(|c| (c.clone(), values.next().unwrap_or_default()))
                        .collect(),
                )
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    sheets: Vec<(String, Table)>,
}

impl Snapshot {
    pub fn new(sheets: Vec<(String, Table)>) -> Self {
        Self { sheets }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.sheets
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| t)
    }

    pub fn sheets(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.sheets.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.sheets.iter().map(|(_, t)| t.len()).sum()
    }
}
